// Neko bot process
// Decision: This binary is the single owner of the ExecutionContext lifecycle
// Decision: Shutdown runs exactly once, after Ctrl-C, bounded by NEKO_SHUTDOWN_TIMEOUT_SECS

use std::sync::Arc;

use anyhow::{Context, Result};
use neko_runtime::telemetry::{init_telemetry, TelemetryConfig};
use neko_runtime::{ExecutionContext, RuntimeConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "info")
    // - NEKO_CONFIG_DIR: directory holding database.yaml (default: "config")
    let mut telemetry_config = TelemetryConfig::from_env();
    if telemetry_config.log_filter.is_none() {
        telemetry_config.log_filter = Some("neko_runtime=info,neko=info".to_string());
    }
    init_telemetry(&telemetry_config);

    tracing::info!("neko starting...");

    let config = RuntimeConfig::from_env();
    tracing::info!(
        config_dir = %config.config_dir.display(),
        shutdown_timeout = ?config.shutdown_timeout,
        "Runtime configured"
    );

    let ctx = Arc::new(
        ExecutionContext::new(config).context("Failed to build execution context")?,
    );

    let stats = ctx.stats();
    tracing::info!(
        cpu_workers = stats.cpu.max_workers,
        io_workers = stats.io.max_workers,
        "Ready, waiting for shutdown signal"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    let report = ctx.shutdown_with_configured_timeout().await;
    if report.is_clean() {
        tracing::info!(hooks = report.launched, "Shutdown complete");
    } else {
        tracing::warn!(
            failed = ?report.failed,
            outstanding = report.outstanding,
            timed_out = report.timed_out,
            "Shutdown finished with problems"
        );
    }

    Ok(())
}
