// Tracing initialisation
//
// Console logging through tracing-subscriber with an EnvFilter. Every pool
// logs with its name as a structured field, so filtering on `pool` or
// `resource` isolates one component.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Whether to enable console logging
    pub enable_console: bool,
    /// Log filter (e.g., "info", "debug", "neko_runtime=debug")
    pub log_filter: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "neko".to_string(),
            enable_console: true,
            log_filter: None,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// - `NEKO_SERVICE_NAME`: service name (default: "neko")
    /// - `RUST_LOG` or `LOG_LEVEL`: log filter (default: "info")
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("NEKO_SERVICE_NAME").unwrap_or_else(|_| "neko".to_string()),
            enable_console: true,
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
        }
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

/// Install the global tracing subscriber
///
/// Returns `false` if a subscriber was already installed, in which case the
/// existing one is left in place.
pub fn init_telemetry(config: &TelemetryConfig) -> bool {
    let console_layer = if config.enable_console {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(config.filter()),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(service = %config.service_name, "Telemetry initialised");
    }
    installed
}
