//! Error types for pools and shared resources

use std::any::Any;
use std::path::PathBuf;
use std::time::Duration;

/// Errors surfaced by worker pools and shared resource pools
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// No pooled resource became available within the caller's timeout
    #[error("{resource}: no connection available after {waited:?}")]
    ResourceExhausted {
        resource: &'static str,
        waited: Duration,
    },

    /// The submitted closure panicked inside a worker
    #[error("{pool}: worker panicked: {message}")]
    WorkerPanicked { pool: &'static str, message: String },

    /// The pool or resource is shutting down or already stopped
    #[error("{resource} has been shut down")]
    ShutDown { resource: &'static str },

    /// Building the underlying resource failed
    #[error("failed to construct {resource}: {source}")]
    Construction {
        resource: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Configuration could not be read or was invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database error from the pooled connection
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File system error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoolError {
    pub(crate) fn construction(
        resource: &'static str,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Construction {
            resource,
            source: source.into(),
        }
    }

    /// Build a [`PoolError::WorkerPanicked`] from a caught panic payload
    pub(crate) fn from_panic(pool: &'static str, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::WorkerPanicked { pool, message }
    }

    /// Whether the error means the caller ran out of pooled resources
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }
}

/// Errors from the configuration collaborator
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config '{name}' not found at {}", path.display())]
    NotFound { name: String, path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
