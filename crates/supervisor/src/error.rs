use std::{path::PathBuf, time::Duration};

/// Failures of a configuration sync run.
///
/// Clonable so a single outcome can be handed to every caller waiting on the
/// same gateway start.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// The document does not hold what a critical step just wrote.
    #[error("config sync mismatch for {key}: wrote {expected_prefix}, read back {actual_prefix}")]
    TokenSyncMismatch {
        key: String,
        expected_prefix: String,
        actual_prefix: String,
    },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("gateway is not configured ({path} missing)")]
    NotConfigured { path: PathBuf },

    #[error(transparent)]
    TokenSync(#[from] SyncError),

    #[error("gateway did not become ready within {}ms", timeout.as_millis())]
    StartTimeout { timeout: Duration },

    #[error("failed to spawn gateway: {message}")]
    Spawn { message: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl clawgate_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

clawgate_common::impl_context!();
