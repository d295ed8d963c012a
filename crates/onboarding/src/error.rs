use clawgate_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Auto-onboarding preconditions not met. Each entry names one.
    #[error("not eligible for onboarding: {}", reasons.join("; "))]
    NotEligible { reasons: Vec<String> },

    /// The gateway's onboard command failed or left no configuration behind.
    #[error("onboard command failed (exit code {exit_code})")]
    OnboardFailure { exit_code: i32, output: String },

    #[error(transparent)]
    Sync(#[from] clawgate_supervisor::SyncError),

    #[error(transparent)]
    Supervisor(#[from] clawgate_supervisor::Error),

    #[error(transparent)]
    Config(#[from] clawgate_config::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

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

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

clawgate_common::impl_context!();
