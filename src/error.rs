//! Error taxonomy for scheduling, sessions and page-level uploads.

use chrono::NaiveDateTime;

pub type PublishResult<T> = Result<T, PublishError>;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Malformed schedule configuration. The batch does not start.
    #[error("invalid schedule policy: {0}")]
    InvalidPolicy(String),

    /// No usable session and interactive login is not allowed.
    #[error("no valid session for {platform}/{account}; run `login` first")]
    AuthUnavailable { platform: String, account: String },

    /// The destination picker cannot represent this timestamp.
    #[error("publish time {at} cannot be set on {platform}: {reason}")]
    ScheduleUnsupported {
        platform: String,
        at: NaiveDateTime,
        reason: String,
    },

    /// The platform reported an error for the uploaded media.
    #[error("platform reported a processing error (attempt {attempt})")]
    ProcessingFailed { attempt: u32 },

    /// Retries exhausted for one unit.
    #[error("upload of {unit} failed after {attempts} attempt(s): {reason}")]
    Fatal {
        unit: String,
        attempts: u32,
        reason: String,
    },

    #[error("page driver error: {0}")]
    Driver(String),

    #[error("{0} exceeded the overall deadline")]
    Deadline(&'static str),

    #[error("cancelled")]
    Cancelled,

    #[error("account {0} is in use by another run (lock file present)")]
    AccountBusy(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PublishError {
    pub fn driver(err: impl std::fmt::Display) -> Self {
        Self::Driver(err.to_string())
    }

    /// Errors that stop the whole batch instead of the current unit.
    pub fn aborts_batch(&self) -> bool {
        matches!(
            self,
            Self::InvalidPolicy(_) | Self::AuthUnavailable { .. } | Self::Cancelled
        )
    }
}

impl From<anyhow::Error> for PublishError {
    fn from(err: anyhow::Error) -> Self {
        Self::Driver(format!("{:#}", err))
    }
}
