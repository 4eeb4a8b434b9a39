//! Error types for lockin

use thiserror::Error;

use crate::date_window::YearMonth;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Server request failed: {0}")]
    Remote(#[from] RemoteError),

    /// A month load finished after the selection moved on. Never shown to users.
    #[error("Discarded stale response for {requested}")]
    StaleResponseDiscarded { requested: YearMonth },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an "other" error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether the backend rejected the session and the user must log in again.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::Unauthorized))
    }
}

/// Bad local input. Raised before any request is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("habit name must not be empty")]
    EmptyName,

    #[error("month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),

    #[error("{month} is earlier than the first tracked month {earliest}")]
    BeforeEarliestMonth {
        month: YearMonth,
        earliest: YearMonth,
    },

    #[error("day {day} of {month} can no longer be edited")]
    DayNotEditable { day: u32, month: YearMonth },

    #[error("no habit with id {0} in the current month")]
    UnknownHabit(String),

    #[error("nothing is staged for confirmation")]
    NothingStaged,

    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),

    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("name must be between 1 and {max} characters")]
    InvalidDisplayName { max: usize },
}

/// A duplicate of an operation that is still in flight.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("day {day} of habit {habit_id} is already being toggled")]
    ToggleInProgress { habit_id: String, day: u32 },

    #[error("a habit is already being created")]
    CreateInProgress,
}

/// The backend rejected a request or could not be reached.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("session is missing or expired, please log in again")]
    Unauthorized,

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("server refused the operation: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Create a rejection error
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            Self::Transport(e.to_string())
        }
    }
}
