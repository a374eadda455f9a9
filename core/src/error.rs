use thiserror::Error;

/// Failures recorded by the lifecycle dispatcher.
///
/// `Configuration` and `UnidentifiedDashboard` are detected before any network
/// call is made. `Transport` and `ResponseStatus` are only known once a request
/// settles.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("\"{0}\" is not a valid URL")]
    Configuration(String),

    #[error("Dashboard has no uid; save it before sessions can be reported")]
    UnidentifiedDashboard,

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Returned status {status}")]
    ResponseStatus { status: u16 },
}

impl DispatchError {
    /// Whether an explicit retry from the panel can succeed without the user
    /// editing options or saving the dashboard first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Transport(_) | DispatchError::ResponseStatus { .. }
        )
    }

    /// Numeric status carried by a `ResponseStatus` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            DispatchError::ResponseStatus { status } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(e: reqwest::Error) -> Self {
        DispatchError::Transport(e.to_string())
    }
}
