use thiserror::Error;

use crate::logging::LoggingError;

/// Unified result type for the navigation runtime.
pub type Result<T> = std::result::Result<T, NavError>;

/// Errors surfaced by the navigation runtime.
///
/// Everything except `Logging`, `Json` and `Io` is a configuration error: the
/// runtime halts instead of continuing with a partially built stack.
#[derive(Debug, Error)]
pub enum NavError {
    #[error("no screen registered for `{0}`")]
    ScreenNotFound(String),
    #[error("could not find stack in layout {0}")]
    StackNotFound(String),
    #[error("could not find component in {0}")]
    ComponentNotFound(String),
    #[error("channel `{0}` is reserved by the navigation runtime")]
    ReservedChannel(String),
    #[error("navigation runtime halted after a fatal configuration error")]
    Halted,
    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),
    #[error("invalid layout: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NavError {
    /// Configuration errors are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            NavError::ScreenNotFound(_)
                | NavError::StackNotFound(_)
                | NavError::ComponentNotFound(_)
                | NavError::ReservedChannel(_)
                | NavError::Halted
        )
    }
}
