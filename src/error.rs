use crate::ui::UIError;
use thiserror::Error;

/// Terminal condition for the active turn.
///
/// Partial assistant content is never discarded when one of these is raised;
/// the UI layer is expected to show it together with an error indicator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The backend sent an explicit `{"type":"error"}` unit
    #[error("Server error: {message}")]
    Server { message: String },

    /// The transport went away before a completion signal arrived
    #[error("Transport closed: {reason}")]
    TransportClosed { reason: String },

    /// Raised by the driver when no chunk arrived for too long
    #[error("No data received for {seconds} seconds")]
    IdleTimeout { seconds: u64 },
}

impl StreamError {
    /// Message suitable for showing next to the partial answer
    pub fn message(&self) -> String {
        match self {
            StreamError::Server { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Misuse of the assembler or failures of its collaborators.
#[derive(Error, Debug)]
pub enum AssemblerError {
    #[error("A turn is still streaming; wait for it to finish before sending")]
    TurnInProgress,

    #[error("UI error: {0}")]
    Ui(#[from] UIError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure of a markdown renderer. Always recovered by falling back to plain text.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Markdown renderer failed: {0}")]
    Failed(String),

    #[error("Markdown renderer panicked: {0}")]
    Panicked(String),
}
