pub mod terminal;

use crate::conversation::ChatMessage;
use crate::error::StreamError;
use thiserror::Error;

pub use terminal::TerminalSink;

#[derive(Error, Debug)]
pub enum UIError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

/// Receives the observable effects of the accumulator.
///
/// Every method is called synchronously from the thread that feeds chunks,
/// right after the corresponding state change.
pub trait MessageSink: Send + Sync {
    /// A message was created or its content and render tree changed
    fn message_updated(&self, message: &ChatMessage) -> Result<(), UIError>;

    /// The transport reported itself live
    fn stream_established(&self, session_id: Option<&str>) -> Result<(), UIError>;

    /// The turn ended normally; `None` if it produced no assistant message
    fn turn_finished(&self, message: Option<&ChatMessage>) -> Result<(), UIError>;

    /// The turn ended with an error. The partial message, if any, has already
    /// been reported through `message_updated`.
    fn turn_failed(&self, error: &StreamError) -> Result<(), UIError>;
}
