//! Reassembly of streamed assistant answers
//!
//! Transport chunks go into a [`StreamSession`], which extracts the JSON
//! control and content objects embedded in the stream, grows the assistant
//! message of the current turn and keeps its markdown render tree up to date.

pub mod config;
pub mod conversation;
pub mod driver;
pub mod error;
pub mod logging;
pub mod recording;
pub mod render;
pub mod session;
pub mod streaming;
pub mod ui;

#[cfg(test)]
mod tests;

pub use config::AssemblerConfig;
pub use conversation::{ChatMessage, MessageRole, TurnState};
pub use error::{AssemblerError, RenderError, StreamError};
pub use session::StreamSession;
