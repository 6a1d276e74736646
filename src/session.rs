//! One conversation's streaming state: transport text in, messages out
//!
//! A [`StreamSession`] owns the chunk buffer, the object extractor and the
//! message accumulator of a single conversation. Each call to `push_chunk`
//! corresponds to one transport callback and runs the whole pipeline
//! synchronously. Sessions share nothing, so any number of them can live in
//! one process.

use crate::config::{AssemblerConfig, Framing};
use crate::conversation::{ChatMessage, MessageAccumulator, TurnState};
use crate::error::{AssemblerError, StreamError};
use crate::render::{MarkdownRenderer, TerminalMarkdownRenderer};
use crate::streaming::{
    ChunkBuffer, ControlMessage, ExtractedUnit, ObjectExtractor, SseDecoder, Utf8Carry,
};
use crate::ui::MessageSink;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// SSE decoding in front of the chunk buffer
#[derive(Debug, Default)]
struct SseFraming {
    decoder: SseDecoder,
    utf8: Utf8Carry,
}

pub struct StreamSession {
    session_id: Option<String>,
    sse: Option<SseFraming>,
    buffer: ChunkBuffer,
    extractor: ObjectExtractor,
    accumulator: MessageAccumulator,
}

impl StreamSession {
    pub fn new(
        config: AssemblerConfig,
        renderer: Arc<dyn MarkdownRenderer>,
        sink: Arc<Box<dyn MessageSink>>,
    ) -> Self {
        let sse = match config.framing {
            Framing::Raw => None,
            Framing::Sse => Some(SseFraming::default()),
        };
        Self {
            session_id: None,
            sse,
            buffer: ChunkBuffer::new(),
            extractor: ObjectExtractor::new(config.keepalive_spacing),
            accumulator: MessageAccumulator::new(config, renderer, sink),
        }
    }

    /// Session using the terminal markdown renderer configured by `config`
    pub fn with_default_renderer(config: AssemblerConfig, sink: Arc<Box<dyn MessageSink>>) -> Self {
        let renderer = Arc::new(TerminalMarkdownRenderer::new(config.markdown.clone()));
        Self::new(config, renderer, sink)
    }

    /// Identifier announced by the backend's `connected` message
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn streaming_active(&self) -> bool {
        self.accumulator.streaming_active()
    }

    pub fn turn_state(&self) -> TurnState {
        self.accumulator.state()
    }

    pub fn current_message_id(&self) -> Option<&str> {
        self.accumulator.current_message_id()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.accumulator.messages()
    }

    pub fn last_assistant_message(&self) -> Option<&ChatMessage> {
        self.accumulator.last_assistant_message()
    }

    /// Transport text that has not been turned into units yet
    pub fn raw_buffer(&self) -> &str {
        self.buffer.as_str()
    }

    /// Start a turn with the user's message
    pub fn begin_turn(&mut self, user_text: &str) -> Result<&ChatMessage, AssemblerError> {
        info!("Beginning turn");
        self.accumulator.push_user_message(user_text)
    }

    /// Process one transport chunk.
    ///
    /// Returns the server error if the chunk carried an `error` unit. The
    /// session state already reflects the failure at that point.
    pub fn push_chunk(&mut self, chunk: &str) -> Result<(), StreamError> {
        match self.sse.as_mut() {
            Some(sse) => {
                let payload = sse.decoder.decode(chunk);
                self.buffer.append(&payload);
            }
            None => self.buffer.append(chunk),
        }
        self.process()
    }

    /// Process one transport chunk given as raw bytes. A multi-byte character
    /// split across chunks is reassembled.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        match self.sse.as_mut() {
            Some(sse) => {
                let text = sse.utf8.decode(bytes);
                let payload = sse.decoder.decode(&text);
                self.buffer.append(&payload);
            }
            None => self.buffer.append_bytes(bytes),
        }
        self.process()
    }

    /// The transport ended or the caller cancelled it.
    ///
    /// Whatever is left in the buffer is flushed into the current message and
    /// the turn is finalized. A failed turn is finalized with its partial
    /// content as it is. Returns an error unit found in the flushed tail.
    pub fn close(&mut self) -> Result<(), StreamError> {
        let result = self.flush();
        match self.accumulator.state() {
            TurnState::Idle | TurnState::Streaming => {
                info!("Closing stream, finalizing turn");
                self.accumulator.finalize();
            }
            TurnState::Failed => {
                debug!("Closing stream after a failed turn");
                self.accumulator.close_failed();
            }
            TurnState::Finalized => {
                debug!("Closing stream after the turn already ended");
            }
        }
        result
    }

    /// The transport failed. Buffered text is kept in the partial message and
    /// the turn ends with `error`.
    pub fn fail(&mut self, error: StreamError) {
        if let Err(server_error) = self.flush() {
            debug!("Remaining buffer carried an error: {}", server_error);
        }
        match self.accumulator.state() {
            TurnState::Idle | TurnState::Streaming => {
                info!("Stream failed: {}", error);
                self.accumulator.fail(error);
            }
            TurnState::Finalized | TurnState::Failed => {
                debug!("Ignoring failure after the turn ended: {}", error);
            }
        }
    }

    fn process(&mut self) -> Result<(), StreamError> {
        let units = self.extractor.drain(&mut self.buffer);
        if !self.buffer.is_empty() {
            debug!("Holding {} bytes for the next chunk", self.buffer.len());
        }
        self.dispatch(units)
    }

    /// Run the end-of-stream drain and dispatch what it yields
    fn flush(&mut self) -> Result<(), StreamError> {
        if let Some(sse) = self.sse.as_mut() {
            let tail = sse.utf8.finish();
            let mut payload = sse.decoder.decode(&tail);
            payload.push_str(&sse.decoder.finish());
            self.buffer.append(&payload);
        }
        let units = self.extractor.finish(&mut self.buffer);
        self.dispatch(units)
    }

    /// Hand units to the accumulator. An error unit ends the turn: whatever
    /// follows it in this chunk, or is still buffered, is dropped.
    fn dispatch(&mut self, units: Vec<ExtractedUnit>) -> Result<(), StreamError> {
        let mut units = units.into_iter();

        while let Some(unit) = units.next() {
            match unit {
                ExtractedUnit::Text(text) => self.accumulator.on_text(&text),
                ExtractedUnit::Content(text) => self.accumulator.on_content(&text),
                ExtractedUnit::Control(message) => {
                    if let ControlMessage::Connected {
                        session_id: Some(id),
                    } = &message
                    {
                        self.adopt_session_id(id);
                    }
                    if let Err(err) = self.accumulator.on_control(message) {
                        let dropped = units.len();
                        if dropped > 0 || !self.buffer.is_empty() {
                            debug!(
                                "Dropping {} units and {} buffered bytes after error",
                                dropped,
                                self.buffer.len()
                            );
                        }
                        self.buffer.clear();
                        self.extractor.reset();
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }

    fn adopt_session_id(&mut self, id: &str) {
        match &self.session_id {
            None => {
                info!("Connected to session {}", id);
                self.session_id = Some(id.to_string());
            }
            Some(existing) if existing != id => {
                warn!(
                    "Ignoring session id {} announced after {}, session ids are immutable",
                    id, existing
                );
            }
            Some(_) => {}
        }
    }
}
