use super::dedup::clean_buffer;
use super::{ChatMessage, MessageRole, TurnState};
use crate::config::{AssemblerConfig, DedupConfig};
use crate::error::{AssemblerError, StreamError};
use crate::render::MarkdownRenderer;
use crate::streaming::ControlMessage;
use crate::ui::{MessageSink, UIError};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// True if joining `fragment` to `content` needs a separating space.
///
/// Both sides of the boundary must be ASCII letters or digits, and the last
/// word of `content` must not be an unfinished markdown token such as `**bold`
/// or `[link](http`.
pub(crate) fn needs_boundary_space(content: &str, fragment: &str) -> bool {
    let (Some(tail), Some(head)) = (content.chars().last(), fragment.chars().next()) else {
        return false;
    };
    if !tail.is_ascii_alphanumeric() || !head.is_ascii_alphanumeric() {
        return false;
    }

    let last_word = content.rsplit(char::is_whitespace).next().unwrap_or_default();
    !has_open_token(last_word)
}

/// An emphasis, code span, link or path that the next fragment may continue
fn has_open_token(word: &str) -> bool {
    let open_emphasis = ['*', '_', '`']
        .into_iter()
        .any(|marker| marker_runs(word, marker) % 2 == 1);
    let open_bracket = word.matches('[').count() > word.matches(']').count();
    let open_link_target = word
        .rfind("](")
        .is_some_and(|at| !word[at..].contains(')'));
    let path = word.contains("://")
        || word.starts_with('/')
        || word.starts_with("./")
        || word.starts_with("~/");

    open_emphasis || open_bracket || open_link_target || path
}

/// Number of separate runs of `marker` in `word` (`**a**` has two)
fn marker_runs(word: &str, marker: char) -> usize {
    let mut runs = 0;
    let mut previous = None;
    for c in word.chars() {
        if c == marker && previous != Some(marker) {
            runs += 1;
        }
        previous = Some(c);
    }
    runs
}

/// Builds the assistant message of the active turn and keeps its render tree
/// in sync with the accumulated text.
pub struct MessageAccumulator {
    config: AssemblerConfig,
    renderer: Arc<dyn MarkdownRenderer>,
    sink: Arc<Box<dyn MessageSink>>,
    messages: Vec<ChatMessage>,
    /// Index of the assistant message being built
    current: Option<usize>,
    state: TurnState,
    /// The last fragment was literal stream text, so a following literal
    /// fragment continues it without a boundary fix
    after_text: bool,
    next_id: u64,
}

impl MessageAccumulator {
    pub fn new(
        config: AssemblerConfig,
        renderer: Arc<dyn MarkdownRenderer>,
        sink: Arc<Box<dyn MessageSink>>,
    ) -> Self {
        Self {
            config,
            renderer,
            sink,
            messages: Vec::new(),
            current: None,
            state: TurnState::Idle,
            after_text: false,
            next_id: 1,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn streaming_active(&self) -> bool {
        self.state.is_streaming()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn current_message(&self) -> Option<&ChatMessage> {
        self.current.map(|index| &self.messages[index])
    }

    pub fn current_message_id(&self) -> Option<&str> {
        self.current_message().map(|message| message.id.as_str())
    }

    /// The most recent assistant message, whether or not its turn has ended
    pub fn last_assistant_message(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == MessageRole::Assistant)
    }

    /// Record a message the user sent. Not allowed while a turn is streaming.
    pub fn push_user_message(
        &mut self,
        content: impl Into<String>,
    ) -> Result<&ChatMessage, AssemblerError> {
        if self.state.is_streaming() {
            return Err(AssemblerError::TurnInProgress);
        }

        let id = self.allocate_id("user");
        self.messages.push(ChatMessage::user(id, content.into()));
        self.current = None;
        self.state = TurnState::Idle;

        let message = &self.messages[self.messages.len() - 1];
        self.sink.message_updated(message)?;
        Ok(message)
    }

    /// Append a fragment taken from a content object
    pub fn on_content(&mut self, fragment: &str) {
        self.append(fragment, false);
    }

    /// Append literal text that appeared in the stream between objects
    pub fn on_text(&mut self, text: &str) {
        self.append(text, true);
    }

    /// Apply a control unit. An `error` unit ends the turn and is returned so
    /// the caller sees it.
    pub fn on_control(&mut self, message: ControlMessage) -> Result<(), StreamError> {
        match message {
            ControlMessage::Completion { .. } => {
                self.finalize();
                Ok(())
            }
            ControlMessage::Error { .. } => {
                let error = StreamError::Server {
                    message: message.error_text().unwrap_or_default(),
                };
                self.fail(error.clone());
                Err(error)
            }
            ControlMessage::Connected { session_id } => {
                debug!("Stream established (session {:?})", session_id);
                let result = self.sink.stream_established(session_id.as_deref());
                self.report(result);
                Ok(())
            }
            ControlMessage::Keepalive => {
                trace!("Keepalive reached the accumulator");
                Ok(())
            }
        }
    }

    /// End the turn normally. The assistant message, if any, is frozen and
    /// optionally cleaned of duplicates. Finalizing a turn without content is
    /// allowed and only reports an empty finish.
    pub fn finalize(&mut self) {
        let current = self.current.take();
        self.state = TurnState::Finalized;
        self.after_text = false;

        let Some(index) = current else {
            debug!("Finalizing turn without assistant content");
            let result = self.sink.turn_finished(None);
            self.report(result);
            return;
        };

        let message = &mut self.messages[index];
        message.frozen = true;
        if self.config.dedup.on_finalize {
            let cleaned = clean_buffer(&message.content, &self.config.dedup);
            if cleaned != message.content {
                debug!(
                    "Removed {} bytes of repeated content from {}",
                    message.content.len().saturating_sub(cleaned.len()),
                    message.id
                );
                message.content = cleaned;
            }
        }
        // The frozen message is rendered from its final content
        render_into(self.renderer.as_ref(), None, message);

        let message = &self.messages[index];
        let updated = self.sink.message_updated(message);
        self.report(updated);
        let finished = self.sink.turn_finished(Some(&self.messages[index]));
        self.report(finished);
    }

    /// End the turn with an error. Partial content stays exactly as it was.
    pub fn fail(&mut self, error: StreamError) {
        warn!("Turn failed: {}", error);
        if let Some(index) = self.current.take() {
            self.messages[index].frozen = true;
        }
        self.state = TurnState::Failed;
        self.after_text = false;

        let result = self.sink.turn_failed(&error);
        self.report(result);
    }

    /// Finalize a failed turn once its transport is closed. The partial
    /// message keeps its content and nothing is reported again.
    pub fn close_failed(&mut self) {
        if self.state == TurnState::Failed {
            self.state = TurnState::Finalized;
        }
    }

    fn append(&mut self, fragment: &str, literal: bool) {
        if fragment.is_empty() {
            return;
        }

        let index = self.current_or_start();
        let continues_text = literal && self.after_text;
        self.after_text = literal;

        let message = &mut self.messages[index];
        if self.config.boundary_fix
            && !continues_text
            && needs_boundary_space(&message.content, fragment)
        {
            trace!("Inserting boundary space before {:?}", fragment);
            message.content.push(' ');
        }
        message.content.push_str(fragment);

        let dedup = self
            .config
            .dedup
            .during_streaming
            .then_some(&self.config.dedup);
        render_into(self.renderer.as_ref(), dedup, message);

        let result = self.sink.message_updated(&self.messages[index]);
        self.report(result);
    }

    fn current_or_start(&mut self) -> usize {
        if let Some(index) = self.current {
            return index;
        }

        let id = self.allocate_id("assistant");
        debug!("Starting assistant message {}", id);
        self.messages.push(ChatMessage::assistant(id));
        let index = self.messages.len() - 1;
        self.current = Some(index);
        self.state = TurnState::Streaming;
        self.after_text = false;
        index
    }

    fn allocate_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}-{}", self.next_id);
        self.next_id += 1;
        id
    }

    /// UI failures never interrupt the stream
    fn report(&self, result: Result<(), UIError>) {
        if let Err(err) = result {
            warn!("Failed to update UI: {}", err);
        }
    }
}

/// Re-derive the render tree of `message`. With `dedup` set the tree is built
/// from a cleaned copy; the content itself is left alone.
fn render_into(
    renderer: &dyn MarkdownRenderer,
    dedup: Option<&DedupConfig>,
    message: &mut ChatMessage,
) {
    let source = match dedup {
        Some(config) => Cow::Owned(clean_buffer(&message.content, config)),
        None => Cow::Borrowed(message.content.as_str()),
    };

    message.rendered = match renderer.render(&source) {
        Ok(rendered) => Some(rendered),
        Err(err) => {
            warn!("Falling back to plain text for {}: {}", message.id, err);
            None
        }
    };
}
