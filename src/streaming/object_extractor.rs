use super::chunk_buffer::{find_object_end, ChunkBuffer};
use super::control::{classify, Classified, ControlMessage, ExtractedUnit};
use serde_json::Value;
use tracing::{debug, trace};

/// What follows a stretch of plain text in the buffer
#[derive(Debug, Clone, Copy, PartialEq)]
enum Boundary {
    /// A complete, parsed object
    Object,
    /// An object that has started but not closed yet
    PendingObject,
    /// The end of the buffered text
    End,
}

/// Pulls complete `{...}` objects out of the chunk buffer and classifies them.
///
/// State carried between drains only concerns the boundaries around objects:
/// whether the previous unit was an object, and whether a heartbeat was
/// dropped right after a word so the next word needs a separating space.
#[derive(Debug)]
pub struct ObjectExtractor {
    keepalive_spacing: bool,
    /// The most recent unit was an object, or nothing was seen yet
    after_object: bool,
    /// Last character of the most recent text, if only keepalive/connected
    /// objects have been seen since
    text_tail: Option<char>,
    /// A dropped heartbeat separated a word from whatever comes next
    pending_space: bool,
}

impl Default for ObjectExtractor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ObjectExtractor {
    pub fn new(keepalive_spacing: bool) -> Self {
        Self {
            keepalive_spacing,
            after_object: true,
            text_tail: None,
            pending_space: false,
        }
    }

    /// Extract every complete unit from the buffer, in order.
    ///
    /// The buffer keeps an unterminated trailing object (and any framing
    /// whitespace right before it) for the next call.
    pub fn drain(&mut self, buffer: &mut ChunkBuffer) -> Vec<ExtractedUnit> {
        self.scan(buffer, false)
    }

    /// End-of-stream drain: an object that never closed is literal text.
    pub fn finish(&mut self, buffer: &mut ChunkBuffer) -> Vec<ExtractedUnit> {
        buffer.flush_pending_bytes();
        let units = self.scan(buffer, true);
        self.reset();
        units
    }

    pub fn reset(&mut self) {
        self.after_object = true;
        self.text_tail = None;
        self.pending_space = false;
    }

    fn scan(&mut self, buffer: &mut ChunkBuffer, at_end: bool) -> Vec<ExtractedUnit> {
        let text = buffer.as_str();
        let mut units = Vec::new();
        // Start of text not yet emitted
        let mut cursor = 0;
        // Where to look for the next '{'
        let mut search = 0;
        let mut consumed = None;

        while let Some(offset) = text[search..].find('{') {
            let start = search + offset;

            let Some(end) = find_object_end(text, start) else {
                if at_end {
                    debug!("Unterminated object at end of stream, treating '{{' as text");
                    search = start + 1;
                    continue;
                }
                let gap = &text[cursor..start];
                consumed = Some(self.gap(gap, Boundary::PendingObject, &mut units, cursor, start));
                break;
            };

            let span = &text[start..=end];
            match serde_json::from_str::<Value>(span) {
                Ok(value) => {
                    self.gap(&text[cursor..start], Boundary::Object, &mut units, cursor, start);
                    self.object(value, span, &mut units);
                    cursor = end + 1;
                    search = cursor;
                }
                Err(err) => {
                    debug!("Balanced span is not JSON ({}), keeping it as text", err);
                    search = start + 1;
                }
            }
        }

        let consumed = match consumed {
            Some(consumed) => consumed,
            None => {
                let tail = &text[cursor..];
                if !at_end && !tail.is_empty() && self.is_framing(tail) {
                    trace!("Holding whitespace after object until the next chunk");
                    cursor
                } else {
                    self.gap(tail, Boundary::End, &mut units, cursor, text.len())
                }
            }
        };

        buffer.consume(consumed);
        units
    }

    /// Handle the plain text between `cursor` and `start`, followed by
    /// `boundary`. Returns how far the buffer may be consumed.
    fn gap(
        &mut self,
        text: &str,
        boundary: Boundary,
        units: &mut Vec<ExtractedUnit>,
        cursor: usize,
        start: usize,
    ) -> usize {
        if text.is_empty() {
            return start;
        }

        if self.is_framing(text) {
            match boundary {
                Boundary::Object | Boundary::End => {
                    trace!("Dropping framing whitespace {:?}", text);
                    return start;
                }
                // Keep it with the pending object, the next chunk decides
                Boundary::PendingObject => return cursor,
            }
        }

        self.text(text, units);
        start
    }

    /// Whitespace that only separates objects from each other
    fn is_framing(&self, text: &str) -> bool {
        self.after_object && self.text_tail.is_none() && text.trim().is_empty()
    }

    fn text(&mut self, text: &str, units: &mut Vec<ExtractedUnit>) {
        let mut fragment = String::with_capacity(text.len() + 1);
        let starts_with_word = text.chars().next().is_some_and(|c| !c.is_whitespace());
        if self.pending_space && starts_with_word {
            fragment.push(' ');
        }
        fragment.push_str(text);

        self.pending_space = false;
        self.text_tail = text.chars().last();
        self.after_object = false;
        units.push(ExtractedUnit::Text(fragment));
    }

    fn object(&mut self, value: Value, raw: &str, units: &mut Vec<ExtractedUnit>) {
        match classify(value, raw) {
            Classified::Control(ControlMessage::Keepalive) => {
                trace!("Dropping keepalive");
                self.transparent();
            }
            Classified::Control(message @ ControlMessage::Connected { .. }) => {
                self.transparent();
                units.push(ExtractedUnit::Control(message));
            }
            Classified::Control(message) => {
                self.opaque();
                units.push(ExtractedUnit::Control(message));
            }
            Classified::Content(text) => {
                self.opaque();
                units.push(ExtractedUnit::Content(text));
            }
            Classified::Empty => {
                trace!("Object without content: {}", raw);
                self.transparent();
            }
        }
        self.after_object = true;
    }

    /// An object that leaves no trace in the text was dropped here
    fn transparent(&mut self) {
        if self.keepalive_spacing && self.text_tail.is_some_and(|c| !c.is_whitespace()) {
            self.pending_space = true;
        }
    }

    fn opaque(&mut self) {
        self.text_tail = None;
        self.pending_space = false;
    }
}
