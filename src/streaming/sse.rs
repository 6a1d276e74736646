//! Server-Sent Events framing
//!
//! Turns SSE text into the payload text the chunk buffer expects. Lines may be
//! split across chunks; comment lines (`: ping`) are heartbeats and vanish.

use tracing::trace;

#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Text of a line that has not been terminated yet
    line: String,
    /// `data:` lines of the event being assembled
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw SSE text, returning the payload of every completed event
    pub fn decode(&mut self, chunk: &str) -> String {
        self.line.push_str(chunk);
        let mut payload = String::new();

        while let Some(newline) = self.line.find('\n') {
            let line: String = self.line.drain(..=newline).collect();
            let line = line.trim_end_matches('\n');
            let line = line.strip_suffix('\r').unwrap_or(line);
            self.handle_line(line, &mut payload);
        }
        payload
    }

    /// Dispatch whatever is left when the stream ends
    pub fn finish(&mut self) -> String {
        let mut payload = String::new();
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            self.handle_line(line.trim_end_matches('\r'), &mut payload);
        }
        self.dispatch(&mut payload);
        payload
    }

    fn handle_line(&mut self, line: &str, payload: &mut String) {
        if line.is_empty() {
            self.dispatch(payload);
            return;
        }
        if line.starts_with(':') {
            trace!("SSE comment: {}", line);
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" | "id" | "retry" => trace!("Ignoring SSE field {}: {}", field, value),
            other => trace!("Ignoring unknown SSE field '{}'", other),
        }
    }

    fn dispatch(&mut self, payload: &mut String) {
        if !self.data.is_empty() {
            payload.push_str(&self.data.join("\n"));
            self.data.clear();
        }
    }
}
