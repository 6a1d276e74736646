//! Buffer for transport text that has not been turned into units yet

/// Carries an incomplete trailing UTF-8 sequence from one byte chunk to the next
#[derive(Debug, Default)]
pub(crate) struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Decode as much of `bytes` as possible. Invalid sequences become U+FFFD,
    /// an incomplete sequence at the end is kept for the next call.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut joined = std::mem::take(&mut self.pending);
        joined.extend_from_slice(bytes);

        let mut decoded = String::with_capacity(joined.len());
        let mut rest = &joined[..];
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    decoded.push_str(valid);
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    decoded.push_str(&String::from_utf8_lossy(&rest[..valid_up_to]));
                    match err.error_len() {
                        Some(invalid_len) => {
                            decoded.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid_up_to + invalid_len..];
                        }
                        None => {
                            self.pending = rest[valid_up_to..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        decoded
    }

    /// Flush whatever is still pending; the stream ended mid-character
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Find the `}` matching the `{` at byte offset `start`.
///
/// Braces inside double-quoted strings are ignored; a backslash escapes the
/// next character so `\"` does not end the string.
pub(crate) fn find_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Accumulates raw transport text until complete units can be extracted.
///
/// The buffer is unbounded; it only ever retains text the extractor could not
/// yet classify, which is at most one trailing incomplete object.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    text: String,
    utf8: Utf8Carry,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, chunk: &str) {
        self.text.push_str(chunk);
    }

    /// Append raw bytes, holding back a multi-byte character split across chunks
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        let decoded = self.utf8.decode(bytes);
        self.text.push_str(&decoded);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && !self.utf8.has_pending()
    }

    /// True when the tail of the buffer is an object that has not been closed
    /// yet, so it must not be flushed as plain text.
    pub fn is_incomplete_trailing(&self) -> bool {
        let text = self.text.as_str();
        let mut search = 0;
        while let Some(offset) = text[search..].find('{') {
            let start = search + offset;
            match find_object_end(text, start) {
                Some(end) => search = end + 1,
                None => return true,
            }
        }
        false
    }

    /// Drop the first `len` bytes, which have been turned into units
    pub(crate) fn consume(&mut self, len: usize) {
        self.text.drain(..len);
    }

    /// Resolve a dangling partial character at end of stream
    pub(crate) fn flush_pending_bytes(&mut self) {
        let tail = self.utf8.finish();
        self.text.push_str(&tail);
    }

    pub(crate) fn clear(&mut self) {
        self.text.clear();
        self.utf8 = Utf8Carry::default();
    }
}
