//! Common test utilities for the streaming pipeline
//!
//! Shared sinks, renderers and helpers used by the extractor, accumulator and
//! session tests.
use super::{ChunkBuffer, ExtractedUnit, ObjectExtractor};
use crate::conversation::ChatMessage;
use crate::error::{RenderError, StreamError};
use crate::render::{MarkdownRenderer, RenderedMarkdown};
use crate::ui::{MessageSink, UIError};
use ratatui::text::Text;
use std::sync::{Arc, Mutex};

/// Everything a sink was told, in order
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Updated { id: String, content: String },
    Established(Option<String>),
    Finished(Option<String>),
    Failed(StreamError),
}

/// A test sink that records every notification
#[derive(Clone, Default)]
pub struct TestSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
    snapshots: Arc<Mutex<Vec<ChatMessage>>>,
}

impl TestSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Arc<Box<dyn MessageSink>> {
        Arc::new(Box::new(self.clone()) as Box<dyn MessageSink>)
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Every message state reported through `message_updated`
    pub fn snapshots(&self) -> Vec<ChatMessage> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn last_content(&self) -> Option<String> {
        self.snapshots
            .lock()
            .unwrap()
            .last()
            .map(|message| message.content.clone())
    }

    pub fn failures(&self) -> Vec<StreamError> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Failed(err) => Some(err),
                _ => None,
            })
            .collect()
    }
}

impl MessageSink for TestSink {
    fn message_updated(&self, message: &ChatMessage) -> Result<(), UIError> {
        self.events.lock().unwrap().push(SinkEvent::Updated {
            id: message.id.clone(),
            content: message.content.clone(),
        });
        self.snapshots.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn stream_established(&self, session_id: Option<&str>) -> Result<(), UIError> {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Established(session_id.map(str::to_string)));
        Ok(())
    }

    fn turn_finished(&self, message: Option<&ChatMessage>) -> Result<(), UIError> {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Finished(message.map(|m| m.content.clone())));
        Ok(())
    }

    fn turn_failed(&self, error: &StreamError) -> Result<(), UIError> {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Failed(error.clone()));
        Ok(())
    }
}

/// Renderer that always fails, to exercise the plain text fallback
pub struct FailingRenderer;

impl MarkdownRenderer for FailingRenderer {
    fn render(&self, _markdown: &str) -> Result<RenderedMarkdown, RenderError> {
        Err(RenderError::Failed("renderer unavailable".to_string()))
    }
}

/// Renderer that maps every source line to one unstyled line
pub struct PlainRenderer;

impl MarkdownRenderer for PlainRenderer {
    fn render(&self, markdown: &str) -> Result<RenderedMarkdown, RenderError> {
        Ok(RenderedMarkdown::new(Text::raw(markdown.to_string())))
    }
}

/// Helper function to split text into small chunks for testing split handling
pub fn chunk_str(s: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut chunks = Vec::new();

    for chunk in chars.chunks(chunk_size) {
        chunks.push(chunk.iter().collect::<String>());
    }

    chunks
}

/// Run chunks through a fresh buffer and extractor, including the final flush
pub fn extract_all<S: AsRef<str>>(chunks: &[S]) -> Vec<ExtractedUnit> {
    let mut buffer = ChunkBuffer::new();
    let mut extractor = ObjectExtractor::default();
    let mut units = Vec::new();
    for chunk in chunks {
        buffer.append(chunk.as_ref());
        units.extend(extractor.drain(&mut buffer));
    }
    units.extend(extractor.finish(&mut buffer));
    units
}

/// Concatenate the content units and drop the rest
pub fn content_of(units: &[ExtractedUnit]) -> String {
    units
        .iter()
        .filter_map(|unit| match unit {
            ExtractedUnit::Content(text) | ExtractedUnit::Text(text) => Some(text.as_str()),
            ExtractedUnit::Control(_) => None,
        })
        .collect()
}

/// Control units only, in order
pub fn controls_of(units: &[ExtractedUnit]) -> Vec<super::ControlMessage> {
    units
        .iter()
        .filter_map(|unit| match unit {
            ExtractedUnit::Control(message) => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/// Helper function to print units for debugging
pub fn print_units(units: &[ExtractedUnit]) {
    println!("Collected {} units:", units.len());
    for (i, unit) in units.iter().enumerate() {
        match unit {
            ExtractedUnit::Content(text) => println!("  [{i}] Content: {text:?}"),
            ExtractedUnit::Text(text) => println!("  [{i}] Text: {text:?}"),
            ExtractedUnit::Control(message) => println!("  [{i}] Control: {message:?}"),
        }
    }
}
