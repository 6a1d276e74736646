//! Markdown rendering for assistant messages
//!
//! The accumulator only relies on the [`MarkdownRenderer`] trait. The default
//! implementation turns markdown into a styled `ratatui` text tree via
//! `tui-markdown`, after a small preprocessing pass that repairs the most
//! common formatting problems in model output.

use crate::config::MarkdownConfig;
use crate::error::RenderError;
use ratatui::text::{Line, Span, Text};
use regex::Regex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

/// Render tree derived from a message's markdown content
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMarkdown {
    text: Text<'static>,
}

impl RenderedMarkdown {
    pub fn new(text: Text<'static>) -> Self {
        Self { text }
    }

    pub fn text(&self) -> &Text<'static> {
        &self.text
    }

    pub fn lines(&self) -> &[Line<'static>] {
        &self.text.lines
    }

    /// Unstyled text of every rendered line
    pub fn plain_lines(&self) -> Vec<String> {
        self.text
            .lines
            .iter()
            .map(|line| {
                line.spans
                    .iter()
                    .map(|span| span.content.as_ref())
                    .collect::<String>()
            })
            .collect()
    }
}

/// Pure conversion from markdown text to a render tree.
///
/// Implementations must not keep state between calls: the same input always
/// yields the same tree.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, markdown: &str) -> Result<RenderedMarkdown, RenderError>;
}

/// Default renderer producing terminal-styled text
#[derive(Debug, Clone, Default)]
pub struct TerminalMarkdownRenderer {
    options: MarkdownConfig,
}

impl TerminalMarkdownRenderer {
    pub fn new(options: MarkdownConfig) -> Self {
        Self { options }
    }
}

impl MarkdownRenderer for TerminalMarkdownRenderer {
    fn render(&self, markdown: &str) -> Result<RenderedMarkdown, RenderError> {
        let prepared = preprocess(markdown, &self.options);

        // tui-markdown still has unimplemented paths for a few constructs
        let result =
            panic::catch_unwind(AssertUnwindSafe(|| into_owned(tui_markdown::from_str(&prepared))));

        result
            .map(RenderedMarkdown::new)
            .map_err(|payload| RenderError::Panicked(panic_message(payload.as_ref())))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn into_owned(text: Text<'_>) -> Text<'static> {
    let style = text.style;
    let lines: Vec<Line<'static>> = text
        .lines
        .into_iter()
        .map(|line| {
            let spans: Vec<Span<'static>> = line
                .spans
                .into_iter()
                .map(|span| Span::styled(span.content.into_owned(), span.style))
                .collect();
            let mut owned = Line::from(spans).style(line.style);
            if let Some(alignment) = line.alignment {
                owned = owned.alignment(alignment);
            }
            owned
        })
        .collect();
    Text::from(lines).style(style)
}

fn table_row_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\|(.+)\|\s*$").expect("static pattern"))
}

fn separator_row_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\|[-:|\s]+\|\s*$").expect("static pattern"))
}

pub(crate) fn is_table_row(line: &str) -> bool {
    table_row_regex().is_match(line.trim_start())
}

/// Normalize line endings and give separator-less tables a separator row
pub fn preprocess(markdown: &str, options: &MarkdownConfig) -> String {
    let text = if options.normalize_line_endings {
        markdown.replace("\r\n", "\n")
    } else {
        markdown.to_string()
    };

    if options.repair_tables {
        repair_tables(&text)
    } else {
        text
    }
}

fn repair_tables(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        if !is_table_row(lines[i]) {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        }

        let start = i;
        while i < lines.len() && is_table_row(lines[i]) {
            i += 1;
        }
        let block = &lines[start..i];

        out.push(block[0].to_string());
        if block.len() >= 2 && !separator_row_regex().is_match(block[1].trim_start()) {
            out.push(separator_for(block[0]));
        }
        out.extend(block[1..].iter().map(|line| line.to_string()));
    }

    out.join("\n")
}

fn separator_for(header: &str) -> String {
    let columns = header
        .split('|')
        .filter(|column| !column.trim().is_empty())
        .count()
        .max(1);
    format!("|{}|", vec!["---"; columns].join("|"))
}
