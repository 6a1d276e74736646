//! Duplicate removal for retransmitted markdown spans
//!
//! The upstream model occasionally repeats sections, tables, paragraphs or
//! single lines it has already sent. [`clean_buffer`] is a pure pass over the
//! text that drops the later copies. The first occurrence of anything is
//! always kept, and fenced code blocks are never touched.

use crate::config::DedupConfig;
use crate::render::is_table_row;
use regex::Regex;
use std::collections::HashSet;
use std::ops::Range;
use std::sync::OnceLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Blank,
    /// Inside a fenced code block, fences included
    Code,
    Table,
    Heading,
    Text,
}

fn heading_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(#{1,6}\s+\S.*|\*\*[^*]+\*\*:?)\s*$").expect("static pattern")
    })
}

struct Document<'a> {
    lines: Vec<&'a str>,
    kinds: Vec<LineKind>,
    keep: Vec<bool>,
}

impl<'a> Document<'a> {
    fn parse(text: &'a str) -> Self {
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let mut kinds = Vec::with_capacity(lines.len());
        let mut in_fence = false;

        for line in &lines {
            let content = line.trim_end_matches(['\n', '\r']);
            let trimmed = content.trim_start();
            let is_fence = trimmed.starts_with("```") || trimmed.starts_with("~~~");

            let kind = if in_fence || is_fence {
                LineKind::Code
            } else if trimmed.is_empty() {
                LineKind::Blank
            } else if is_table_row(content) {
                LineKind::Table
            } else if heading_regex().is_match(trimmed) {
                LineKind::Heading
            } else {
                LineKind::Text
            };

            if is_fence {
                in_fence = !in_fence;
            }
            kinds.push(kind);
        }

        let keep = vec![true; lines.len()];
        Self { lines, kinds, keep }
    }

    /// Maximal runs of kept lines of `kind`, skipping removed lines
    fn blocks(&self, kind: LineKind) -> Vec<Range<usize>> {
        let mut blocks = Vec::new();
        let mut start = None;
        for i in 0..self.lines.len() {
            let matches = self.keep[i] && self.kinds[i] == kind;
            match (matches, start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    blocks.push(s..i);
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            blocks.push(s..self.lines.len());
        }
        blocks
    }

    fn normalized(&self, range: Range<usize>) -> String {
        self.lines[range]
            .iter()
            .flat_map(|line| line.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn remove(&mut self, range: Range<usize>) {
        for i in range {
            self.keep[i] = false;
        }
    }

    /// A heading together with everything up to the next heading
    fn remove_repeated_sections(&mut self, signature_len: usize) {
        let headings: Vec<usize> = (0..self.lines.len())
            .filter(|&i| self.kinds[i] == LineKind::Heading)
            .collect();
        let mut seen = HashSet::new();

        for (n, &start) in headings.iter().enumerate() {
            let end = headings.get(n + 1).copied().unwrap_or(self.lines.len());
            let heading = self.normalized(start..start + 1);
            let body: String = self
                .normalized(start + 1..end)
                .chars()
                .take(signature_len)
                .collect();
            let signature = format!("{heading}\n{body}");

            if !seen.insert(signature) {
                debug!("Removing repeated section '{}'", heading);
                self.remove(start..end);
            }
        }
    }

    fn remove_repeated_tables(&mut self) {
        let mut seen = HashSet::new();
        for block in self.blocks(LineKind::Table) {
            let verbatim: String = self.lines[block.clone()]
                .iter()
                .map(|line| line.trim_end())
                .collect::<Vec<_>>()
                .join("\n");
            if !seen.insert(verbatim) {
                debug!("Removing repeated table at line {}", block.start + 1);
                self.remove(block);
            }
        }
    }

    fn remove_repeated_paragraphs(&mut self, signature_len: usize, min_len: usize) {
        let mut seen = HashSet::new();
        for block in self.blocks(LineKind::Text) {
            let normalized = self.normalized(block.clone());
            if normalized.chars().count() < min_len {
                continue;
            }
            let signature: String = normalized.chars().take(signature_len).collect();
            if !seen.insert(signature) {
                debug!("Removing repeated paragraph at line {}", block.start + 1);
                self.remove(block);
            }
        }
    }

    fn remove_repeated_lines(&mut self, signature_len: usize, min_len: usize) {
        let mut seen = HashSet::new();
        for i in 0..self.lines.len() {
            if !self.keep[i] || self.kinds[i] != LineKind::Text {
                continue;
            }
            let normalized = self.normalized(i..i + 1);
            if normalized.chars().count() < min_len {
                continue;
            }
            let signature: String = normalized.chars().take(signature_len).collect();
            if !seen.insert(signature) {
                self.keep[i] = false;
            }
        }
    }

    /// Drop the blank lines in front of a removed block so holes do not leave
    /// runs of empty lines behind. A removed block always has its first
    /// occurrence somewhere before it.
    fn collapse_blank_runs(&mut self) {
        for i in 0..self.lines.len() {
            if self.keep[i] || self.kinds[i] == LineKind::Blank {
                continue;
            }
            let mut j = i;
            while j > 0 && self.kinds[j - 1] == LineKind::Blank && self.keep[j - 1] {
                self.keep[j - 1] = false;
                j -= 1;
            }
        }
    }

    fn render(&self) -> String {
        self.lines
            .iter()
            .zip(&self.keep)
            .filter(|(_, keep)| **keep)
            .map(|(line, _)| *line)
            .collect()
    }
}

/// Remove repeated sections, tables, paragraphs and lines from `text`.
///
/// Passes run in that order and each one only considers what the previous
/// passes kept. When nothing is repeated the input comes back unchanged.
pub fn clean_buffer(text: &str, config: &DedupConfig) -> String {
    let mut doc = Document::parse(text);

    if config.sections {
        doc.remove_repeated_sections(config.signature_len);
    }
    if config.tables {
        doc.remove_repeated_tables();
    }
    if config.paragraphs {
        doc.remove_repeated_paragraphs(config.signature_len, config.min_paragraph_len);
    }
    if config.lines {
        doc.remove_repeated_lines(config.signature_len, config.min_line_len);
    }

    if doc.keep.iter().all(|keep| *keep) {
        return text.to_string();
    }

    doc.collapse_blank_runs();
    let mut cleaned = doc.render();
    if !text.ends_with('\n') {
        let trimmed_len = cleaned.trim_end_matches(['\n', '\r']).len();
        cleaned.truncate(trimmed_len);
    }
    cleaned
}
