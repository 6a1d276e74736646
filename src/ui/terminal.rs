use super::{MessageSink, UIError};
use crate::conversation::{ChatMessage, MessageRole};
use crate::error::StreamError;
use crossterm::style::{Attribute, Color as TermColor, ContentStyle, StyledContent, Stylize};
use ratatui::style::{Color, Modifier, Style};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Mutex;
use tracing::debug;

/// Prints the conversation to a terminal as it streams.
///
/// Assistant text is written incrementally: every update only prints the part
/// of the content that has not been printed yet.
pub struct TerminalSink {
    writer: Mutex<Box<dyn Write + Send>>,
    /// Bytes of content already printed, per message id
    printed: Mutex<HashMap<String, usize>>,
    show_rendered: bool,
}

impl TerminalSink {
    pub fn new(show_rendered: bool) -> Self {
        Self::with_writer(Box::new(io::stdout()), show_rendered)
    }

    pub fn with_writer(writer: Box<dyn Write + Send>, show_rendered: bool) -> Self {
        Self {
            writer: Mutex::new(writer),
            printed: Mutex::new(HashMap::new()),
            show_rendered,
        }
    }

    fn write(&self, text: &str) -> Result<(), UIError> {
        let mut writer = self.writer.lock().unwrap();
        write!(writer, "{text}")?;
        writer.flush()?;
        Ok(())
    }

    /// The part of `message` that has not been printed yet
    fn unprinted<'a>(&self, message: &'a ChatMessage) -> Option<&'a str> {
        let mut printed = self.printed.lock().unwrap();
        let done = printed.entry(message.id.clone()).or_insert(0);
        let content = message.content.as_str();

        if content.len() <= *done || !content.is_char_boundary(*done) {
            // Content shrank when duplicates were removed at finalize
            return None;
        }
        let delta = &content[*done..];
        *done = content.len();
        Some(delta)
    }

    fn write_rendered(&self, message: &ChatMessage) -> Result<(), UIError> {
        let mut out = String::new();
        out.push_str(&format!("\n{}\n", "─── rendered ───".dark_grey()));

        match &message.rendered {
            Some(rendered) => {
                for line in rendered.lines() {
                    for span in &line.spans {
                        let style = to_terminal_style(line.style.patch(span.style));
                        out.push_str(&StyledContent::new(style, span.content.as_ref()).to_string());
                    }
                    out.push('\n');
                }
            }
            None => {
                out.push_str(message.plain_text());
                out.push('\n');
            }
        }
        self.write(&out)
    }
}

impl MessageSink for TerminalSink {
    fn message_updated(&self, message: &ChatMessage) -> Result<(), UIError> {
        match message.role {
            MessageRole::User => self.write(&format!("{} {}\n\n", ">".bold(), message.content)),
            MessageRole::Assistant => match self.unprinted(message) {
                Some(delta) => self.write(delta),
                None => Ok(()),
            },
        }
    }

    fn stream_established(&self, session_id: Option<&str>) -> Result<(), UIError> {
        debug!("Terminal sink: stream established ({:?})", session_id);
        Ok(())
    }

    fn turn_finished(&self, message: Option<&ChatMessage>) -> Result<(), UIError> {
        let Some(message) = message else {
            return Ok(());
        };
        self.write("\n")?;
        if self.show_rendered {
            self.write_rendered(message)?;
        }
        Ok(())
    }

    fn turn_failed(&self, error: &StreamError) -> Result<(), UIError> {
        self.write(&format!("\n{}\n", format!("✗ {}", error.message()).red()))
    }
}

fn to_terminal_style(style: Style) -> ContentStyle {
    let mut content = ContentStyle::new();
    content.foreground_color = style.fg.map(to_terminal_color);
    content.background_color = style.bg.map(to_terminal_color);

    let modifiers = [
        (Modifier::BOLD, Attribute::Bold),
        (Modifier::DIM, Attribute::Dim),
        (Modifier::ITALIC, Attribute::Italic),
        (Modifier::UNDERLINED, Attribute::Underlined),
        (Modifier::REVERSED, Attribute::Reverse),
        (Modifier::CROSSED_OUT, Attribute::CrossedOut),
    ];
    for (modifier, attribute) in modifiers {
        if style.add_modifier.contains(modifier) {
            content.attributes.set(attribute);
        }
    }
    content
}

fn to_terminal_color(color: Color) -> TermColor {
    match color {
        Color::Reset => TermColor::Reset,
        Color::Black => TermColor::Black,
        Color::Red => TermColor::DarkRed,
        Color::Green => TermColor::DarkGreen,
        Color::Yellow => TermColor::DarkYellow,
        Color::Blue => TermColor::DarkBlue,
        Color::Magenta => TermColor::DarkMagenta,
        Color::Cyan => TermColor::DarkCyan,
        Color::Gray => TermColor::Grey,
        Color::DarkGray => TermColor::DarkGrey,
        Color::LightRed => TermColor::Red,
        Color::LightGreen => TermColor::Green,
        Color::LightYellow => TermColor::Yellow,
        Color::LightBlue => TermColor::Blue,
        Color::LightMagenta => TermColor::Magenta,
        Color::LightCyan => TermColor::Cyan,
        Color::White => TermColor::White,
        Color::Rgb(r, g, b) => TermColor::Rgb { r, g, b },
        Color::Indexed(index) => TermColor::AnsiValue(index),
    }
}
