use crate::error::AssemblerError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "settings.json";

/// How raw transport text is framed before it reaches the chunk buffer
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Chunks are fed to the buffer as they arrive
    #[default]
    Raw,
    /// Chunks are Server-Sent Events; only `data:` payloads are buffered
    Sse,
}

/// Switches for the duplicate removal pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Render a cleaned copy of the content on every update
    pub during_streaming: bool,
    /// Replace the frozen content with its cleaned version at finalize
    pub on_finalize: bool,
    pub sections: bool,
    pub tables: bool,
    pub paragraphs: bool,
    pub lines: bool,
    /// Number of leading characters compared for paragraphs and lines
    pub signature_len: usize,
    pub min_paragraph_len: usize,
    pub min_line_len: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            during_streaming: false,
            on_finalize: true,
            sections: true,
            tables: true,
            paragraphs: true,
            lines: true,
            signature_len: 40,
            min_paragraph_len: 20,
            min_line_len: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownConfig {
    pub normalize_line_endings: bool,
    pub repair_tables: bool,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            normalize_line_endings: true,
            repair_tables: true,
        }
    }
}

/// Settings for one stream assembler instance.
///
/// Passed explicitly to [`crate::StreamSession::new`]; independent sessions in
/// the same process may use different settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Insert a space between alphanumeric fragment boundaries
    pub boundary_fix: bool,
    /// Synthesize a space where a heartbeat object separated two words
    pub keepalive_spacing: bool,
    pub framing: Framing,
    pub dedup: DedupConfig,
    pub markdown: MarkdownConfig,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            boundary_fix: true,
            keepalive_spacing: true,
            framing: Framing::Raw,
            dedup: DedupConfig::default(),
            markdown: MarkdownConfig::default(),
        }
    }
}

impl AssemblerConfig {
    /// Load settings from the default config directory, falling back to
    /// defaults when the file is missing or cannot be parsed.
    pub fn load() -> Self {
        let path = match config_directory() {
            Ok(dir) => dir.join(SETTINGS_FILE),
            Err(err) => {
                tracing::warn!("Failed to resolve config directory: {err}");
                return Self::default();
            }
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::from_file(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Failed to load settings from {}: {err:#}", path.display());
                Self::default()
            }
        }
    }

    /// Load settings from an explicit file. Errors are returned, not masked.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the dedup heuristics meaningless
    pub fn validate(&self) -> Result<(), AssemblerError> {
        if self.dedup.signature_len == 0 {
            return Err(AssemblerError::Config(
                "dedup.signature_len must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Directory holding `settings.json`
pub fn config_directory() -> Result<PathBuf> {
    if let Ok(custom_dir) = std::env::var("STREAM_ASSEMBLER_CONFIG_DIR") {
        return Ok(PathBuf::from(custom_dir));
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg_config).join("stream-assembler"));
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("stream-assembler"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_settings_use_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"boundary_fix": false, "framing": "sse", "dedup": {{"signature_len": 24}}}}"#
        )
        .unwrap();

        let config = AssemblerConfig::from_file(file.path()).unwrap();
        assert!(!config.boundary_fix);
        assert!(config.keepalive_spacing);
        assert_eq!(config.framing, Framing::Sse);
        assert_eq!(config.dedup.signature_len, 24);
        assert!(config.dedup.on_finalize);
        assert_eq!(config.markdown, MarkdownConfig::default());
    }

    #[test]
    fn test_invalid_settings_are_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(AssemblerConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_zero_signature_len_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"dedup": {{"signature_len": 0}}}}"#).unwrap();
        let err = AssemblerConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("signature_len"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AssemblerConfig::from_file(&dir.path().join("nope.json")).is_err());
    }
}
