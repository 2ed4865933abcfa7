//! Parse options.
//!
//! Everything has a default, so an empty TOML document (or no file at all)
//! gives the stock behaviour.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::music::{QuarterLength, TimeSignature};
use crate::token::{parse_default_length, parse_time_signature};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Knobs shared by every pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// How many characters to search for the closing `!` of a decoration
    pub decoration_lookahead: usize,

    /// Meter used for tuplet ratios before any `M:` field
    pub assumed_meter: String,

    /// Default note length (e.g. `"1/8"`) for tunes that never set `L:` or
    /// `M:`. Without it such tunes fail to resolve.
    pub fallback_default_length: Option<String>,

    /// Map `!staccato!`, `!tenuto!`, `!<(!` and the other long-form
    /// decorations to tokens
    pub extended_decorations: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            decoration_lookahead: 20,
            assumed_meter: "4/4".to_string(),
            fallback_default_length: None,
            extended_decorations: true,
        }
    }
}

impl ParseOptions {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse_toml(contents, Path::new("<string>"))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse_toml(&contents, path)
    }

    fn parse_toml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// `assumed_meter` parsed, 4/4 if it doesn't parse.
    pub fn assumed_time_signature(&self) -> TimeSignature {
        parse_time_signature(&self.assumed_meter).unwrap_or_else(|| TimeSignature::new(4, 4))
    }

    pub fn fallback_quarter_length(&self) -> Option<QuarterLength> {
        self.fallback_default_length
            .as_deref()
            .and_then(parse_default_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_rational::Ratio;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_empty_toml_is_default() {
        let options = ParseOptions::from_toml_str("").unwrap();
        assert_eq!(options, ParseOptions::default());
    }

    #[test]
    fn test_partial_toml() {
        let options = ParseOptions::from_toml_str(
            r#"
            assumed_meter = "6/8"
            fallback_default_length = "1/8"
            "#,
        )
        .unwrap();
        assert_eq!(options.decoration_lookahead, 20);
        assert!(options.assumed_time_signature().is_compound());
        assert_eq!(options.fallback_quarter_length(), Some(Ratio::new(1, 2)));
    }

    #[test]
    fn test_bad_meter_falls_back() {
        let options = ParseOptions {
            assumed_meter: "free".to_string(),
            ..ParseOptions::default()
        };
        assert_eq!(options.assumed_time_signature(), TimeSignature::new(4, 4));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "decoration_lookahead = 40").unwrap();
        writeln!(file, "extended_decorations = false").unwrap();

        let options = ParseOptions::from_file(file.path()).unwrap();
        assert_eq!(options.decoration_lookahead, 40);
        assert!(!options.extended_decorations);
    }

    #[test]
    fn test_errors() {
        let missing = ParseOptions::from_file("/nonexistent/abc-format.toml");
        assert!(matches!(missing, Err(ConfigError::FileRead { .. })));

        let invalid = ParseOptions::from_toml_str("decoration_lookahead = \"far\"");
        assert!(matches!(invalid, Err(ConfigError::Parse { .. })));
    }
}
