//! Input sanitization
//!
//! Cleans caller-supplied text before it reaches the ledger:
//! - item codes (restricted alphabet, no separators used by storage keys)
//! - free-text annotations (destination, purpose, metadata)
//! - markup and script injection in annotations

use regex::Regex;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Maximum item code length
pub const MAX_CODE_LEN: usize = 64;

/// Maximum annotation length (destination, purpose)
pub const MAX_NOTE_LEN: usize = 200;

/// Maximum metadata length (description, vendor, location, image)
pub const MAX_FIELD_LEN: usize = 500;

/// Default destination when none is given
pub const DEFAULT_DESTINATION: &str = "N/A";

/// Default purpose when none is given
pub const DEFAULT_PURPOSE: &str = "General";

/// Sanitization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SanitizationError {
    #[error("Input too long: max {max}, got {actual}")]
    TooLong { max: usize, actual: usize },

    #[error("Required field is empty: {0}")]
    Empty(&'static str),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Forbidden character: {0:?}")]
    ForbiddenCharacter(char),

    #[error("Markup or script content is not allowed")]
    Markup,
}

pub type Result<T> = std::result::Result<T, SanitizationError>;

/// Input sanitizer
#[derive(Debug)]
pub struct Sanitizer {
    /// Allowed item code shape
    code_regex: Regex,

    /// Markup / script patterns
    markup_patterns: Vec<Regex>,
}

impl Sanitizer {
    /// Create new sanitizer
    pub fn new() -> Self {
        let code_regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-]*$").expect("static regex");

        let markup_patterns = vec![
            Regex::new(r"(?i)(<\s*/?\s*(script|iframe|object|embed|img|svg|style|link)\b)")
                .expect("static regex"),
            Regex::new(r"(?i)(javascript:|vbscript:|\bon[a-z]+\s*=)").expect("static regex"),
        ];

        Self {
            code_regex,
            markup_patterns,
        }
    }

    /// Normalize, trim and bound a string; reject control characters
    pub fn sanitize_string(&self, input: &str, max_length: usize) -> Result<String> {
        if let Some(ch) = input
            .chars()
            .find(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
        {
            return Err(SanitizationError::ForbiddenCharacter(ch));
        }

        // NFC so equal-looking strings compare equal
        let normalized: String = input.nfc().collect();
        let trimmed = normalized.trim();

        let length = trimmed.chars().count();
        if length > max_length {
            return Err(SanitizationError::TooLong {
                max: max_length,
                actual: length,
            });
        }

        Ok(trimmed.to_string())
    }

    /// Reject markup and script content
    pub fn check_markup(&self, input: &str) -> Result<()> {
        if self.markup_patterns.iter().any(|p| p.is_match(input)) {
            return Err(SanitizationError::Markup);
        }
        Ok(())
    }

    /// Validate an item code
    pub fn sanitize_code(&self, code: &str) -> Result<String> {
        let code = self.sanitize_string(code, MAX_CODE_LEN)?;
        if code.is_empty() {
            return Err(SanitizationError::Empty("code"));
        }
        if !self.code_regex.is_match(&code) {
            return Err(SanitizationError::InvalidFormat(format!(
                "item code {:?} may only contain letters, digits, '.', '_' and '-'",
                code
            )));
        }
        Ok(code)
    }

    /// Sanitize a free-text annotation, substituting `default` when empty
    pub fn sanitize_note(&self, input: &str, default: &str) -> Result<String> {
        let note = self.sanitize_string(input, MAX_NOTE_LEN)?;
        self.check_markup(&note)?;
        if note.is_empty() {
            return Ok(default.to_string());
        }
        Ok(note)
    }

    /// Sanitize an optional metadata field
    pub fn sanitize_field(&self, input: &str) -> Result<String> {
        let field = self.sanitize_string(input, MAX_FIELD_LEN)?;
        self.check_markup(&field)?;
        Ok(field)
    }

    /// Sanitize a required metadata field
    pub fn sanitize_required(&self, input: &str, name: &'static str) -> Result<String> {
        let field = self.sanitize_field(input)?;
        if field.is_empty() {
            return Err(SanitizationError::Empty(name));
        }
        Ok(field)
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}
