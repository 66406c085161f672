//! Compiled image patterns.

use regex::Regex;

use crate::error::{PurgeError, Result};

/// A regular expression matched against the start of an image identifier.
///
/// The match must begin at the first character but may end anywhere, so
/// `dev` matches `dev:3` and not `mydev:3`.
#[derive(Debug, Clone)]
pub struct ImagePattern {
    source: String,
    regex: Regex,
}

impl ImagePattern {
    /// Compile `pattern`. `name` identifies the option in error messages.
    pub fn new(name: &'static str, pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{pattern})"))
            .map_err(|source| PurgeError::Pattern { name, source })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Compile an optional pattern, passing `None` through.
    pub fn optional(name: &'static str, pattern: Option<&str>) -> Result<Option<Self>> {
        pattern.map(|p| Self::new(name, p)).transpose()
    }

    pub fn is_match(&self, identifier: &str) -> bool {
        self.regex.is_match(identifier)
    }

    /// The pattern as supplied, without the anchor.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}
