//! Key Pattern Module
//!
//! Glob-style key patterns used for bulk invalidation.

use regex::Regex;

use crate::error::{CacheError, Result};

// == Key Pattern ==
/// A compiled glob where `*` matches any substring.
///
/// The match covers the whole key: `user:*` matches `user:42` but not
/// `super_user:42`. Every other character, regex metacharacters included,
/// matches itself.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    source: String,
    regex: Regex,
}

impl KeyPattern {
    /// Compiles a glob into an anchored regular expression.
    pub fn compile(pattern: &str) -> Result<Self> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        let regex = Regex::new(&format!("^{body}$"))
            .map_err(|e| CacheError::InvalidPattern(format!("{pattern}: {e}")))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Returns true when the whole key matches.
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    /// The glob this pattern was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}
