//! Request DTOs for the cache service API
//!
//! Defines the structure of incoming HTTP request bodies.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{MAX_KEY_LENGTH, MAX_VALUE_SIZE};

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value, `null` included
/// - `ttl`: Optional TTL in seconds; absent uses the default, 0 never expires
/// - `tags`: Optional tags for `POST /invalidate {"tags": [...]}`
/// - `depends_on`: Optional parent keys; invalidating a parent drops this key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl SetRequest {
    pub fn new(key: impl Into<String>, value: Value, ttl: Option<u64>) -> Self {
        Self {
            key: key.into(),
            value,
            ttl,
            tags: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if let Some(msg) = validate_key(&self.key) {
            return Some(msg);
        }
        if self.tags.iter().any(|tag| tag.is_empty()) {
            return Some("Tags cannot be empty".to_string());
        }
        if let Some(msg) = self.depends_on.iter().find_map(|parent| validate_key(parent)) {
            return Some(format!("Invalid parent key: {msg}"));
        }
        match serde_json::to_vec(&self.value) {
            Ok(bytes) if bytes.len() > MAX_VALUE_SIZE => Some(format!(
                "Value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            )),
            Ok(_) => None,
            Err(e) => Some(format!("Value is not serializable: {e}")),
        }
    }
}

/// Checks a key against the service limits.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        ));
    }
    None
}

/// Request body for POST /invalidate
///
/// Exactly one of: a glob `pattern`, an `event` resolved through the
/// invalidation rules with `context` filling `{placeholders}`, or a list of
/// `tags`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvalidateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl InvalidateRequest {
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            ..Self::default()
        }
    }

    pub fn event(event: impl Into<String>, context: HashMap<String, String>) -> Self {
        Self {
            event: Some(event.into()),
            context,
            ..Self::default()
        }
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Option<String> {
        let selectors = [
            self.pattern.is_some(),
            self.event.is_some(),
            !self.tags.is_empty(),
        ];
        match selectors.iter().filter(|given| **given).count() {
            0 => return Some("One of 'pattern', 'event' or 'tags' is required".to_string()),
            1 => {}
            _ => return Some("Provide only one of 'pattern', 'event' or 'tags'".to_string()),
        }

        if self.pattern.as_deref() == Some("") {
            return Some("Pattern cannot be empty".to_string());
        }
        if self.event.as_deref() == Some("") {
            return Some("Event cannot be empty".to_string());
        }
        if self.tags.iter().any(|tag| tag.is_empty()) {
            return Some("Tags cannot be empty".to_string());
        }
        None
    }
}
