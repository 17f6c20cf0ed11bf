use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::ValidationError;

/// Length of every document key handed out by the backend.
pub const HANDLE_LEN: usize = 8;

/// Opaque key naming one document. Also the last path segment of its share URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocHandle(String);

impl DocHandle {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw.chars().count() != HANDLE_LEN {
            return Err(ValidationError::HandleLength(raw.to_string()));
        }
        if raw.chars().any(|c| c == '/' || c.is_whitespace() || c.is_control()) {
            return Err(ValidationError::HandleCharacters(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Extract the handle from a document URL such as `https://host/docs/abcd1234`.
    pub fn from_url(url: &str) -> Result<Self, ValidationError> {
        let last = url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        Self::parse(last)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Broker topic carrying everybody's edits of this document
    pub fn topic(&self) -> String {
        format!("/topic/docs/{}", self.0)
    }

    /// Broker destination accepting edits of this document
    pub fn destination(&self) -> String {
        format!("/app/edit/{}", self.0)
    }
}

impl fmt::Display for DocHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocHandle {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocHandle> for String {
    fn from(handle: DocHandle) -> Self {
        handle.0
    }
}
