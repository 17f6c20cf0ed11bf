use crate::models::EMPTY_DOCUMENT;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditorError {
    #[error("editor rejected content: {0}")]
    Rejected(String),
}

/// The rich-text document the user edits.
///
/// Holds serialized markup and reports every mutation through its change
/// hook. Here the hook is the return value of [`EditorModel::set_content`]:
/// `Some(html)` when the editor fired an update for the replacement, `None`
/// when it did not.
pub trait EditorModel {
    fn html(&self) -> &str;

    fn set_content(&mut self, html: &str) -> Result<Option<String>, EditorError>;
}

/// In-memory editor model whose change hook fires on every replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlBuffer {
    html: String,
}

impl HtmlBuffer {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }
}

impl Default for HtmlBuffer {
    fn default() -> Self {
        Self::new(EMPTY_DOCUMENT)
    }
}

impl EditorModel for HtmlBuffer {
    fn html(&self) -> &str {
        &self.html
    }

    fn set_content(&mut self, html: &str) -> Result<Option<String>, EditorError> {
        // The channel frames text with NUL terminators
        if html.contains('\0') {
            return Err(EditorError::Rejected("content contains a NUL character".to_string()));
        }
        self.html = html.to_string();
        Ok(Some(self.html.clone()))
    }
}
