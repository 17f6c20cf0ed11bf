use serde::{Deserialize, Serialize};

/// Body of every message on a document topic: the whole serialized document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContentMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ContentMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()) }
    }

    /// Parse a channel payload. An empty `content` counts as absent.
    pub fn parse(payload: &str) -> Result<Option<String>, serde_json::Error> {
        let msg: ContentMessage = serde_json::from_str(payload)?;
        Ok(msg.content.filter(|c| !c.is_empty()))
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({ "content": self.content }).to_string()
    }
}

/// Body of the broker's per-user error queue
#[derive(Deserialize, Debug, Clone)]
pub struct BrokerErrorMessage {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_field() {
        let content = ContentMessage::parse(r#"{"content":"<p>hello</p>"}"#).unwrap();
        assert_eq!(content.as_deref(), Some("<p>hello</p>"));
    }

    #[test]
    fn missing_or_empty_content_is_absent() {
        assert_eq!(ContentMessage::parse(r#"{"other":1}"#).unwrap(), None);
        assert_eq!(ContentMessage::parse(r#"{"content":""}"#).unwrap(), None);
        assert_eq!(ContentMessage::parse(r#"{"content":null}"#).unwrap(), None);
    }

    #[test]
    fn rejects_non_json_and_wrong_types() {
        assert!(ContentMessage::parse("not json").is_err());
        assert!(ContentMessage::parse(r#"{"content":42}"#).is_err());
    }

    #[test]
    fn serializes_whole_document_body() {
        let body = ContentMessage::new("<p>a \"quote\"</p>").to_json();
        let back: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(back["content"], "<p>a \"quote\"</p>");
    }
}
