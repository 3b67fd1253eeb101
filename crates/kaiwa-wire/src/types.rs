//! Request and response types shared across the wire protocol

use serde::{Deserialize, Serialize};

/// Which streaming endpoint (and therefore which event vocabulary) the
/// backend is expected to speak.
///
/// This only selects the request path; the decoder accepts both
/// vocabularies unconditionally, so a backend that mixes them still
/// decodes correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Api {
    /// Legacy endpoint (`status`/`text` event kinds, timings in ms)
    V2,
    /// Progress-event endpoint (`progress`/`content` kinds, timings in seconds)
    V3,
}

impl Api {
    /// Request path for this endpoint, relative to the base URL
    pub fn path(&self) -> &'static str {
        match self {
            Api::V2 => "/chat/stream",
            Api::V3 => "/chat/v3/stream/v3",
        }
    }
}

/// One retrieved knowledge record attached to a turn's context set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    pub domain: String,
    pub title: String,
    pub content: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Timing metadata reported on completion, canonicalized to milliseconds.
///
/// A missing field means the backend did not report it, not zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_ms: Option<u64>,
}

/// Outbound body for the streaming chat POST
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    /// Continue an existing backend session when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Scope retrieval to one client/record owner when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// How many retrieved items the backend should return
    pub context_size: u32,
    pub stream: bool,
}

impl ChatRequest {
    /// Default number of retrieved items requested per turn
    pub const DEFAULT_CONTEXT_SIZE: u32 = 5;

    /// Create a streaming request with default settings
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
            client_id: None,
            context_size: Self::DEFAULT_CONTEXT_SIZE,
            stream: true,
        }
    }

    /// Set the prior-session identifier
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Scope the request to one client
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Override the retrieved-context size hint
    pub fn with_context_size(mut self, context_size: u32) -> Self {
        self.context_size = context_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_paths() {
        assert_eq!(Api::V2.path(), "/chat/stream");
        assert_eq!(Api::V3.path(), "/chat/v3/stream/v3");
    }

    #[test]
    fn test_request_defaults() {
        let req = ChatRequest::new("hello");
        assert_eq!(req.message, "hello");
        assert_eq!(req.context_size, ChatRequest::DEFAULT_CONTEXT_SIZE);
        assert!(req.stream);
        assert!(req.session_id.is_none());
        assert!(req.client_id.is_none());
    }

    #[test]
    fn test_request_serializes_without_absent_fields() {
        let json = serde_json::to_value(ChatRequest::new("hi")).unwrap();
        assert!(json.get("session_id").is_none());
        assert!(json.get("client_id").is_none());
        assert_eq!(json["context_size"], 5);
    }

    #[test]
    fn test_request_builder_fields() {
        let req = ChatRequest::new("hi")
            .with_session_id("s-1")
            .with_client_id("c-9")
            .with_context_size(20);
        assert_eq!(req.session_id.as_deref(), Some("s-1"));
        assert_eq!(req.client_id.as_deref(), Some("c-9"));
        assert_eq!(req.context_size, 20);
    }

    #[test]
    fn test_context_item_optional_fields_default() {
        let item: ContextItem = serde_json::from_str(
            r#"{"id":"k1","domain":"nursing","title":"t","content":"c","score":0.8}"#,
        )
        .unwrap();
        assert!(item.source_type.is_none());
        assert!(item.tags.is_none());
    }
}
