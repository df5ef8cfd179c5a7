//! Core protocol types for the streaming chat endpoint
//!
//! This module contains the request value a caller hands to the consumer and
//! the typed events decoded from the response body. The design prioritizes:
//! - Type safety: every record is validated into a concrete variant
//! - Forward compatibility: unknown metadata fields are kept verbatim
//! - No credential leakage through `Debug` or log output

use crate::config::{SafeLogging, SecretString};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Binary attachment (an image) sent along with a chat message
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// Raw file contents
    pub data: Bytes,

    /// MIME type, e.g. `image/png`
    pub mime_type: String,

    /// Original file name, used only for logging
    pub file_name: Option<String>,
}

impl Attachment {
    /// Create an attachment from raw bytes
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    /// Attach the original file name
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Encode as a `data:` URL, the form the backend expects in the `image` field
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.data))
    }
}

/// One invocation of the streaming chat endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// User message text
    pub message: String,

    /// Conversation the message belongs to
    pub session_id: String,

    /// Optional image attachment
    pub image: Option<Attachment>,

    /// Bearer credential when the user is signed in
    pub bearer: Option<SecretString>,
}

/// Reasons a request is rejected before anything is sent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestValidationError {
    #[error("request has neither message text nor an attachment")]
    Empty,

    #[error("session id is empty")]
    MissingSessionId,

    #[error("attachment '{name}' contains no data")]
    EmptyAttachment { name: String },

    #[error("bearer credential is empty")]
    EmptyBearer,
}

impl StreamRequest {
    /// Create a text-only request for a session
    pub fn new(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: session_id.into(),
            image: None,
            bearer: None,
        }
    }

    /// Attach an image
    pub fn with_image(mut self, image: Attachment) -> Self {
        self.image = Some(image);
        self
    }

    /// Send the request on behalf of a signed-in user
    pub fn with_bearer(mut self, token: impl Into<SecretString>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Whether the image endpoint should be used
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Check the request is worth sending
    pub fn validate(&self) -> Result<(), RequestValidationError> {
        if self.message.trim().is_empty() && self.image.is_none() {
            return Err(RequestValidationError::Empty);
        }

        if self.session_id.trim().is_empty() {
            return Err(RequestValidationError::MissingSessionId);
        }

        if let Some(image) = &self.image {
            if image.data.is_empty() {
                return Err(RequestValidationError::EmptyAttachment {
                    name: image.file_name.clone().unwrap_or_else(|| "image".to_string()),
                });
            }
        }

        if self.bearer.as_ref().is_some_and(|b| b.is_empty()) {
            return Err(RequestValidationError::EmptyBearer);
        }

        Ok(())
    }

    /// JSON body sent to the backend
    pub fn wire_body(&self) -> WireRequest<'_> {
        WireRequest {
            message: &self.message,
            session_id: &self.session_id,
            image: self.image.as_ref().map(Attachment::to_data_url),
        }
    }
}

impl SafeLogging for StreamRequest {
    fn safe_for_logging(&self) -> String {
        let image = match &self.image {
            Some(img) => format!(
                "{} ({} bytes, {})",
                img.file_name.as_deref().unwrap_or("image"),
                img.data.len(),
                img.mime_type
            ),
            None => "none".to_string(),
        };
        format!(
            "session={} message_chars={} image={} auth={}",
            self.session_id,
            self.message.chars().count(),
            image,
            if self.bearer.is_some() { "bearer" } else { "guest" }
        )
    }
}

/// Serialized request body
#[derive(Debug, Serialize)]
pub struct WireRequest<'a> {
    pub message: &'a str,
    pub session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Record type tags understood by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordTag {
    /// Informational progress line
    Log,
    /// Fragment of the answer
    Chunk,
    /// Terminal success, JSON payload
    Result,
    /// Terminal failure, JSON payload
    Error,
}

impl RecordTag {
    /// Parse a tag as it appears on the wire; unknown tags yield `None`
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "log" => Some(Self::Log),
            "chunk" => Some(Self::Chunk),
            "result" => Some(Self::Result),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Wire spelling of the tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Chunk => "chunk",
            Self::Result => "result",
            Self::Error => "error",
        }
    }
}

/// Distinguishes failures the UI renders differently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// An unauthenticated caller exhausted the guest quota
    RateLimitedGuest,
    /// Every other failure
    Generic,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimitedGuest => "rate-limited-guest",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure delivered to `on_error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
    pub kind: ErrorKind,
}

impl ErrorEvent {
    pub fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(message, ErrorKind::Generic)
    }

    pub fn rate_limited_guest(message: impl Into<String>) -> Self {
        Self::new(message, ErrorKind::RateLimitedGuest)
    }
}

/// Identifier of a retrieved document chunk; the backend sends either form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkId {
    Number(i64),
    Text(String),
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A knowledge-base chunk the answer was grounded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsedChunk {
    #[serde(default)]
    pub id: Option<ChunkId>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub source: Option<String>,

    #[serde(default)]
    pub file_url: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Side-channel metadata of a result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Free-form breakdown of stage name to seconds; stages may nest
    #[serde(default, deserialize_with = "null_as_default")]
    pub timing: serde_json::Map<String, serde_json::Value>,

    /// Any other metadata, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The authoritative final answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    /// Complete answer text
    #[serde(rename = "response")]
    pub answer: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub sources: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub source_urls: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub used_chunks: Vec<UsedChunk>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: ResultMetadata,
}

impl ResultPayload {
    /// A result with only the answer set
    pub fn with_answer(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
            source_urls: Vec::new(),
            used_chunks: Vec::new(),
            metadata: ResultMetadata::default(),
        }
    }

    /// Sum of the numeric leaves of the timing breakdown
    pub fn total_time(&self) -> f64 {
        self.metadata.timing.values().map(numeric_leaf_sum).sum()
    }
}

/// One decoded record
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Log { text: String },
    Chunk { text: String },
    Result(ResultPayload),
    Error(ErrorEvent),
}

impl StreamEvent {
    /// `Result` and `Error` end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result(_) | Self::Error(_))
    }

    /// Tag this event was decoded from
    pub fn tag(&self) -> RecordTag {
        match self {
            Self::Log { .. } => RecordTag::Log,
            Self::Chunk { .. } => RecordTag::Chunk,
            Self::Result(_) => RecordTag::Result,
            Self::Error(_) => RecordTag::Error,
        }
    }
}

fn numeric_leaf_sum(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::Object(map) => map.values().map(numeric_leaf_sum).sum(),
        _ => 0.0,
    }
}

/// Treat an explicit JSON `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_validation() {
        assert_eq!(
            StreamRequest::new("   ", "s1").validate(),
            Err(RequestValidationError::Empty)
        );
        assert_eq!(
            StreamRequest::new("hi", "").validate(),
            Err(RequestValidationError::MissingSessionId)
        );
        assert!(StreamRequest::new("hi", "s1").validate().is_ok());

        let image_only = StreamRequest::new("", "s1")
            .with_image(Attachment::new(vec![1u8, 2, 3], "image/png"));
        assert!(image_only.validate().is_ok());

        let empty_image = StreamRequest::new("", "s1")
            .with_image(Attachment::new(Vec::<u8>::new(), "image/png").with_file_name("scan.png"));
        assert_eq!(
            empty_image.validate(),
            Err(RequestValidationError::EmptyAttachment {
                name: "scan.png".to_string()
            })
        );

        let empty_bearer = StreamRequest::new("hi", "s1").with_bearer("");
        assert_eq!(empty_bearer.validate(), Err(RequestValidationError::EmptyBearer));
    }

    #[test]
    fn test_wire_body_shape() {
        let request = StreamRequest::new("What are the deadlines?", "abc");
        let body = serde_json::to_value(request.wire_body()).unwrap();
        assert_eq!(body, json!({"message": "What are the deadlines?", "session_id": "abc"}));

        let with_image = request.with_image(Attachment::new(&b"hi"[..], "image/png"));
        let body = serde_json::to_value(with_image.wire_body()).unwrap();
        assert_eq!(body["image"], "data:image/png;base64,aGk=");
    }

    #[test]
    fn test_safe_logging_hides_bearer() {
        let request = StreamRequest::new("hello", "s1").with_bearer("super-secret-token");
        let logged = request.safe_for_logging();
        assert!(!logged.contains("super-secret-token"));
        assert!(logged.contains("auth=bearer"));
        assert!(!format!("{:?}", request).contains("super-secret-token"));
    }

    #[test]
    fn test_result_payload_defaults_and_nulls() {
        let payload: ResultPayload = serde_json::from_value(json!({
            "response": "Hello",
            "sources": null,
            "used_chunks": [{"id": 7, "content": "Tuition is ...", "title": null}],
            "metadata": {"timing": {"retrieval": 0.25, "generation": 1.5}, "model": "x"}
        }))
        .unwrap();
        assert_eq!(payload.answer, "Hello");
        assert!(payload.sources.is_empty());
        assert!(payload.source_urls.is_empty());
        assert_eq!(payload.used_chunks[0].id, Some(ChunkId::Number(7)));
        assert_eq!(payload.total_time(), 1.75);
        assert_eq!(payload.metadata.extra["model"], "x");
    }

    #[test]
    fn test_result_payload_requires_answer() {
        let payload: Result<ResultPayload, _> =
            serde_json::from_value(json!({"sources": ["a"]}));
        assert!(payload.is_err());
    }

    #[test]
    fn test_error_kind_wire_names() {
        assert_eq!(ErrorKind::RateLimitedGuest.to_string(), "rate-limited-guest");
        assert_eq!(
            serde_json::to_value(ErrorKind::Generic).unwrap(),
            json!("generic")
        );
    }

    #[test]
    fn test_record_tags() {
        assert_eq!(RecordTag::parse("chunk"), Some(RecordTag::Chunk));
        assert_eq!(RecordTag::parse("progress"), None);
        assert_eq!(RecordTag::Error.as_str(), "error");
    }
}
