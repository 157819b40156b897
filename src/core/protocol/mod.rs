//! Encoded chat-response protocol.
//!
//! An assistant message may carry its retrieval context and its answer in one string:
//! `base64(json({"context": [...]})) + RESPONSE_MARKER + answer`. Everything in this module
//! is pure and never mutates the message it reads.

mod citations;
mod decoder;
mod projection;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub use citations::normalize;
pub use decoder::decode;
pub use projection::{project, project_message};

/// Separates the base64 context block from the answer text. Shared with the chat service;
/// there is no escaping, so the literal must never appear inside context or answer text.
pub const RESPONSE_MARKER: &str = "__LLM_RESPONSE__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Data,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Data => "data",
        }
    }
}

/// Opaque message identifier. Server ids are integers; client-created messages get a UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(value) => MessageId(value.to_string()),
            RawId::Text(value) => MessageId(value),
        })
    }
}

/// A message exactly as persisted or streamed. Treated as immutable input by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// The chat service emits naive ISO timestamps; those are taken as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp '{trimmed}': {e}"))
}

/// One retrieved chunk inside the encoded context block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDocument {
    #[serde(default, deserialize_with = "null_as_default")]
    pub page_content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,
}

/// Explicit `null` reads the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedContext {
    pub context: Vec<ContextDocument>,
}

/// Numbered by position in the decoded context, starting at 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub id: u32,
    pub text: String,
    pub metadata: Map<String, Value>,
}

impl Citation {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderableMessage {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub citations: Vec<Citation>,
}

impl RenderableMessage {
    pub(crate) fn passthrough(raw: &RawMessage) -> Self {
        Self {
            id: raw.id.clone(),
            role: raw.role,
            content: raw.content.clone(),
            citations: Vec::new(),
        }
    }
}

/// Builds an encoded response the way the chat service does.
pub fn encode_response(context: &[ContextDocument], answer: &str) -> String {
    let payload = serde_json::json!({ "context": context });
    let encoded = STANDARD.encode(payload.to_string());
    format!("{encoded}{RESPONSE_MARKER}{answer}")
}

/// Answer text suitable for re-sending as model history: everything after the last marker.
pub fn strip_context(content: &str) -> &str {
    match content.rsplit_once(RESPONSE_MARKER) {
        Some((_, answer)) => answer,
        None => content,
    }
}
