use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::protocol::{RawMessage, Role, RESPONSE_MARKER};
use crate::core::retrieval::{RetrievalHit, RetrievalRequest};

pub use crate::adapters::http::{ApiError, StreamEvent};

/// Chat list entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub knowledge_base_ids: Vec<i64>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

impl ChatSummary {
    /// Visible text of the newest message: for an encoded response, the answer between the
    /// first marker and any later one.
    pub fn last_message_preview(&self) -> Option<&str> {
        let content = self.messages.last()?.content.as_str();
        Some(content.split(RESPONSE_MARKER).nth(1).unwrap_or(content))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NewChatError {
    #[error("Please select a knowledge base")]
    NoKnowledgeBase,
}

/// Body of the create-conversation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewChat {
    pub title: String,
    pub knowledge_base_ids: Vec<i64>,
}

impl NewChat {
    pub fn new(title: Option<&str>, knowledge_base_ids: Vec<i64>) -> Result<Self, NewChatError> {
        let mut knowledge_base_ids = knowledge_base_ids;
        knowledge_base_ids.dedup();
        if knowledge_base_ids.is_empty() {
            return Err(NewChatError::NoKnowledgeBase);
        }
        let title = title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or("New chat")
            .to_string();
        Ok(Self {
            title,
            knowledge_base_ids,
        })
    }
}

/// Full conversation as returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    #[serde(default)]
    pub knowledge_base_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub token: Option<String>,
    pub chat_id: i64,
    /// Full history; the last entry is the user's new turn.
    pub messages: Vec<OutboundMessage>,
    pub tx: mpsc::UnboundedSender<StreamEvent>,
}

pub trait ChatApiPort: Send + Sync {
    fn list_chats<'a>(
        &'a self,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<ChatSummary>, ApiError>>;

    fn fetch_chat<'a>(
        &'a self,
        token: Option<&'a str>,
        chat_id: i64,
    ) -> BoxFuture<'a, Result<Conversation, ApiError>>;

    fn create_chat<'a>(
        &'a self,
        token: Option<&'a str>,
        chat: &'a NewChat,
    ) -> BoxFuture<'a, Result<ChatSummary, ApiError>>;

    fn delete_chat<'a>(
        &'a self,
        token: Option<&'a str>,
        chat_id: i64,
    ) -> BoxFuture<'a, Result<(), ApiError>>;

    /// Streams the assistant reply into `request.tx`. Returns once the stream ends or the
    /// receiver is dropped.
    fn send_message<'a>(
        &'a self,
        request: SendMessageRequest,
    ) -> BoxFuture<'a, Result<(), ApiError>>;

    fn test_retrieval<'a>(
        &'a self,
        token: Option<&'a str>,
        request: &'a RetrievalRequest,
    ) -> BoxFuture<'a, Result<Vec<RetrievalHit>, ApiError>>;
}
