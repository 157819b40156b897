mod error;
mod stream;

use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::adapters::config::Settings;
use crate::core::ports::chat_api::{
    ChatApiPort, ChatSummary, Conversation, NewChat, OutboundMessage, SendMessageRequest,
};
use crate::core::retrieval::{RetrievalHit, RetrievalRequest};

pub use error::ApiError;
use stream::{StreamDecoder, StreamPart};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Text(String),
    /// Failure reported by the service inside the stream.
    Error(String),
    Done,
}

#[derive(Debug, Serialize)]
struct SendMessagesBody<'a> {
    messages: &'a [OutboundMessage],
}

#[derive(Debug, Deserialize)]
struct RetrievalResponse {
    #[serde(default)]
    results: Vec<RetrievalHit>,
}

/// `ChatApiPort` over the chat service's REST endpoints.
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatApi {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ApiError> {
        Self::new(
            &settings.api_base_url(),
            Duration::from_secs(settings.connect_timeout_secs()),
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token.map(str::trim).filter(|token| !token.is_empty()) {
            Some(token) => builder.header("Authorization", format!("Bearer {token}")),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path);
        log::debug!("GET {url}");
        let response = self
            .authorized(self.client.get(&url), token)
            .send()
            .await?;
        parse_json(ensure_success(response).await?).await
    }
}

async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    log::warn!("Chat service returned {status}: {body}");
    Err(ApiError::from_status(status.as_u16(), &body))
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Parse(e.to_string()))
}

impl ChatApiPort for HttpChatApi {
    fn list_chats<'a>(
        &'a self,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<ChatSummary>, ApiError>> {
        Box::pin(async move { self.get_json::<Vec<ChatSummary>>("chat", token).await })
    }

    fn fetch_chat<'a>(
        &'a self,
        token: Option<&'a str>,
        chat_id: i64,
    ) -> BoxFuture<'a, Result<Conversation, ApiError>> {
        Box::pin(async move {
            self.get_json::<Conversation>(&format!("chat/{chat_id}"), token)
                .await
        })
    }

    fn create_chat<'a>(
        &'a self,
        token: Option<&'a str>,
        chat: &'a NewChat,
    ) -> BoxFuture<'a, Result<ChatSummary, ApiError>> {
        Box::pin(async move {
            let url = self.endpoint("chat");
            log::debug!("POST {url} kbs={:?}", chat.knowledge_base_ids);
            let response = self
                .authorized(self.client.post(&url), token)
                .json(chat)
                .send()
                .await?;
            parse_json::<ChatSummary>(ensure_success(response).await?).await
        })
    }

    fn delete_chat<'a>(
        &'a self,
        token: Option<&'a str>,
        chat_id: i64,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            let url = self.endpoint(&format!("chat/{chat_id}"));
            log::debug!("DELETE {url}");
            let response = self
                .authorized(self.client.delete(&url), token)
                .send()
                .await?;
            ensure_success(response).await?;
            Ok(())
        })
    }

    fn send_message<'a>(
        &'a self,
        request: SendMessageRequest,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            let url = self.endpoint(&format!("chat/{}/messages", request.chat_id));
            log::debug!("POST {url} ({} messages)", request.messages.len());

            let response = self
                .authorized(self.client.post(&url), request.token.as_deref())
                .json(&SendMessagesBody {
                    messages: &request.messages,
                })
                .send()
                .await?;
            let response = ensure_success(response).await?;

            let mut body = response.bytes_stream();
            let mut decoder = StreamDecoder::new();
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                for part in decoder.feed(&chunk) {
                    if !forward(&request.tx, part) {
                        log::debug!("Reply receiver dropped, abandoning stream");
                        return Ok(());
                    }
                }
            }
            if let Some(part) = decoder.finish() {
                forward(&request.tx, part);
            }

            let _ = request.tx.send(StreamEvent::Done);
            Ok(())
        })
    }

    fn test_retrieval<'a>(
        &'a self,
        token: Option<&'a str>,
        request: &'a RetrievalRequest,
    ) -> BoxFuture<'a, Result<Vec<RetrievalHit>, ApiError>> {
        Box::pin(async move {
            let url = self.endpoint("knowledge-base/test-retrieval");
            log::debug!("POST {url} kb={} top_k={}", request.kb_id, request.top_k);
            let response = self
                .authorized(self.client.post(&url), token)
                .json(request)
                .send()
                .await?;
            let parsed: RetrievalResponse = parse_json(ensure_success(response).await?).await?;
            Ok(parsed.results)
        })
    }
}

/// Returns false once the receiving side is gone.
fn forward(tx: &tokio::sync::mpsc::UnboundedSender<StreamEvent>, part: StreamPart) -> bool {
    let event = match part {
        StreamPart::Text(text) => StreamEvent::Text(text),
        StreamPart::Error(message) => StreamEvent::Error(message),
        StreamPart::Ignored => return !tx.is_closed(),
    };
    tx.send(event).is_ok()
}
