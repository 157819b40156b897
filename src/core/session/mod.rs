//! One open conversation: history fetched once, live turns appended, view derived on demand.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::ports::chat_api::{
    ApiError, ChatApiPort, OutboundMessage, SendMessageRequest, StreamEvent,
};
use crate::core::ports::credentials::CredentialProvider;
use crate::core::protocol::{
    project, project_message, strip_context, RawMessage, RenderableMessage, Role,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Conversation is already loaded")]
    AlreadyLoaded,
    #[error("Conversation is not loaded")]
    NotLoaded,
    #[error("Conversation session is closed")]
    Closed,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Failed to load conversation {chat_id}: {source}")]
    Load { chat_id: i64, source: ApiError },
    #[error("Failed to send message: {0}")]
    Send(#[source] ApiError),
    #[error("Assistant reply failed: {0}")]
    Stream(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Open,
    /// History could not be loaded; the caller is expected to leave.
    Closed,
}

pub struct ConversationSession {
    api: Arc<dyn ChatApiPort>,
    credentials: Arc<dyn CredentialProvider>,
    state: SessionState,
    chat_id: Option<i64>,
    title: String,
    knowledge_base_ids: Vec<i64>,
    messages: Vec<RawMessage>,
}

impl ConversationSession {
    pub fn new(api: Arc<dyn ChatApiPort>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            api,
            credentials,
            state: SessionState::Idle,
            chat_id: None,
            title: String::new(),
            knowledge_base_ids: Vec::new(),
            messages: Vec::new(),
        }
    }

    /// Fetches the full history once. Messages appended before the load stay after it.
    pub async fn load(&mut self, chat_id: i64) -> Result<&[RawMessage], SessionError> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Open => return Err(SessionError::AlreadyLoaded),
            SessionState::Closed => return Err(SessionError::Closed),
        }

        let token = self.credentials.bearer_token();
        let conversation = match self.api.fetch_chat(token.as_deref(), chat_id).await {
            Ok(conversation) => conversation,
            Err(source) => {
                log::error!("Failed to load conversation {chat_id}: {source}");
                self.state = SessionState::Closed;
                return Err(SessionError::Load { chat_id, source });
            }
        };

        log::info!(
            "Loaded conversation {} ({} messages)",
            conversation.id,
            conversation.messages.len()
        );
        let live = std::mem::take(&mut self.messages);
        self.messages = conversation.messages;
        self.messages.extend(live);
        self.chat_id = Some(conversation.id);
        self.title = conversation.title;
        self.knowledge_base_ids = conversation.knowledge_base_ids;
        self.state = SessionState::Open;
        Ok(&self.messages)
    }

    pub fn append(&mut self, message: RawMessage) {
        if self.state == SessionState::Closed {
            log::warn!("Ignoring message {} appended to a closed session", message.id);
            return;
        }
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[RawMessage] {
        &self.messages
    }

    /// Freshly projected on every call, so a reply completed since the last call is
    /// decoded without any invalidation step.
    pub fn current_view(&self) -> Vec<RenderableMessage> {
        project(&self.messages)
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.chat_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn knowledge_base_ids(&self) -> &[i64] {
        &self.knowledge_base_ids
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Sends a user turn and streams the assistant reply into the conversation.
    ///
    /// The user message is appended before the request goes out and is kept if the request
    /// fails. A partially received reply is discarded on failure, and also when this future
    /// is dropped before the stream ends. `on_update` sees the
    /// projected conversation after every change.
    pub async fn send<F>(
        &mut self,
        text: &str,
        mut on_update: F,
    ) -> Result<Option<RenderableMessage>, SessionError>
    where
        F: FnMut(&[RenderableMessage]),
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let chat_id = match (self.state, self.chat_id) {
            (SessionState::Closed, _) => return Err(SessionError::Closed),
            (SessionState::Open, Some(chat_id)) => chat_id,
            _ => return Err(SessionError::NotLoaded),
        };

        self.append(RawMessage::new(Role::User, text));
        on_update(&self.current_view());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = SendMessageRequest {
            token: self.credentials.bearer_token(),
            chat_id,
            messages: self.outbound_history(),
            tx,
        };
        let api = Arc::clone(&self.api);
        let transport = tokio::spawn(async move { api.send_message(request).await });

        // The reply joins `messages` only once the stream has completed.
        let mut reply: Option<RawMessage> = None;
        let mut stream_error: Option<String> = None;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Text(chunk) => {
                    reply
                        .get_or_insert_with(|| RawMessage::new(Role::Assistant, String::new()))
                        .content
                        .push_str(&chunk);
                    on_update(&self.view_with(reply.as_ref()));
                }
                StreamEvent::Error(message) => {
                    stream_error = Some(message);
                    break;
                }
                StreamEvent::Done => break,
            }
        }
        drop(rx);

        let outcome = match transport.await {
            Ok(result) => result,
            Err(e) => Err(ApiError::Stream(format!("reply task failed: {e}"))),
        };
        let failure = match (stream_error, outcome) {
            (Some(message), _) => Some(SessionError::Stream(message)),
            (None, Err(e)) => Some(SessionError::Send(e)),
            (None, Ok(())) => None,
        };

        if let Some(err) = failure {
            log::warn!("Send to conversation {chat_id} failed: {err}");
            if reply.is_some() {
                on_update(&self.current_view());
            }
            return Err(err);
        }

        Ok(reply.map(|message| {
            let projected = project_message(&message);
            self.messages.push(message);
            projected
        }))
    }

    /// The stored conversation plus a reply that is still streaming.
    fn view_with(&self, in_flight: Option<&RawMessage>) -> Vec<RenderableMessage> {
        let mut view = self.current_view();
        view.extend(in_flight.map(project_message));
        view
    }

    /// History as the service expects it: context blocks stripped, new turn last.
    fn outbound_history(&self) -> Vec<OutboundMessage> {
        self.messages
            .iter()
            .map(|message| OutboundMessage {
                role: message.role,
                content: strip_context(&message.content).to_string(),
            })
            .collect()
    }
}
