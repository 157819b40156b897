use std::io::Write;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::chats;
use crate::adapters::render::{render_conversation, render_message};
use crate::core::protocol::RenderableMessage;
use crate::core::session::{ConversationSession, SessionError};
use crate::runtime::cli::{print_auth_hint, CliError, Context};

const HELP: &str = "Type a message and press Enter. /history reprints the conversation, /quit leaves.";

#[derive(Debug, Serialize)]
struct ConversationView<'a> {
    id: i64,
    title: &'a str,
    knowledge_base_ids: &'a [i64],
    messages: Vec<RenderableMessage>,
}

/// Loads the conversation. On failure the user is told and sent back to the list.
async fn open(ctx: &Context, id: i64) -> Result<ConversationSession, CliError> {
    let mut session = ConversationSession::new(ctx.api()?, ctx.credentials());
    let loaded = session.load(id).await.map(|_| ());
    match loaded {
        Ok(()) => Ok(session),
        Err(err @ SessionError::Load { .. }) => {
            eprintln!("Error: {err}");
            if let SessionError::Load { source, .. } = &err {
                if source.is_unauthorized() {
                    print_auth_hint();
                }
            }
            eprintln!("Returning to the conversation list.");
            if let Err(list_err) = chats::list(ctx).await {
                log::warn!("Failed to list conversations: {list_err}");
            }
            Err(CliError::Reported)
        }
        Err(err) => Err(err.into()),
    }
}

fn heading(session: &ConversationSession) -> String {
    let title = session.title().trim();
    match session.chat_id() {
        Some(id) if title.is_empty() => format!("# Conversation {id}"),
        _ => format!("# {title}"),
    }
}

fn print_view(ctx: &Context, session: &ConversationSession) -> Result<(), CliError> {
    let messages = session.current_view();
    if ctx.json {
        let view = ConversationView {
            id: session.chat_id().unwrap_or_default(),
            title: session.title(),
            knowledge_base_ids: session.knowledge_base_ids(),
            messages,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{}\n", heading(session));
        if !messages.is_empty() {
            println!("{}", render_conversation(&messages));
        }
    }
    Ok(())
}

pub async fn show(ctx: &Context, id: i64) -> Result<(), CliError> {
    let session = open(ctx, id).await?;
    print_view(ctx, &session)
}

pub async fn interactive(ctx: &Context, id: i64) -> Result<(), CliError> {
    let mut session = open(ctx, id).await?;
    if !ctx.json {
        print_view(ctx, &session)?;
        println!("\n{HELP}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if !ctx.json {
            print!("\nyou> ");
            std::io::stdout().flush()?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                print_view(ctx, &session)?;
                continue;
            }
            _ => {}
        }

        let show_progress = !ctx.json;
        let mut updates = 0usize;
        let result = session
            .send(&line, |_| {
                updates += 1;
                // the first update is the user's own turn
                if show_progress && updates > 1 {
                    eprint!(".");
                }
            })
            .await;
        if show_progress && updates > 1 {
            eprintln!();
        }

        match result {
            Ok(Some(reply)) if ctx.json => println!("{}", serde_json::to_string(&reply)?),
            Ok(Some(reply)) => println!("{}", render_message(&reply)),
            Ok(None) => eprintln!("The assistant returned an empty reply."),
            // the session stays usable; the user message is kept
            Err(err) => {
                eprintln!("Error: {err}");
                if matches!(&err, SessionError::Send(source) if source.is_unauthorized()) {
                    print_auth_hint();
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::heading;
    use crate::core::ports::chat_api::{
        ApiError, ChatApiPort, ChatSummary, Conversation, NewChat, SendMessageRequest,
    };
    use crate::core::retrieval::{RetrievalHit, RetrievalRequest};
    use crate::core::session::ConversationSession;
    use crate::adapters::credentials::StaticToken;
    use futures::future::BoxFuture;
    use std::sync::Arc;

    struct Titled(&'static str);

    impl ChatApiPort for Titled {
        fn list_chats<'a>(
            &'a self,
            _token: Option<&'a str>,
        ) -> BoxFuture<'a, Result<Vec<ChatSummary>, ApiError>> {
            Box::pin(async move { Ok(Vec::new()) })
        }

        fn fetch_chat<'a>(
            &'a self,
            _token: Option<&'a str>,
            chat_id: i64,
        ) -> BoxFuture<'a, Result<Conversation, ApiError>> {
            Box::pin(async move {
                Ok(Conversation {
                    id: chat_id,
                    title: self.0.to_string(),
                    messages: Vec::new(),
                    knowledge_base_ids: Vec::new(),
                })
            })
        }

        fn create_chat<'a>(
            &'a self,
            _token: Option<&'a str>,
            _chat: &'a NewChat,
        ) -> BoxFuture<'a, Result<ChatSummary, ApiError>> {
            Box::pin(async move { Err(ApiError::from_status(500, "not used")) })
        }

        fn delete_chat<'a>(
            &'a self,
            _token: Option<&'a str>,
            _chat_id: i64,
        ) -> BoxFuture<'a, Result<(), ApiError>> {
            Box::pin(async move { Ok(()) })
        }

        fn send_message<'a>(
            &'a self,
            _request: SendMessageRequest,
        ) -> BoxFuture<'a, Result<(), ApiError>> {
            Box::pin(async move { Ok(()) })
        }

        fn test_retrieval<'a>(
            &'a self,
            _token: Option<&'a str>,
            _request: &'a RetrievalRequest,
        ) -> BoxFuture<'a, Result<Vec<RetrievalHit>, ApiError>> {
            Box::pin(async move { Ok(Vec::new()) })
        }
    }

    async fn loaded(title: &'static str) -> ConversationSession {
        let mut session =
            ConversationSession::new(Arc::new(Titled(title)), Arc::new(StaticToken::anonymous()));
        session.load(5).await.expect("load");
        session
    }

    #[tokio::test]
    async fn heading_falls_back_to_conversation_id() {
        assert_eq!(heading(&loaded("Onboarding").await), "# Onboarding");
        assert_eq!(heading(&loaded("  ").await), "# Conversation 5");
    }
}
