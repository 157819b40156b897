use tokio::io::{AsyncBufReadExt, BufReader};

use super::conversation;
use crate::adapters::render::snippet;
use crate::core::ports::chat_api::{ChatApiPort, ChatSummary, NewChat};
use crate::core::ports::credentials::CredentialProvider;
use crate::runtime::cli::{CliError, Context};

const PREVIEW_CHARS: usize = 80;

pub async fn list(ctx: &Context) -> Result<(), CliError> {
    let api = ctx.api()?;
    let token = ctx.credentials().bearer_token();
    let chats = api.list_chats(token.as_deref()).await?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&chats)?);
    } else {
        println!("{}", format_chat_list(&chats));
    }
    Ok(())
}

pub async fn create(
    ctx: &Context,
    kb_ids: Vec<i64>,
    title: Option<&str>,
    open: bool,
) -> Result<(), CliError> {
    let new_chat = NewChat::new(title, kb_ids)?;
    let api = ctx.api()?;
    let token = ctx.credentials().bearer_token();
    let chat = api.create_chat(token.as_deref(), &new_chat).await?;
    log::info!("Created conversation {} ({})", chat.id, chat.title);

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&chat)?);
    } else {
        println!("Created conversation {}: {}", chat.id, chat.title);
    }
    if open {
        return conversation::interactive(ctx, chat.id).await;
    }
    Ok(())
}

pub async fn delete(ctx: &Context, id: i64, yes: bool) -> Result<(), CliError> {
    if !yes && !confirm(&format!("Delete conversation {id}? [y/N] ")).await? {
        eprintln!("Cancelled.");
        return Ok(());
    }

    let api = ctx.api()?;
    let token = ctx.credentials().bearer_token();
    api.delete_chat(token.as_deref(), id).await?;
    log::info!("Deleted conversation {id}");

    if ctx.json {
        println!("{}", serde_json::json!({ "status": "success", "id": id }));
    } else {
        println!("Deleted conversation {id}.");
    }
    Ok(())
}

async fn confirm(prompt: &str) -> Result<bool, CliError> {
    eprint!("{prompt}");
    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

pub(crate) fn format_chat_list(chats: &[ChatSummary]) -> String {
    if chats.is_empty() {
        return "No conversations yet.".to_string();
    }
    chats
        .iter()
        .map(|chat| {
            let title = if chat.title.trim().is_empty() {
                "(untitled)"
            } else {
                chat.title.trim()
            };
            let count = match chat.messages.len() {
                1 => "1 message".to_string(),
                n => format!("{n} messages"),
            };
            let mut line = match chat.updated_at.as_deref() {
                Some(updated) => format!("{:>6}  {title}  ({count}, {updated})", chat.id),
                None => format!("{:>6}  {title}  ({count})", chat.id),
            };
            if let Some(preview) = chat.last_message_preview() {
                let preview = snippet(preview, PREVIEW_CHARS);
                if !preview.is_empty() {
                    line.push_str(&format!("\n        {preview}"));
                }
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
