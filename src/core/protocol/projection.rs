use super::{decode, normalize, RawMessage, RenderableMessage, Role};

/// Decodes one message and canonicalizes citation markers in its visible answer text.
/// Only assistant text is rewritten; user and system text is shown as typed.
pub fn project_message(raw: &RawMessage) -> RenderableMessage {
    let mut message = decode(raw);
    if message.role == Role::Assistant && !message.content.is_empty() {
        message.content = normalize(&message.content);
    }
    message
}

/// Projects a conversation 1:1, in order. Always recomputed from the raw messages.
pub fn project(messages: &[RawMessage]) -> Vec<RenderableMessage> {
    messages.iter().map(project_message).collect()
}
