use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;

use super::{Citation, EncodedContext, RawMessage, RenderableMessage, Role, RESPONSE_MARKER};

/// Standard alphabet, padding optional.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, thiserror::Error)]
enum ContextDecodeError {
    #[error("context block is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("context block is not a valid context document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Splits an assistant message into answer text and numbered citations.
///
/// Anything that cannot be decoded falls back to the original content with no citations.
/// A partially streamed message is indistinguishable from a malformed one and gets the
/// same treatment until the rest of it arrives.
pub fn decode(raw: &RawMessage) -> RenderableMessage {
    if raw.role != Role::Assistant || raw.content.is_empty() {
        return RenderableMessage::passthrough(raw);
    }

    let Some((prefix, answer)) = raw.content.split_once(RESPONSE_MARKER) else {
        return RenderableMessage::passthrough(raw);
    };

    // Whitespace around the marker is framing, not answer text.
    let answer = answer.trim_start();
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return RenderableMessage {
            id: raw.id.clone(),
            role: raw.role,
            content: answer.to_string(),
            citations: Vec::new(),
        };
    }

    match decode_context(prefix) {
        Ok(context) => RenderableMessage {
            id: raw.id.clone(),
            role: raw.role,
            content: answer.to_string(),
            citations: number_citations(context),
        },
        Err(e) => {
            log::warn!(
                "Failed to decode context block of message {}: {}. Showing raw content.",
                raw.id,
                e
            );
            RenderableMessage::passthrough(raw)
        }
    }
}

fn decode_context(prefix: &str) -> Result<EncodedContext, ContextDecodeError> {
    let bytes = LENIENT_STANDARD.decode(prefix)?;
    Ok(serde_json::from_slice::<EncodedContext>(&bytes)?)
}

fn number_citations(context: EncodedContext) -> Vec<Citation> {
    context
        .context
        .into_iter()
        .zip(1u32..)
        .map(|(document, id)| Citation {
            id,
            text: document.page_content,
            metadata: document.metadata,
        })
        .collect()
}
