use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::core::protocol::{project_message, RawMessage, RenderableMessage, Role};
use crate::runtime::cli::CliError;

pub async fn run(file: Option<&Path>) -> Result<(), CliError> {
    let input = match file {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin().read_to_string(&mut buffer).await?;
            buffer
        }
    };
    println!("{}", serde_json::to_string_pretty(&decode_input(&input))?);
    Ok(())
}

/// Treats the input as one assistant message. Only the trailing line break is dropped.
fn decode_input(input: &str) -> RenderableMessage {
    let content = input.trim_end_matches(['\n', '\r']);
    project_message(&RawMessage::new(Role::Assistant, content))
}

#[cfg(test)]
mod tests {
    use super::decode_input;

    #[test]
    fn decodes_piped_response_with_trailing_newline() {
        let decoded = decode_input("eyJjb250ZXh0IjpbXX0=__LLM_RESPONSE__Hi [[citation:2]]\n");
        assert_eq!(decoded.content, "Hi [citation](2)");
        assert!(decoded.citations.is_empty());
    }

    #[test]
    fn plain_text_is_normalized_only() {
        let decoded = decode_input("No context [citation:1]");
        assert_eq!(decoded.content, "No context [citation](1)");
    }
}
