use serde::Serialize;

use crate::adapters::render::render_hits;
use crate::core::ports::chat_api::ChatApiPort;
use crate::core::ports::credentials::CredentialProvider;
use crate::core::retrieval::{RetrievalHit, RetrievalRequest, TOP_K_CHOICES};
use crate::runtime::cli::{CliError, Context};

#[derive(Debug, Serialize)]
struct ScoredHit<'a> {
    relevance: String,
    #[serde(flatten)]
    hit: &'a RetrievalHit,
}

pub async fn run(
    ctx: &Context,
    kb_id: i64,
    top_k: Option<u32>,
    query: &str,
) -> Result<(), CliError> {
    let top_k = top_k.unwrap_or_else(|| ctx.settings.default_top_k());
    if !TOP_K_CHOICES.contains(&top_k) {
        log::info!("top_k {top_k} is outside the usual choices {TOP_K_CHOICES:?}");
    }
    let request = RetrievalRequest::new(query, kb_id, top_k)?;

    let api = ctx.api()?;
    let token = ctx.credentials().bearer_token();
    let hits = api.test_retrieval(token.as_deref(), &request).await?;
    log::debug!("Retrieval returned {} hits for kb {kb_id}", hits.len());

    if ctx.json {
        let scored = hits
            .iter()
            .map(|hit| ScoredHit {
                relevance: hit.relevance_label(),
                hit,
            })
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&scored)?);
    } else {
        println!("{}", render_hits(&hits));
    }
    Ok(())
}
