use pulldown_cmark::{Event, Parser, Tag, TagEnd};

use crate::core::protocol::{Citation, RenderableMessage};
use crate::core::retrieval::RetrievalHit;

const SNIPPET_CHARS: usize = 120;
const CITATION_LABEL: &str = "citation";

struct OpenLink {
    dest: String,
    text_start: usize,
}

fn ensure_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn ensure_blank_line(out: &mut String) {
    ensure_newline(out);
    if !out.is_empty() && !out.ends_with("\n\n") {
        out.push('\n');
    }
}

fn is_citation_target(dest: &str) -> bool {
    !dest.is_empty() && dest.bytes().all(|b| b.is_ascii_digit())
}

/// Markdown to terminal text. `[citation](N)` becomes `[N]`, whether or not N exists.
pub fn render_markdown(markdown: &str) -> String {
    let mut out = String::new();
    let mut links: Vec<OpenLink> = Vec::new();
    let mut lists: Vec<Option<u64>> = Vec::new();

    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => out.push_str(&t),
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::Rule => {
                ensure_blank_line(&mut out);
                out.push_str("---\n\n");
            }
            Event::Start(Tag::Link { dest_url, .. }) => links.push(OpenLink {
                dest: dest_url.to_string(),
                text_start: out.len(),
            }),
            Event::End(TagEnd::Link) => {
                let Some(link) = links.pop() else { continue };
                let text = out[link.text_start..].to_string();
                if text == CITATION_LABEL && is_citation_target(&link.dest) {
                    out.truncate(link.text_start);
                    out.push_str(&format!("[{}]", link.dest));
                } else if !link.dest.is_empty() && text != link.dest {
                    out.push_str(&format!(" ({})", link.dest));
                }
            }
            Event::Start(Tag::List(start)) => {
                ensure_newline(&mut out);
                lists.push(start);
            }
            Event::End(TagEnd::List(_)) => {
                lists.pop();
                if lists.is_empty() {
                    ensure_blank_line(&mut out);
                }
            }
            Event::Start(Tag::Item) => {
                ensure_newline(&mut out);
                out.push_str(&"  ".repeat(lists.len().saturating_sub(1)));
                match lists.last_mut() {
                    Some(Some(number)) => {
                        out.push_str(&format!("{number}. "));
                        *number += 1;
                    }
                    _ => out.push_str("- "),
                }
            }
            Event::End(TagEnd::Item) => ensure_newline(&mut out),
            Event::End(TagEnd::Paragraph) => {
                if lists.is_empty() {
                    ensure_blank_line(&mut out);
                } else {
                    ensure_newline(&mut out);
                }
            }
            Event::End(TagEnd::Heading(_)) | Event::End(TagEnd::CodeBlock) => {
                ensure_blank_line(&mut out)
            }
            _ => {}
        }
    }

    out.trim_end().to_string()
}

/// Collapses whitespace and cuts to `max_chars`, marking the cut with `...`.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

pub fn render_sources(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return String::new();
    }
    let mut out = String::from("Sources:");
    for citation in citations {
        out.push_str(&format!(
            "\n[{}] {}: {}",
            citation.id,
            citation.source().unwrap_or("unknown source"),
            snippet(&citation.text, SNIPPET_CHARS)
        ));
    }
    out
}

pub fn render_message(message: &RenderableMessage) -> String {
    let body = render_markdown(&message.content);
    let mut out = format!("{}> {}", message.role.as_str(), body);
    let sources = render_sources(&message.citations);
    if !sources.is_empty() {
        out.push_str("\n\n");
        out.push_str(&sources);
    }
    out
}

pub fn render_conversation(messages: &[RenderableMessage]) -> String {
    messages
        .iter()
        .map(render_message)
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_hits(hits: &[RetrievalHit]) -> String {
    if hits.is_empty() {
        return "No matching documents.".to_string();
    }
    hits.iter()
        .zip(1..)
        .map(|(hit, rank)| {
            format!(
                "{rank}. {} {}\n   {}",
                hit.relevance_label(),
                hit.source().unwrap_or("unknown source"),
                snippet(&hit.document, SNIPPET_CHARS * 2)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
