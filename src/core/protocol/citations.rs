use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// A whole-string rewrite. Rules run in order; each sees the previous rule's output.
struct RewriteRule {
    pattern: Regex,
    replacement: &'static str,
    /// Skip a match when this character immediately follows it.
    unless_followed_by: Option<char>,
}

impl RewriteRule {
    fn new(pattern: &str, replacement: &'static str) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("valid citation rewrite pattern"),
            replacement,
            unless_followed_by: None,
        }
    }

    fn unless_followed_by(mut self, ch: char) -> Self {
        self.unless_followed_by = Some(ch);
        self
    }

    fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let Some(guard) = self.unless_followed_by else {
            return self.pattern.replace_all(text, self.replacement);
        };

        let mut output = String::with_capacity(text.len());
        let mut last = 0;
        let mut rewritten = false;
        for caps in self.pattern.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if text[whole.end()..].starts_with(guard) {
                continue;
            }
            output.push_str(&text[last..whole.start()]);
            caps.expand(self.replacement, &mut output);
            last = whole.end();
            rewritten = true;
        }

        if !rewritten {
            return Cow::Borrowed(text);
        }
        output.push_str(&text[last..]);
        Cow::Owned(output)
    }
}

static CITATION_RULES: LazyLock<[RewriteRule; 4]> = LazyLock::new(|| {
    [
        // [[citation / [[Citation -> [citation
        RewriteRule::new(r"\[\[[cC]itation", "[citation"),
        // citation:N]] -> citation:N]
        RewriteRule::new(r"[cC]itation:([0-9]+)\]\]", "citation:${1}]"),
        // [[citation:N]] -> [citation:N], unless a third bracket follows
        RewriteRule::new(r"\[\[([cC]itation:[0-9]+)\]\]", "[${1}]").unless_followed_by(']'),
        // [citation:N] -> [citation](N)
        RewriteRule::new(r"\[[cC]itation:([0-9]+)\]", "[citation](${1})"),
    ]
});

/// Canonicalizes model-emitted citation markers to `[citation](N)`.
///
/// `N` is copied verbatim; it is not checked against the message's citations.
pub fn normalize(text: &str) -> String {
    let mut current = text.to_string();
    for rule in CITATION_RULES.iter() {
        let rewritten = match rule.apply(&current) {
            Cow::Borrowed(_) => None,
            Cow::Owned(next) => Some(next),
        };
        if let Some(next) = rewritten {
            current = next;
        }
    }
    current
}
