//! Shared pieces of the workflow steps: prompt rendering, embedding,
//! similarity trimming and text helpers

use std::sync::LazyLock;

use handlebars::Handlebars;
use regex::Regex;
use serde::Serialize;

use crate::engine::{StepContext, WorkflowError};
use crate::provider::truncate_for_embedding;

/// Everything up to and including the first sentence terminator
static FIRST_SENTENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*(.+?[.!?])(?:\s|$)").unwrap());

/// Prompts are plain text, so nothing is HTML-escaped
static PROMPTS: LazyLock<Handlebars<'static>> = LazyLock::new(|| {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
});

const MAX_QUOTE_CHARS: usize = 200;

/// First sentence of a provider response, for quoting in recommendations
pub fn first_sentence(text: &str) -> String {
    let sentence = FIRST_SENTENCE_REGEX
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| text.trim());

    let sentence = sentence.split_whitespace().collect::<Vec<_>>().join(" ");
    if sentence.is_empty() {
        return "No analysis available.".to_string();
    }
    if sentence.chars().count() > MAX_QUOTE_CHARS {
        let cut: String = sentence.chars().take(MAX_QUOTE_CHARS).collect();
        return format!("{}...", cut.trim_end());
    }
    sentence
}

pub fn render_prompt<T: Serialize>(template: &str, data: &T) -> Result<String, WorkflowError> {
    Ok(PROMPTS.render_template(template, data)?)
}

/// Embed text through the configured provider, truncated to its input limit
pub async fn embed_text(ctx: &StepContext<'_>, text: &str) -> Result<Vec<f32>, WorkflowError> {
    Ok(ctx.services.embedder.embed(truncate_for_embedding(text)).await?)
}

/// Drop the queried entity from its own similarity results and keep `limit`
pub fn exclude_self<T>(hits: Vec<T>, is_self: impl Fn(&T) -> bool, limit: usize) -> Vec<T> {
    hits.into_iter().filter(|h| !is_self(h)).take(limit).collect()
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Similarity rounded for display
pub fn similarity_pct(distance: f32) -> f64 {
    round1(((1.0 - distance as f64) * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_sentence() {
        assert_eq!(
            first_sentence("Replace brake pads now. Then check coolant."),
            "Replace brake pads now."
        );
        assert_eq!(first_sentence("  Inspect\nthe engine! Later"), "Inspect the engine!");
        assert_eq!(first_sentence("no terminator here"), "no terminator here");
        assert_eq!(first_sentence("   "), "No analysis available.");
    }

    #[test]
    fn test_decimal_point_is_not_a_sentence_end() {
        assert_eq!(
            first_sentence("Brake wear at 95.5% is critical. Act."),
            "Brake wear at 95.5% is critical."
        );
    }

    #[test]
    fn test_long_sentence_is_cut() {
        let text = "a".repeat(500);
        let quoted = first_sentence(&text);
        assert!(quoted.ends_with("..."));
        assert_eq!(quoted.chars().count(), MAX_QUOTE_CHARS + 3);
    }

    #[test]
    fn test_render_prompt_does_not_escape() {
        let prompt = render_prompt(
            "Route {{origin}} -> {{destination}}{{#each stops}} via {{this}}{{/each}}",
            &json!({ "origin": "A & B", "destination": "C", "stops": ["D"] }),
        )
        .unwrap();
        assert_eq!(prompt, "Route A & B -> C via D");
    }

    #[test]
    fn test_exclude_self() {
        let kept = exclude_self(vec![1, 2, 3, 4], |n| *n == 2, 2);
        assert_eq!(kept, vec![1, 3]);
    }

    #[test]
    fn test_similarity_pct() {
        assert_eq!(similarity_pct(0.0), 100.0);
        assert_eq!(similarity_pct(0.25), 75.0);
        assert_eq!(similarity_pct(1.5), 0.0);
    }
}
