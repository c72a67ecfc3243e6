//! Reply parsing: inline model markup to a structured [`TurnReply`].
//!
//! Prompts ask the model to open with a language tag (`[ES]`) and, for some
//! businesses, to close with a suggestion tag (`<<Pricing|Book a demo>>`).
//! Neither should ever be spoken, so they are lifted out here.

use parley_types::chat::{DEFAULT_LANGUAGE, FallbackReason, TurnReply};
use parley_types::config::FallbackPhrases;
use parley_types::error::ConfigError;

/// Parse raw model output. Returns None when nothing speakable remains.
pub fn parse_reply(raw: &str) -> Option<TurnReply> {
    let (language, rest) = split_language_tag(raw);
    let (text, suggestions) = extract_suggestions(rest);
    let text = collapse_whitespace(&text);
    if text.is_empty() {
        return None;
    }
    Some(TurnReply {
        text,
        language: language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        suggestions,
    })
}

/// Reject fallback phrases that would parse to nothing speakable.
pub fn validate_fallback_phrases(fallbacks: &FallbackPhrases) -> Result<(), ConfigError> {
    for (name, reason) in [
        ("transport", FallbackReason::Transport),
        ("timeout", FallbackReason::Timeout),
        ("malformed", FallbackReason::Malformed),
    ] {
        if parse_reply(fallbacks.phrase(reason)).is_none() {
            return Err(ConfigError::Invalid(format!(
                "fallbacks.{name} must contain speakable text"
            )));
        }
    }
    Ok(())
}

/// Remove all markup from a fragment (one streamed sentence).
pub fn strip_markup(fragment: &str) -> String {
    let (_, rest) = split_language_tag(fragment);
    let (text, _) = extract_suggestions(rest);
    collapse_whitespace(&text)
}

/// Split a leading `[XX]` tag off. The code is returned lower-cased.
fn split_language_tag(text: &str) -> (Option<String>, &str) {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 4
        && bytes[0] == b'['
        && bytes[1].is_ascii_uppercase()
        && bytes[2].is_ascii_uppercase()
        && bytes[3] == b']'
    {
        (Some(trimmed[1..3].to_ascii_lowercase()), &trimmed[4..])
    } else {
        (None, text)
    }
}

/// Remove every complete `<<a|b>>` segment, collecting its items. An
/// unterminated `<<` drops the rest of the text.
fn extract_suggestions(text: &str) -> (String, Vec<String>) {
    let mut kept = String::with_capacity(text.len());
    let mut suggestions = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("<<") {
        kept.push_str(&rest[..open]);
        let inner = &rest[open + 2..];
        let Some(close) = inner.find(">>") else {
            rest = "";
            break;
        };
        suggestions.extend(
            inner[..close]
                .split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        kept.push(' ');
        rest = &inner[close + 2..];
    }
    kept.push_str(rest);

    (kept, suggestions)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
