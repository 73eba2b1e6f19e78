//! Post-LLM output cleanup.
//!
//! Strips model artifacts (thinking blocks, unused tokens) and locates the
//! JSON payload inside prose or code fences.

use std::sync::LazyLock;

use regex::Regex;

/// Strip model-specific artifacts from raw LLM output.
///
/// Handles:
/// 1. `<think>...</think>` reasoning blocks
/// 2. Gemma thinking prefixes (`<unusedN>thought\n`)
/// 3. Stray `<unusedN>` tokens
pub fn sanitize_llm_output(raw: &str) -> String {
    static THINK_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));
    static UNUSED_TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<unused\d+>").expect("valid regex"));

    let mut text = THINK_BLOCK_RE.replace_all(raw, "").to_string();

    if let Some(idx) = text.find("<unused") {
        if let Some(thought_offset) = text[idx..].find("thought\n") {
            text = text[idx + thought_offset + "thought\n".len()..].to_string();
        }
    }

    text = UNUSED_TOKEN_RE.replace_all(&text, "").to_string();
    text.trim().to_string()
}

/// Locate a JSON block in LLM response text.
///
/// Tries a ```json fence, then a bare fence holding JSON, then the outermost
/// `[...]` or `{...}` span, whichever opens first.
pub fn extract_json_block(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') || block.starts_with('[') {
                return Some(block);
            }
        }
    }

    let object = trimmed.find('{');
    let array = trimmed.find('[');
    let array_first = match (array, object) {
        (Some(a), Some(o)) => a < o,
        (Some(_), None) => true,
        _ => false,
    };
    if array_first {
        if let Some(span) = span_between(trimmed, '[', ']') {
            return Some(span);
        }
    }
    span_between(trimmed, '{', '}')
}

/// Outermost `open...close` span, if any.
fn span_between(text: &str, open: char, close: char) -> Option<&str> {
    match (text.find(open), text.rfind(close)) {
        (Some(start), Some(end)) if start < end => Some(&text[start..=end]),
        _ => None,
    }
}
