use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::Generated;

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").expect("fenced block pattern"))
}

/// Locate a JSON object embedded in free text.
///
/// The first fenced code block holding an object wins; otherwise the span
/// from the first `{` to the last `}` is returned.
pub fn extract_json_fragment(text: &str) -> Option<&str> {
    if let Some(inner) = fenced_block()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .find(|s| s.starts_with('{'))
    {
        return Some(inner);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Turn a generation result into `T`.
///
/// Structured output is deserialized directly. Text is parsed as JSON first;
/// if that fails a single extraction pass is attempted before giving up.
pub fn parse_structured<T: DeserializeOwned>(generated: &Generated) -> Result<T, String> {
    match generated {
        Generated::Structured(value) => {
            serde_json::from_value(value.clone()).map_err(|e| format!("structured output did not match: {e}"))
        }
        Generated::Text(text) => {
            let direct = match serde_json::from_str::<T>(text.trim()) {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            let fragment = extract_json_fragment(text)
                .ok_or_else(|| format!("no JSON object found in output: {direct}"))?;
            serde_json::from_str::<T>(fragment).map_err(|e| format!("extracted JSON did not match: {e}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pair {
        value: u8,
        reason: String,
    }

    #[test]
    fn direct_json_parses() {
        let g = Generated::Text(r#"{"value": 7, "reason": "fine"}"#.into());
        let p: Pair = parse_structured(&g).unwrap();
        assert_eq!(p.value, 7);
    }

    #[test]
    fn fenced_block_is_extracted() {
        let text = "Here you go:\n```json\n{\"value\": 9, \"reason\": \"sharp\"}\n```\nThanks";
        assert_eq!(
            extract_json_fragment(text),
            Some("{\"value\": 9, \"reason\": \"sharp\"}")
        );
        let p: Pair = parse_structured(&Generated::Text(text.into())).unwrap();
        assert_eq!(p.reason, "sharp");
    }

    #[test]
    fn non_json_fence_falls_through_to_object() {
        let text = "Here is the post:\n```\nnot json\n```\n{\"value\": 8, \"reason\": \"real\"}";
        assert_eq!(
            extract_json_fragment(text),
            Some("{\"value\": 8, \"reason\": \"real\"}")
        );
        let p: Pair = parse_structured(&Generated::Text(text.into())).unwrap();
        assert_eq!(p, Pair { value: 8, reason: "real".into() });
    }

    #[test]
    fn later_json_fence_is_preferred_over_prose_fence() {
        let text = "```text\nquoted draft\n```\nFinal:\n```json\n{\"value\": 6, \"reason\": \"ok\"}\n```";
        let p: Pair = parse_structured(&Generated::Text(text.into())).unwrap();
        assert_eq!(p.value, 6);
    }

    #[test]
    fn brace_span_is_extracted_from_prose() {
        let text = "Sure! {\"value\": 4, \"reason\": \"flat\"} Hope that helps.";
        let p: Pair = parse_structured(&Generated::Text(text.into())).unwrap();
        assert_eq!(p, Pair { value: 4, reason: "flat".into() });
    }

    #[test]
    fn no_json_is_an_error() {
        let err = parse_structured::<Pair>(&Generated::Text("I cannot do that.".into())).unwrap_err();
        assert!(err.contains("no JSON object"));
        assert_eq!(extract_json_fragment("} backwards {"), None);
    }

    #[test]
    fn mismatched_shape_is_an_error() {
        let err = parse_structured::<Pair>(&Generated::Structured(json!({"value": "high"}))).unwrap_err();
        assert!(err.contains("did not match"));
    }

    #[test]
    fn structured_value_passes_through() {
        let g = Generated::Structured(json!({"value": 10, "reason": "perfect"}));
        let p: Pair = parse_structured(&g).unwrap();
        assert_eq!(p.value, 10);
    }
}
