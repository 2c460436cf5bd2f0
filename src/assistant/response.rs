//! Parsing of `generateContent` responses.
//!
//! Works on `serde_json::Value` rather than typed structs: the grounding
//! metadata shape varies between model versions, and every field is optional.

use std::collections::HashSet;

use serde_json::Value;

use crate::assistant::types::{SearchResult, SpeechAudio};

/// Marker line the search prompt asks the model to finish with.
pub const QUERY_MARKER: &str = "QUERY_USED:";

/// Split the `QUERY_USED:` line off a search answer.
///
/// Returns `(summary, actual_query)`.  The last line starting with the
/// marker is removed from the summary and its text becomes the actual
/// query.  Without a marker (or with an empty one) the actual query is
/// `requested`.  The summary is trimmed.
///
/// ```
/// use voice_search::assistant::split_query_marker;
///
/// let (summary, used) = split_query_marker(
///     "Paris grew from a Gallic settlement.\nQUERY_USED: Paris history",
///     "paris",
/// );
/// assert_eq!(summary, "Paris grew from a Gallic settlement.");
/// assert_eq!(used, "Paris history");
/// ```
pub fn split_query_marker(text: &str, requested: &str) -> (String, String) {
    let mut marker: Option<(usize, usize, &str)> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if let Some(rest) = line.trim().strip_prefix(QUERY_MARKER) {
            marker = Some((offset, offset + line.len(), rest.trim()));
        }
        offset += line.len();
    }

    match marker {
        Some((start, end, used)) => {
            let mut summary = String::with_capacity(text.len());
            summary.push_str(&text[..start]);
            summary.push_str(&text[end..]);
            let actual = if used.is_empty() { requested } else { used };
            (summary.trim().to_string(), actual.to_string())
        }
        None => (text.trim().to_string(), requested.to_string()),
    }
}

/// Keep the first result for each non-empty uri, preserving order.
pub fn dedup_sources(results: impl IntoIterator<Item = SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| !r.uri.trim().is_empty())
        .filter(|r| seen.insert(r.uri.clone()))
        .collect()
}

/// Concatenated text of the first candidate's parts.
pub fn extract_text(root: &Value) -> Option<String> {
    let parts = first_candidate_parts(root)?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Citations from the candidates' grounding metadata.
///
/// Chunks without a uri are skipped; a missing title falls back to the uri.
pub fn extract_sources(root: &Value) -> Vec<SearchResult> {
    let Some(candidates) = root.get("candidates").and_then(Value::as_array) else {
        return Vec::new();
    };

    let chunks = candidates
        .iter()
        .filter_map(|c| c.get("groundingMetadata"))
        .filter_map(|m| m.get("groundingChunks").and_then(Value::as_array))
        .flatten();

    let results = chunks.filter_map(|chunk| {
        let web = chunk
            .get("web")
            .or_else(|| chunk.get("retrievedContext"))?;
        let uri = web.get("uri").and_then(Value::as_str)?.trim();
        let title = web
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(uri);
        Some(SearchResult::new(title, uri))
    });

    dedup_sources(results)
}

/// First inline audio payload of the first candidate.
pub fn extract_audio(root: &Value) -> Option<SpeechAudio> {
    first_candidate_parts(root)?.iter().find_map(|part| {
        let inline = part.get("inlineData")?;
        let data = inline.get("data").and_then(Value::as_str)?;
        if data.is_empty() {
            return None;
        }
        Some(SpeechAudio {
            data: data.to_string(),
            mime_type: inline
                .get("mimeType")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    })
}

/// `error.message` from an API error body, or the raw body.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|err| err.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn first_candidate_parts(root: &Value) -> Option<&Vec<Value>> {
    root.get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
