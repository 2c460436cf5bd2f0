//! Prompt templates for the remote assistant.
//!
//! The three query rewrites (random topic, tweak, refine) are the same
//! operation with different parameters, so they are described by one
//! [`TextTask`] value: a prompt, a fallback, and a sampling temperature.

use crate::assistant::response::QUERY_MARKER;

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

const RANDOM_TOPIC_PROMPT: &str = "\
Suggest one specific, surprising topic someone might enjoy hearing a short \
spoken briefing about: a historical event, a scientific discovery, a place, \
or a curious phenomenon.
Reply with ONLY the search query, at most ten words, no quotes, no explanation.";

const TWEAK_PROMPT: &str = "\
Rewrite the following search query so it is more precise and more likely to \
return focused, authoritative results. Keep the user's intent.
Reply with ONLY the rewritten query, no quotes, no explanation.

Query: ";

const REFINE_PROMPT: &str = "\
A user searched for the query below and heard the summary that follows. \
Write one follow-up search query that digs deeper into the most interesting \
aspect of the summary without repeating what it already covers.
Reply with ONLY the new query, no quotes, no explanation.
";

/// Build the grounded-search prompt for `query`.
///
/// The model is asked to end with a `QUERY_USED:` line naming the search it
/// actually ran; see [`split_query_marker`](crate::assistant::split_query_marker).
pub fn search_prompt(query: &str) -> String {
    format!(
        "Search the web for: {query}\n\n\
         Write a concise, conversational summary of what you find, suitable \
         for being read aloud: plain sentences, no markdown, no lists, no URLs, \
         under 150 words.\n\
         On the very last line write `{QUERY_MARKER} ` followed by the exact \
         search query you used."
    )
}

// ---------------------------------------------------------------------------
// TextTask
// ---------------------------------------------------------------------------

/// A single text-to-text request with a value to use when it fails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextTask<'a> {
    /// Invent a topic to search for.
    RandomTopic { fallback: &'a str },
    /// Make a query more precise.
    Tweak { query: &'a str },
    /// Produce a deeper follow-up to an answered query.
    Refine { original: &'a str, summary: &'a str },
}

impl TextTask<'_> {
    pub fn prompt(&self) -> String {
        match self {
            TextTask::RandomTopic { .. } => RANDOM_TOPIC_PROMPT.to_string(),
            TextTask::Tweak { query } => format!("{TWEAK_PROMPT}{query}"),
            TextTask::Refine { original, summary } => {
                format!("{REFINE_PROMPT}\nQuery: {original}\n\nSummary:\n{summary}")
            }
        }
    }

    /// Value returned when the backend fails or answers with nothing.
    pub fn fallback(&self) -> String {
        match self {
            TextTask::RandomTopic { fallback } => fallback.to_string(),
            TextTask::Tweak { query } => query.to_string(),
            TextTask::Refine { original, .. } => format!("{original} in detail"),
        }
    }

    pub fn temperature(&self) -> f32 {
        match self {
            TextTask::RandomTopic { .. } => 1.0,
            TextTask::Tweak { .. } => 0.4,
            TextTask::Refine { .. } => 0.7,
        }
    }

    /// Short name for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            TextTask::RandomTopic { .. } => "random topic",
            TextTask::Tweak { .. } => "tweak",
            TextTask::Refine { .. } => "refine",
        }
    }
}

/// Strip the wrapping models like to add around a one-line answer.
pub fn clean_single_line(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
