//! Values produced by the remote assistant.

/// One citation backing a summary.  Two results are the same source when
/// their `uri`s match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub uri: String,
}

impl SearchResult {
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uri: uri.into(),
        }
    }
}

/// Outcome of one grounded search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResponse {
    /// Spoken-style summary of the findings.
    pub summary: String,
    /// Citations, unique by uri, in the order the backend reported them.
    pub sources: Vec<SearchResult>,
    /// The query the backend says it actually searched for.
    pub actual_query: String,
}

/// Base64 speech audio plus the MIME type the backend attached to it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechAudio {
    pub data: String,
    pub mime_type: Option<String>,
}
