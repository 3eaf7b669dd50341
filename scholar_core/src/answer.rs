use serde::Serialize;

/// One deduplicated source reference of an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    /// 1-based ordinal used in the inline `[n]` marker
    pub index: usize,
    pub source_id: String,
    pub display_name: String,
}

/// Rendered reply to a question. `text` already contains the citation footer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
}
