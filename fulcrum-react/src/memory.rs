//! Memory refresh (§4.5 "Memory refresh"): a narrow port onto the
//! out-of-scope memory service (§1), plus the keyword extraction the
//! runtime does before calling it.

use async_trait::async_trait;
use fulcrum_core::ToolResultRecord;

use crate::error::ReactError;

/// External memory service the runtime queries for proactive context.
/// Implemented by a collaborator outside this crate (§1 "memory
/// services").
#[async_trait]
pub trait MemoryService: Send + Sync {
    /// Query for proactive context relevant to `keywords`, scoped to
    /// `user_id`. Returns `None` when nothing relevant was found.
    async fn query(&self, user_id: &str, keywords: &[String]) -> Result<Option<String>, ReactError>;
}

const MAX_RECENT_RESULTS: usize = 5;
const MAX_KEYWORDS: usize = 12;
const MIN_KEYWORD_LEN: usize = 4;

const STOPWORDS: &[&str] = &[
    "this", "that", "with", "from", "have", "were", "been", "about", "their", "which", "would",
    "could", "should", "there", "these", "those", "into",
];

/// Extract a small, de-duplicated keyword set from the most recent
/// tool results, for a memory-service query.
pub fn extract_keywords(tool_results: &[ToolResultRecord]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut keywords = Vec::new();

    for record in tool_results.iter().rev().take(MAX_RECENT_RESULTS) {
        for word in record.output.split(|c: char| !c.is_alphanumeric()) {
            let lower = word.to_ascii_lowercase();
            if lower.len() < MIN_KEYWORD_LEN || STOPWORDS.contains(&lower.as_str()) {
                continue;
            }
            if seen.insert(lower.clone()) {
                keywords.push(lower);
            }
            if keywords.len() >= MAX_KEYWORDS {
                return keywords;
            }
        }
    }
    keywords
}

/// Whether a memory refresh should run this iteration (§4.5).
pub fn should_refresh(
    enabled: bool,
    iteration: u32,
    interval: u32,
    user_id: &Option<String>,
) -> bool {
    enabled && interval > 0 && iteration % interval == 0 && user_id.is_some()
}
