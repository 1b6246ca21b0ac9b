// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt building and response cleanup for consolidating pruned memories.

use mnemos_core::{MemoryRecord, Metadata};

/// Category given to consolidated summary records.
pub const SUMMARY_CATEGORY: &str = "summary";

/// Metadata key listing the ids a summary replaced.
pub const SUMMARIZED_FROM_KEY: &str = "summarized_from";

const SUMMARY_PROMPT: &str = r#"Combine the following remembered facts about one user into a single concise statement. Keep every concrete detail (names, dates, preferences). Do not add anything that is not stated.

Facts:
{facts}

Output the combined statement only, no explanation:"#;

pub fn build_summary_prompt(records: &[&MemoryRecord]) -> String {
    let facts: String = records
        .iter()
        .map(|r| format!("- {}\n", r.content))
        .collect();
    SUMMARY_PROMPT.replace("{facts}", facts.trim_end())
}

/// Strip code fences and wrapping quotes from a generator response.
///
/// Returns `None` when nothing usable is left.
pub fn clean_summary(response: &str) -> Option<String> {
    let mut text = response.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop an optional language tag on the opening fence line.
        text = rest.split_once('\n').map_or("", |(_, body)| body);
        text = text.trim_end().strip_suffix("```").unwrap_or(text);
    }
    let text = text.trim();
    let text = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
        .trim();
    (!text.is_empty()).then(|| text.to_string())
}

pub fn summary_metadata(ids: &[String]) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(SUMMARIZED_FROM_KEY.to_string(), serde_json::json!(ids));
    metadata
}
