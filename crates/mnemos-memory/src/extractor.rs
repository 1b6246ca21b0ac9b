// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-based candidate extraction from a conversation turn.
//!
//! The agent loop calls [`FactExtractor::extract`] after each turn and hands
//! the result to [`MemoryManager::process_interaction`]. Nothing here stores
//! anything.
//!
//! [`MemoryManager::process_interaction`]: crate::MemoryManager::process_interaction

use serde::Deserialize;
use tracing::{debug, warn};

use mnemos_core::{MnemosError, TextGenerator};

use crate::candidate::Candidate;

const EXTRACTION_PROMPT: &str = r#"Extract factual information from this conversation that would be useful to remember for future conversations. Output as JSON array.

For each fact:
- "content": The fact as a standalone statement (e.g., "The user's dog is named Max")
- "category": A short label such as personal, preference, project, decision, instruction
- "importance": A number from 0.0 (trivia) to 1.0 (must remember)

Only include facts that are:
1. Stated by the user (not the assistant)
2. Specific and factual (not opinions unless explicitly stated as preferences)
3. Likely to be relevant in future conversations

If no memorable facts, return an empty array: []

Conversation:
User: {user}
Assistant: {assistant}

Output JSON array only, no explanation:"#;

pub fn build_extraction_prompt(user: &str, assistant: &str) -> String {
    EXTRACTION_PROMPT
        .replace("{user}", user.trim())
        .replace("{assistant}", assistant.trim())
}

/// A model may answer with objects or with bare strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCandidate {
    Full(Candidate),
    Text(String),
}

/// Parse an extraction response into candidates.
///
/// Tolerates markdown fences and prose around the JSON array. Malformed
/// output yields an empty list; extraction must never fail the turn.
pub fn parse_candidates(response: &str) -> Vec<Candidate> {
    let trimmed = response.trim();
    let start = trimmed.find('[').unwrap_or(0);
    let end = trimmed.rfind(']').map_or(trimmed.len(), |i| i + 1);
    let json_str = trimmed.get(start..end).unwrap_or(trimmed);

    match serde_json::from_str::<Vec<RawCandidate>>(json_str) {
        Ok(raw) => raw
            .into_iter()
            .map(|r| match r {
                RawCandidate::Full(c) => c,
                RawCandidate::Text(s) => Candidate::new(s),
            })
            .filter(|c| !c.is_blank())
            .collect(),
        Err(e) => {
            warn!("failed to parse extraction response: {e}");
            debug!("raw response: {response}");
            Vec::new()
        }
    }
}

/// Asks a text generator for candidate facts.
#[derive(Debug, Clone, Default)]
pub struct FactExtractor {
    categories: Vec<String>,
}

impl FactExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the categories suggested to the model.
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn prompt(&self, user: &str, assistant: &str) -> String {
        let mut prompt = build_extraction_prompt(user, assistant);
        if !self.categories.is_empty() {
            prompt.push_str(&format!(
                "\n\nUse only these categories: {}",
                self.categories.join(", ")
            ));
        }
        prompt
    }

    pub async fn extract(
        &self,
        generator: &dyn TextGenerator,
        user: &str,
        assistant: &str,
    ) -> Result<Vec<Candidate>, MnemosError> {
        if user.trim().is_empty() {
            return Ok(Vec::new());
        }
        let response = generator.generate(&self.prompt(user, assistant)).await?;
        let candidates = parse_candidates(&response);
        debug!(candidates = candidates.len(), "facts extracted");
        Ok(candidates)
    }
}
