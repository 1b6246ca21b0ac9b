// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retention policy: importance scoring, admission, pruning selection.
//!
//! Everything here is pure and deterministic; no I/O, no clocks.

use std::cmp::Ordering;

use mnemos_config::DomainConfig;
use mnemos_core::types::clamp_unit;
use mnemos_core::{DEFAULT_CATEGORY, MemoryRecord, ScoredMemory};

use crate::candidate::Candidate;

const BASE_SCORE: f64 = 0.3;
const EXPLICIT_BOOST: f64 = 0.3;
const PREFERENCE_BOOST: f64 = 0.2;
const CATEGORY_BOOST: f64 = 0.15;

const EXPLICIT_MARKERS: &[&str] = &["remember", "don't forget", "do not forget", "important"];
const PREFERENCE_MARKERS: &[&str] = &[
    "prefer", "always", "never", "favorite", "favourite", "like", "love", "hate", "dislike",
];

/// Default heuristic retention policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetentionPolicy;

impl RetentionPolicy {
    /// Importance of a candidate in [0, 1].
    ///
    /// An importance supplied with the candidate wins over the heuristic.
    pub fn score(&self, candidate: &Candidate, config: &DomainConfig) -> f64 {
        if let Some(hint) = candidate.importance {
            return clamp_unit(hint);
        }

        let text = candidate.content.to_lowercase();
        let mut score = BASE_SCORE;
        if EXPLICIT_MARKERS.iter().any(|m| text.contains(m)) {
            score += EXPLICIT_BOOST;
        }
        if PREFERENCE_MARKERS.iter().any(|m| text.contains(m)) {
            score += PREFERENCE_BOOST;
        }
        if candidate
            .category
            .as_deref()
            .is_some_and(|c| config.is_listed_category(c))
        {
            score += CATEGORY_BOOST;
        }

        let words = text.split_whitespace().count();
        if words < 3 {
            score -= 0.1;
        } else if words >= 6 {
            score += 0.05;
        }
        clamp_unit(score)
    }

    pub fn should_admit(&self, importance: f64, config: &DomainConfig) -> bool {
        importance >= config.min_importance_threshold()
    }

    /// Category to store for an automatically admitted candidate.
    pub fn category_for(&self, requested: Option<&str>, config: &DomainConfig) -> String {
        match requested.map(str::trim) {
            Some(c) if !c.is_empty() && config.allows_category(c) => c.to_string(),
            _ => DEFAULT_CATEGORY.to_string(),
        }
    }

    /// The records to remove so that exactly `max_memories_per_owner` remain.
    ///
    /// Lowest importance goes first; ties go oldest first, or newest first
    /// when `prioritize_recent` is off. Never selects more than the excess.
    pub fn select_for_pruning<'a>(
        &self,
        records: &'a [MemoryRecord],
        config: &DomainConfig,
    ) -> Vec<&'a MemoryRecord> {
        let excess = records.len().saturating_sub(config.max_memories_per_owner());
        self.pruning_order(records, config)
            .into_iter()
            .take(excess)
            .collect()
    }

    /// Records to fold into one summary: the excess plus one, so that the
    /// summary replaces them and the owner lands exactly on the cap.
    pub fn select_for_consolidation<'a>(
        &self,
        records: &'a [MemoryRecord],
        config: &DomainConfig,
    ) -> Vec<&'a MemoryRecord> {
        let excess = records.len().saturating_sub(config.max_memories_per_owner());
        if excess == 0 {
            return Vec::new();
        }
        self.pruning_order(records, config)
            .into_iter()
            .take(excess + 1)
            .collect()
    }

    /// Every record, in the order pruning removes them.
    pub fn pruning_order<'a>(
        &self,
        records: &'a [MemoryRecord],
        config: &DomainConfig,
    ) -> Vec<&'a MemoryRecord> {
        let mut ordered: Vec<&MemoryRecord> = records.iter().collect();
        let oldest_first = config.prioritize_recent();
        ordered.sort_by(|a, b| {
            a.importance
                .partial_cmp(&b.importance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    let by_age = a.created_at.cmp(&b.created_at);
                    if oldest_first { by_age } else { by_age.reverse() }
                })
                .then_with(|| a.id.cmp(&b.id))
        });
        ordered
    }

    /// Orders retrieval hits by similarity, breaking ties by recency
    /// (newest first when `prioritize_recent`, oldest first otherwise).
    pub fn rank(&self, hits: &mut [ScoredMemory], config: &DomainConfig) {
        let newest_first = config.prioritize_recent();
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    let by_age = a.memory.created_at.cmp(&b.memory.created_at);
                    if newest_first { by_age.reverse() } else { by_age }
                })
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
    }
}
