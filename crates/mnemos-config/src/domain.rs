// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The validated, immutable domain policy attached to a memory manager.
//!
//! Sharing one `Arc<DomainConfig>` across sessions is safe; swapping policy
//! means attaching a new value, never mutating the old one.

use std::collections::HashSet;

use mnemos_core::{DEFAULT_CATEGORY, MnemosError};

use crate::model::DomainSection;

/// Thresholds, caps and taxonomy governing admission, retrieval and pruning.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainConfig {
    max_memories_per_interaction: usize,
    min_importance_threshold: f64,
    max_memories_per_owner: usize,
    prioritize_recent: bool,
    categories: Vec<String>,
    min_similarity: f64,
    duplicate_similarity: f64,
    summarize_on_prune: bool,
}

impl DomainConfig {
    pub fn builder() -> DomainConfigBuilder {
        DomainConfigBuilder {
            section: DomainSection::default(),
        }
    }

    pub fn max_memories_per_interaction(&self) -> usize {
        self.max_memories_per_interaction
    }

    pub fn min_importance_threshold(&self) -> f64 {
        self.min_importance_threshold
    }

    pub fn max_memories_per_owner(&self) -> usize {
        self.max_memories_per_owner
    }

    pub fn prioritize_recent(&self) -> bool {
        self.prioritize_recent
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn min_similarity(&self) -> f64 {
        self.min_similarity
    }

    pub fn duplicate_similarity(&self) -> f64 {
        self.duplicate_similarity
    }

    pub fn summarize_on_prune(&self) -> bool {
        self.summarize_on_prune
    }

    /// True if `category` may be stored. The default category is always allowed.
    pub fn allows_category(&self, category: &str) -> bool {
        self.categories.is_empty()
            || category == DEFAULT_CATEGORY
            || self.categories.iter().any(|c| c == category)
    }

    /// True if `category` is explicitly part of the configured taxonomy.
    pub fn is_listed_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }
}

impl Default for DomainConfig {
    fn default() -> Self {
        let s = DomainSection::default();
        Self {
            max_memories_per_interaction: s.max_memories_per_interaction,
            min_importance_threshold: s.min_importance_threshold,
            max_memories_per_owner: s.max_memories_per_owner,
            prioritize_recent: s.prioritize_recent,
            categories: s.categories,
            min_similarity: s.min_similarity,
            duplicate_similarity: s.duplicate_similarity,
            summarize_on_prune: s.summarize_on_prune,
        }
    }
}

impl TryFrom<DomainSection> for DomainConfig {
    type Error = MnemosError;

    fn try_from(section: DomainSection) -> Result<Self, Self::Error> {
        let violations = domain_violations(&section);
        if !violations.is_empty() {
            return Err(MnemosError::Config(violations.join("; ")));
        }
        Ok(Self {
            max_memories_per_interaction: section.max_memories_per_interaction,
            min_importance_threshold: section.min_importance_threshold,
            max_memories_per_owner: section.max_memories_per_owner,
            prioritize_recent: section.prioritize_recent,
            categories: section.categories,
            min_similarity: section.min_similarity,
            duplicate_similarity: section.duplicate_similarity,
            summarize_on_prune: section.summarize_on_prune,
        })
    }
}

/// Builder over [`DomainSection`] that validates on [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct DomainConfigBuilder {
    section: DomainSection,
}

impl DomainConfigBuilder {
    pub fn max_memories_per_interaction(mut self, value: usize) -> Self {
        self.section.max_memories_per_interaction = value;
        self
    }

    pub fn min_importance_threshold(mut self, value: f64) -> Self {
        self.section.min_importance_threshold = value;
        self
    }

    pub fn max_memories_per_owner(mut self, value: usize) -> Self {
        self.section.max_memories_per_owner = value;
        self
    }

    pub fn prioritize_recent(mut self, value: bool) -> Self {
        self.section.prioritize_recent = value;
        self
    }

    pub fn categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.section.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn min_similarity(mut self, value: f64) -> Self {
        self.section.min_similarity = value;
        self
    }

    pub fn duplicate_similarity(mut self, value: f64) -> Self {
        self.section.duplicate_similarity = value;
        self
    }

    pub fn summarize_on_prune(mut self, value: bool) -> Self {
        self.section.summarize_on_prune = value;
        self
    }

    /// Fails with `MnemosError::Config` listing every violated constraint.
    pub fn build(self) -> Result<DomainConfig, MnemosError> {
        DomainConfig::try_from(self.section)
    }
}

/// Collect every constraint the section violates. Empty means valid.
pub fn domain_violations(section: &DomainSection) -> Vec<String> {
    let mut errors = Vec::new();

    let unit_fields = [
        ("min_importance_threshold", section.min_importance_threshold),
        ("min_similarity", section.min_similarity),
        ("duplicate_similarity", section.duplicate_similarity),
    ];
    for (name, value) in unit_fields {
        if !(0.0..=1.0).contains(&value) {
            errors.push(format!("domain.{name} must be within [0.0, 1.0], got {value}"));
        }
    }

    if section.max_memories_per_interaction < 1 {
        errors.push("domain.max_memories_per_interaction must be at least 1".to_string());
    }

    if section.max_memories_per_owner < 1 {
        errors.push("domain.max_memories_per_owner must be at least 1".to_string());
    }

    if section.max_memories_per_interaction > section.max_memories_per_owner {
        errors.push(format!(
            "domain.max_memories_per_interaction ({}) must not exceed domain.max_memories_per_owner ({})",
            section.max_memories_per_interaction, section.max_memories_per_owner
        ));
    }

    let mut seen = HashSet::new();
    for (i, category) in section.categories.iter().enumerate() {
        if category.trim().is_empty() {
            errors.push(format!("domain.categories[{i}] must not be empty"));
        } else if !seen.insert(category.as_str()) {
            errors.push(format!("duplicate category `{category}` in domain.categories"));
        }
    }

    errors
}
