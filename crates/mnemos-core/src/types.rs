// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types shared by storage backends and the memory manager.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Category assigned when none (or a disallowed one) is supplied.
pub const DEFAULT_CATEGORY: &str = "uncategorized";

/// Open key-value bag attached to a memory (provenance, source turn id, ...).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// The tenant a memory belongs to.
///
/// Resolved once at the call boundary. Owner-global reads see every record of
/// the owner; session reads see only records written in that session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    OwnerGlobal { owner_id: String },
    Session { owner_id: String, session_id: String },
}

impl Scope {
    pub fn owner(owner_id: impl Into<String>) -> Self {
        Scope::OwnerGlobal {
            owner_id: owner_id.into(),
        }
    }

    pub fn session(owner_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Scope::Session {
            owner_id: owner_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Builds a scope from an optional session, the shape callers usually hold.
    pub fn from_parts(owner_id: impl Into<String>, session_id: Option<String>) -> Self {
        match session_id {
            Some(session_id) => Scope::session(owner_id, session_id),
            None => Scope::owner(owner_id),
        }
    }

    pub fn owner_id(&self) -> &str {
        match self {
            Scope::OwnerGlobal { owner_id } | Scope::Session { owner_id, .. } => owner_id,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Scope::OwnerGlobal { .. } => None,
            Scope::Session { session_id, .. } => Some(session_id),
        }
    }

    /// Returns true if a record with the given owner/session is visible in this scope.
    pub fn contains(&self, owner_id: &str, session_id: Option<&str>) -> bool {
        match self {
            Scope::OwnerGlobal { owner_id: o } => o == owner_id,
            Scope::Session {
                owner_id: o,
                session_id: s,
            } => o == owner_id && session_id == Some(s.as_str()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::OwnerGlobal { owner_id } => write!(f, "{owner_id}/*"),
            Scope::Session {
                owner_id,
                session_id,
            } => write!(f, "{owner_id}/{session_id}"),
        }
    }
}

/// Per-call context supplied by the agent loop.
///
/// Identifiers are trusted as given. The cancellation token is forwarded to
/// remote embedding calls.
#[derive(Debug, Clone)]
pub struct MemoryContext {
    pub scope: Scope,
    pub cancel: CancellationToken,
}

impl MemoryContext {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(scope: Scope, cancel: CancellationToken) -> Self {
        Self { scope, cancel }
    }

    pub fn owner_id(&self) -> &str {
        self.scope.owner_id()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.scope.session_id()
    }
}

/// A single distilled fact stored by the memory system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier, assigned at creation.
    pub id: String,
    pub owner_id: String,
    /// `None` means the record is owner-global.
    pub session_id: Option<String>,
    /// The factual content of this memory.
    pub content: String,
    pub category: String,
    /// Importance in [0.0, 1.0].
    pub importance: f64,
    /// Embedding of `content`; never empty once stored.
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl MemoryRecord {
    /// Creates a record for `scope` with a fresh id and timestamps.
    pub fn new(scope: &Scope, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: scope.owner_id().to_string(),
            session_id: scope.session_id().map(str::to_string),
            content: content.into(),
            category: DEFAULT_CATEGORY.to_string(),
            importance: 0.5,
            embedding,
            created_at: now,
            updated_at: now,
            metadata: Metadata::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Sets importance, clamped to [0, 1].
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = clamp_unit(importance);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The scope this record was written in.
    pub fn scope(&self) -> Scope {
        Scope::from_parts(self.owner_id.clone(), self.session_id.clone())
    }
}

/// A memory paired with its similarity to a query.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: MemoryRecord,
    /// Similarity in [0, 1].
    pub similarity: f64,
}

/// Parameters for a nearest-neighbour search inside one owner's records.
#[derive(Debug, Clone)]
pub struct SimilarityQuery {
    pub owner_id: String,
    pub session_id: Option<String>,
    pub vector: Vec<f32>,
    pub limit: usize,
    pub min_similarity: f64,
    /// Records below this importance are skipped before truncation.
    pub min_importance: Option<f64>,
}

impl SimilarityQuery {
    pub fn new(scope: &Scope, vector: Vec<f32>, limit: usize, min_similarity: f64) -> Self {
        Self {
            owner_id: scope.owner_id().to_string(),
            session_id: scope.session_id().map(str::to_string),
            vector,
            limit,
            min_similarity,
            min_importance: None,
        }
    }

    pub fn with_min_importance(mut self, min_importance: f64) -> Self {
        self.min_importance = Some(min_importance);
        self
    }

    pub fn scope(&self) -> Scope {
        Scope::from_parts(self.owner_id.clone(), self.session_id.clone())
    }
}

/// Result of an atomic batch insert.
///
/// Valid records are committed together; invalid ones are reported by their
/// index in the submitted batch.
#[derive(Debug, Default)]
pub struct BatchInsert {
    pub inserted: Vec<String>,
    pub rejected: Vec<(usize, crate::error::MnemosError)>,
}

/// Clamps a score into [0, 1]. NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
