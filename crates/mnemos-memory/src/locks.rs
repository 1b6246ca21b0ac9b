// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-scope and per-owner serialization for the memory manager.
//!
//! Writers to one (owner, session) scope queue on that scope's lock; other
//! tenants never touch it. Pruning counts records owner-wide, so it also
//! holds the owner's prune lock. Lock order is always scope, then owner.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use mnemos_core::Scope;

#[derive(Debug, Default)]
pub struct ScopeLocks {
    scopes: DashMap<Scope, Arc<RwLock<()>>>,
    owners: DashMap<String, Arc<Mutex<()>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn scope_lock(&self, scope: &Scope) -> Arc<RwLock<()>> {
        if let Some(lock) = self.scopes.get(scope) {
            return lock.clone();
        }
        self.scopes.entry(scope.clone()).or_default().clone()
    }

    /// Exclusive access for writes to `scope`.
    pub async fn write(&self, scope: &Scope) -> OwnedRwLockWriteGuard<()> {
        self.scope_lock(scope).write_owned().await
    }

    /// Shared access for reads of `scope`; waits out an in-flight write.
    pub async fn read(&self, scope: &Scope) -> OwnedRwLockReadGuard<()> {
        self.scope_lock(scope).read_owned().await
    }

    /// Serializes pruning for one owner across all of its scopes.
    pub async fn prune(&self, owner_id: &str) -> OwnedMutexGuard<()> {
        let lock = match self.owners.get(owner_id) {
            Some(lock) => lock.clone(),
            None => self.owners.entry(owner_id.to_string()).or_default().clone(),
        };
        lock.lock_owned().await
    }

    /// Drop lock entries nobody is holding or waiting on.
    pub fn shrink(&self) {
        self.scopes.retain(|_, lock| Arc::strong_count(lock) > 1);
        self.owners.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
