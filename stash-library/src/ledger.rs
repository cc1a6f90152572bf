//! In-memory bookkeeping of which sandbox holds which access scope.
//!
//! The ledger is the only shared mutable state between sandboxes. A single
//! mutex covers validation and reservation of a whole batch, so two
//! sandboxes requesting overlapping scopes at the same time cannot both
//! succeed. Reservation never touches the filesystem.

use crate::error::{GrantRefusal, LibraryError, LibraryResult};
use crate::registry::StoreRegistry;
use stash_types::{AccessScope, SandboxId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

type Claims = HashMap<AccessScope, SandboxId>;

#[derive(Debug, Default)]
pub struct ScopeLedger {
    claims: Mutex<Claims>,
}

impl ScopeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that every scope in `scopes` could be granted to `sandbox`
    /// right now, without reserving anything.
    pub fn check_available(
        &self,
        registry: &StoreRegistry,
        sandbox: SandboxId,
        scopes: &[AccessScope],
    ) -> LibraryResult<()> {
        let claims = self.lock();
        validate(&claims, registry, sandbox, scopes)
    }

    /// Validates the whole batch, then records `sandbox` as holder of every
    /// scope in it. Either all scopes are reserved or none are.
    ///
    /// Returns the scopes that were newly reserved; scopes `sandbox` already
    /// held are accepted and left as they were.
    pub fn reserve(
        &self,
        registry: &StoreRegistry,
        sandbox: SandboxId,
        scopes: &[AccessScope],
    ) -> LibraryResult<Vec<AccessScope>> {
        let mut claims = self.lock();
        validate(&claims, registry, sandbox, scopes)?;

        let mut added = Vec::new();
        for scope in scopes {
            if claims.insert(scope.clone(), sandbox).is_none() {
                debug!(sandbox = %sandbox, scope = %scope, "Scope reserved");
                added.push(scope.clone());
            }
        }
        Ok(added)
    }

    /// Removes every scope held by `sandbox` and returns them.
    pub fn release(&self, sandbox: SandboxId) -> Vec<AccessScope> {
        let mut claims = self.lock();
        let freed: Vec<AccessScope> = claims
            .iter()
            .filter(|(_, holder)| **holder == sandbox)
            .map(|(scope, _)| scope.clone())
            .collect();
        for scope in &freed {
            claims.remove(scope);
        }
        if !freed.is_empty() {
            debug!(sandbox = %sandbox, count = freed.len(), "Scopes released");
        }
        freed
    }

    /// The sandbox currently holding `scope`, if any.
    pub fn holder_of(&self, scope: &AccessScope) -> Option<SandboxId> {
        self.lock().get(scope).copied()
    }

    /// Scopes currently held by `sandbox`.
    pub fn scopes_of(&self, sandbox: SandboxId) -> Vec<AccessScope> {
        let mut scopes: Vec<AccessScope> = self
            .lock()
            .iter()
            .filter(|(_, holder)| **holder == sandbox)
            .map(|(scope, _)| scope.clone())
            .collect();
        scopes.sort();
        scopes
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every claim at once. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut claims = self.lock();
        let count = claims.len();
        claims.clear();
        count
    }

    // Every mutation is a single map operation, so a panic elsewhere while
    // the lock was held cannot leave the map inconsistent.
    fn lock(&self) -> MutexGuard<'_, Claims> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate(
    claims: &Claims,
    registry: &StoreRegistry,
    sandbox: SandboxId,
    scopes: &[AccessScope],
) -> LibraryResult<()> {
    for scope in scopes {
        let refusal = match registry.lookup(scope.store()) {
            None if registry.has_store(scope.store().name()) => {
                Some(GrantRefusal::DefinitionMismatch)
            }
            None => Some(GrantRefusal::UnknownStore),
            Some(registered) if !registered.policy.allows_sandbox() => {
                Some(GrantRefusal::PrivateStore)
            }
            Some(_) => match claims.get(scope) {
                Some(holder) if *holder != sandbox => {
                    Some(GrantRefusal::AlreadyClaimed { holder: *holder })
                }
                _ => None,
            },
        };
        if let Some(reason) = refusal {
            return Err(LibraryError::ScopeGrant {
                scope: scope.clone(),
                reason,
            });
        }
    }
    Ok(())
}
