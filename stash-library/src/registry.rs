//! Catalogue of the stores known to a library.
//!
//! Stores are registered once, never replaced and never removed. Each
//! registration eagerly creates the store's directory under the library
//! root, while holding the write lock, so a failed creation leaves no trace
//! in the catalogue and two racing registrations of one name cannot both win.

use crate::error::{LibraryError, LibraryResult};
use crate::resolver::PathResolver;
use serde::Serialize;
use stash_types::{ClaimKey, StoreDef, StoreKind, StorePolicy};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// A store definition together with the policy it was registered with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredStore {
    pub def: StoreDef,
    pub policy: StorePolicy,
}

#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: RwLock<HashMap<String, RegisteredStore>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `def` under `policy` and creates its directory.
    pub fn register(
        &self,
        resolver: &PathResolver,
        def: StoreDef,
        policy: StorePolicy,
    ) -> LibraryResult<()> {
        def.validate()?;
        if !def.accepts_policy(policy) {
            return Err(LibraryError::IncompatiblePolicy {
                store: def.name().to_string(),
                kind: def.kind(),
                policy,
            });
        }

        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        if stores.contains_key(def.name()) {
            return Err(LibraryError::DuplicateStore(def.name().to_string()));
        }
        let path = resolver.resolve_directory(&def)?;

        info!(
            store = %def.name(),
            kind = %def.kind(),
            policy = %policy,
            path = %path.display(),
            "Store registered"
        );
        stores.insert(def.name().to_string(), RegisteredStore { def, policy });
        Ok(())
    }

    pub fn has_store(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<RegisteredStore> {
        self.read().get(name).cloned()
    }

    pub fn policy_of(&self, name: &str) -> LibraryResult<StorePolicy> {
        self.get(name)
            .map(|registered| registered.policy)
            .ok_or_else(|| LibraryError::UnknownStore(name.to_string()))
    }

    /// Registered stores, sorted by name.
    pub fn stores(&self) -> Vec<RegisteredStore> {
        let mut all: Vec<_> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.def.name().cmp(b.def.name()));
        all
    }

    /// Looks up the registration matching `def` exactly.
    ///
    /// A different definition registered under the same name does not
    /// match.
    pub fn lookup(&self, def: &StoreDef) -> Option<RegisteredStore> {
        self.get(def.name())
            .filter(|registered| registered.def == *def)
    }

    /// Returns the registered raw store named `name`.
    pub fn assert_raw_usable(&self, name: &str) -> LibraryResult<RegisteredStore> {
        let registered = self.require(name)?;
        if registered.def.kind() != StoreKind::Raw {
            return Err(LibraryError::WrongStoreKind {
                store: name.to_string(),
                expected: "raw",
                actual: registered.def.kind(),
            });
        }
        Ok(registered)
    }

    /// Returns the registered claim-scoped store named `name`, after
    /// checking that `claim` has the store's claim type.
    pub fn assert_claim_usable(
        &self,
        name: &str,
        claim: &ClaimKey,
    ) -> LibraryResult<RegisteredStore> {
        let registered = self.require(name)?;
        if !registered.def.is_claim_scoped() {
            return Err(LibraryError::WrongStoreKind {
                store: name.to_string(),
                expected: "claim-scoped",
                actual: registered.def.kind(),
            });
        }
        registered.def.check_claim(claim)?;
        Ok(registered)
    }

    fn require(&self, name: &str) -> LibraryResult<RegisteredStore> {
        self.get(name)
            .ok_or_else(|| LibraryError::UnknownStore(name.to_string()))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, RegisteredStore>> {
        self.stores.read().unwrap_or_else(PoisonError::into_inner)
    }
}
