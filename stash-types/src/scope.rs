//! Access scopes: the unit of exclusive editing.

use crate::claim::{ClaimKey, ScopedEntity};
use crate::store::StoreDef;
use crate::Result;
use std::fmt;

/// A (store, claim key) pair a sandbox can hold exclusively.
///
/// Scopes only exist for claim-scoped stores, and the claim's type must
/// match the type the store was declared with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccessScope {
    store: StoreDef,
    claim: ClaimKey,
}

impl AccessScope {
    pub fn new(store: &StoreDef, claim: ClaimKey) -> Result<Self> {
        store.check_claim(&claim)?;
        Ok(Self {
            store: store.clone(),
            claim,
        })
    }

    /// Scope covering `entity`'s claim in `store`.
    pub fn for_entity(store: &StoreDef, entity: &impl ScopedEntity) -> Result<Self> {
        Self::new(store, entity.claim_key()?)
    }

    pub fn store(&self) -> &StoreDef {
        &self.store
    }

    pub fn claim(&self) -> &ClaimKey {
        &self.claim
    }
}

impl fmt::Display for AccessScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.store.name(), self.claim.token())
    }
}
