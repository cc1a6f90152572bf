//! Claim keys: caller-supplied names for one logical resource inside a
//! claim-scoped store.
//!
//! A claim key pairs a short token (`[a-zA-Z0-9_-]+`) with a claim type, a
//! discriminator that ties the key to the stores declared for that type.
//! Collaborators usually do not build keys by hand; they implement
//! [`ScopedEntity`] on their domain types instead.

use crate::{DefinitionError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Returns whether `token` is a non-empty `[a-zA-Z0-9_-]+` token.
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Discriminator naming the family of entities a claim key belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimType(Cow<'static, str>);

impl ClaimType {
    /// Claim type backed by a static string, usable in `const` items.
    #[must_use]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated name of one resource inside a claim-scoped store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClaimKey {
    claim_type: ClaimType,
    token: String,
}

impl ClaimKey {
    /// Builds a claim key, rejecting tokens outside `[a-zA-Z0-9_-]+`.
    pub fn new(claim_type: ClaimType, token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if !is_valid_token(&token) {
            return Err(DefinitionError::InvalidToken(token));
        }
        Ok(Self { claim_type, token })
    }

    /// Builds a claim key from a token already known to be well formed.
    pub(crate) fn trusted(claim_type: ClaimType, token: String) -> Self {
        debug_assert!(is_valid_token(&token));
        Self { claim_type, token }
    }

    pub fn claim_type(&self) -> &ClaimType {
        &self.claim_type
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.claim_type, self.token)
    }
}

/// Implemented by domain types that own a directory or file in a
/// claim-scoped store.
///
/// `scoped_name` must be stable for the lifetime of the entity: it becomes
/// the on-disk name of the entity's claim.
pub trait ScopedEntity {
    /// Claim type shared by every entity of this kind.
    fn claim_type(&self) -> ClaimType;

    /// Stable token naming this entity.
    fn scoped_name(&self) -> String;

    /// Validated claim key for this entity.
    fn claim_key(&self) -> Result<ClaimKey> {
        ClaimKey::new(self.claim_type(), self.scoped_name())
    }
}
