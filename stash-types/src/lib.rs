//! Core type definitions for the Stash library engine.
//!
//! This crate defines the plain values the engine reasons about, with no
//! filesystem access of its own:
//! - Claim keys and the `ScopedEntity` trait collaborators implement
//! - Store definitions (layout, claim type, extension) and sync policies
//! - Access scopes, the unit of exclusive editing
//! - Isolation sandbox identifiers
//!
//! Path arithmetic, locking and commits live in `stash-library`.

mod claim;
mod ids;
mod scope;
mod store;

pub use claim::{ClaimKey, ClaimType, ScopedEntity, is_valid_token};
pub use ids::SandboxId;
pub use scope::AccessScope;
pub use store::{StoreDef, StoreKind, StoreLayout, StorePolicy};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, DefinitionError>;

/// Malformed definitions. Always a caller bug; never retryable as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("invalid claim token '{0}': expected [a-zA-Z0-9_-]+")]
    InvalidToken(String),

    #[error("invalid store name '{0}': expected [a-zA-Z0-9_-]+")]
    InvalidStoreName(String),

    #[error("invalid extension '{0}' for store '{1}': expected [a-zA-Z0-9_-]+")]
    InvalidExtension(String, String),

    #[error("store '{0}' is raw and cannot be scoped by claim")]
    RawStore(String),

    #[error("store '{store}' expects claims of type '{expected}', got '{actual}'")]
    ClaimTypeMismatch {
        store: String,
        expected: String,
        actual: String,
    },

    #[error("invalid sandbox id: {0}")]
    InvalidSandboxId(#[from] uuid::Error),
}
