//! Scoped storage isolation engine for Stash.
//!
//! Callers stage file writes in a private sandbox, then publish that
//! sandbox into the shared on-disk library, one claim at a time, without two
//! concurrent writers ever touching the same claim and without any resolved
//! path escaping its store.
//!
//! # Architecture
//!
//! - `PathResolver`: boundary-checked path arithmetic under a root
//! - `StoreRegistry`: the named stores of a library and their policies
//! - `ScopeLedger`: which sandbox holds which (store, claim) scope
//! - `IsolationSandbox`: a private mirror directory with a commit/discard lifecycle
//! - `CommitEngine`: backup, apply policy, roll back on failure, per scope
//!
//! On-disk layout under the library root:
//!
//! ```text
//! <root>/
//!   <store>/<claim>(.<ext>)     per-claim-file entries
//!   <store>/<claim>/...         per-claim-directory entries
//!   isolation/<sandbox-id>/...  live sandbox mirrors
//!   tmp/...                     scratch files, never published
//! ```

mod commit;
mod config;
mod error;
mod fsops;
mod ledger;
mod library;
mod registry;
mod resolver;
mod sandbox;

pub use commit::{CommitEngine, CommitReport, DEFAULT_BACKUP_PREFIX, ScopeFailure, SyncOutcome};
pub use config::{DEFAULT_ISOLATION_STORE, DEFAULT_TEMP_STORE, LibraryConfig, StoreDecl};
pub use error::{GrantRefusal, LibraryError, LibraryResult, SandboxState};
pub use ledger::ScopeLedger;
pub use library::{ISOLATION_CLAIM, Library};
pub use registry::{RegisteredStore, StoreRegistry};
pub use resolver::{PathResolver, normalize};
pub use sandbox::IsolationSandbox;

pub use stash_types::{
    AccessScope, ClaimKey, ClaimType, DefinitionError, SandboxId, ScopedEntity, StoreDef,
    StoreKind, StoreLayout, StorePolicy,
};
