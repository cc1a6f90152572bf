//! Error types for the library engine.

use crate::commit::CommitReport;
use stash_types::{AccessScope, DefinitionError, SandboxId, StoreKind, StorePolicy};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for library operations.
pub type LibraryResult<T> = Result<T, LibraryError>;

/// Why a scope could not be granted to a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantRefusal {
    /// The scope's store is not registered in this library.
    UnknownStore,
    /// A store with this name is registered, but with a different definition.
    DefinitionMismatch,
    /// The scope's store is `Private` and never usable from a sandbox.
    PrivateStore,
    /// Another live sandbox holds the scope.
    AlreadyClaimed { holder: SandboxId },
}

impl fmt::Display for GrantRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownStore => f.write_str("store is not registered"),
            Self::DefinitionMismatch => {
                f.write_str("store is registered with a different definition")
            }
            Self::PrivateStore => f.write_str("store is private"),
            Self::AlreadyClaimed { holder } => write!(f, "already claimed by isolation {holder}"),
        }
    }
}

/// Lifecycle state of an isolation sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Open,
    Committed,
    Discarded,
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Committed => "committed",
            Self::Discarded => "discarded",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in library operations.
#[derive(Debug, Error)]
pub enum LibraryError {
    // ── Registration ────────────────────────────────────────────
    #[error("store '{0}' is already registered")]
    DuplicateStore(String),

    #[error("store '{store}' ({kind}) cannot use policy {policy}")]
    IncompatiblePolicy {
        store: String,
        kind: StoreKind,
        policy: StorePolicy,
    },

    // ── Definition ──────────────────────────────────────────────
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("store '{0}' is not registered")]
    UnknownStore(String),

    #[error("store '{store}' is {actual}, expected {expected}")]
    WrongStoreKind {
        store: String,
        expected: &'static str,
        actual: StoreKind,
    },

    // ── Grant ───────────────────────────────────────────────────
    #[error("cannot grant scope {scope}: {reason}")]
    ScopeGrant {
        scope: AccessScope,
        reason: GrantRefusal,
    },

    // ── Access ──────────────────────────────────────────────────
    #[error("path {path:?} is out of bound of {boundary:?}")]
    OutOfBound { path: PathBuf, boundary: PathBuf },

    #[error("cannot access {path:?}: {reason}")]
    Access { path: PathBuf, reason: String },

    #[error("store '{0}' is private and cannot be used inside an isolation context")]
    PrivateStore(String),

    // ── Unavailable ─────────────────────────────────────────────
    #[error("isolation context {sandbox} is unavailable: already {state}")]
    Unavailable {
        sandbox: SandboxId,
        state: SandboxState,
    },

    #[error("library has been shut down")]
    LibraryClosed,

    // ── Commit ──────────────────────────────────────────────────
    #[error("failed to sync scope {scope}: {source}")]
    ScopeSync {
        scope: AccessScope,
        #[source]
        source: Box<LibraryError>,
    },

    #[error("commit of isolation {sandbox} failed for {}", .report.failed_scope_list())]
    PartialCommit {
        sandbox: SandboxId,
        report: CommitReport,
    },

    // ── Environment ─────────────────────────────────────────────
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl LibraryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn access(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Access {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is a grant refusal the caller may retry later.
    pub fn is_grant_refusal(&self) -> bool {
        matches!(self, Self::ScopeGrant { .. })
    }
}
