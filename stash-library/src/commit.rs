//! Publishing sandbox content into the main library, one scope at a time.
//!
//! Each scope sync takes a hidden backup of the claim's current main-library
//! entry before touching it, applies the store policy, and on failure puts
//! the backup back. A failed sync therefore never leaves the claim worse
//! than it was; commits are not atomic across scopes.

use crate::error::{LibraryError, LibraryResult};
use crate::fsops;
use crate::resolver::PathResolver;
use stash_types::{AccessScope, StoreKind, StorePolicy};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default prefix of the hidden backup sibling of a claim entry.
pub const DEFAULT_BACKUP_PREFIX: &str = ".backup-";

/// What a single scope sync did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Content was published according to the store policy.
    Synced,
    /// Nothing to publish: `Discard` policy or raw store.
    Skipped,
}

/// A scope whose sync failed, with the cause.
#[derive(Debug)]
pub struct ScopeFailure {
    pub scope: AccessScope,
    pub error: LibraryError,
}

/// Per-scope outcome of a sandbox commit.
#[derive(Debug, Default)]
pub struct CommitReport {
    pub synced: Vec<AccessScope>,
    pub skipped: Vec<AccessScope>,
    pub failed: Vec<ScopeFailure>,
}

impl CommitReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Failing scopes, comma separated.
    pub fn failed_scope_list(&self) -> String {
        self.failed
            .iter()
            .map(|failure| failure.scope.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn record(&mut self, scope: &AccessScope, result: LibraryResult<SyncOutcome>) {
        match result {
            Ok(SyncOutcome::Synced) => self.synced.push(scope.clone()),
            Ok(SyncOutcome::Skipped) => self.skipped.push(scope.clone()),
            Err(error) => self.failed.push(ScopeFailure {
                scope: scope.clone(),
                error,
            }),
        }
    }
}

/// Moves sandbox content into the main library according to store policy.
#[derive(Debug, Clone)]
pub struct CommitEngine {
    backup_prefix: String,
}

impl Default for CommitEngine {
    fn default() -> Self {
        Self {
            backup_prefix: DEFAULT_BACKUP_PREFIX.to_string(),
        }
    }
}

impl CommitEngine {
    /// Creates an engine using `backup_prefix` for backup siblings.
    ///
    /// The prefix must start with `.` (claim entries never do) and contain
    /// no path separators.
    pub fn new(backup_prefix: impl Into<String>) -> LibraryResult<Self> {
        let backup_prefix = backup_prefix.into();
        let well_formed = backup_prefix.len() > 1
            && backup_prefix.starts_with('.')
            && backup_prefix != ".."
            && !backup_prefix.contains(['/', '\\']);
        if !well_formed {
            return Err(LibraryError::Config(format!(
                "invalid backup prefix '{backup_prefix}': must start with '.' and contain no separators"
            )));
        }
        Ok(Self { backup_prefix })
    }

    pub fn backup_prefix(&self) -> &str {
        &self.backup_prefix
    }

    /// Syncs every scope independently. A failing scope is recorded and does
    /// not stop the others.
    pub fn sync_all<'a>(
        &self,
        main: &PathResolver,
        sandbox: &PathResolver,
        scopes: impl IntoIterator<Item = (&'a AccessScope, StorePolicy)>,
    ) -> CommitReport {
        let mut report = CommitReport::default();
        for (scope, policy) in scopes {
            let result = self.sync_scope(main, sandbox, scope, policy);
            if let Err(e) = &result {
                warn!(scope = %scope, error = %e, "Scope sync failed");
            }
            report.record(scope, result);
        }
        report
    }

    /// Publishes one scope from `sandbox` into `main`.
    pub fn sync_scope(
        &self,
        main: &PathResolver,
        sandbox: &PathResolver,
        scope: &AccessScope,
        policy: StorePolicy,
    ) -> LibraryResult<SyncOutcome> {
        let store = scope.store();
        if !policy.syncs_back() || store.kind() == StoreKind::Raw {
            debug!(scope = %scope, policy = %policy, "Scope skipped");
            return Ok(SyncOutcome::Skipped);
        }

        self.sync_claim(main, sandbox, scope, policy)
            .map(|()| {
                debug!(scope = %scope, policy = %policy, "Scope synced");
                SyncOutcome::Synced
            })
            .map_err(|e| LibraryError::ScopeSync {
                scope: scope.clone(),
                source: Box::new(e),
            })
    }

    fn sync_claim(
        &self,
        main: &PathResolver,
        sandbox: &PathResolver,
        scope: &AccessScope,
        policy: StorePolicy,
    ) -> LibraryResult<()> {
        let store = scope.store();
        let claim = scope.claim();
        let kind = store.kind();

        let (main_path, sandbox_path) = match kind {
            StoreKind::PerClaimDirectory => {
                let main_path = main.locate_claim(store, claim)?;
                if fsops::exists(&main_path)? && !main_path.is_dir() {
                    return Err(LibraryError::access(
                        &main_path,
                        "expected a directory, found a file",
                    ));
                }
                (main_path, sandbox.resolve_claim_directory(store, claim)?)
            }
            _ => (
                main.resolve_claim_file(store, claim)?,
                sandbox.resolve_claim_file(store, claim)?,
            ),
        };
        let backup_path = self.backup_path(&main_path)?;

        // Leftover from an interrupted attempt.
        fsops::remove_path(&backup_path)?;

        let has_backup = fsops::exists(&main_path)?;
        if has_backup {
            fsops::copy_tree(&main_path, &backup_path)?;
        }

        match apply(kind, policy, &sandbox_path, &main_path) {
            Ok(()) => {
                if has_backup {
                    if let Err(e) = fsops::remove_path(&backup_path) {
                        warn!(path = %backup_path.display(), error = %e, "Failed to remove commit backup");
                    }
                }
                Ok(())
            }
            Err(e) => {
                rollback(&main_path, has_backup.then_some(backup_path.as_path()));
                Err(e)
            }
        }
    }

    fn backup_path(&self, main_path: &Path) -> LibraryResult<PathBuf> {
        match (main_path.parent(), main_path.file_name()) {
            (Some(parent), Some(name)) => {
                let mut backup_name = std::ffi::OsString::from(&self.backup_prefix);
                backup_name.push(name);
                Ok(parent.join(backup_name))
            }
            _ => Err(LibraryError::access(main_path, "claim entry has no parent")),
        }
    }
}

fn apply(kind: StoreKind, policy: StorePolicy, sandbox_path: &Path, main_path: &Path) -> LibraryResult<()> {
    match (kind, policy) {
        (StoreKind::PerClaimDirectory, StorePolicy::FullSwap) => {
            fsops::remove_path(main_path)?;
            fsops::copy_tree(sandbox_path, main_path)
        }
        (StoreKind::PerClaimDirectory, _) => fsops::copy_tree(sandbox_path, main_path),
        (_, StorePolicy::FullSwap) => {
            fsops::remove_path(main_path)?;
            if fsops::is_regular_file(sandbox_path)? {
                fsops::copy_file(sandbox_path, main_path)?;
            }
            Ok(())
        }
        _ => {
            // A claim the sandbox never wrote leaves the main entry as-is.
            if fsops::is_regular_file(sandbox_path)? {
                fsops::copy_file(sandbox_path, main_path)?;
            }
            Ok(())
        }
    }
}

/// Drops whatever partial state reached `main_path` and restores the backup.
fn rollback(main_path: &Path, backup_path: Option<&Path>) {
    if let Err(e) = fsops::remove_path(main_path) {
        warn!(path = %main_path.display(), error = %e, "Failed to clear partial commit");
    }
    let Some(backup_path) = backup_path else {
        warn!(path = %main_path.display(), "Commit rolled back, no prior content to restore");
        return;
    };
    let restored = fs::rename(backup_path, main_path)
        .map_err(|e| LibraryError::io(backup_path, e))
        .or_else(|_| fsops::copy_tree(backup_path, main_path));
    match restored {
        Ok(()) => warn!(path = %main_path.display(), "Commit rolled back from backup"),
        Err(e) => warn!(
            path = %main_path.display(),
            backup = %backup_path.display(),
            error = %e,
            "Failed to restore commit backup"
        ),
    }
}
