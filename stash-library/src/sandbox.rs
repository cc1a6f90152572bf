//! Isolation sandboxes: private, ephemeral mirrors of the library layout.
//!
//! A sandbox lives in its own directory under the reserved isolation store
//! and mirrors the store layout of the main library. Writes inside the
//! sandbox root are unrestricted; only publishing back is scope-gated.
//!
//! State machine:
//! - `Open` → `Committed` on `commit()`
//! - `Open` → `Discarded` on `discard()` / `close()`
//!
//! Both terminal states reject every further operation. Nothing is cleaned
//! up on drop: an abandoned sandbox keeps its claims until the library shuts
//! down.

use crate::commit::CommitReport;
use crate::error::{LibraryError, LibraryResult, SandboxState};
use crate::fsops;
use crate::library::LibraryInner;
use crate::registry::RegisteredStore;
use crate::resolver::PathResolver;
use stash_types::{AccessScope, ClaimKey, SandboxId, StorePolicy, is_valid_token};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct IsolationSandbox {
    id: SandboxId,
    library: Arc<LibraryInner>,
    resolver: PathResolver,
    granted: BTreeSet<AccessScope>,
    state: SandboxState,
}

impl IsolationSandbox {
    pub(crate) fn new(
        id: SandboxId,
        library: Arc<LibraryInner>,
        root: PathBuf,
        granted: impl IntoIterator<Item = AccessScope>,
    ) -> LibraryResult<Self> {
        Ok(Self {
            id,
            library,
            resolver: PathResolver::new(root)?,
            granted: granted.into_iter().collect(),
            state: SandboxState::Open,
        })
    }

    pub fn id(&self) -> SandboxId {
        self.id
    }

    /// Root directory of this sandbox's mirror.
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    pub fn is_committed(&self) -> bool {
        self.state == SandboxState::Committed
    }

    /// Scopes granted to this sandbox, in order.
    pub fn granted_scopes(&self) -> Vec<AccessScope> {
        self.granted.iter().cloned().collect()
    }

    pub fn holds(&self, scope: &AccessScope) -> bool {
        self.granted.contains(scope)
    }

    // ================================================================
    // Scopes
    // ================================================================

    /// Claims additional scopes. All-or-nothing: if any scope is refused,
    /// none of the batch is granted.
    pub fn request_scopes(&mut self, scopes: &[AccessScope]) -> LibraryResult<()> {
        self.ensure_open()?;
        self.library.ensure_open()?;
        self.library
            .ledger
            .reserve(&self.library.registry, self.id, scopes)?;
        self.granted.extend(scopes.iter().cloned());
        Ok(())
    }

    pub fn request_scope(&mut self, scope: AccessScope) -> LibraryResult<()> {
        self.request_scopes(std::slice::from_ref(&scope))
    }

    // ================================================================
    // Resolution (rooted at the sandbox)
    // ================================================================

    /// Resolves a raw store's directory inside the sandbox.
    pub fn resolve_directory(&self, store: &str) -> LibraryResult<PathBuf> {
        let registered = self.usable(self.library.registry.assert_raw_usable(store))?;
        self.resolver.resolve_directory(&registered.def)
    }

    /// Resolves `claim`'s directory inside the sandbox.
    pub fn resolve_claim_directory(&self, store: &str, claim: &ClaimKey) -> LibraryResult<PathBuf> {
        let registered = self.usable(self.library.registry.assert_claim_usable(store, claim))?;
        self.resolver.resolve_claim_directory(&registered.def, claim)
    }

    /// Resolves `filename` in a raw store inside the sandbox.
    pub fn resolve_file(&self, store: &str, filename: &str) -> LibraryResult<PathBuf> {
        let registered = self.usable(self.library.registry.assert_raw_usable(store))?;
        self.resolver.resolve_file(&registered.def, filename)
    }

    /// Resolves `claim`'s file inside the sandbox.
    pub fn resolve_claim_file(&self, store: &str, claim: &ClaimKey) -> LibraryResult<PathBuf> {
        let registered = self.usable(self.library.registry.assert_claim_usable(store, claim))?;
        self.resolver.resolve_claim_file(&registered.def, claim)
    }

    /// Resolves `filename` inside `claim`'s directory inside the sandbox.
    pub fn resolve_claim_entry(
        &self,
        store: &str,
        claim: &ClaimKey,
        filename: &str,
    ) -> LibraryResult<PathBuf> {
        let registered = self.usable(self.library.registry.assert_claim_usable(store, claim))?;
        self.resolver
            .resolve_claim_entry(&registered.def, claim, filename)
    }

    /// Resolves a fresh, uniquely named file in the scratch store inside
    /// the sandbox. `extension` may be empty.
    pub fn request_temporary_file(&self, extension: &str) -> LibraryResult<PathBuf> {
        self.ensure_open()?;
        self.library.ensure_open()?;
        let filename = temporary_file_name(extension)?;
        self.resolver
            .resolve_file(&self.library.temp_store, &filename)
    }

    // ================================================================
    // Lifecycle
    // ================================================================

    /// Publishes every granted scope into the main library.
    ///
    /// Scopes are synced independently: a failing scope does not stop the
    /// others, and scopes already synced stay applied. The sandbox ends up
    /// committed and its claims released either way; failures surface as
    /// `LibraryError::PartialCommit` carrying the full report.
    ///
    /// A missing sandbox directory is an `Access` error; nothing is published
    /// and the sandbox stays open with its claims.
    pub fn commit(&mut self) -> LibraryResult<CommitReport> {
        self.ensure_open()?;
        self.library.ensure_open()?;
        if !self.root().is_dir() {
            warn!(sandbox = %self.id, root = %self.root().display(), "Isolation directory missing, commit refused");
            return Err(LibraryError::access(
                self.root(),
                "isolation directory is missing",
            ));
        }

        let scopes: Vec<(&AccessScope, StorePolicy)> = self
            .granted
            .iter()
            .map(|scope| {
                let policy = self
                    .library
                    .registry
                    .lookup(scope.store())
                    .map_or(StorePolicy::Discard, |registered| registered.policy);
                (scope, policy)
            })
            .collect();
        let report = self
            .library
            .engine
            .sync_all(&self.library.resolver, &self.resolver, scopes);

        self.state = SandboxState::Committed;
        self.library.ledger.release(self.id);
        if let Err(e) = fsops::remove_path(self.root()) {
            warn!(sandbox = %self.id, error = %e, "Failed to remove committed isolation directory");
        }

        info!(
            sandbox = %self.id,
            synced = report.synced.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Isolation committed"
        );
        if report.is_success() {
            Ok(report)
        } else {
            Err(LibraryError::PartialCommit {
                sandbox: self.id,
                report,
            })
        }
    }

    /// Abandons the sandbox without publishing anything.
    ///
    /// Claims are released before the directory is deleted, so they free up
    /// even if deletion fails; the deletion error is still returned.
    pub fn discard(&mut self) -> LibraryResult<()> {
        self.ensure_open()?;
        self.state = SandboxState::Discarded;
        let freed = self.library.ledger.release(self.id);
        info!(sandbox = %self.id, released = freed.len(), "Isolation discarded");
        fsops::remove_path(self.root())
    }

    /// Discards the sandbox if it is still open; no-op otherwise.
    pub fn close(&mut self) -> LibraryResult<()> {
        match self.state {
            SandboxState::Open => self.discard(),
            SandboxState::Committed | SandboxState::Discarded => Ok(()),
        }
    }

    fn ensure_open(&self) -> LibraryResult<()> {
        match self.state {
            SandboxState::Open => Ok(()),
            state => Err(LibraryError::Unavailable {
                sandbox: self.id,
                state,
            }),
        }
    }

    /// Gatekeeper for resolution: the sandbox must be open and the store
    /// must not be private.
    fn usable(&self, registered: LibraryResult<RegisteredStore>) -> LibraryResult<RegisteredStore> {
        self.ensure_open()?;
        self.library.ensure_open()?;
        let registered = registered?;
        if !registered.policy.allows_sandbox() {
            return Err(LibraryError::PrivateStore(registered.def.name().to_string()));
        }
        Ok(registered)
    }
}

impl std::fmt::Debug for IsolationSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolationSandbox")
            .field("id", &self.id)
            .field("root", &self.resolver.root())
            .field("state", &self.state)
            .field("granted", &self.granted.len())
            .finish()
    }
}

/// Random file name for the scratch store.
pub(crate) fn temporary_file_name(extension: &str) -> LibraryResult<String> {
    let stem = Uuid::new_v4().simple().to_string();
    if extension.is_empty() {
        return Ok(stem);
    }
    if !is_valid_token(extension) {
        return Err(stash_types::DefinitionError::InvalidExtension(
            extension.to_string(),
            "temporary file".to_string(),
        )
        .into());
    }
    Ok(format!("{stem}.{extension}"))
}
