//! The library facade: one on-disk root, its stores, and its sandboxes.
//!
//! `Library` is a cheap, cloneable handle. Every clone and every sandbox
//! created from it share the same registry and ledger. Reserved stores are
//! per-instance, so independent libraries in one process never interfere.

use crate::commit::CommitEngine;
use crate::config::LibraryConfig;
use crate::error::{LibraryError, LibraryResult};
use crate::fsops;
use crate::ledger::ScopeLedger;
use crate::registry::{RegisteredStore, StoreRegistry};
use crate::resolver::PathResolver;
use crate::sandbox::{IsolationSandbox, temporary_file_name};
use stash_types::{AccessScope, ClaimKey, ClaimType, SandboxId, StoreDef, StorePolicy};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Claim type of the sandbox directories in the isolation store.
pub const ISOLATION_CLAIM: ClaimType = ClaimType::from_static("isolation");

pub(crate) struct LibraryInner {
    pub(crate) resolver: PathResolver,
    pub(crate) registry: StoreRegistry,
    pub(crate) ledger: ScopeLedger,
    pub(crate) engine: CommitEngine,
    pub(crate) isolation_store: StoreDef,
    pub(crate) temp_store: StoreDef,
    closed: AtomicBool,
}

impl LibraryInner {
    pub(crate) fn ensure_open(&self) -> LibraryResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LibraryError::LibraryClosed);
        }
        Ok(())
    }

    /// Clears every claim and removes the isolation store. Runs once.
    fn teardown(&self) -> LibraryResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let dropped = self.ledger.clear();
        let isolation_dir = self.resolver.locate_store(&self.isolation_store)?;
        let removed = fsops::remove_path(&isolation_dir);
        info!(
            root = %self.resolver.root().display(),
            dropped_claims = dropped,
            "Library shut down"
        );
        removed
    }
}

impl Drop for LibraryInner {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(error = %e, "Library teardown failed");
        }
    }
}

#[derive(Clone)]
pub struct Library {
    inner: Arc<LibraryInner>,
}

impl Library {
    /// Opens a library at `root` with default settings.
    pub fn open(root: impl Into<PathBuf>) -> LibraryResult<Self> {
        Self::from_config(LibraryConfig::new(root))
    }

    /// Opens a library described by `config`: creates the root, registers
    /// the reserved stores and the declared stores, and purges stale
    /// sandbox directories if asked to.
    pub fn from_config(config: LibraryConfig) -> LibraryResult<Self> {
        if config.root.as_os_str().is_empty() {
            return Err(LibraryError::Config("library root is not set".to_string()));
        }
        let resolver = PathResolver::new(&config.root)?;
        fs::create_dir_all(resolver.root()).map_err(|e| LibraryError::io(resolver.root(), e))?;

        let engine = CommitEngine::new(config.backup_prefix.as_str())?;
        let isolation_store = StoreDef::per_claim_directory(&config.isolation_store, ISOLATION_CLAIM)?;
        let temp_store = StoreDef::raw(&config.temp_store)?;

        let registry = StoreRegistry::new();
        registry.register(&resolver, isolation_store.clone(), StorePolicy::Private)?;
        registry.register(&resolver, temp_store.clone(), StorePolicy::Discard)?;

        let inner = LibraryInner {
            resolver,
            registry,
            ledger: ScopeLedger::new(),
            engine,
            isolation_store,
            temp_store,
            closed: AtomicBool::new(false),
        };
        if config.purge_stale_isolations {
            purge_stale_isolations(&inner)?;
        }
        for decl in config.stores {
            inner.registry.register(&inner.resolver, decl.def, decl.policy)?;
        }

        info!(root = %inner.resolver.root().display(), "Library opened");
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn root(&self) -> &Path {
        self.inner.resolver.root()
    }

    pub fn is_open(&self) -> bool {
        self.inner.ensure_open().is_ok()
    }

    // ================================================================
    // Stores
    // ================================================================

    /// Registers a store and creates its directory.
    pub fn register_store(&self, def: StoreDef, policy: StorePolicy) -> LibraryResult<()> {
        self.inner.ensure_open()?;
        self.inner.registry.register(&self.inner.resolver, def, policy)
    }

    pub fn has_store(&self, name: &str) -> bool {
        self.inner.registry.has_store(name)
    }

    pub fn policy_of(&self, name: &str) -> LibraryResult<StorePolicy> {
        self.inner.registry.policy_of(name)
    }

    pub fn store(&self, name: &str) -> Option<StoreDef> {
        self.inner.registry.get(name).map(|registered| registered.def)
    }

    /// Every registered store, reserved ones included, sorted by name.
    pub fn stores(&self) -> Vec<RegisteredStore> {
        self.inner.registry.stores()
    }

    pub fn isolation_store(&self) -> &StoreDef {
        &self.inner.isolation_store
    }

    pub fn temp_store(&self) -> &StoreDef {
        &self.inner.temp_store
    }

    pub fn assert_raw_usable(&self, name: &str) -> LibraryResult<StoreDef> {
        self.inner
            .registry
            .assert_raw_usable(name)
            .map(|registered| registered.def)
    }

    pub fn assert_claim_usable(&self, name: &str, claim: &ClaimKey) -> LibraryResult<StoreDef> {
        self.inner
            .registry
            .assert_claim_usable(name, claim)
            .map(|registered| registered.def)
    }

    /// Builds a scope on the registered store named `store`.
    pub fn scope(&self, store: &str, claim: ClaimKey) -> LibraryResult<AccessScope> {
        let def = self.assert_claim_usable(store, &claim)?;
        Ok(AccessScope::new(&def, claim)?)
    }

    // ================================================================
    // Main-library resolution
    // ================================================================

    pub fn resolve_directory(&self, store: &str) -> LibraryResult<PathBuf> {
        let def = self.usable(self.assert_raw_usable(store))?;
        self.inner.resolver.resolve_directory(&def)
    }

    pub fn resolve_claim_directory(&self, store: &str, claim: &ClaimKey) -> LibraryResult<PathBuf> {
        let def = self.usable(self.assert_claim_usable(store, claim))?;
        self.inner.resolver.resolve_claim_directory(&def, claim)
    }

    pub fn resolve_file(&self, store: &str, filename: &str) -> LibraryResult<PathBuf> {
        let def = self.usable(self.assert_raw_usable(store))?;
        self.inner.resolver.resolve_file(&def, filename)
    }

    pub fn resolve_claim_file(&self, store: &str, claim: &ClaimKey) -> LibraryResult<PathBuf> {
        let def = self.usable(self.assert_claim_usable(store, claim))?;
        self.inner.resolver.resolve_claim_file(&def, claim)
    }

    pub fn resolve_claim_entry(
        &self,
        store: &str,
        claim: &ClaimKey,
        filename: &str,
    ) -> LibraryResult<PathBuf> {
        let def = self.usable(self.assert_claim_usable(store, claim))?;
        self.inner.resolver.resolve_claim_entry(&def, claim, filename)
    }

    /// Resolves a fresh, uniquely named file in the main library's scratch
    /// store. `extension` may be empty.
    pub fn request_temporary_file(&self, extension: &str) -> LibraryResult<PathBuf> {
        self.inner.ensure_open()?;
        let filename = temporary_file_name(extension)?;
        self.inner
            .resolver
            .resolve_file(&self.inner.temp_store, &filename)
    }

    // ================================================================
    // Isolation
    // ================================================================

    /// Opens a sandbox holding `scopes`.
    ///
    /// The whole batch is validated and reserved in one step; if any scope
    /// is refused, nothing is reserved and no directory is created.
    pub fn create_isolation(&self, scopes: &[AccessScope]) -> LibraryResult<IsolationSandbox> {
        self.inner.ensure_open()?;
        let id = SandboxId::new();
        let granted = self
            .inner
            .ledger
            .reserve(&self.inner.registry, id, scopes)?;

        let claim = id.claim_key(ISOLATION_CLAIM);
        let sandbox = self
            .inner
            .resolver
            .resolve_claim_directory(&self.inner.isolation_store, &claim)
            .and_then(|root| IsolationSandbox::new(id, Arc::clone(&self.inner), root, granted));
        match sandbox {
            Ok(sandbox) => {
                info!(sandbox = %id, scopes = scopes.len(), root = %sandbox.root().display(), "Isolation created");
                Ok(sandbox)
            }
            Err(e) => {
                self.inner.ledger.release(id);
                Err(e)
            }
        }
    }

    /// The sandbox currently holding `scope`, if any.
    pub fn holder_of(&self, scope: &AccessScope) -> Option<SandboxId> {
        self.inner.ledger.holder_of(scope)
    }

    /// Number of scopes currently claimed across all sandboxes.
    pub fn claimed_scope_count(&self) -> usize {
        self.inner.ledger.len()
    }

    /// Number of sandbox directories currently present on disk.
    pub fn active_isolations(&self) -> LibraryResult<usize> {
        let dir = self.inner.resolver.locate_store(&self.inner.isolation_store)?;
        match fs::read_dir(&dir) {
            Ok(entries) => Ok(entries.filter_map(Result::ok).count()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(LibraryError::io(dir, e)),
        }
    }

    /// Force-clears every claim and deletes the isolation store.
    ///
    /// Live sandboxes become unusable. Idempotent.
    pub fn shutdown(&self) -> LibraryResult<()> {
        self.inner.teardown()
    }

    fn usable(&self, def: LibraryResult<StoreDef>) -> LibraryResult<StoreDef> {
        self.inner.ensure_open()?;
        def
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("root", &self.inner.resolver.root())
            .field("stores", &self.inner.registry.stores().len())
            .field("claims", &self.inner.ledger.len())
            .finish()
    }
}

/// Removes sandbox directories left by an earlier process. The ledger is
/// in-memory, so none of them can hold a live claim.
fn purge_stale_isolations(inner: &LibraryInner) -> LibraryResult<()> {
    let dir = inner.resolver.resolve_directory(&inner.isolation_store)?;
    let entries = fs::read_dir(&dir).map_err(|e| LibraryError::io(&dir, e))?;
    let mut purged = 0usize;
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Failed to list isolation store");
                continue;
            }
        };
        match fsops::remove_path(&path) {
            Ok(()) => purged += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to purge stale isolation"),
        }
    }
    if purged > 0 {
        info!(count = purged, "Purged stale isolations");
    }
    Ok(())
}
