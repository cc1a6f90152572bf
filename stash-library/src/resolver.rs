//! Path arithmetic for stores and claims under a root directory.
//!
//! Every candidate path is normalized lexically and must stay strictly
//! inside its parent boundary (the root for stores, the store directory for
//! claims and filenames, the claim directory for claim entries). Claim
//! tokens are pre-validated, but filenames are caller-supplied and free-form,
//! so both go through the same check.

use crate::error::{LibraryError, LibraryResult};
use stash_types::{ClaimKey, StoreDef, StoreKind};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Normalizes `path` lexically: drops `.` components and folds `..` into
/// the preceding component. Never touches the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `..` at the root stays at the root.
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(Component::ParentDir),
            },
            other => out.push(other),
        }
    }
    out
}

/// Resolves store and claim locations under a fixed root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Creates a resolver rooted at `root`, made absolute against the
    /// current directory if needed.
    pub fn new(root: impl AsRef<Path>) -> LibraryResult<Self> {
        let root = root.as_ref();
        let absolute = std::path::absolute(root).map_err(|e| LibraryError::io(root, e))?;
        Ok(Self {
            root: normalize(&absolute),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ================================================================
    // Pure location (boundary-checked, no filesystem access)
    // ================================================================

    /// Location of `store`'s directory.
    pub fn locate_store(&self, store: &StoreDef) -> LibraryResult<PathBuf> {
        within(&self.root, Path::new(store.name()))
    }

    /// Location of `claim`'s entry (directory or file) in `store`.
    pub fn locate_claim(&self, store: &StoreDef, claim: &ClaimKey) -> LibraryResult<PathBuf> {
        store.check_claim(claim)?;
        let store_dir = self.locate_store(store)?;
        within(&store_dir, Path::new(&store.entry_name(claim)))
    }

    // ================================================================
    // Resolution (creates directories on demand)
    // ================================================================

    /// Resolves `store`'s directory, creating it if absent.
    pub fn resolve_directory(&self, store: &StoreDef) -> LibraryResult<PathBuf> {
        let path = self.locate_store(store)?;
        ensure_directory(&path)?;
        Ok(path)
    }

    /// Resolves `claim`'s directory in a per-claim-directory store,
    /// creating it if absent.
    pub fn resolve_claim_directory(
        &self,
        store: &StoreDef,
        claim: &ClaimKey,
    ) -> LibraryResult<PathBuf> {
        expect_kind(store, StoreKind::PerClaimDirectory)?;
        let path = self.locate_claim(store, claim)?;
        ensure_directory(&path)?;
        Ok(path)
    }

    /// Resolves `filename` directly under `store`'s directory.
    ///
    /// Subdirectories named in `filename` are created; the file itself is not.
    pub fn resolve_file(&self, store: &StoreDef, filename: &str) -> LibraryResult<PathBuf> {
        let store_dir = self.resolve_directory(store)?;
        let path = within(&store_dir, Path::new(filename))?;
        ensure_file_slot(&path)?;
        Ok(path)
    }

    /// Resolves `claim`'s file in a per-claim-file store.
    pub fn resolve_claim_file(&self, store: &StoreDef, claim: &ClaimKey) -> LibraryResult<PathBuf> {
        expect_kind(store, StoreKind::PerClaimFile)?;
        let path = self.locate_claim(store, claim)?;
        ensure_file_slot(&path)?;
        Ok(path)
    }

    /// Resolves `filename` inside `claim`'s directory of a
    /// per-claim-directory store.
    pub fn resolve_claim_entry(
        &self,
        store: &StoreDef,
        claim: &ClaimKey,
        filename: &str,
    ) -> LibraryResult<PathBuf> {
        let claim_dir = self.resolve_claim_directory(store, claim)?;
        let path = within(&claim_dir, Path::new(filename))?;
        ensure_file_slot(&path)?;
        Ok(path)
    }
}

/// Joins `relative` onto `boundary` and requires the normalized result to
/// be strictly below `boundary`. Names carrying `..` or an absolute prefix
/// are refused even when they would fold back inside.
fn within(boundary: &Path, relative: &Path) -> LibraryResult<PathBuf> {
    let climbs = relative.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    let candidate = normalize(&boundary.join(relative));
    if climbs || candidate == boundary || !candidate.starts_with(boundary) {
        return Err(LibraryError::OutOfBound {
            path: candidate,
            boundary: boundary.to_path_buf(),
        });
    }
    Ok(candidate)
}

fn expect_kind(store: &StoreDef, expected: StoreKind) -> LibraryResult<()> {
    if store.kind() != expected {
        return Err(LibraryError::WrongStoreKind {
            store: store.name().to_string(),
            expected: match expected {
                StoreKind::Raw => "raw",
                StoreKind::PerClaimDirectory => "per-claim-directory",
                StoreKind::PerClaimFile => "per-claim-file",
            },
            actual: store.kind(),
        });
    }
    Ok(())
}

/// Makes sure `path` is a directory, creating it and its parents if absent.
fn ensure_directory(path: &Path) -> LibraryResult<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(LibraryError::access(path, "expected a directory, found a file")),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "Creating directory");
            fs::create_dir_all(path).map_err(|e| LibraryError::io(path, e))
        }
        Err(e) => Err(LibraryError::io(path, e)),
    }
}

/// Makes sure `path` is absent or a regular file, creating its parent.
fn ensure_file_slot(path: &Path) -> LibraryResult<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {
            Err(LibraryError::access(path, "expected a file, found a directory"))
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => match path.parent() {
            Some(parent) => ensure_directory(parent),
            None => Ok(()),
        },
        Err(e) => Err(LibraryError::io(path, e)),
    }
}
