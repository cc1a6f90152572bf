//! Shared fixtures for library tests.

#![allow(dead_code)]

use stash_library::{ClaimKey, ClaimType, Library, StoreDef, StorePolicy};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub const ANIME: ClaimType = ClaimType::from_static("anime");
pub const EPISODE: ClaimType = ClaimType::from_static("episode");

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fresh library rooted in a temporary directory.
pub fn open_library() -> (TempDir, Library) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let library = Library::open(dir.path().join("library")).unwrap();
    (dir, library)
}

/// A library with the usual media stores registered:
/// - `covers`: per-claim file (`.txt`), overwrite
/// - `posters`: per-claim file (`.txt`), full swap
/// - `episodes`: per-claim directory, full swap
/// - `extras`: per-claim directory, overwrite
/// - `previews`: per-claim directory, discard
/// - `secrets`: per-claim file, private
/// - `downloads`: raw, overwrite
pub fn media_library() -> (TempDir, Library) {
    let (dir, library) = open_library();
    let stores = [
        (
            StoreDef::per_claim_file("covers", ANIME, Some("txt")).unwrap().sandbox_editable(),
            StorePolicy::Overwrite,
        ),
        (
            StoreDef::per_claim_file("posters", ANIME, Some("txt")).unwrap().sandbox_editable(),
            StorePolicy::FullSwap,
        ),
        (
            StoreDef::per_claim_directory("episodes", EPISODE).unwrap().sandbox_editable(),
            StorePolicy::FullSwap,
        ),
        (
            StoreDef::per_claim_directory("extras", ANIME).unwrap().sandbox_editable(),
            StorePolicy::Overwrite,
        ),
        (
            StoreDef::per_claim_directory("previews", ANIME).unwrap(),
            StorePolicy::Discard,
        ),
        (
            StoreDef::per_claim_file("secrets", ANIME, Some("key")).unwrap(),
            StorePolicy::Private,
        ),
        (StoreDef::raw("downloads").unwrap(), StorePolicy::Overwrite),
    ];
    for (def, policy) in stores {
        library.register_store(def, policy).unwrap();
    }
    (dir, library)
}

pub fn anime(token: &str) -> ClaimKey {
    ClaimKey::new(ANIME, token).unwrap()
}

pub fn episode(token: &str) -> ClaimKey {
    ClaimKey::new(EPISODE, token).unwrap()
}

pub fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

/// Sorted names of the entries directly under `dir`.
pub fn list(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
