mod common;

use common::{anime, episode, media_library, read, write};
use pretty_assertions::assert_eq;
use stash_library::{GrantRefusal, LibraryError, SandboxState};

// ── Creation ────────────────────────────────────────────────────

#[test]
fn create_isolation_makes_directory_under_isolation_store() {
    let (_dir, library) = media_library();

    let sandbox = library.create_isolation(&[]).unwrap();
    assert_eq!(sandbox.state(), SandboxState::Open);
    assert!(sandbox.root().is_dir());
    assert_eq!(
        sandbox.root(),
        library.root().join("isolation").join(sandbox.id().to_string())
    );
    assert_eq!(library.active_isolations().unwrap(), 1);
}

#[test]
fn sandbox_ids_are_unique() {
    let (_dir, library) = media_library();

    let a = library.create_isolation(&[]).unwrap();
    let b = library.create_isolation(&[]).unwrap();
    assert_ne!(a.id(), b.id());
    assert_ne!(a.root(), b.root());
}

#[test]
fn refused_batch_creates_nothing() {
    let (_dir, library) = media_library();
    let x = library.scope("covers", anime("x")).unwrap();
    let secret = library.scope("secrets", anime("x")).unwrap();

    let err = library.create_isolation(&[x.clone(), secret]).unwrap_err();
    assert!(matches!(
        err,
        LibraryError::ScopeGrant { reason: GrantRefusal::PrivateStore, .. }
    ));
    assert!(err.is_grant_refusal());
    assert_eq!(library.holder_of(&x), None);
    assert_eq!(library.active_isolations().unwrap(), 0);
}

#[test]
fn granted_scopes_are_reported_in_order() {
    let (_dir, library) = media_library();
    let y = library.scope("covers", anime("y")).unwrap();
    let x = library.scope("covers", anime("x")).unwrap();

    let sandbox = library.create_isolation(&[y.clone(), x.clone()]).unwrap();
    assert_eq!(sandbox.granted_scopes(), vec![x.clone(), y.clone()]);
    assert!(sandbox.holds(&x));
    assert!(sandbox.holds(&y));
}

// ── Scope requests ──────────────────────────────────────────────

#[test]
fn request_scope_after_creation() {
    let (_dir, library) = media_library();
    let scope = library.scope("episodes", episode("ep-1")).unwrap();

    let mut sandbox = library.create_isolation(&[]).unwrap();
    sandbox.request_scope(scope.clone()).unwrap();

    assert!(sandbox.holds(&scope));
    assert_eq!(library.holder_of(&scope), Some(sandbox.id()));
}

#[test]
fn request_scope_held_elsewhere_is_refused() {
    let (_dir, library) = media_library();
    let scope = library.scope("covers", anime("x")).unwrap();
    let holder = library.create_isolation(&[scope.clone()]).unwrap();

    let mut other = library.create_isolation(&[]).unwrap();
    let err = other.request_scope(scope.clone()).unwrap_err();

    assert!(err.to_string().contains("already claimed"));
    assert!(!other.holds(&scope));
    assert_eq!(library.holder_of(&scope), Some(holder.id()));
}

#[test]
fn scope_frees_up_after_holder_discards() {
    let (_dir, library) = media_library();
    let scope = library.scope("covers", anime("x")).unwrap();
    let mut first = library.create_isolation(&[scope.clone()]).unwrap();
    first.discard().unwrap();

    let second = library.create_isolation(&[scope.clone()]).unwrap();
    assert_eq!(library.holder_of(&scope), Some(second.id()));
}

// ── Resolution ──────────────────────────────────────────────────

#[test]
fn resolution_is_rooted_at_the_sandbox() {
    let (_dir, library) = media_library();
    let sandbox = library.create_isolation(&[]).unwrap();

    let file = sandbox.resolve_claim_file("covers", &anime("x")).unwrap();
    assert_eq!(file, sandbox.root().join("covers/x.txt"));

    let dir = sandbox.resolve_claim_directory("episodes", &episode("ep-1")).unwrap();
    assert_eq!(dir, sandbox.root().join("episodes/ep-1"));
    assert!(dir.is_dir());

    let entry = sandbox
        .resolve_claim_entry("extras", &anime("x"), "making-of.mkv")
        .unwrap();
    assert_eq!(entry, sandbox.root().join("extras/x/making-of.mkv"));

    let raw = sandbox.resolve_file("downloads", "batch/a.bin").unwrap();
    assert_eq!(raw, sandbox.root().join("downloads/batch/a.bin"));
    assert_eq!(
        sandbox.resolve_directory("downloads").unwrap(),
        sandbox.root().join("downloads")
    );
}

#[test]
fn resolution_does_not_require_a_scope() {
    let (_dir, library) = media_library();
    let sandbox = library.create_isolation(&[]).unwrap();

    let path = sandbox.resolve_claim_file("covers", &anime("unclaimed")).unwrap();
    write(&path, "draft");
    assert_eq!(read(&path), "draft");
    assert!(!library.root().join("covers/unclaimed.txt").exists());
}

#[test]
fn private_store_is_refused_inside_sandbox() {
    let (_dir, library) = media_library();
    let sandbox = library.create_isolation(&[]).unwrap();

    let err = sandbox.resolve_claim_file("secrets", &anime("x")).unwrap_err();
    assert!(matches!(err, LibraryError::PrivateStore(name) if name == "secrets"));
    assert!(matches!(
        sandbox.resolve_claim_directory("isolation", &anime("x")),
        Err(LibraryError::PrivateStore(_)) | Err(LibraryError::Definition(_))
    ));
}

#[test]
fn unknown_store_is_refused_inside_sandbox() {
    let (_dir, library) = media_library();
    let sandbox = library.create_isolation(&[]).unwrap();

    assert!(matches!(
        sandbox.resolve_directory("missing"),
        Err(LibraryError::UnknownStore(_))
    ));
}

#[test]
fn traversal_is_refused_inside_sandbox() {
    let (_dir, library) = media_library();
    let sandbox = library.create_isolation(&[]).unwrap();

    let err = sandbox.resolve_file("downloads", "../../escape").unwrap_err();
    assert!(matches!(err, LibraryError::OutOfBound { .. }));
    assert!(!sandbox.root().join("escape").exists());
}

#[test]
fn temporary_files_are_unique_and_inside_the_sandbox() {
    let (_dir, library) = media_library();
    let sandbox = library.create_isolation(&[]).unwrap();

    let a = sandbox.request_temporary_file("part").unwrap();
    let b = sandbox.request_temporary_file("part").unwrap();
    assert_ne!(a, b);
    assert!(a.starts_with(sandbox.root().join("tmp")));
    assert_eq!(a.extension().and_then(|e| e.to_str()), Some("part"));
    assert!(!a.exists());

    let bare = sandbox.request_temporary_file("").unwrap();
    assert_eq!(bare.extension(), None);

    assert!(matches!(
        sandbox.request_temporary_file("../x"),
        Err(LibraryError::Definition(_))
    ));
}

// ── Lifecycle ───────────────────────────────────────────────────

#[test]
fn discard_removes_directory_and_releases_scopes() {
    let (_dir, library) = media_library();
    let scope = library.scope("covers", anime("x")).unwrap();
    let mut sandbox = library.create_isolation(&[scope.clone()]).unwrap();
    write(&sandbox.resolve_claim_file("covers", &anime("x")).unwrap(), "B");
    write(&library.resolve_claim_file("covers", &anime("x")).unwrap(), "A");

    sandbox.discard().unwrap();

    assert_eq!(sandbox.state(), SandboxState::Discarded);
    assert!(!sandbox.is_committed());
    assert!(!sandbox.root().exists());
    assert_eq!(library.holder_of(&scope), None);
    assert_eq!(read(&library.root().join("covers/x.txt")), "A");
}

#[test]
fn second_discard_is_unavailable() {
    let (_dir, library) = media_library();
    let scope = library.scope("covers", anime("x")).unwrap();
    let mut sandbox = library.create_isolation(&[scope.clone()]).unwrap();
    sandbox.discard().unwrap();

    let other = library.create_isolation(&[scope.clone()]).unwrap();
    let err = sandbox.discard().unwrap_err();

    assert!(matches!(
        err,
        LibraryError::Unavailable { state: SandboxState::Discarded, .. }
    ));
    assert_eq!(library.holder_of(&scope), Some(other.id()));
}

#[test]
fn terminal_sandbox_rejects_everything() {
    let (_dir, library) = media_library();
    let scope = library.scope("covers", anime("x")).unwrap();
    let mut sandbox = library.create_isolation(&[]).unwrap();
    sandbox.commit().unwrap();

    assert!(sandbox.is_committed());
    let unavailable = |result: Result<_, LibraryError>| {
        matches!(
            result,
            Err(LibraryError::Unavailable { state: SandboxState::Committed, .. })
        )
    };
    assert!(unavailable(sandbox.commit().map(|_| ())));
    assert!(unavailable(sandbox.discard()));
    assert!(unavailable(sandbox.request_scope(scope)));
    assert!(unavailable(sandbox.resolve_directory("downloads").map(|_| ())));
    assert!(unavailable(sandbox.request_temporary_file("tmp").map(|_| ())));
}

#[test]
fn close_discards_open_sandbox_and_is_idempotent() {
    let (_dir, library) = media_library();
    let scope = library.scope("covers", anime("x")).unwrap();
    let mut sandbox = library.create_isolation(&[scope.clone()]).unwrap();

    sandbox.close().unwrap();
    assert_eq!(sandbox.state(), SandboxState::Discarded);
    assert_eq!(library.holder_of(&scope), None);

    sandbox.close().unwrap();
    assert_eq!(sandbox.state(), SandboxState::Discarded);
}

#[test]
fn close_after_commit_is_noop() {
    let (_dir, library) = media_library();
    let mut sandbox = library.create_isolation(&[]).unwrap();
    sandbox.commit().unwrap();

    sandbox.close().unwrap();
    assert_eq!(sandbox.state(), SandboxState::Committed);
}

#[test]
fn dropped_sandbox_keeps_its_claims() {
    let (_dir, library) = media_library();
    let scope = library.scope("covers", anime("x")).unwrap();
    let id = library.create_isolation(&[scope.clone()]).unwrap().id();

    assert_eq!(library.holder_of(&scope), Some(id));
    assert_eq!(library.active_isolations().unwrap(), 1);
}

// ── Library shutdown ────────────────────────────────────────────

#[test]
fn shutdown_clears_claims_and_isolation_store() {
    let (_dir, library) = media_library();
    let scope = library.scope("covers", anime("x")).unwrap();
    let mut sandbox = library.create_isolation(&[scope.clone()]).unwrap();
    let root = sandbox.root().to_path_buf();

    library.shutdown().unwrap();

    assert!(!library.is_open());
    assert_eq!(library.claimed_scope_count(), 0);
    assert!(!root.exists());
    assert!(!library.root().join("isolation").exists());
    assert!(matches!(sandbox.commit(), Err(LibraryError::LibraryClosed)));
    assert!(matches!(
        sandbox.resolve_claim_file("covers", &anime("x")),
        Err(LibraryError::LibraryClosed)
    ));
    assert!(matches!(
        library.create_isolation(&[]),
        Err(LibraryError::LibraryClosed)
    ));

    library.shutdown().unwrap();
}

#[test]
fn dropping_last_handle_tears_down() {
    let (_dir, library) = media_library();
    let isolation_dir = library.root().join("isolation");
    let sandbox = library.create_isolation(&[]).unwrap();
    assert!(isolation_dir.is_dir());

    drop(library);
    assert!(isolation_dir.exists());

    drop(sandbox);
    assert!(!isolation_dir.exists());
}
