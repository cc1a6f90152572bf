mod common;

use common::{ANIME, anime, media_library};
use stash_library::{
    AccessScope, GrantRefusal, LibraryError, PathResolver, SandboxId, ScopeLedger, StoreDef,
    StorePolicy, StoreRegistry,
};

fn fixture() -> (tempfile::TempDir, StoreRegistry, StoreDef, StoreDef) {
    let dir = tempfile::tempdir().unwrap();
    let resolver = PathResolver::new(dir.path()).unwrap();
    let registry = StoreRegistry::new();
    let covers = StoreDef::per_claim_file("covers", ANIME, Some("txt")).unwrap();
    let secrets = StoreDef::per_claim_file("secrets", ANIME, Some("key")).unwrap();
    registry
        .register(&resolver, covers.clone(), StorePolicy::Overwrite)
        .unwrap();
    registry
        .register(&resolver, secrets.clone(), StorePolicy::Private)
        .unwrap();
    (dir, registry, covers, secrets)
}

fn refusal(err: LibraryError) -> GrantRefusal {
    match err {
        LibraryError::ScopeGrant { reason, .. } => reason,
        other => panic!("expected a grant refusal, got {other:?}"),
    }
}

// ── Availability ────────────────────────────────────────────────

#[test]
fn check_available_does_not_reserve() {
    let (_dir, registry, covers, _) = fixture();
    let ledger = ScopeLedger::new();
    let scope = AccessScope::new(&covers, anime("x")).unwrap();

    ledger
        .check_available(&registry, SandboxId::new(), &[scope.clone()])
        .unwrap();
    assert!(ledger.is_empty());
    assert_eq!(ledger.holder_of(&scope), None);
}

#[test]
fn private_store_is_refused() {
    let (_dir, registry, _, secrets) = fixture();
    let ledger = ScopeLedger::new();
    let scope = AccessScope::new(&secrets, anime("x")).unwrap();

    let err = ledger
        .reserve(&registry, SandboxId::new(), &[scope])
        .unwrap_err();
    assert_eq!(refusal(err), GrantRefusal::PrivateStore);
}

#[test]
fn unregistered_store_is_refused() {
    let (_dir, registry, _, _) = fixture();
    let ledger = ScopeLedger::new();
    let posters = StoreDef::per_claim_file("posters", ANIME, Some("txt")).unwrap();
    let scope = AccessScope::new(&posters, anime("x")).unwrap();

    let err = ledger
        .check_available(&registry, SandboxId::new(), &[scope])
        .unwrap_err();
    assert_eq!(refusal(err), GrantRefusal::UnknownStore);
}

#[test]
fn mismatched_definition_is_refused() {
    let (_dir, registry, _, _) = fixture();
    let ledger = ScopeLedger::new();
    let impostor = StoreDef::per_claim_file("covers", ANIME, Some("png")).unwrap();
    let scope = AccessScope::new(&impostor, anime("x")).unwrap();

    let err = ledger
        .check_available(&registry, SandboxId::new(), &[scope])
        .unwrap_err();
    assert!(err.to_string().contains("different definition"), "{err}");
    assert_eq!(refusal(err), GrantRefusal::DefinitionMismatch);
}

// ── Reservation ─────────────────────────────────────────────────

#[test]
fn held_scope_is_refused_to_others() {
    let (_dir, registry, covers, _) = fixture();
    let ledger = ScopeLedger::new();
    let scope = AccessScope::new(&covers, anime("x")).unwrap();
    let first = SandboxId::new();
    let second = SandboxId::new();

    ledger.reserve(&registry, first, &[scope.clone()]).unwrap();
    let err = ledger
        .reserve(&registry, second, &[scope.clone()])
        .unwrap_err();

    assert!(err.to_string().contains("already claimed"));
    assert_eq!(refusal(err), GrantRefusal::AlreadyClaimed { holder: first });
    assert_eq!(ledger.holder_of(&scope), Some(first));
}

#[test]
fn reserving_again_for_same_holder_is_accepted() {
    let (_dir, registry, covers, _) = fixture();
    let ledger = ScopeLedger::new();
    let scope = AccessScope::new(&covers, anime("x")).unwrap();
    let id = SandboxId::new();

    assert_eq!(ledger.reserve(&registry, id, &[scope.clone()]).unwrap().len(), 1);
    assert!(ledger.reserve(&registry, id, &[scope]).unwrap().is_empty());
    assert_eq!(ledger.len(), 1);
}

#[test]
fn batch_is_all_or_nothing() {
    let (_dir, registry, covers, _) = fixture();
    let ledger = ScopeLedger::new();
    let x = AccessScope::new(&covers, anime("x")).unwrap();
    let y = AccessScope::new(&covers, anime("y")).unwrap();
    let holder = SandboxId::new();
    ledger.reserve(&registry, holder, &[y.clone()]).unwrap();

    let other = SandboxId::new();
    assert!(ledger.reserve(&registry, other, &[x.clone(), y]).is_err());
    assert_eq!(ledger.holder_of(&x), None);
    assert!(ledger.scopes_of(other).is_empty());
    assert_eq!(ledger.len(), 1);
}

// ── Release ─────────────────────────────────────────────────────

#[test]
fn release_frees_every_scope_of_a_sandbox() {
    let (_dir, registry, covers, _) = fixture();
    let ledger = ScopeLedger::new();
    let x = AccessScope::new(&covers, anime("x")).unwrap();
    let y = AccessScope::new(&covers, anime("y")).unwrap();
    let keeper = SandboxId::new();
    let leaver = SandboxId::new();
    ledger.reserve(&registry, keeper, &[x.clone()]).unwrap();
    ledger.reserve(&registry, leaver, &[y.clone()]).unwrap();

    let freed = ledger.release(leaver);
    assert_eq!(freed, vec![y.clone()]);
    assert_eq!(ledger.scopes_of(keeper), vec![x]);
    assert_eq!(ledger.holder_of(&y), None);

    ledger.reserve(&registry, keeper, &[y]).unwrap();
    assert_eq!(ledger.len(), 2);
}

#[test]
fn release_is_idempotent() {
    let (_dir, registry, covers, _) = fixture();
    let ledger = ScopeLedger::new();
    let id = SandboxId::new();
    ledger
        .reserve(&registry, id, &[AccessScope::new(&covers, anime("x")).unwrap()])
        .unwrap();

    assert_eq!(ledger.release(id).len(), 1);
    assert!(ledger.release(id).is_empty());
    assert!(ledger.release(SandboxId::new()).is_empty());
    assert!(ledger.is_empty());
}

#[test]
fn clear_drops_everything() {
    let (_dir, registry, covers, _) = fixture();
    let ledger = ScopeLedger::new();
    for token in ["a", "b", "c"] {
        ledger
            .reserve(
                &registry,
                SandboxId::new(),
                &[AccessScope::new(&covers, anime(token)).unwrap()],
            )
            .unwrap();
    }

    assert_eq!(ledger.clear(), 3);
    assert!(ledger.is_empty());
}

// ── Through the library ─────────────────────────────────────────

#[test]
fn library_tracks_holders() {
    let (_dir, library) = media_library();
    let scope = library.scope("covers", anime("x")).unwrap();

    let mut sandbox = library.create_isolation(&[scope.clone()]).unwrap();
    assert_eq!(library.holder_of(&scope), Some(sandbox.id()));
    assert_eq!(library.claimed_scope_count(), 1);

    sandbox.discard().unwrap();
    assert_eq!(library.holder_of(&scope), None);
    assert_eq!(library.claimed_scope_count(), 0);
}
