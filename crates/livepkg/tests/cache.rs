//! Integration tests for the resolution cache
//!
//! Covers provenance bookkeeping and concurrent insertion.

use livepkg::{
    CacheEntry, Framework, LibraryIdentity, Provenance, ResolutionCache, ResolvedLibrary, Version,
};
use std::sync::Arc;
use std::thread;

fn library(name: &str, version: &str) -> Arc<ResolvedLibrary> {
    Arc::new(ResolvedLibrary::new(
        LibraryIdentity::package(name, Version::parse(version).unwrap()),
        Framework::any(),
        Vec::new(),
    ))
}

#[test]
fn test_names_are_case_insensitive() {
    let cache = ResolutionCache::new();
    assert!(cache.try_insert(
        "Newtonsoft.Json",
        CacheEntry::installed_from(library("Newtonsoft.Json", "13.0.1"), "App")
    ));

    assert!(cache.contains("newtonsoft.json"));
    assert!(!cache.try_insert(
        "NEWTONSOFT.JSON",
        CacheEntry::installed_from(library("NEWTONSOFT.JSON", "12.0.0"), "App")
    ));
    assert_eq!(
        cache.lookup("NewtonSoft.Json").unwrap().resolved.version(),
        &Version::new(13, 0, 1)
    );
}

#[test]
fn test_rollback_only_touches_one_package() {
    let cache = ResolutionCache::with_fixed([ResolvedLibrary::assembly(
        "System.Runtime",
        Version::new(6, 0, 0),
    )]);
    cache.try_insert("A", CacheEntry::installed_from(library("A", "1.0.0"), "A"));
    cache.try_insert("B", CacheEntry::installed_from(library("B", "1.0.0"), "A"));
    cache.try_insert("C", CacheEntry::installed_from(library("C", "1.0.0"), "C"));

    let removed = cache.rollback("a");

    assert_eq!(removed.len(), 2);
    assert_eq!(cache.len(), 2);
    assert!(cache.lookup("System.Runtime").is_some_and(|entry| entry.is_fixed()));
    assert_eq!(cache.lookup("C").unwrap().source(), Some("C"));
    assert!(cache.rollback("A").is_empty());
}

#[test]
fn test_fixed_entries_survive_removal() {
    let cache =
        ResolutionCache::with_fixed([ResolvedLibrary::assembly("Foo", Version::new(2, 0, 0))]);

    assert!(cache.remove("Foo").is_none());
    assert!(!cache.rehome("Foo", "Other"));

    // A lower baseline never replaces a higher one
    cache.insert_fixed(ResolvedLibrary::assembly("Foo", Version::new(1, 0, 0)));
    assert_eq!(
        cache.lookup("Foo").unwrap().resolved.version(),
        &Version::new(2, 0, 0)
    );

    cache.insert_fixed(ResolvedLibrary::assembly("Foo", Version::new(3, 0, 0)));
    assert_eq!(
        cache.lookup("Foo").unwrap().resolved.version(),
        &Version::new(3, 0, 0)
    );
}

#[test]
fn test_rehome_changes_source() {
    let cache = ResolutionCache::new();
    cache.try_insert("Shared", CacheEntry::installed_from(library("Shared", "1.0.0"), "First"));

    assert!(cache.is_source_of_any("first"));
    assert!(cache.rehome("Shared", "Second"));

    let entry = cache.lookup("Shared").unwrap();
    assert_eq!(entry.provenance, Provenance::InstalledFrom("Second".to_string()));
    assert!(!cache.is_source_of_any("First"));
    assert_eq!(cache.entries_from("Second").len(), 1);
}

#[test]
fn test_entries_are_sorted() {
    let cache = ResolutionCache::new();
    for name in ["zeta", "Alpha", "mid"] {
        cache.try_insert(name, CacheEntry::installed_from(library(name, "1.0.0"), "Root"));
    }

    let names: Vec<_> = cache
        .entries()
        .iter()
        .map(|entry| entry.resolved.name().to_string())
        .collect();
    assert_eq!(names, vec!["Alpha", "mid", "zeta"]);
}

#[test]
fn test_concurrent_inserts_have_one_winner() {
    let cache = Arc::new(ResolutionCache::new());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cache = cache.clone();
            thread::spawn(move || {
                let version = format!("1.0.{}", i);
                let source = format!("Root{}", i);
                let entry = CacheEntry::installed_from(library("Contested", &version), source);
                cache.try_insert("Contested", entry)
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(cache.len(), 1);
}
