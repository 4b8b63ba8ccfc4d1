//! Integration tests for version parsing and range matching

use livepkg::{SemverError, Version, VersionRange};

#[test]
fn test_version_parsing() {
    let v = Version::parse("1.2.3").unwrap();
    assert_eq!(v.major, 1);
    assert_eq!(v.minor, 2);
    assert_eq!(v.patch, 3);
    assert_eq!(v.revision, 0);
    assert_eq!(v.to_string(), "1.2.3");
}

#[test]
fn test_four_part_version() {
    let v = Version::parse("4.7.2.1").unwrap();
    assert_eq!(v.revision, 1);
    assert_eq!(v.to_string(), "4.7.2.1");
    assert!(v > Version::new(4, 7, 2));
}

#[test]
fn test_short_versions_are_padded() {
    assert_eq!(Version::parse("2").unwrap(), Version::new(2, 0, 0));
    assert_eq!(Version::parse("2.1").unwrap(), Version::new(2, 1, 0));
    assert_eq!(Version::parse("2.1.0.0").unwrap(), Version::new(2, 1, 0));
}

#[test]
fn test_version_with_prerelease() {
    let v = Version::parse("1.2.3-preview.1").unwrap();
    assert_eq!(v.prerelease, Some("preview.1".to_string()));
    assert!(v.is_prerelease());
    assert!(v < Version::new(1, 2, 3));
}

#[test]
fn test_build_metadata_is_ignored_by_comparison() {
    let v = Version::parse("1.2.3+sha.abc").unwrap();
    assert_eq!(v.build, Some("sha.abc".to_string()));
    assert_eq!(v, Version::new(1, 2, 3));
    assert_eq!(v.to_string(), "1.2.3+sha.abc");
}

#[test]
fn test_prerelease_ordering() {
    let alpha = Version::new(1, 0, 0).with_prerelease("alpha");
    let alpha2 = Version::new(1, 0, 0).with_prerelease("alpha.2");
    let alpha10 = Version::new(1, 0, 0).with_prerelease("alpha.10");
    let beta = Version::new(1, 0, 0).with_prerelease("beta");

    assert!(alpha < alpha2);
    assert!(alpha2 < alpha10);
    assert!(alpha10 < beta);
    assert!(beta < Version::new(1, 0, 0));
    assert_eq!(alpha, Version::new(1, 0, 0).with_prerelease("ALPHA"));
}

#[test]
fn test_invalid_versions() {
    assert!(matches!(Version::parse(""), Err(SemverError::InvalidVersion(_))));
    assert!(matches!(Version::parse("1.x"), Err(SemverError::InvalidVersion(_))));
    assert!(matches!(Version::parse("1.2.3.4.5"), Err(SemverError::InvalidVersion(_))));
    assert!(matches!(Version::parse("1.0.0-"), Err(SemverError::InvalidPrerelease(_))));
}

#[test]
fn test_plain_range_is_minimum() {
    let range = VersionRange::parse("1.2.0").unwrap();

    assert!(range.satisfies(&Version::new(1, 2, 0)));
    assert!(range.satisfies(&Version::new(9, 0, 0)));
    assert!(!range.satisfies(&Version::new(1, 1, 9)));
    assert!(range.is_min_inclusive());
    assert_eq!(range.min_version(), Some(&Version::new(1, 2, 0)));
    assert_eq!(range.max_version(), None);
}

#[test]
fn test_exact_range() {
    let range = VersionRange::parse("[2.0.0]").unwrap();

    assert!(range.satisfies(&Version::new(2, 0, 0)));
    assert!(!range.satisfies(&Version::new(2, 0, 1)));
    assert_eq!(range, VersionRange::exact(Version::new(2, 0, 0)));
    assert_eq!(range.to_string(), "[2.0.0]");
}

#[test]
fn test_half_open_range() {
    let range = VersionRange::parse("[1.0, 2.0)").unwrap();

    assert!(range.satisfies(&Version::new(1, 0, 0)));
    assert!(range.satisfies(&Version::new(1, 9, 9)));
    assert!(!range.satisfies(&Version::new(2, 0, 0)));
    assert!(!range.satisfies(&Version::new(0, 9, 0)));
    assert_eq!(range.to_string(), "[1.0.0, 2.0.0)");
}

#[test]
fn test_exclusive_minimum() {
    let range = VersionRange::parse("(1.0.0,)").unwrap();

    assert!(!range.satisfies(&Version::new(1, 0, 0)));
    assert!(range.satisfies(&Version::new(1, 0, 1)));
    assert!(!range.is_min_inclusive());
}

#[test]
fn test_upper_bound_only() {
    let range = VersionRange::parse("(,3.0]").unwrap();

    assert!(range.satisfies(&Version::new(0, 1, 0)));
    assert!(range.satisfies(&Version::new(3, 0, 0)));
    assert!(!range.satisfies(&Version::new(3, 0, 1)));
    assert_eq!(range.min_version(), None);
    assert!(!range.is_min_inclusive());
}

#[test]
fn test_floating_range() {
    let range = VersionRange::parse("1.2.*").unwrap();

    assert!(range.is_floating());
    assert!(range.satisfies(&Version::new(1, 2, 0)));
    assert!(range.satisfies(&Version::new(1, 3, 0)));
    assert!(!range.satisfies(&Version::new(1, 1, 9)));
}

#[test]
fn test_any_range() {
    for text in ["*", "", "  "] {
        let range = VersionRange::parse(text).unwrap();
        assert_eq!(range, VersionRange::any());
        assert!(range.satisfies(&Version::new(0, 0, 1)));
    }
    assert_eq!(VersionRange::any().to_string(), "*");
}

#[test]
fn test_invalid_ranges() {
    for text in ["[1.0", "(1.0)", "[2.0, 1.0]", "(1.0, 1.0)", "[,]", "1.*.3"] {
        assert!(
            matches!(VersionRange::parse(text), Err(SemverError::InvalidRange(_))),
            "{} should be rejected",
            text
        );
    }
}

#[test]
fn test_range_serde_uses_manifest_notation() {
    let range: VersionRange = serde_json::from_str("\"[1.0, 2.0)\"").unwrap();
    assert_eq!(serde_json::to_string(&range).unwrap(), "\"[1.0.0, 2.0.0)\"");

    let version: Version = serde_json::from_str("\"6.0.0-rc.1\"").unwrap();
    assert!(version.is_prerelease());
    assert!(serde_json::from_str::<Version>("\"nope\"").is_err());
}
