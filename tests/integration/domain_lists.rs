//! Loading the blacklist and override fixtures from disk

use std::net::Ipv4Addr;
use std::path::PathBuf;

use dns_sinkhole::dns::{Blacklist, OverrideMap};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name)
}

fn fixture_domains() -> Vec<String> {
    std::fs::read_to_string(fixture("test-blacklist.txt"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_fixture_blacklist_has_no_false_negatives() {
    let blacklist = Blacklist::load(fixture("test-blacklist.txt")).unwrap();
    let domains = fixture_domains();

    assert_eq!(blacklist.size(), domains.len());
    assert!(blacklist.is_sorted());
    for domain in &domains {
        assert!(blacklist.contains(domain), "{domain} should be blocked");
        assert!(
            blacklist.contains(&domain.to_uppercase()),
            "{domain} should be blocked in any case"
        );
    }
}

#[test]
fn test_fixture_blacklist_exact_match_only() {
    let blacklist = Blacklist::load(fixture("test-blacklist.txt")).unwrap();

    assert!(!blacklist.contains("example.com"));
    assert!(!blacklist.contains("sub.ads.example.com"));
    assert!(!blacklist.contains("ads.example.co"));
    assert!(!blacklist.contains(""));
}

#[test]
fn test_shipped_blacklist_loads() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/blacklist.txt");
    let blacklist = Blacklist::load(path).unwrap();
    assert!(!blacklist.is_empty());
    assert!(blacklist.is_sorted());
    assert!(blacklist.contains("ad.doubleclick.net"));
}

#[test]
fn test_missing_blacklist_is_error() {
    let err = Blacklist::load(fixture("does-not-exist.txt")).unwrap_err();
    assert!(err.path().ends_with("does-not-exist.txt"));
}

#[test]
fn test_fixture_overrides() {
    let overrides = OverrideMap::load(fixture("test-override.txt")).unwrap();
    assert_eq!(overrides.len(), 2);
    assert_eq!(
        overrides.lookup("router.lan"),
        Some(Ipv4Addr::new(192, 168, 1, 1))
    );
    assert_eq!(
        overrides.lookup("NAS.lan"),
        Some(Ipv4Addr::new(192, 168, 1, 20))
    );
    assert_eq!(overrides.lookup("printer.lan"), None);
}

#[test]
fn test_missing_overrides_is_empty() {
    let overrides = OverrideMap::load(fixture("no-override.txt")).unwrap();
    assert!(overrides.is_empty());
}
