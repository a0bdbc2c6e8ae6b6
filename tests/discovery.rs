// tests/discovery.rs

mod common;
use crate::common::TestResult;

use std::fs;
use std::path::Path;

use dagsuite::discovery::{default_test_name, SpecFileDiscovery, TestDiscovery, TEST_SPEC_FILE};
use tempfile::TempDir;

fn tree(root: &Path, dirs: &[&str]) {
    for dir in dirs {
        let dir = root.join(dir);
        fs::create_dir_all(&dir).expect("cannot create test dir");
        fs::write(dir.join(TEST_SPEC_FILE), "").expect("cannot write spec");
    }
}

fn discover(root: &Path, sublist: &[&str]) -> anyhow::Result<Vec<String>> {
    let discovery = SpecFileDiscovery {
        base_dir: Some(root.to_path_buf()),
    };
    let sublist: Vec<String> = sublist.iter().map(|s| s.to_string()).collect();
    discovery.discover(root, &sublist)
}

#[test]
fn test_finds_every_spec_file_sorted() -> TestResult {
    let dir = TempDir::new()?;
    tree(dir.path(), &["b", "a/nested", "a", "c/d/e"]);
    fs::write(dir.path().join("b/notes.toml"), "")?;
    fs::create_dir_all(dir.path().join("empty"))?;

    let found = discover(dir.path(), &[])?;
    assert_eq!(
        found,
        vec!["a/nested/test.toml", "a/test.toml", "b/test.toml", "c/d/e/test.toml"]
    );
    Ok(())
}

#[test]
fn test_selectors_are_anchored_prefix_patterns() -> TestResult {
    let dir = TempDir::new()?;
    tree(dir.path(), &["api/get", "api/post", "apix", "core"]);

    assert_eq!(
        discover(dir.path(), &["api"])?,
        vec!["api/get/test.toml", "api/post/test.toml", "apix/test.toml"]
    );
    assert_eq!(
        discover(dir.path(), &["api/"])?,
        vec!["api/get/test.toml", "api/post/test.toml"]
    );
    assert_eq!(discover(dir.path(), &["api/p.*"])?, vec!["api/post/test.toml"]);
    // Not anchored at the end, but anchored at the start.
    assert!(discover(dir.path(), &["ore"])?.is_empty());
    Ok(())
}

#[test]
fn test_selector_union_has_no_duplicates() -> TestResult {
    let dir = TempDir::new()?;
    tree(dir.path(), &["api/get", "core"]);

    let found = discover(dir.path(), &["api", "api/get", "core"])?;
    assert_eq!(found, vec!["api/get/test.toml", "core/test.toml"]);
    Ok(())
}

#[test]
fn test_test_dir_or_parent_selects_everything() -> TestResult {
    let dir = TempDir::new()?;
    let tests = dir.path().join("tests");
    tree(&tests, &["x", "y"]);

    let discovery = SpecFileDiscovery {
        base_dir: Some(dir.path().to_path_buf()),
    };
    for selector in ["tests", "tests/", ".", "..", "tests/x/.."] {
        let found = discovery.discover(&tests, &[selector.to_string()])?;
        assert_eq!(found, vec!["x/test.toml", "y/test.toml"], "selector {selector}");
    }
    // Relative to the base dir, not the test dir.
    let found = discovery.discover(&tests, &["tests/y".to_string()])?;
    assert_eq!(found, vec!["y/test.toml"]);
    Ok(())
}

#[test]
fn test_invalid_regex_falls_back_to_prefix() -> TestResult {
    let dir = TempDir::new()?;
    tree(dir.path(), &["odd(name", "oddity"]);

    assert_eq!(discover(dir.path(), &["odd("])?, vec!["odd(name/test.toml"]);
    Ok(())
}

#[test]
fn test_missing_test_dir_is_an_error() {
    let discovery = SpecFileDiscovery::default();
    let err = discovery
        .discover(Path::new("/definitely/not/a/test/dir"), &[])
        .unwrap_err();
    assert!(format!("{err:#}").contains("scanning test dir"));
}

#[test]
fn test_default_test_name() {
    assert_eq!(default_test_name("a/test.toml"), "a");
    assert_eq!(default_test_name("a/b/c/test.toml"), "a__b__c");
    assert_eq!(default_test_name("a\\b\\test.toml"), "a__b");
    assert_eq!(default_test_name("test.toml"), "");
}
