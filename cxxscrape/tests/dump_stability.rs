//! Two extractions of identical inputs must produce byte-identical dumps.
//!
//! Runs both extractions sequentially in one test: libclang is initialized
//! per extraction and torn down in between.

use std::path::Path;

#[test]
fn repeated_extraction_dumps_are_byte_identical() {
    let config = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/cxxscrape.toml");

    let first = cxxscrape::generate(&config).expect("first extraction succeeds");
    let second = cxxscrape::generate(&config).expect("second extraction succeeds");

    assert!(!first.is_empty());
    assert_eq!(first, second, "dumps must be byte-identical across runs");
}
