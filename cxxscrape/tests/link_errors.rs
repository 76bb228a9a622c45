//! Link-phase failure tests.
//!
//! libclang can only be initialized once per process, so both scenarios run
//! sequentially inside a single test.

use std::path::Path;

use cxxscrape::{Context, ExtractError};

fn fixture_args(binding_source: &str) -> Vec<String> {
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    vec![
        fixtures.join(binding_source).display().to_string(),
        format!("-I{}", fixtures.display()),
        "-std=c++17".to_string(),
    ]
}

#[test]
fn link_phase_rejects_broken_contexts() {
    // A bound class with a field of an unbound type fails the link with a
    // diagnostic naming that type.
    let err = Context::compile_and_extract(&fixture_args("bind_missing.cpp"))
        .expect_err("unbound field type must fail the link");
    let ExtractError::Link(errors) = &err else {
        panic!("expected an aggregate link error, got: {err}");
    };
    assert!(
        errors.iter().any(|e| matches!(
            e,
            ExtractError::MissingTypeBinding { spelling, .. } if spelling == "geo::Bar"
        )),
        "expected a missing binding for geo::Bar, got: {err}"
    );

    // The same class bound from two modules fails the link: a binding id
    // belongs to at most one module.
    let err = Context::compile_and_extract(&fixture_args("bind_shared.cpp"))
        .expect_err("an id listed by two modules must fail the link");
    let ExtractError::Link(errors) = &err else {
        panic!("expected an aggregate link error, got: {err}");
    };
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ExtractError::DuplicateBinding { .. })),
        "expected a duplicate binding error, got: {err}"
    );
}
