//! Structured extraction diagnostics.
//!
//! Matcher logic distinguishes a missing type binding from every other
//! failure: a missing binding can be reported with the offending spelling and
//! deferred to the aggregate link report, while the rest fail the site that
//! produced them.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// A `QType` refers to a C++ type the user did not bind.
    #[error("missing binding for type `{spelling}` ({id})")]
    MissingTypeBinding { spelling: String, id: String },

    /// A type shape that cannot cross the flat C ABI.
    #[error("unsupported type `{spelling}`: {reason}")]
    UnsupportedType { spelling: String, reason: String },

    /// An id was inserted twice with divergent contents.
    #[error("duplicate binding for `{id}` with divergent contents")]
    DuplicateBinding { id: String },

    /// A non-`OpaquePtr` bind kind on a type that is not both copy- and
    /// move-constructible. Never fatal during extraction — the IR records
    /// what the user asked for and the emitted bindings carry a static
    /// assertion — but surfaced in the link report.
    #[error("`{class}` must be copy- and move-constructible to be bound by value")]
    InvalidBindKind { class: String },

    /// A marker site did not parse into the expected shape.
    #[error("{location}: malformed binding marker: {reason}")]
    MalformedMarker { location: String, reason: String },

    /// The AST provider failed to parse or query the inputs.
    #[error("AST provider error: {0}")]
    Provider(String),

    /// Aggregate report produced by the link phase.
    #[error("link failed with {} error(s):{}", .0.len(), render_report(.0))]
    Link(Vec<ExtractError>),
}

fn render_report(errors: &[ExtractError]) -> String {
    let mut out = String::new();
    for e in errors {
        out.push_str("\n  • ");
        out.push_str(&e.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_report_lists_every_error() {
        let err = ExtractError::Link(vec![
            ExtractError::MissingTypeBinding {
                spelling: "Bar".into(),
                id: "c:@S@Bar".into(),
            },
            ExtractError::DuplicateBinding { id: "c:@S@Foo".into() },
        ]);
        let text = err.to_string();
        assert!(text.contains("2 error(s)"), "got: {text}");
        assert!(text.contains("missing binding for type `Bar`"), "got: {text}");
        assert!(text.contains("duplicate binding for `c:@S@Foo`"), "got: {text}");
    }

    #[test]
    fn missing_type_binding_names_the_spelling() {
        let err = ExtractError::MissingTypeBinding {
            spelling: "geo::Bar".into(),
            id: "c:@N@geo@S@Bar".into(),
        };
        assert_eq!(
            err.to_string(),
            "missing binding for type `geo::Bar` (c:@N@geo@S@Bar)"
        );
    }
}
