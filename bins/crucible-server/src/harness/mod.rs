/// Test-Harness Synthesizer - Per-Language Code Generation
///
/// **Core Responsibility:**
/// Turn (candidate source, ordered test-case specs) into one self-contained
/// program that drives the tests and prints a single structured result
/// object as the last line of stdout.
///
/// **Critical Properties:**
/// - Total: synthesis never fails, whatever the test-case data looks like.
///   Malformed operation JSON becomes a runtime raise inside that one
///   test's body; unknown operation types become comments.
/// - Deterministic: same inputs, same source text.
/// - No I/O, no state: the backends are pure string builders.
///
/// One strategy implementation per target language, all behind
/// `HarnessBackend`, so each backend is testable in isolation with literal
/// fixtures.
mod java;
mod javascript;
mod python;

pub use java::JavaBackend;
pub use javascript::JavascriptBackend;
pub use python::PythonBackend;

use crucible_common::types::{Language, Operation, TestCaseSpec};
use serde_json::Value;

/// Literal prefix of the structured result line; the reconciler seeks the
/// last occurrence of this in stdout.
pub const RESULT_MARKER: &str = "{\"results\":";

pub trait HarnessBackend {
    fn language(&self) -> Language;
    fn synthesize(&self, candidate: &str, specs: &[TestCaseSpec]) -> String;
}

/// Synthesize a harness for any supported language.
pub fn synthesize(language: Language, candidate: &str, specs: &[TestCaseSpec]) -> String {
    let backend: &dyn HarnessBackend = match language {
        Language::Javascript => &JavascriptBackend,
        Language::Python => &PythonBackend,
        Language::Java => &JavaBackend,
    };
    debug_assert_eq!(backend.language(), language);
    backend.synthesize(candidate, specs)
}

/// Operation list of one test case after tolerant parsing.
pub(crate) enum ParsedOps {
    Ops(Vec<ParsedOp>),
    /// The `operations` field was present but not an array; the test must
    /// raise at runtime instead of breaking synthesis.
    Malformed(String),
}

pub(crate) enum ParsedOp {
    Op(Operation),
    /// Unrecognized `type` tag; rendered as a comment, not an error.
    Unsupported(String),
    /// Recognized tag with malformed fields; rendered as a runtime raise.
    Invalid(String),
}

pub(crate) fn parse_operations(spec: &TestCaseSpec) -> ParsedOps {
    let items = match &spec.operations {
        Value::Null => return ParsedOps::Ops(Vec::new()),
        Value::Array(items) => items,
        _ => {
            return ParsedOps::Malformed(format!(
                "operations of test '{}' is not an array",
                spec.id
            ))
        }
    };

    let mut ops = Vec::with_capacity(items.len());
    for item in items {
        let tag = item.get("type").and_then(Value::as_str).unwrap_or_default();
        match tag {
            "create" | "call" | "assign" | "sleep" => {
                match serde_json::from_value::<Operation>(item.clone()) {
                    Ok(op) => ops.push(ParsedOp::Op(op)),
                    Err(err) => ops.push(ParsedOp::Invalid(format!(
                        "malformed {} operation: {}",
                        tag, err
                    ))),
                }
            }
            other => ops.push(ParsedOp::Unsupported(other.to_string())),
        }
    }
    ParsedOps::Ops(ops)
}

/// Sanitized names the operation list binds, in first-seen order. Assertion
/// keys outside this set get placeholder bindings so the generated code
/// stays syntactically valid.
pub(crate) fn bound_names(ops: &[ParsedOp]) -> Vec<String> {
    let mut names = Vec::new();
    for op in ops {
        if let ParsedOp::Op(op) = op {
            if let Some(raw) = op.binding() {
                let name = sanitize_identifier(raw);
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
    }
    names
}

/// Force an arbitrary spec-supplied name into a valid identifier in all
/// three target languages.
pub(crate) fn sanitize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if i == 0 && c.is_ascii_digit() {
                out.push('_');
            }
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

/// camelCase -> snake_case, for Python method naming.
pub(crate) fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Render a string as a quoted JSON literal, which all three target
/// grammars accept as a string literal.
pub(crate) fn quoted(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec_with_ops(ops: Value) -> TestCaseSpec {
        TestCaseSpec {
            id: "tc-1".to_string(),
            name: "spec".to_string(),
            description: String::new(),
            operations: ops,
            assertions: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_parse_operations_happy_path() {
        let spec = spec_with_ops(json!([
            { "type": "create", "class": "Stack", "args": [], "var": "s" },
            { "type": "call", "var": "s", "method": "push", "args": [1], "store": "size" },
            { "type": "sleep", "ms": 10 }
        ]));
        let ParsedOps::Ops(ops) = parse_operations(&spec) else {
            panic!("expected parsed ops");
        };
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[0], ParsedOp::Op(Operation::Create { .. })));
        assert_eq!(bound_names(&ops), vec!["s", "size"]);
    }

    #[test]
    fn test_parse_operations_unknown_type_is_not_fatal() {
        let spec = spec_with_ops(json!([{ "type": "teleport", "to": "prod" }]));
        let ParsedOps::Ops(ops) = parse_operations(&spec) else {
            panic!("expected parsed ops");
        };
        assert!(matches!(&ops[0], ParsedOp::Unsupported(tag) if tag == "teleport"));
    }

    #[test]
    fn test_parse_operations_invalid_fields() {
        // recognized tag, missing required field
        let spec = spec_with_ops(json!([{ "type": "create", "args": [] }]));
        let ParsedOps::Ops(ops) = parse_operations(&spec) else {
            panic!("expected parsed ops");
        };
        assert!(matches!(&ops[0], ParsedOp::Invalid(_)));
    }

    #[test]
    fn test_parse_operations_non_array() {
        let spec = spec_with_ops(json!("not a list"));
        assert!(matches!(parse_operations(&spec), ParsedOps::Malformed(_)));
    }

    #[test]
    fn test_parse_operations_null_is_empty() {
        let spec = spec_with_ops(Value::Null);
        let ParsedOps::Ops(ops) = parse_operations(&spec) else {
            panic!("expected parsed ops");
        };
        assert!(ops.is_empty());
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("count"), "count");
        assert_eq!(sanitize_identifier("my-var"), "my_var");
        assert_eq!(sanitize_identifier("1st"), "_1st");
        assert_eq!(sanitize_identifier(""), "_");
        assert_eq!(sanitize_identifier("a b"), "a_b");
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("getCount"), "get_count");
        assert_eq!(to_snake_case("allow"), "allow");
        assert_eq!(to_snake_case("parseHTTPBody"), "parse_h_t_t_p_body");
    }

    #[test]
    fn test_synthesize_total_for_all_languages() {
        let nasty = TestCaseSpec {
            id: "weird id with spaces".to_string(),
            name: "quote \" and \\ backslash".to_string(),
            description: String::new(),
            operations: json!([
                { "type": "teleport" },
                { "type": "call", "method": "orphan" },
                { "type": "assign", "var": "x", "value": { "nested": [1, null, "s"] } }
            ]),
            assertions: match json!({ "unbound key": true }) {
                Value::Object(map) => map,
                _ => unreachable!(),
            },
        };

        for language in [Language::Javascript, Language::Python, Language::Java] {
            let empty = synthesize(language, "", &[]);
            assert!(!empty.is_empty(), "{} harness must not be empty", language);

            let full = synthesize(language, "garbage ∆ candidate", &[nasty.clone()]);
            assert!(full.contains("results"), "{} harness must emit results", language);
        }
    }
}
