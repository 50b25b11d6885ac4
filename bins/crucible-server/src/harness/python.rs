use super::{
    bound_names, parse_operations, quoted, sanitize_identifier, to_snake_case, HarnessBackend,
    ParsedOp, ParsedOps,
};
use crucible_common::types::{Language, Operation, TestCaseSpec};
use serde_json::Value;

/// Python harness. Method names are converted from camelCase to
/// snake_case; each test becomes a module-level function so one raising
/// test cannot touch another's bindings.
pub struct PythonBackend;

const PREAMBLE: &str = r#"# ---- generated test harness ----
import json as __json
import time as __time

__results = []


def __deep_equal(a, b):
    if isinstance(a, bool) != isinstance(b, bool):
        return False
    if isinstance(a, dict) and isinstance(b, dict):
        if set(a.keys()) != set(b.keys()):
            return False
        return all(__deep_equal(a[k], b[k]) for k in a)
    if isinstance(a, (list, tuple)) and isinstance(b, (list, tuple)):
        if len(a) != len(b):
            return False
        return all(__deep_equal(x, y) for x, y in zip(a, b))
    return a == b


def __run_test(test_id, name, fn):
    started = __time.time()
    try:
        expected, actual = fn()
        __results.append({
            "id": test_id,
            "name": name,
            "passed": __deep_equal(expected, actual),
            "expected": __json.dumps(expected, default=str),
            "actual": __json.dumps(actual, default=str),
            "error": None,
            "time_ms": int((__time.time() - started) * 1000),
        })
    except Exception as exc:
        __results.append({
            "id": test_id,
            "name": name,
            "passed": False,
            "expected": "",
            "actual": "",
            "error": str(exc) or exc.__class__.__name__,
            "time_ms": int((__time.time() - started) * 1000),
        })
"#;

impl HarnessBackend for PythonBackend {
    fn language(&self) -> Language {
        Language::Python
    }

    fn synthesize(&self, candidate: &str, specs: &[TestCaseSpec]) -> String {
        let mut out = String::with_capacity(candidate.len() + PREAMBLE.len() + 1024);
        out.push_str(candidate);
        out.push_str("\n\n");
        out.push_str(PREAMBLE);

        for (index, spec) in specs.iter().enumerate() {
            emit_test(&mut out, index, spec);
        }

        out.push_str("\nprint(__json.dumps({\"results\": __results}))\n");
        out
    }
}

fn emit_test(out: &mut String, index: usize, spec: &TestCaseSpec) {
    out.push_str(&format!("\n\ndef __test_{}():\n", index));

    match parse_operations(spec) {
        ParsedOps::Malformed(reason) => {
            out.push_str(&format!("    raise RuntimeError({})\n", quoted(&reason)));
        }
        ParsedOps::Ops(ops) => {
            let mut aborted = false;

            for op in &ops {
                match op {
                    ParsedOp::Op(op) => emit_operation(out, op),
                    ParsedOp::Unsupported(tag) => {
                        out.push_str(&format!("    # unsupported operation type: {}\n", tag));
                    }
                    ParsedOp::Invalid(reason) => {
                        out.push_str(&format!("    raise RuntimeError({})\n", quoted(reason)));
                        aborted = true;
                        break;
                    }
                }
            }

            if !aborted {
                let produced = bound_names(&ops);
                for key in spec.assertions.keys() {
                    let ident = sanitize_identifier(key);
                    if !produced.contains(&ident) {
                        out.push_str(&format!("    {} = None\n", ident));
                    }
                }

                out.push_str("    actual = {");
                let mut first = true;
                for key in spec.assertions.keys() {
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    out.push_str(&format!("{}: {}", quoted(key), sanitize_identifier(key)));
                }
                out.push_str("}\n");

                out.push_str(&format!(
                    "    expected = {}\n",
                    literal(&Value::Object(spec.assertions.clone()))
                ));
                out.push_str("    return expected, actual\n");
            }
        }
    }

    out.push_str(&format!(
        "\n__run_test({}, {}, __test_{})\n",
        quoted(&spec.id),
        quoted(&spec.name),
        index
    ));
}

fn emit_operation(out: &mut String, op: &Operation) {
    match op {
        Operation::Create { class, args, var } => {
            out.push_str(&format!(
                "    {} = {}({})\n",
                sanitize_identifier(var),
                sanitize_identifier(class),
                render_args(args)
            ));
        }
        Operation::Call {
            var,
            method,
            args,
            store,
        } => {
            let call = format!(
                "{}.{}({})",
                sanitize_identifier(var),
                to_snake_case(&sanitize_identifier(method)),
                render_args(args)
            );
            match store {
                Some(store) => {
                    out.push_str(&format!("    {} = {}\n", sanitize_identifier(store), call))
                }
                None => out.push_str(&format!("    {}\n", call)),
            }
        }
        Operation::Assign { var, value } => {
            out.push_str(&format!(
                "    {} = {}\n",
                sanitize_identifier(var),
                literal(value)
            ));
        }
        Operation::Sleep { ms } => {
            out.push_str(&format!("    __time.sleep({})\n", *ms as f64 / 1000.0));
        }
    }
}

fn render_args(args: &[Value]) -> String {
    args.iter().map(literal).collect::<Vec<_>>().join(", ")
}

/// JSON value rendered as a Python literal. JSON string escapes are a
/// subset of Python's, so strings pass through serde's encoder.
fn literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quoted(s),
        Value::Array(items) => {
            let inner = items.iter().map(literal).collect::<Vec<_>>().join(", ");
            format!("[{}]", inner)
        }
        Value::Object(map) => {
            let inner = map
                .iter()
                .map(|(k, v)| format!("{}: {}", quoted(k), literal(v)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{}}}", inner)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(id: &str, ops: Value, assertions: Value) -> TestCaseSpec {
        TestCaseSpec {
            id: id.to_string(),
            name: format!("test {}", id),
            description: String::new(),
            operations: ops,
            assertions: match assertions {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
        }
    }

    #[test]
    fn test_literal_rendering() {
        assert_eq!(literal(&json!(null)), "None");
        assert_eq!(literal(&json!(true)), "True");
        assert_eq!(literal(&json!(3.5)), "3.5");
        assert_eq!(literal(&json!("a\"b")), r#""a\"b""#);
        assert_eq!(literal(&json!([1, false])), "[1, False]");
        assert_eq!(literal(&json!({"k": null})), r#"{"k": None}"#);
    }

    #[test]
    fn test_method_names_are_snake_cased() {
        let specs = vec![spec(
            "tc-1",
            json!([
                { "type": "create", "class": "Counter", "args": [], "var": "c" },
                { "type": "call", "var": "c", "method": "getCount", "store": "count" }
            ]),
            json!({ "count": 0 }),
        )];
        let out = PythonBackend.synthesize("", &specs);
        assert!(out.contains("count = c.get_count()"));
        // class names keep their casing
        assert!(out.contains("c = Counter()"));
    }

    #[test]
    fn test_sleep_converts_to_seconds() {
        let specs = vec![spec(
            "tc-1",
            json!([{ "type": "sleep", "ms": 1500 }]),
            json!({}),
        )];
        let out = PythonBackend.synthesize("", &specs);
        assert!(out.contains("__time.sleep(1.5)"));
    }

    #[test]
    fn test_expected_uses_python_literals() {
        let specs = vec![spec(
            "tc-1",
            json!([]),
            json!({ "ok": true, "missing": null }),
        )];
        let out = PythonBackend.synthesize("", &specs);
        assert!(out.contains(r#"expected = {"missing": None, "ok": True}"#));
    }

    #[test]
    fn test_malformed_operations_raise() {
        let specs = vec![spec("tc-1", json!(42), json!({}))];
        let out = PythonBackend.synthesize("", &specs);
        assert!(out.contains("raise RuntimeError("));
        assert!(out.trim_end().ends_with(r#"print(__json.dumps({"results": __results}))"#));
    }

    #[test]
    fn test_one_function_per_test() {
        let specs = vec![
            spec("a", json!([]), json!({})),
            spec("b", json!([]), json!({})),
        ];
        let out = PythonBackend.synthesize("", &specs);
        assert!(out.contains("def __test_0():"));
        assert!(out.contains("def __test_1():"));
        assert!(out.contains(r#"__run_test("a", "test a", __test_0)"#));
        assert!(out.contains(r#"__run_test("b", "test b", __test_1)"#));
    }
}
