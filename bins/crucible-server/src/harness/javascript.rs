use super::{
    bound_names, parse_operations, quoted, sanitize_identifier, HarnessBackend, ParsedOp,
    ParsedOps,
};
use crucible_common::types::{Language, Operation, TestCaseSpec};
use serde_json::Value;

/// JavaScript harness: candidate code first, then a result accumulator,
/// deep-equality helper and per-test closures, then a single JSON line on
/// stdout.
pub struct JavascriptBackend;

const PREAMBLE: &str = r#"// ---- generated test harness ----
const __results = [];

function __deepEqual(a, b) {
  if (a === b) return true;
  if (Array.isArray(a) && Array.isArray(b)) {
    return a.length === b.length && a.every((v, i) => __deepEqual(v, b[i]));
  }
  if (a && b && typeof a === "object" && typeof b === "object") {
    const ka = Object.keys(a);
    const kb = Object.keys(b);
    return ka.length === kb.length && ka.every((k) => __deepEqual(a[k], b[k]));
  }
  return false;
}

function __runTest(id, name, fn) {
  const started = Date.now();
  try {
    const pair = fn();
    __results.push({
      id: id,
      name: name,
      passed: __deepEqual(pair.expected, pair.actual),
      expected: JSON.stringify(pair.expected),
      actual: JSON.stringify(pair.actual),
      error: null,
      time_ms: Date.now() - started,
    });
  } catch (err) {
    __results.push({
      id: id,
      name: name,
      passed: false,
      expected: "",
      actual: "",
      error: String(err && err.message ? err.message : err),
      time_ms: Date.now() - started,
    });
  }
}

// Scripts have no synchronous sleep; block on a throwaway futex instead.
function __sleep(ms) {
  Atomics.wait(new Int32Array(new SharedArrayBuffer(4)), 0, 0, ms);
}
"#;

impl HarnessBackend for JavascriptBackend {
    fn language(&self) -> Language {
        Language::Javascript
    }

    fn synthesize(&self, candidate: &str, specs: &[TestCaseSpec]) -> String {
        let mut out = String::with_capacity(candidate.len() + PREAMBLE.len() + 1024);
        out.push_str(candidate);
        out.push_str("\n\n");
        out.push_str(PREAMBLE);

        for spec in specs {
            emit_test(&mut out, spec);
        }

        out.push_str("\nconsole.log(JSON.stringify({ results: __results }));\n");
        out
    }
}

fn emit_test(out: &mut String, spec: &TestCaseSpec) {
    out.push_str(&format!(
        "\n__runTest({}, {}, () => {{\n",
        quoted(&spec.id),
        quoted(&spec.name)
    ));

    match parse_operations(spec) {
        ParsedOps::Malformed(reason) => {
            out.push_str(&format!("  throw new Error({});\n", quoted(&reason)));
        }
        ParsedOps::Ops(ops) => {
            let mut declared: Vec<String> = Vec::new();
            let mut aborted = false;

            for op in &ops {
                match op {
                    ParsedOp::Op(op) => emit_operation(out, op, &mut declared),
                    ParsedOp::Unsupported(tag) => {
                        out.push_str(&format!("  // unsupported operation type: {}\n", tag));
                    }
                    ParsedOp::Invalid(reason) => {
                        out.push_str(&format!("  throw new Error({});\n", quoted(reason)));
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
                        out.push_str(&format!("  let {} = null;\n", ident));
                    }
                }

                out.push_str("  const __actual = {");
                let mut first = true;
                for key in spec.assertions.keys() {
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    out.push_str(&format!(" {}: {}", quoted(key), sanitize_identifier(key)));
                }
                out.push_str(" };\n");

                out.push_str(&format!(
                    "  const __expected = {};\n",
                    literal(&Value::Object(spec.assertions.clone()))
                ));
                out.push_str("  return { expected: __expected, actual: __actual };\n");
            }
        }
    }

    out.push_str("});\n");
}

fn emit_operation(out: &mut String, op: &Operation, declared: &mut Vec<String>) {
    match op {
        Operation::Create { class, args, var } => {
            let expr = format!("new {}({})", sanitize_identifier(class), render_args(args));
            emit_binding(out, var, &expr, declared);
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
                sanitize_identifier(method),
                render_args(args)
            );
            match store {
                Some(store) => emit_binding(out, store, &call, declared),
                None => out.push_str(&format!("  {};\n", call)),
            }
        }
        Operation::Assign { var, value } => {
            emit_binding(out, var, &literal(value), declared);
        }
        Operation::Sleep { ms } => {
            out.push_str(&format!("  __sleep({});\n", ms));
        }
    }
}

/// First binding declares with `let`; later bindings to the same name
/// reassign, so duplicate names in spec data cannot break the whole file.
fn emit_binding(out: &mut String, name: &str, expr: &str, declared: &mut Vec<String>) {
    let ident = sanitize_identifier(name);
    if declared.contains(&ident) {
        out.push_str(&format!("  {} = {};\n", ident, expr));
    } else {
        out.push_str(&format!("  let {} = {};\n", ident, expr));
        declared.push(ident);
    }
}

fn render_args(args: &[Value]) -> String {
    args.iter().map(literal).collect::<Vec<_>>().join(", ")
}

/// JSON text is valid JavaScript expression syntax.
fn literal(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}
