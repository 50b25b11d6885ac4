use super::{
    bound_names, parse_operations, quoted, sanitize_identifier, HarnessBackend, ParsedOp,
    ParsedOps,
};
use crucible_common::types::{Language, Operation, TestCaseSpec};
use serde_json::Value;

/// Java harness. The file is staged as `Main.java`, so the generated
/// `Main` class must be the only public type: candidate `package` lines are
/// dropped, candidate imports are hoisted above the type declarations, and
/// candidate top-level `public` types are demoted to package-private.
pub struct JavaBackend;

const MAIN_HEADER: &str = r#"
public class Main {
    interface __TestBody {
        Object[] run() throws Exception;
    }

    static final List<String> __results = new ArrayList<>();

    static void __runTest(String id, String name, __TestBody body) {
        long started = System.currentTimeMillis();
        try {
            Object[] pair = body.run();
            boolean passed = __deepEquals(pair[0], pair[1]);
            __results.add(__entry(id, name, passed, __stringify(pair[0]), __stringify(pair[1]),
                    null, System.currentTimeMillis() - started));
        } catch (Throwable t) {
            __results.add(__entry(id, name, false, "", "", String.valueOf(t),
                    System.currentTimeMillis() - started));
        }
    }

    static boolean __deepEquals(Object a, Object b) {
        if (a == null || b == null) return a == b;
        if (a instanceof Number && b instanceof Number) {
            return ((Number) a).doubleValue() == ((Number) b).doubleValue();
        }
        if (a instanceof Map && b instanceof Map) {
            Map<?, ?> ma = (Map<?, ?>) a;
            Map<?, ?> mb = (Map<?, ?>) b;
            if (!ma.keySet().equals(mb.keySet())) return false;
            for (Object k : ma.keySet()) {
                if (!__deepEquals(ma.get(k), mb.get(k))) return false;
            }
            return true;
        }
        if (a instanceof List && b instanceof List) {
            List<?> la = (List<?>) a;
            List<?> lb = (List<?>) b;
            if (la.size() != lb.size()) return false;
            for (int i = 0; i < la.size(); i++) {
                if (!__deepEquals(la.get(i), lb.get(i))) return false;
            }
            return true;
        }
        return a.equals(b);
    }

    static String __escape(String s) {
        StringBuilder out = new StringBuilder(s.length() + 2);
        for (int i = 0; i < s.length(); i++) {
            char c = s.charAt(i);
            switch (c) {
                case '"': out.append("\\\""); break;
                case '\\': out.append("\\\\"); break;
                case '\n': out.append("\\n"); break;
                case '\r': out.append("\\r"); break;
                case '\t': out.append("\\t"); break;
                default:
                    if (c < 0x20) {
                        out.append(String.format("\\u%04x", (int) c));
                    } else {
                        out.append(c);
                    }
            }
        }
        return out.toString();
    }

    static String __stringify(Object v) {
        if (v == null) return "null";
        if (v instanceof String) return "\"" + __escape((String) v) + "\"";
        if (v instanceof Boolean || v instanceof Number) return String.valueOf(v);
        if (v instanceof Map) {
            StringBuilder out = new StringBuilder("{");
            boolean first = true;
            for (Map.Entry<?, ?> e : ((Map<?, ?>) v).entrySet()) {
                if (!first) out.append(",");
                first = false;
                out.append("\"").append(__escape(String.valueOf(e.getKey()))).append("\":")
                        .append(__stringify(e.getValue()));
            }
            return out.append("}").toString();
        }
        if (v instanceof List) {
            StringBuilder out = new StringBuilder("[");
            List<?> list = (List<?>) v;
            for (int i = 0; i < list.size(); i++) {
                if (i > 0) out.append(",");
                out.append(__stringify(list.get(i)));
            }
            return out.append("]").toString();
        }
        return "\"" + __escape(String.valueOf(v)) + "\"";
    }

    static String __entry(String id, String name, boolean passed, String expected, String actual,
            String error, long timeMs) {
        return "{\"id\":\"" + __escape(id) + "\",\"name\":\"" + __escape(name)
                + "\",\"passed\":" + passed
                + ",\"expected\":\"" + __escape(expected)
                + "\",\"actual\":\"" + __escape(actual)
                + "\",\"error\":" + (error == null ? "null" : "\"" + __escape(error) + "\"")
                + ",\"time_ms\":" + timeMs + "}";
    }

    static Map<String, Object> __map(Object... kv) {
        Map<String, Object> m = new LinkedHashMap<>();
        for (int i = 0; i + 1 < kv.length; i += 2) {
            m.put(String.valueOf(kv[i]), kv[i + 1]);
        }
        return m;
    }

    static List<Object> __list(Object... items) {
        return Arrays.asList(items);
    }

    static void __sleep(long ms) {
        try {
            Thread.sleep(ms);
        } catch (InterruptedException e) {
            Thread.currentThread().interrupt();
        }
    }

    public static void main(String[] args) {
"#;

const MAIN_FOOTER: &str = r#"
        StringBuilder __out = new StringBuilder("{\"results\":[");
        for (int i = 0; i < __results.size(); i++) {
            if (i > 0) __out.append(",");
            __out.append(__results.get(i));
        }
        __out.append("]}");
        System.out.println(__out);
    }
}
"#;

impl HarnessBackend for JavaBackend {
    fn language(&self) -> Language {
        Language::Java
    }

    fn synthesize(&self, candidate: &str, specs: &[TestCaseSpec]) -> String {
        let (imports, body) = split_candidate(candidate);

        let mut out = String::with_capacity(candidate.len() + MAIN_HEADER.len() + 1024);
        out.push_str("import java.util.*;\n");
        for import in imports {
            if import != "import java.util.*;" {
                out.push_str(&import);
                out.push('\n');
            }
        }
        out.push('\n');
        out.push_str(&body);
        out.push('\n');
        out.push_str(MAIN_HEADER);

        for spec in specs {
            emit_test(&mut out, spec);
        }

        out.push_str(MAIN_FOOTER);
        out
    }
}

/// Hoist candidate imports, drop package declarations, and demote
/// top-level public types so `Main` stays the single public entry point.
fn split_candidate(candidate: &str) -> (Vec<String>, String) {
    let mut imports = Vec::new();
    let mut body = String::with_capacity(candidate.len());

    for line in candidate.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("package ") && trimmed.ends_with(';') {
            continue;
        }
        if trimmed.starts_with("import ") && trimmed.ends_with(';') {
            imports.push(trimmed.to_string());
            continue;
        }
        body.push_str(&demote_public(line));
        body.push('\n');
    }

    (imports, body)
}

/// Top-level (column zero) public type declarations lose their modifier;
/// nested members are left alone.
fn demote_public(line: &str) -> String {
    if let Some(rest) = line.strip_prefix("public ") {
        let keyword = rest.trim_start();
        if keyword.starts_with("class ")
            || keyword.starts_with("interface ")
            || keyword.starts_with("enum ")
            || keyword.starts_with("record ")
            || keyword.starts_with("abstract ")
            || keyword.starts_with("final ")
        {
            return rest.to_string();
        }
    }
    line.to_string()
}

fn emit_test(out: &mut String, spec: &TestCaseSpec) {
    out.push_str(&format!(
        "        __runTest({}, {}, () -> {{\n",
        quoted(&spec.id),
        quoted(&spec.name)
    ));

    match parse_operations(spec) {
        ParsedOps::Malformed(reason) => {
            out.push_str(&format!(
                "            throw new RuntimeException({});\n",
                quoted(&reason)
            ));
        }
        ParsedOps::Ops(ops) => {
            let mut declared: Vec<String> = Vec::new();
            let mut aborted = false;

            for op in &ops {
                match op {
                    ParsedOp::Op(op) => emit_operation(out, op, &mut declared),
                    ParsedOp::Unsupported(tag) => {
                        out.push_str(&format!(
                            "            // unsupported operation type: {}\n",
                            tag
                        ));
                    }
                    ParsedOp::Invalid(reason) => {
                        // statements after a throw would be unreachable in Java
                        out.push_str(&format!(
                            "            throw new RuntimeException({});\n",
                            quoted(reason)
                        ));
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
                        out.push_str(&format!("            Object {} = null;\n", ident));
                    }
                }

                out.push_str("            Object __actual = __map(");
                let mut first = true;
                for key in spec.assertions.keys() {
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    out.push_str(&format!("{}, {}", quoted(key), sanitize_identifier(key)));
                }
                out.push_str(");\n");

                out.push_str(&format!(
                    "            Object __expected = {};\n",
                    literal(&Value::Object(spec.assertions.clone()))
                ));
                out.push_str("            return new Object[] { __expected, __actual };\n");
            }
        }
    }

    out.push_str("        });\n");
}

fn emit_operation(out: &mut String, op: &Operation, declared: &mut Vec<String>) {
    match op {
        Operation::Create { class, args, var } => {
            let ident = sanitize_identifier(var);
            let class = sanitize_identifier(class);
            let expr = format!("new {}({})", class, render_args(args));
            if declared.contains(&ident) {
                out.push_str(&format!("            {} = {};\n", ident, expr));
            } else {
                out.push_str(&format!("            {} {} = {};\n", class, ident, expr));
                declared.push(ident);
            }
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
                Some(store) => {
                    let ident = sanitize_identifier(store);
                    if declared.contains(&ident) {
                        out.push_str(&format!("            {} = {};\n", ident, call));
                    } else {
                        out.push_str(&format!("            var {} = {};\n", ident, call));
                        declared.push(ident);
                    }
                }
                None => out.push_str(&format!("            {};\n", call)),
            }
        }
        Operation::Assign { var, value } => {
            let ident = sanitize_identifier(var);
            let expr = literal(value);
            if declared.contains(&ident) {
                out.push_str(&format!("            {} = {};\n", ident, expr));
            } else if value.is_null() {
                // `var x = null` does not infer
                out.push_str(&format!("            Object {} = null;\n", ident));
                declared.push(ident);
            } else {
                out.push_str(&format!("            var {} = {};\n", ident, expr));
                declared.push(ident);
            }
        }
        Operation::Sleep { ms } => {
            out.push_str(&format!("            __sleep({});\n", ms));
        }
    }
}

fn render_args(args: &[Value]) -> String {
    args.iter().map(literal).collect::<Vec<_>>().join(", ")
}

/// JSON value rendered as a Java expression. Scalars become primitive
/// literals so candidate constructors see int/double/boolean; composites
/// go through the harness `__list`/`__map` helpers.
fn literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                if i32::try_from(v).is_ok() {
                    v.to_string()
                } else {
                    format!("{}L", v)
                }
            } else {
                format!("{:?}", n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => quoted(s),
        Value::Array(items) => {
            let inner = items.iter().map(literal).collect::<Vec<_>>().join(", ");
            format!("__list({})", inner)
        }
        Value::Object(map) => {
            let inner = map
                .iter()
                .map(|(k, v)| format!("{}, {}", quoted(k), literal(v)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("__map({})", inner)
        }
    }
}
