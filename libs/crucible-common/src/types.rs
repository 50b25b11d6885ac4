use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Languages candidate code may be submitted in. Closed set; the sandbox
/// refuses anything that is not also present in the language configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Python,
    Java,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Python => "python",
            Language::Java => "java",
        }
    }

    pub fn from_str(name: &str) -> Option<Language> {
        match name.to_lowercase().as_str() {
            "javascript" | "js" | "node" => Some(Language::Javascript),
            "python" | "py" => Some(Language::Python),
            "java" => Some(Language::Java),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution-wide outcome classification. Every consumer matches
/// exhaustively so a new status cannot be silently mishandled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    Success,
    Error,
    Timeout,
    CompilationError,
}

impl ExecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecStatus::Success => "success",
            ExecStatus::Error => "error",
            ExecStatus::Timeout => "timeout",
            ExecStatus::CompilationError => "compilation_error",
        }
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declarative test case: an ordered operation list plus a mapping
/// from stored-variable name to expected value.
///
/// `operations` is kept as raw JSON and parsed element-by-element at
/// synthesis time, so one malformed entry degrades only its own test
/// instead of failing the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub operations: Value,
    #[serde(default)]
    pub assertions: serde_json::Map<String, Value>,
}

/// One step in a test case's setup sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Instantiate a candidate type and bind it to `var`.
    Create {
        class: String,
        #[serde(default)]
        args: Vec<Value>,
        var: String,
    },
    /// Invoke a method on a bound variable, optionally storing the result.
    Call {
        var: String,
        method: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        store: Option<String>,
    },
    /// Bind a literal value; pre-seeds expected values, never touches
    /// candidate state.
    Assign { var: String, value: Value },
    /// Pause for `ms` milliseconds, for time-windowed behavior.
    Sleep { ms: u64 },
}

impl Operation {
    /// Variable name this operation binds, if any.
    pub fn binding(&self) -> Option<&str> {
        match self {
            Operation::Create { var, .. } => Some(var),
            Operation::Call { store, .. } => store.as_deref(),
            Operation::Assign { var, .. } => Some(var),
            Operation::Sleep { .. } => None,
        }
    }
}

/// Raw outcome of one sandbox invocation. Produced once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExecutionResult {
    pub success: bool,
    pub status: ExecStatus,
    pub exit_code: Option<i64>,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

impl RawExecutionResult {
    /// Terminal infrastructure failure (daemon unavailable, container
    /// creation failed, unsupported language). Never retried here.
    pub fn infra_error(message: impl Into<String>) -> Self {
        RawExecutionResult {
            success: false,
            status: ExecStatus::Error,
            exit_code: None,
            duration_ms: 0,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(message.into()),
        }
    }
}

/// Resolved pass/fail outcome for one test case. Reconciliation guarantees
/// exactly one verdict per requested spec, in request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestVerdict {
    pub test_id: String,
    pub test_name: String,
    pub passed: bool,
    pub expected: String,
    pub actual: String,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl TestVerdict {
    /// Synthetic failing verdict for a test the harness never reported on.
    pub fn failed(spec: &TestCaseSpec, reason: &str) -> Self {
        TestVerdict {
            test_id: spec.id.clone(),
            test_name: spec.name.clone(),
            passed: false,
            expected: String::new(),
            actual: String::new(),
            error: Some(reason.to_string()),
            duration_ms: 0,
        }
    }
}

/// Persisted outcome of one execution attempt. Append-only; written once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub context_id: String,
    pub language: Language,
    pub status: ExecStatus,
    pub tests_passed: u32,
    pub tests_total: u32,
    pub auto_score: u8,
    pub duration_ms: u64,
    pub verdicts: Vec<TestVerdict>,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of the owning interview context. Executions are only
/// accepted while the context is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    Draft,
    Active,
    Completed,
    Cancelled,
}

/// Context document written by the surrounding application and read here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub id: String,
    pub state: ContextState,
    #[serde(default)]
    pub test_cases: Vec<TestCaseSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_language_parsing() {
        assert_eq!(Language::from_str("javascript"), Some(Language::Javascript));
        assert_eq!(Language::from_str("JS"), Some(Language::Javascript));
        assert_eq!(Language::from_str("python"), Some(Language::Python));
        assert_eq!(Language::from_str("Java"), Some(Language::Java));
        assert_eq!(Language::from_str("cobol"), None);
    }

    #[test]
    fn test_exec_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&ExecStatus::CompilationError).unwrap(),
            "\"compilation_error\""
        );
        let parsed: ExecStatus = serde_json::from_str("\"timeout\"").unwrap();
        assert_eq!(parsed, ExecStatus::Timeout);
    }

    #[test]
    fn test_operation_tagged_parsing() {
        let op: Operation = serde_json::from_value(json!({
            "type": "call",
            "var": "limiter",
            "method": "allow",
            "args": ["user-1"],
            "store": "first"
        }))
        .unwrap();
        assert_eq!(op.binding(), Some("first"));

        let op: Operation = serde_json::from_value(json!({
            "type": "sleep",
            "ms": 250
        }))
        .unwrap();
        assert_eq!(op, Operation::Sleep { ms: 250 });
        assert_eq!(op.binding(), None);
    }

    #[test]
    fn test_call_without_store_binds_nothing() {
        let op: Operation = serde_json::from_value(json!({
            "type": "call",
            "var": "cache",
            "method": "clear"
        }))
        .unwrap();
        assert_eq!(op.binding(), None);
    }

    #[test]
    fn test_spec_tolerates_missing_optional_fields() {
        let spec: TestCaseSpec = serde_json::from_value(json!({
            "id": "tc-1",
            "name": "basic"
        }))
        .unwrap();
        assert!(spec.operations.is_null());
        assert!(spec.assertions.is_empty());
    }

    #[test]
    fn test_context_state_gate_values() {
        let ctx: ExecutionContext = serde_json::from_value(json!({
            "id": "int-9",
            "state": "active"
        }))
        .unwrap();
        assert_eq!(ctx.state, ContextState::Active);
        assert!(ctx.test_cases.is_empty());
    }
}
