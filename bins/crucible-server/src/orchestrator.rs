/// Execution Orchestrator - High-Level Coordination
///
/// **Responsibility:**
/// Sequence synthesis, sandbox execution, reconciliation and scoring for
/// one submission, and persist exactly one execution record per attempt.
///
/// This is the glue layer - it knows nothing about:
/// - How code executes (the backend's job)
/// - How harness text is produced (the synthesizer's job)
/// - How stdout becomes verdicts (the reconciler's job)
///
/// Preconditions are rejected before any sandbox resource is allocated.
/// Persistence is best-effort: the in-memory result of the just-completed
/// execution is authoritative for the response.
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crucible_common::context::ContextSource;
use crucible_common::records::RecordSink;
use crucible_common::scoring;
use crucible_common::types::{
    ContextState, ExecStatus, ExecutionContext, ExecutionRecord, Language,
};

use crate::harness;
use crate::reconcile;
use crate::sandbox::ExecutionBackend;

/// Terminal request-level failures, rejected before execution starts.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("context '{0}' not found")]
    ContextNotFound(String),
    #[error("context '{0}' is not active")]
    ContextNotActive(String),
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(Language),
    #[error("storage error: {0}")]
    Storage(String),
}

pub struct Orchestrator {
    contexts: Box<dyn ContextSource>,
    backend: Box<dyn ExecutionBackend>,
    records: Box<dyn RecordSink>,
}

impl Orchestrator {
    pub fn new(
        contexts: Box<dyn ContextSource>,
        backend: Box<dyn ExecutionBackend>,
        records: Box<dyn RecordSink>,
    ) -> Self {
        Orchestrator {
            contexts,
            backend,
            records,
        }
    }

    pub async fn execute(
        &self,
        context_id: &str,
        language: Language,
        source: &str,
    ) -> Result<ExecutionRecord, PreconditionError> {
        let context = self
            .contexts
            .fetch(context_id)
            .await
            .map_err(|e| PreconditionError::Storage(e.to_string()))?
            .ok_or_else(|| PreconditionError::ContextNotFound(context_id.to_string()))?;

        if context.state != ContextState::Active {
            return Err(PreconditionError::ContextNotActive(context_id.to_string()));
        }
        if !self.backend.supports(language) {
            return Err(PreconditionError::UnsupportedLanguage(language));
        }

        info!(
            context_id,
            language = %language,
            test_count = context.test_cases.len(),
            source_size = source.len(),
            "starting execution"
        );

        let record = if context.test_cases.is_empty() {
            // nothing to run; no sandbox resources are allocated
            empty_record(context_id, language)
        } else {
            self.run(&context, language, source).await
        };

        if let Err(err) = self.records.append(&record).await {
            // Non-fatal - the computed result stays authoritative.
            warn!(context_id, error = %err, "failed to persist execution record");
        }

        info!(
            context_id,
            status = %record.status,
            tests_passed = record.tests_passed,
            tests_total = record.tests_total,
            auto_score = record.auto_score,
            execution_ms = record.duration_ms,
            "execution finished"
        );

        Ok(record)
    }

    async fn run(
        &self,
        context: &ExecutionContext,
        language: Language,
        source: &str,
    ) -> ExecutionRecord {
        let specs = &context.test_cases;
        let harness_source = harness::synthesize(language, source, specs);
        let raw = self.backend.execute(language, &harness_source).await;

        let verdicts = match raw.status {
            // a timeout is terminal; partial structured output is not trusted
            ExecStatus::Timeout => {
                reconcile::failed_verdicts(specs, "timed out before completing")
            }
            ExecStatus::Success | ExecStatus::Error | ExecStatus::CompilationError => {
                reconcile::reconcile(&raw.stdout, specs)
            }
        };

        let tests_total = specs.len() as u32;
        let tests_passed = verdicts.iter().filter(|v| v.passed).count() as u32;

        ExecutionRecord {
            id: Uuid::new_v4(),
            context_id: context.id.clone(),
            language,
            status: raw.status,
            tests_passed,
            tests_total,
            auto_score: scoring::auto_score(tests_passed, tests_total),
            duration_ms: raw.duration_ms,
            verdicts,
            stdout: raw.stdout,
            stderr: raw.stderr,
            error: raw.error,
            created_at: Utc::now(),
        }
    }
}

fn empty_record(context_id: &str, language: Language) -> ExecutionRecord {
    ExecutionRecord {
        id: Uuid::new_v4(),
        context_id: context_id.to_string(),
        language,
        status: ExecStatus::Success,
        tests_passed: 0,
        tests_total: 0,
        auto_score: 0,
        duration_ms: 0,
        verdicts: Vec::new(),
        stdout: String::new(),
        stderr: String::new(),
        error: None,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use crucible_common::types::{RawExecutionResult, TestCaseSpec};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct MemoryContexts {
        contexts: HashMap<String, ExecutionContext>,
    }

    #[async_trait]
    impl ContextSource for MemoryContexts {
        async fn fetch(&self, context_id: &str) -> Result<Option<ExecutionContext>> {
            Ok(self.contexts.get(context_id).cloned())
        }
    }

    struct ScriptedBackend {
        result: RawExecutionResult,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ExecutionBackend for ScriptedBackend {
        fn supports(&self, language: Language) -> bool {
            language != Language::Java // one unsupported language for tests
        }

        async fn execute(&self, _language: Language, _source: &str) -> RawExecutionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    struct MemorySink {
        records: Arc<Mutex<Vec<ExecutionRecord>>>,
        fail: bool,
    }

    #[async_trait]
    impl RecordSink for MemorySink {
        async fn append(&self, record: &ExecutionRecord) -> Result<()> {
            if self.fail {
                return Err(anyhow!("redis unavailable"));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn spec(id: &str) -> TestCaseSpec {
        TestCaseSpec {
            id: id.to_string(),
            name: format!("test {}", id),
            description: String::new(),
            operations: json!([]),
            assertions: serde_json::Map::new(),
        }
    }

    fn context(id: &str, state: ContextState, specs: Vec<TestCaseSpec>) -> ExecutionContext {
        ExecutionContext {
            id: id.to_string(),
            state,
            test_cases: specs,
        }
    }

    fn raw_result(status: ExecStatus, stdout: &str) -> RawExecutionResult {
        RawExecutionResult {
            success: status == ExecStatus::Success,
            status,
            exit_code: Some(if status == ExecStatus::Success { 0 } else { 1 }),
            duration_ms: 120,
            stdout: stdout.to_string(),
            stderr: String::new(),
            error: None,
        }
    }

    fn wire_results(entries: Value) -> String {
        serde_json::to_string(&json!({ "results": entries })).unwrap()
    }

    struct Fixture {
        orchestrator: Orchestrator,
        backend_calls: Arc<AtomicUsize>,
        persisted: Arc<Mutex<Vec<ExecutionRecord>>>,
    }

    fn fixture(contexts: Vec<ExecutionContext>, result: RawExecutionResult, sink_fails: bool) -> Fixture {
        let calls = Arc::new(AtomicUsize::new(0));
        let persisted = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = Orchestrator::new(
            Box::new(MemoryContexts {
                contexts: contexts.into_iter().map(|c| (c.id.clone(), c)).collect(),
            }),
            Box::new(ScriptedBackend {
                result,
                calls: calls.clone(),
            }),
            Box::new(MemorySink {
                records: persisted.clone(),
                fail: sink_fails,
            }),
        );
        Fixture {
            orchestrator,
            backend_calls: calls,
            persisted,
        }
    }

    #[tokio::test]
    async fn test_all_tests_pass() {
        let specs = vec![spec("a"), spec("b"), spec("c")];
        let stdout = wire_results(json!([
            { "id": "a", "passed": true },
            { "id": "b", "passed": true },
            { "id": "c", "passed": true }
        ]));
        let fx = fixture(
            vec![context("int-1", ContextState::Active, specs)],
            raw_result(ExecStatus::Success, &stdout),
            false,
        );

        let record = fx
            .orchestrator
            .execute("int-1", Language::Python, "class Foo: pass")
            .await
            .unwrap();

        assert_eq!(record.status, ExecStatus::Success);
        assert_eq!(record.tests_passed, 3);
        assert_eq!(record.tests_total, 3);
        assert_eq!(record.auto_score, 100);
        assert_eq!(fx.persisted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_scores_sixty() {
        let specs = (0..5).map(|i| spec(&format!("t{}", i))).collect::<Vec<_>>();
        let stdout = wire_results(json!([
            { "id": "t0", "passed": true },
            { "id": "t1", "passed": true },
            { "id": "t2", "passed": true },
            { "id": "t3", "passed": false },
            { "id": "t4", "passed": false }
        ]));
        let fx = fixture(
            vec![context("int-1", ContextState::Active, specs)],
            raw_result(ExecStatus::Success, &stdout),
            false,
        );

        let record = fx
            .orchestrator
            .execute("int-1", Language::Javascript, "")
            .await
            .unwrap();

        assert_eq!(record.tests_passed, 3);
        assert_eq!(record.tests_total, 5);
        assert_eq!(record.auto_score, 60);
    }

    #[tokio::test]
    async fn test_compilation_error_fails_all_verdicts() {
        let specs = vec![spec("a"), spec("b")];
        let fx = fixture(
            vec![context("int-1", ContextState::Active, specs)],
            raw_result(ExecStatus::CompilationError, ""),
            false,
        );

        let record = fx
            .orchestrator
            .execute("int-1", Language::Python, "def broken(")
            .await
            .unwrap();

        assert_eq!(record.status, ExecStatus::CompilationError);
        assert_eq!(record.tests_total, 2);
        assert_eq!(record.tests_passed, 0);
        assert!(record.verdicts.iter().all(|v| !v.passed));
        assert_eq!(record.auto_score, 0);
    }

    #[tokio::test]
    async fn test_malformed_stdout_yields_full_verdict_list() {
        let specs = vec![spec("a"), spec("b"), spec("c")];
        let fx = fixture(
            vec![context("int-1", ContextState::Active, specs)],
            raw_result(ExecStatus::Error, "segfault gibberish \x01\x02"),
            false,
        );

        let record = fx
            .orchestrator
            .execute("int-1", Language::Python, "")
            .await
            .unwrap();

        assert_eq!(record.verdicts.len(), 3);
        assert!(record.verdicts.iter().all(|v| !v.passed));
        assert_eq!(record.status, ExecStatus::Error);
    }

    #[tokio::test]
    async fn test_timeout_ignores_partial_results() {
        let specs = vec![spec("a")];
        // even a well-formed passing marker must be ignored on timeout
        let stdout = wire_results(json!([{ "id": "a", "passed": true }]));
        let fx = fixture(
            vec![context("int-1", ContextState::Active, specs)],
            raw_result(ExecStatus::Timeout, &stdout),
            false,
        );

        let record = fx
            .orchestrator
            .execute("int-1", Language::Python, "")
            .await
            .unwrap();

        assert_eq!(record.status, ExecStatus::Timeout);
        assert_eq!(record.tests_passed, 0);
        assert!(record.verdicts[0]
            .error
            .as_deref()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_no_test_cases_short_circuits() {
        let fx = fixture(
            vec![context("int-1", ContextState::Active, vec![])],
            raw_result(ExecStatus::Success, ""),
            false,
        );

        let record = fx
            .orchestrator
            .execute("int-1", Language::Python, "print('hi')")
            .await
            .unwrap();

        assert_eq!(record.status, ExecStatus::Success);
        assert_eq!(record.tests_total, 0);
        assert_eq!(record.auto_score, 0);
        assert_eq!(fx.backend_calls.load(Ordering::SeqCst), 0, "sandbox must not run");
        assert_eq!(fx.persisted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inactive_context_is_rejected_before_execution() {
        let fx = fixture(
            vec![context("int-1", ContextState::Completed, vec![spec("a")])],
            raw_result(ExecStatus::Success, ""),
            false,
        );

        let err = fx
            .orchestrator
            .execute("int-1", Language::Python, "")
            .await
            .unwrap_err();

        assert!(matches!(err, PreconditionError::ContextNotActive(_)));
        assert_eq!(fx.backend_calls.load(Ordering::SeqCst), 0);
        assert!(fx.persisted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_context_is_rejected() {
        let fx = fixture(vec![], raw_result(ExecStatus::Success, ""), false);

        let err = fx
            .orchestrator
            .execute("ghost", Language::Python, "")
            .await
            .unwrap_err();

        assert!(matches!(err, PreconditionError::ContextNotFound(_)));
    }

    #[tokio::test]
    async fn test_unsupported_language_is_rejected() {
        let fx = fixture(
            vec![context("int-1", ContextState::Active, vec![spec("a")])],
            raw_result(ExecStatus::Success, ""),
            false,
        );

        let err = fx
            .orchestrator
            .execute("int-1", Language::Java, "")
            .await
            .unwrap_err();

        assert!(matches!(err, PreconditionError::UnsupportedLanguage(_)));
        assert_eq!(fx.backend_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_mask_result() {
        let specs = vec![spec("a")];
        let stdout = wire_results(json!([{ "id": "a", "passed": true }]));
        let fx = fixture(
            vec![context("int-1", ContextState::Active, specs)],
            raw_result(ExecStatus::Success, &stdout),
            true, // sink always fails
        );

        let record = fx
            .orchestrator
            .execute("int-1", Language::Python, "")
            .await
            .unwrap();

        assert_eq!(record.auto_score, 100);
    }
}
