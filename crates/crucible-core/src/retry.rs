//! Bounded execute-fix-retry orchestration
//!
//! Wraps an executor in a loop that hands each failure to an external fix
//! provider (in practice an LLM-backed generator) and re-runs the proposed
//! code. The loop is guaranteed to terminate: it stops on success, when the
//! provider returns the code unchanged (a stall), when the provider itself
//! fails, or when the attempt budget is exhausted. Whatever happens, the
//! caller gets back the last code, its result and the full attempt log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ExecutionConfig;
use crate::core_types::{ExecutionRequest, ExecutionResult, ExecutionStatus};
use crate::engine::Executor;
use crate::errors::SandboxError;
use crate::languages::ExecutionLanguage;

/// External fix generator contract. Called at most once per failed attempt
/// with the code that failed and its classified result.
#[async_trait]
pub trait FixProvider: Send + Sync {
    async fn propose_fix(
        &self,
        code: &str,
        result: &ExecutionResult,
    ) -> Result<String, SandboxError>;
}

/// Why a retry session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Succeeded,
    /// The provider returned the input code byte-for-byte unchanged.
    Stalled,
    /// The provider itself failed; the last known state is still returned.
    FixFailed,
    RetriesExhausted,
}

/// One entry of the per-session attempt log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based attempt index.
    pub index: u32,
    /// Short sha256 digest of the code at this attempt.
    pub fingerprint: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Final state of a retry session: the best code we have, its result, and
/// the append-only attempt log.
#[derive(Debug)]
pub struct RetrySession {
    pub final_code: String,
    pub final_result: ExecutionResult,
    pub attempts: Vec<RetryAttempt>,
    pub stop: StopReason,
}

/// Short deterministic digest used for the attempt log. Exact string
/// equality remains the stall contract; the fingerprint exists so callers
/// can compare attempts without holding every code version.
pub fn fingerprint(code: &str) -> String {
    let digest = Sha256::digest(code.as_bytes());
    let mut out = String::with_capacity(16);
    for byte in &digest[..8] {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Runs up to `max_retries` sequential attempts. Attempt `i + 1` never
/// starts before attempt `i`'s result and its fix callback have completed.
pub async fn execute_with_retry(
    executor: &dyn Executor,
    code: &str,
    language: ExecutionLanguage,
    fixer: &dyn FixProvider,
    max_retries: u32,
    config: ExecutionConfig,
) -> RetrySession {
    let mut current_code = code.to_string();
    let mut attempts = Vec::new();
    let mut last_result = None;

    for index in 1..=max_retries {
        let request = ExecutionRequest::new(current_code.clone(), language)
            .with_config(config.clone());
        let result = executor.execute(request).await;

        attempts.push(RetryAttempt {
            index,
            fingerprint: fingerprint(&current_code),
            status: result.status,
            error_message: result
                .error
                .as_ref()
                .and_then(|detail| detail.message.clone()),
        });

        if result.status.is_success() {
            return RetrySession {
                final_code: current_code,
                final_result: result,
                attempts,
                stop: StopReason::Succeeded,
            };
        }

        let proposed = match fixer.propose_fix(&current_code, &result).await {
            Ok(proposed) => proposed,
            Err(e) => {
                log::warn!("Fix provider failed on attempt {}: {}", index, e);
                return RetrySession {
                    final_code: current_code,
                    final_result: result,
                    attempts,
                    stop: StopReason::FixFailed,
                };
            }
        };

        if proposed == current_code {
            log::debug!("Fix provider stalled on attempt {}", index);
            return RetrySession {
                final_code: current_code,
                final_result: result,
                attempts,
                stop: StopReason::Stalled,
            };
        }

        current_code = proposed;
        last_result = Some(result);
    }

    // Budget exhausted, or it was zero to begin with.
    let final_result = last_result
        .unwrap_or_else(|| ExecutionResult::engine_error("retry budget was zero, nothing was executed"));
    RetrySession {
        final_code: current_code,
        final_result,
        attempts,
        stop: StopReason::RetriesExhausted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::RawOutput;
    use crate::classifier::classify;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Executor whose verdicts are scripted per code string: code containing
    /// "fixed" succeeds, anything else raises a NameError.
    struct VerdictExecutor {
        calls: AtomicU32,
    }

    impl VerdictExecutor {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Executor for VerdictExecutor {
        async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let raw = if request.code.contains("fixed") {
                RawOutput {
                    exit_code: Some(0),
                    stdout: "ok\n".to_string(),
                    stderr: String::new(),
                }
            } else {
                RawOutput {
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: "Traceback (most recent call last):\n  File \"/work/main.py\", line 1, in <module>\nNameError: name 'x' is not defined\n".to_string(),
                }
            };
            classify(request.language, &raw)
        }
    }

    struct ScriptedFixer {
        responses: Mutex<Vec<Result<String, SandboxError>>>,
    }

    impl ScriptedFixer {
        fn new(responses: Vec<Result<String, SandboxError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl FixProvider for ScriptedFixer {
        async fn propose_fix(
            &self,
            code: &str,
            _result: &ExecutionResult,
        ) -> Result<String, SandboxError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(code.to_string())
            } else {
                responses.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_second_attempt() {
        let executor = VerdictExecutor::new();
        let fixer = ScriptedFixer::new(vec![Ok("fixed = True".to_string())]);

        let session = execute_with_retry(
            &executor,
            "broken",
            ExecutionLanguage::Python,
            &fixer,
            5,
            ExecutionConfig::default(),
        )
        .await;

        assert_eq!(session.stop, StopReason::Succeeded);
        assert_eq!(session.attempts.len(), 2);
        assert_eq!(session.final_code, "fixed = True");
        assert!(session.final_result.status.is_success());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
        // The failed attempt logged its classified message.
        assert!(session.attempts[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("not defined"));
    }

    #[tokio::test]
    async fn test_unchanged_fix_stalls_after_one_attempt() {
        let executor = VerdictExecutor::new();
        let fixer = ScriptedFixer::new(vec![]);

        let session = execute_with_retry(
            &executor,
            "broken",
            ExecutionLanguage::Python,
            &fixer,
            5,
            ExecutionConfig::default(),
        )
        .await;

        assert_eq!(session.stop, StopReason::Stalled);
        assert_eq!(session.attempts.len(), 1);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.final_code, "broken");
    }

    #[tokio::test]
    async fn test_fix_provider_failure_aborts_with_last_state() {
        let executor = VerdictExecutor::new();
        let fixer = ScriptedFixer::new(vec![Err(SandboxError::FixProvider(
            "provider offline".to_string(),
        ))]);

        let session = execute_with_retry(
            &executor,
            "broken",
            ExecutionLanguage::Python,
            &fixer,
            5,
            ExecutionConfig::default(),
        )
        .await;

        assert_eq!(session.stop, StopReason::FixFailed);
        assert_eq!(session.attempts.len(), 1);
        assert_eq!(session.final_code, "broken");
        assert_eq!(
            session.final_result.status,
            ExecutionStatus::RuntimeError
        );
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_last_result() {
        let executor = VerdictExecutor::new();
        // Every proposal differs from the last, so only the budget stops us.
        let fixer = ScriptedFixer::new(vec![
            Ok("attempt_two".to_string()),
            Ok("attempt_three".to_string()),
            Ok("attempt_four".to_string()),
        ]);

        let session = execute_with_retry(
            &executor,
            "broken",
            ExecutionLanguage::Python,
            &fixer,
            3,
            ExecutionConfig::default(),
        )
        .await;

        assert_eq!(session.stop, StopReason::RetriesExhausted);
        assert_eq!(session.attempts.len(), 3);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(session.final_code, "attempt_four");
    }

    #[tokio::test]
    async fn test_zero_budget_executes_nothing() {
        let executor = VerdictExecutor::new();
        let fixer = ScriptedFixer::new(vec![]);

        let session = execute_with_retry(
            &executor,
            "broken",
            ExecutionLanguage::Python,
            &fixer,
            0,
            ExecutionConfig::default(),
        )
        .await;

        assert_eq!(session.stop, StopReason::RetriesExhausted);
        assert!(session.attempts.is_empty());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.final_result.status, ExecutionStatus::Error);
    }

    #[test]
    fn test_fingerprint_is_deterministic_and_short() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("abc").len(), 16);
    }
}
