//! Core result and request types shared across the engine
//!
//! These are the contract between the execution engine and its callers,
//! including the retry controller and any LLM-backed fix generator sitting
//! above it. A run always produces an `ExecutionResult`; failure modes are
//! values of `ExecutionStatus`, never exceptions, so a caller can branch on
//! the taxonomy without unwinding.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::ExecutionConfig;
use crate::languages::ExecutionLanguage;

/// Outcome taxonomy for a single execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Exit code 0 and empty stderr.
    Success,
    /// Uncategorized engine-level failure: malformed request, backend
    /// unreachable, workspace creation failure, unmatched stderr.
    Error,
    /// The process exceeded its wall-clock budget and was killed.
    Timeout,
    /// Parse/compile-stage failure in the executed language.
    SyntaxError,
    /// The code ran and raised.
    RuntimeError,
    /// A module, package or crate could not be resolved.
    ImportError,
    /// The sandbox killed the process at a resource ceiling.
    ResourceLimit,
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Success)
    }
}

/// Classified failure details extracted from stderr.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// The language's error type token, e.g. `NameError` or `E0425`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// 1-based line in the main source file, when a marker was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Tail of the raw stderr, kept for fix providers that want the full
    /// traceback rather than the extracted summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

/// Pass/fail counts recovered from a combined code+test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    pub passed: u32,
    pub failed: u32,
    pub total: u32,
}

/// The immutable outcome of one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// Captured stdout, truncated to the configured output ceiling.
    pub stdout: String,
    /// Captured stderr, truncated to the configured output ceiling.
    pub stderr: String,
    /// Real exit code observed by the backend; `None` when the process was
    /// killed before reporting one.
    pub exit_code: Option<i64>,
    /// Wall-clock time for the whole call, workspace setup included.
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_summary: Option<TestSummary>,
}

impl ExecutionResult {
    /// An engine-level failure that never reached a process. Used for
    /// malformed requests, unreachable backends and unexpected internal
    /// errors, per the "execute never raises" contract.
    pub fn engine_error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: ExecutionStatus::Error,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            duration_ms: 0,
            error: Some(ErrorDetail {
                error_type: None,
                message: Some(message),
                line: None,
                traceback: None,
            }),
            test_summary: None,
        }
    }
}

/// One execution request: main code plus any auxiliary files, bound to a
/// language and a config. Built per call and consumed by it.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: ExecutionLanguage,
    pub config: ExecutionConfig,
    /// Relative path -> content. Written into the workspace alongside the
    /// main file; insertion order is irrelevant.
    pub files: HashMap<String, String>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, language: ExecutionLanguage) -> Self {
        Self {
            code: code.into(),
            language,
            config: ExecutionConfig::default(),
            files: HashMap::new(),
        }
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_files(mut self, files: HashMap<String, String>) -> Self {
        self.files = files;
        self
    }
}
