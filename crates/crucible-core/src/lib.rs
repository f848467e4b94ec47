//! Sandboxed multi-language code execution with an automated fix-retry loop.
//!
//! This crate runs one self-contained unit of generated code per call inside
//! an isolated environment, captures a structured result, and classifies
//! failures into a taxonomy an external fix generator can act on. On top of
//! the engine sit three small orchestration layers: a bounded retry loop
//! driven by a caller-supplied fix provider, a multi-file project runner,
//! and a code+test combinator that turns a (code, tests) pair into a single
//! runnable unit and recovers its pass/fail counts.
//!
//! # Architecture Overview
//!
//! - **Language registry**: a closed enum mapping each supported language to
//!   its sandbox image, file extension and invocation command
//! - **Execution backends**: Docker-isolated containers when a daemon is
//!   reachable, a warned-about local process fallback otherwise
//! - **Classifier**: per-language stderr pattern tables producing error
//!   type, message and line number
//! - **Engine**: workspace lifecycle, timeout enforcement, and the
//!   "execute never raises" boundary
//! - **Retry controller**: execute-fix-retry with stall detection and a
//!   hard attempt budget
//!
//! Every `execute` call is independent; the only shared state is the
//! once-probed backend selection.

pub mod backends;
pub mod classifier;
pub mod config;
pub mod core_types;
pub mod engine;
pub mod errors;
pub mod languages;
pub mod project;
pub mod retry;
pub mod test_harness;

pub use backends::{DockerBackend, ExecutionBackend, LocalBackend, RawOutput};
pub use classifier::classify;
pub use config::ExecutionConfig;
pub use core_types::{
    ErrorDetail, ExecutionRequest, ExecutionResult, ExecutionStatus, TestSummary,
};
pub use engine::{ExecutionEngine, Executor};
pub use errors::SandboxError;
pub use languages::ExecutionLanguage;
pub use project::execute_project;
pub use retry::{execute_with_retry, FixProvider, RetryAttempt, RetrySession, StopReason};
pub use test_harness::{combine_and_run, combine_sources};
