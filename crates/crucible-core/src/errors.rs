//! Error types for failure handling across the execution engine
//!
//! Internal failures are modeled as a single `thiserror` hierarchy. Almost
//! none of these variants ever reach a caller of the public API: the engine
//! boundary folds them into a typed `ExecutionResult` so that a failed run
//! is data, not an exception. The variants exist so the backends and the
//! retry controller can distinguish "the child timed out" from "Docker is
//! unreachable" while that distinction still matters.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Bollard (Docker client) error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("I/O error during sandbox operation: {0}")]
    Io(#[from] std::io::Error),
    #[error("UTF-8 decoding error from slice: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("Execution timed out")]
    Timeout,
    #[error("Could not prepare workspace: {0}")]
    Workspace(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Fix provider failed: {0}")]
    FixProvider(String),
    #[error("Invalid execution request: {0}")]
    InvalidRequest(String),
}
