//! Supported execution languages and their sandbox registry entries
//!
//! Each language is a variant of a closed enum carrying its own registry
//! data: the Docker image the isolated backend launches, the source file
//! extension the engine writes, and the argv that runs the main file inside
//! the workspace. Adding a language means adding a variant and filling in
//! these methods; no shared string-building branch needs editing.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// The main source file name, without extension, written into every workspace.
pub const MAIN_FILE_STEM: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionLanguage {
    Python,
    JavaScript,
    TypeScript,
    Go,
    Rust,
    Bash,
}

impl ExecutionLanguage {
    /// Docker image used by the isolated backend. Images are expected to be
    /// pre-pulled or pullable by the Docker daemon; this crate never manages
    /// a registry.
    pub fn image(&self) -> &'static str {
        match self {
            ExecutionLanguage::Python => "python:3.11-slim",
            ExecutionLanguage::JavaScript => "node:20-slim",
            ExecutionLanguage::TypeScript => "denoland/deno:alpine",
            ExecutionLanguage::Go => "golang:1.22-alpine",
            ExecutionLanguage::Rust => "rust:1.79-slim",
            ExecutionLanguage::Bash => "bash:5",
        }
    }

    /// Source file extension, without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ExecutionLanguage::Python => "py",
            ExecutionLanguage::JavaScript => "js",
            ExecutionLanguage::TypeScript => "ts",
            ExecutionLanguage::Go => "go",
            ExecutionLanguage::Rust => "rs",
            ExecutionLanguage::Bash => "sh",
        }
    }

    /// File name of the entry point written by the engine, e.g. `main.py`.
    pub fn main_file(&self) -> String {
        format!("{}.{}", MAIN_FILE_STEM, self.extension())
    }

    /// Argv that runs the main file rooted at `workspace_root` (the bind
    /// mount point for the isolated backend, the workspace directory itself
    /// for the local one). Paths are absolute so a working-directory
    /// override cannot make the main file unresolvable. Compiled languages
    /// compile and run in one shell step, writing the binary into the
    /// workspace, which stays writable in both backends.
    pub fn command(&self, workspace_root: &Path) -> Vec<String> {
        let main = workspace_root.join(self.main_file()).display().to_string();
        match self {
            ExecutionLanguage::Python => vec!["python3".into(), main],
            ExecutionLanguage::JavaScript => vec!["node".into(), main],
            ExecutionLanguage::TypeScript => {
                vec!["deno".into(), "run".into(), "--allow-read".into(), main]
            }
            ExecutionLanguage::Go => vec!["go".into(), "run".into(), main],
            ExecutionLanguage::Rust => {
                let binary = workspace_root.join("main.bin").display().to_string();
                vec![
                    "sh".into(),
                    "-c".into(),
                    format!("rustc {} -o {} && {}", main, binary, binary),
                ]
            }
            ExecutionLanguage::Bash => vec!["bash".into(), main],
        }
    }

    /// Lowercase name used in logs and serialized results.
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionLanguage::Python => "python",
            ExecutionLanguage::JavaScript => "javascript",
            ExecutionLanguage::TypeScript => "typescript",
            ExecutionLanguage::Go => "go",
            ExecutionLanguage::Rust => "rust",
            ExecutionLanguage::Bash => "bash",
        }
    }
}

impl std::fmt::Display for ExecutionLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
