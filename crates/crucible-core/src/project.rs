//! Multi-file project execution
//!
//! Resolves an entry point among a set of named files and forwards the rest
//! as auxiliary files to the engine. The entry point is named without its
//! extension; the language supplies it.

use std::collections::HashMap;

use crate::config::ExecutionConfig;
use crate::core_types::{ExecutionRequest, ExecutionResult};
use crate::engine::Executor;
use crate::languages::ExecutionLanguage;

/// Executes `files[entry_point + ext]` as the main code with every other
/// file written alongside it. A missing entry point fails fast with an
/// `Error` result; no process is spawned.
pub async fn execute_project(
    executor: &dyn Executor,
    files: HashMap<String, String>,
    language: ExecutionLanguage,
    entry_point: &str,
    config: ExecutionConfig,
) -> ExecutionResult {
    let entry_file = format!("{}.{}", entry_point, language.extension());

    let mut files = files;
    let Some(main_code) = files.remove(&entry_file) else {
        return ExecutionResult::engine_error(format!(
            "entry point '{}' not found among project files",
            entry_file
        ));
    };

    if config.install_dependencies {
        // Extension point: manifest-driven dependency installation is not
        // implemented. Sandbox images are expected to already provide
        // common packages.
        log::debug!(
            "install_dependencies requested for {} project; no installer is wired in",
            language
        );
    }

    executor
        .execute(
            ExecutionRequest::new(main_code, language)
                .with_config(config)
                .with_files(files),
        )
        .await
}
