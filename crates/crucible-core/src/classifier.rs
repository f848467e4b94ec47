//! Output parsing and error classification
//!
//! Turns a raw (exit code, stdout, stderr) triple into a typed
//! `ExecutionResult`. Each language has its own small pattern table for
//! extracting an error type token, a message and a 1-based line number from
//! stderr. Classification never fails: an unmatched stderr degrades to the
//! generic `Error` status with the raw tail preserved in `traceback`.

use regex::Regex;
use std::sync::OnceLock;

use crate::backends::RawOutput;
use crate::core_types::{ErrorDetail, ExecutionResult, ExecutionStatus};
use crate::languages::ExecutionLanguage;

/// Lines of stderr preserved as the traceback tail.
const TRACEBACK_TAIL_LINES: usize = 20;

/// Exit code the kernel reports for a SIGKILL, which is what a container
/// receives when it crosses its memory ceiling.
const EXIT_OOM_KILLED: i64 = 137;

macro_rules! static_regex {
    ($pattern:expr) => {{
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new($pattern).expect("invalid classifier pattern"))
    }};
}

/// Classifies one raw backend outcome. `duration_ms` is left at zero; the
/// engine owns wall-clock accounting.
pub fn classify(language: ExecutionLanguage, raw: &RawOutput) -> ExecutionResult {
    let stderr_clean = raw.stderr.trim();

    if raw.exit_code == Some(0) && stderr_clean.is_empty() {
        return ExecutionResult {
            status: ExecutionStatus::Success,
            stdout: raw.stdout.clone(),
            stderr: raw.stderr.clone(),
            exit_code: raw.exit_code,
            duration_ms: 0,
            error: None,
            test_summary: None,
        };
    }

    let (status, mut detail) = match_language_error(language, &raw.stderr)
        .map(|(status, detail)| (status, Some(detail)))
        .unwrap_or_else(|| {
            if raw.exit_code == Some(EXIT_OOM_KILLED) {
                (
                    ExecutionStatus::ResourceLimit,
                    Some(ErrorDetail {
                        message: Some("process killed at resource ceiling".to_string()),
                        ..Default::default()
                    }),
                )
            } else {
                (ExecutionStatus::Error, Some(ErrorDetail::default()))
            }
        });

    if let Some(detail) = detail.as_mut() {
        if !stderr_clean.is_empty() {
            detail.traceback = Some(tail_lines(&raw.stderr, TRACEBACK_TAIL_LINES));
        }
    }

    ExecutionResult {
        status,
        stdout: raw.stdout.clone(),
        stderr: raw.stderr.clone(),
        exit_code: raw.exit_code,
        duration_ms: 0,
        error: detail,
        test_summary: None,
    }
}

fn match_language_error(
    language: ExecutionLanguage,
    stderr: &str,
) -> Option<(ExecutionStatus, ErrorDetail)> {
    match language {
        ExecutionLanguage::Python => match_python(stderr),
        ExecutionLanguage::JavaScript | ExecutionLanguage::TypeScript => match_node(stderr),
        ExecutionLanguage::Go => match_go(stderr),
        ExecutionLanguage::Rust => match_rust(stderr),
        ExecutionLanguage::Bash => match_bash(stderr),
    }
}

/// Maps an extracted error type token onto the status taxonomy.
fn status_for_token(token: &str) -> ExecutionStatus {
    let token = token.to_ascii_lowercase();
    if token.contains("syntax") || token.contains("indentation") || token.contains("compile") {
        ExecutionStatus::SyntaxError
    } else if token.contains("import") || token.contains("modulenotfound") {
        ExecutionStatus::ImportError
    } else {
        ExecutionStatus::RuntimeError
    }
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

fn match_python(stderr: &str) -> Option<(ExecutionStatus, ErrorDetail)> {
    // Last "<Type>Error: <msg>" / "<Type>Exception: <msg>" line wins; the
    // traceback prints cause-first, error-last.
    let error_re = static_regex!(r"(?m)^(\w+(?:Error|Exception|Interrupt|Exit)): ?(.*)$");
    let line_re = static_regex!(r#"File "[^"]+", line (\d+)"#);

    let caps = error_re.captures_iter(stderr).last()?;
    let error_type = caps[1].to_string();
    let message = caps[2].trim().to_string();
    let line = line_re
        .captures_iter(stderr)
        .last()
        .and_then(|c| c[1].parse::<u32>().ok());

    Some((
        status_for_token(&error_type),
        ErrorDetail {
            error_type: Some(error_type),
            message: Some(message),
            line,
            traceback: None,
        },
    ))
}

fn match_node(stderr: &str) -> Option<(ExecutionStatus, ErrorDetail)> {
    let error_re = static_regex!(r"(?m)^(?:error: Uncaught (?:\(in promise\) )?)?(\w+Error): ?(.*)$");
    // Stack frames and syntax headers both carry "main.<ext>:<line>" markers.
    let line_re = static_regex!(r"main\.[jt]s:(\d+)");

    let caps = error_re.captures_iter(stderr).last()?;
    let error_type = caps[1].to_string();
    let message = caps[2].trim().to_string();
    let line = line_re
        .captures(stderr)
        .and_then(|c| c[1].parse::<u32>().ok());

    let status = if message.contains("Cannot find module")
        || message.contains("Module not found")
        || message.contains("Cannot find package")
    {
        ExecutionStatus::ImportError
    } else {
        status_for_token(&error_type)
    };

    Some((
        status,
        ErrorDetail {
            error_type: Some(error_type),
            message: Some(message),
            line,
            traceback: None,
        },
    ))
}

fn match_go(stderr: &str) -> Option<(ExecutionStatus, ErrorDetail)> {
    let compile_re = static_regex!(r"(?m)^(?:\S*/)?main\.go:(\d+):(?:\d+:)? ?(.*)$");
    let panic_re = static_regex!(r"(?m)^panic: ?(.*)$");

    if let Some(caps) = compile_re.captures(stderr) {
        let line = caps[1].parse::<u32>().ok();
        let message = caps[2].trim().to_string();
        let (status, error_type) = if message.contains("cannot find package")
            || message.contains("no required module provides")
        {
            (ExecutionStatus::ImportError, "ImportError")
        } else if message.contains("syntax error") || message.contains("expected") {
            (ExecutionStatus::SyntaxError, "SyntaxError")
        } else {
            (ExecutionStatus::SyntaxError, "CompileError")
        };
        return Some((
            status,
            ErrorDetail {
                error_type: Some(error_type.to_string()),
                message: Some(message),
                line,
                traceback: None,
            },
        ));
    }

    if let Some(caps) = panic_re.captures(stderr) {
        let line_re = static_regex!(r"main\.go:(\d+)");
        let line = line_re
            .captures(stderr)
            .and_then(|c| c[1].parse::<u32>().ok());
        return Some((
            ExecutionStatus::RuntimeError,
            ErrorDetail {
                error_type: Some("panic".to_string()),
                message: Some(caps[1].trim().to_string()),
                line,
                traceback: None,
            },
        ));
    }

    None
}

fn match_rust(stderr: &str) -> Option<(ExecutionStatus, ErrorDetail)> {
    let compile_re = static_regex!(r"(?m)^error(\[E\d+\])?: ?(.*)$");
    let line_re = static_regex!(r"main\.rs:(\d+)");
    let panic_re = static_regex!(r"(?m)^thread '[^']+' panicked at [^:]*main\.rs:(\d+):\d+:?\s*(.*)$");

    if let Some(caps) = panic_re.captures(stderr) {
        let line = caps[1].parse::<u32>().ok();
        let mut message = caps[2].trim().to_string();
        if message.is_empty() {
            // Newer rustc prints the panic payload on the following line.
            message = stderr
                .lines()
                .skip_while(|l| !l.contains("panicked at"))
                .nth(1)
                .unwrap_or("")
                .trim()
                .to_string();
        }
        return Some((
            ExecutionStatus::RuntimeError,
            ErrorDetail {
                error_type: Some("panic".to_string()),
                message: Some(message),
                line,
                traceback: None,
            },
        ));
    }

    let caps = compile_re.captures(stderr)?;
    let code = caps.get(1).map(|m| m.as_str().to_string());
    let message = caps[2].trim().to_string();
    if message.starts_with("aborting due to") {
        return None;
    }
    let line = line_re
        .captures(stderr)
        .and_then(|c| c[1].parse::<u32>().ok());

    let status = if message.contains("unresolved import")
        || message.contains("can't find crate")
        || message.contains("use of undeclared crate or module")
    {
        ExecutionStatus::ImportError
    } else {
        ExecutionStatus::SyntaxError
    };

    Some((
        status,
        ErrorDetail {
            error_type: code.or_else(|| Some("CompileError".to_string())),
            message: Some(message),
            line,
            traceback: None,
        },
    ))
}

fn match_bash(stderr: &str) -> Option<(ExecutionStatus, ErrorDetail)> {
    let line_re = static_regex!(r"(?m)main\.sh: line (\d+): ?(.*)$");

    let caps = line_re.captures(stderr)?;
    let line = caps[1].parse::<u32>().ok();
    let message = caps[2].trim().to_string();

    let (status, error_type) = if message.contains("command not found") {
        (ExecutionStatus::ImportError, "CommandNotFound")
    } else if message.contains("syntax error") {
        (ExecutionStatus::SyntaxError, "SyntaxError")
    } else {
        (ExecutionStatus::RuntimeError, "ShellError")
    };

    Some((
        status,
        ErrorDetail {
            error_type: Some(error_type.to_string()),
            message: Some(message),
            line,
            traceback: None,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(exit_code: i64, stdout: &str, stderr: &str) -> RawOutput {
        RawOutput {
            exit_code: Some(exit_code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_clean_exit_is_success() {
        let result = classify(ExecutionLanguage::Python, &raw(0, "hello\n", ""));
        assert_eq!(result.status, ExecutionStatus::Success);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_zero_exit_with_stderr_is_not_success() {
        let result = classify(ExecutionLanguage::Bash, &raw(0, "", "something odd\n"));
        assert_ne!(result.status, ExecutionStatus::Success);
    }

    #[test]
    fn test_python_syntax_error() {
        let stderr = concat!(
            "  File \"/work/main.py\", line 3\n",
            "    def broken(\n",
            "              ^\n",
            "SyntaxError: '(' was never closed\n",
        );
        let result = classify(ExecutionLanguage::Python, &raw(1, "", stderr));
        assert_eq!(result.status, ExecutionStatus::SyntaxError);
        let detail = result.error.unwrap();
        assert_eq!(detail.error_type.as_deref(), Some("SyntaxError"));
        assert_eq!(detail.line, Some(3));
    }

    #[test]
    fn test_python_missing_import() {
        let stderr = concat!(
            "Traceback (most recent call last):\n",
            "  File \"/work/main.py\", line 1, in <module>\n",
            "    import nonexistent_pkg\n",
            "ModuleNotFoundError: No module named 'nonexistent_pkg'\n",
        );
        let result = classify(ExecutionLanguage::Python, &raw(1, "", stderr));
        assert_eq!(result.status, ExecutionStatus::ImportError);
        let detail = result.error.unwrap();
        assert_eq!(detail.error_type.as_deref(), Some("ModuleNotFoundError"));
        assert_eq!(detail.line, Some(1));
    }

    #[test]
    fn test_python_runtime_error_uses_last_frame() {
        let stderr = concat!(
            "Traceback (most recent call last):\n",
            "  File \"/work/main.py\", line 7, in <module>\n",
            "    run()\n",
            "  File \"/work/main.py\", line 4, in run\n",
            "    return 1 / 0\n",
            "ZeroDivisionError: division by zero\n",
        );
        let result = classify(ExecutionLanguage::Python, &raw(1, "", stderr));
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        let detail = result.error.unwrap();
        assert_eq!(detail.error_type.as_deref(), Some("ZeroDivisionError"));
        assert_eq!(detail.message.as_deref(), Some("division by zero"));
        assert_eq!(detail.line, Some(4));
        assert!(detail.traceback.is_some());
    }

    #[test]
    fn test_javascript_type_error_with_stack_marker() {
        let stderr = concat!(
            "/work/main.js:2\n",
            "undefined.foo();\n",
            "^\n",
            "\n",
            "TypeError: Cannot read properties of undefined (reading 'foo')\n",
            "    at Object.<anonymous> (/work/main.js:2:11)\n",
        );
        let result = classify(ExecutionLanguage::JavaScript, &raw(1, "", stderr));
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        let detail = result.error.unwrap();
        assert_eq!(detail.error_type.as_deref(), Some("TypeError"));
        assert_eq!(detail.line, Some(2));
    }

    #[test]
    fn test_javascript_missing_module() {
        let stderr =
            "Error: Cannot find module 'left-pad'\nRequire stack:\n- /work/main.js\n";
        let result = classify(ExecutionLanguage::JavaScript, &raw(1, "", stderr));
        assert_eq!(result.status, ExecutionStatus::ImportError);
    }

    #[test]
    fn test_go_compile_diagnostic() {
        let stderr = "./main.go:5:2: undefined: fmt.Printlnn\n";
        let result = classify(ExecutionLanguage::Go, &raw(1, "", stderr));
        assert_eq!(result.status, ExecutionStatus::SyntaxError);
        let detail = result.error.unwrap();
        assert_eq!(detail.line, Some(5));
        assert!(detail.message.unwrap().contains("undefined"));
    }

    #[test]
    fn test_go_diagnostic_with_absolute_path_prefix() {
        let stderr = "/work/main.go:3:14: syntax error: unexpected newline\n";
        let result = classify(ExecutionLanguage::Go, &raw(1, "", stderr));
        assert_eq!(result.status, ExecutionStatus::SyntaxError);
        assert_eq!(result.error.unwrap().line, Some(3));
    }

    #[test]
    fn test_go_panic_is_runtime() {
        let stderr = concat!(
            "panic: runtime error: index out of range [3] with length 2\n",
            "\n",
            "goroutine 1 [running]:\n",
            "main.main()\n",
            "\t/work/main.go:6 +0x1d\n",
        );
        let result = classify(ExecutionLanguage::Go, &raw(2, "", stderr));
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        assert_eq!(result.error.unwrap().line, Some(6));
    }

    #[test]
    fn test_rust_unresolved_import() {
        let stderr = concat!(
            "error[E0432]: unresolved import `serde`\n",
            " --> main.rs:1:5\n",
            "  |\n",
            "1 | use serde::Serialize;\n",
            "  |     ^^^^^ use of undeclared crate or module `serde`\n",
        );
        let result = classify(ExecutionLanguage::Rust, &raw(1, "", stderr));
        assert_eq!(result.status, ExecutionStatus::ImportError);
        assert_eq!(result.error.unwrap().line, Some(1));
    }

    #[test]
    fn test_rust_panic() {
        let stderr = concat!(
            "thread 'main' panicked at main.rs:3:5:\n",
            "attempt to divide by zero\n",
            "note: run with `RUST_BACKTRACE=1` environment variable\n",
        );
        let result = classify(ExecutionLanguage::Rust, &raw(101, "", stderr));
        assert_eq!(result.status, ExecutionStatus::RuntimeError);
        let detail = result.error.unwrap();
        assert_eq!(detail.line, Some(3));
        assert_eq!(detail.message.as_deref(), Some("attempt to divide by zero"));
    }

    #[test]
    fn test_bash_command_not_found() {
        let stderr = "main.sh: line 2: frobnicate: command not found\n";
        let result = classify(ExecutionLanguage::Bash, &raw(127, "", stderr));
        assert_eq!(result.status, ExecutionStatus::ImportError);
        assert_eq!(result.error.unwrap().line, Some(2));
    }

    #[test]
    fn test_oom_kill_maps_to_resource_limit() {
        let result = classify(ExecutionLanguage::Python, &raw(137, "", ""));
        assert_eq!(result.status, ExecutionStatus::ResourceLimit);
    }

    #[test]
    fn test_unmatched_stderr_degrades_to_generic_error() {
        let stderr = "completely unrecognizable failure output\n";
        let result = classify(ExecutionLanguage::Python, &raw(3, "", stderr));
        assert_eq!(result.status, ExecutionStatus::Error);
        let detail = result.error.unwrap();
        assert!(detail.message.is_none());
        assert!(detail.traceback.unwrap().contains("unrecognizable"));
    }
}
