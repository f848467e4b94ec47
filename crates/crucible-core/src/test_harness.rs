//! Code+test combination and pass/fail annotation
//!
//! Merges a source snippet and a test snippet into one runnable unit with a
//! generated driver appended. The driver discovers `test_`-prefixed
//! functions, invokes each independently, prints a final
//! `"<passed> passed, <failed> failed"` line and exits non-zero when
//! anything failed. After the run, the annotator recovers the counts from
//! stdout into `ExecutionResult::test_summary`.
//!
//! Go and Rust are deliberately not combinable here: their native test
//! harnesses own the driver role, and wiring those in is a separate
//! integration. Requests for them fail fast without spawning anything.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::ExecutionConfig;
use crate::core_types::{ExecutionRequest, ExecutionResult, TestSummary};
use crate::engine::Executor;
use crate::errors::SandboxError;
use crate::languages::ExecutionLanguage;

fn summary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+) passed, (\d+) failed").expect("invalid summary pattern"))
}

/// Extracts `test_`-prefixed function names from the tests source, in
/// declaration order.
fn discover_tests(tests: &str, language: ExecutionLanguage) -> Vec<String> {
    static PYTHON_RE: OnceLock<Regex> = OnceLock::new();
    static JS_RE: OnceLock<Regex> = OnceLock::new();
    static BASH_RE: OnceLock<Regex> = OnceLock::new();

    let re = match language {
        ExecutionLanguage::Python => PYTHON_RE
            .get_or_init(|| Regex::new(r"(?m)^def (test_\w+)\s*\(").expect("invalid pattern")),
        ExecutionLanguage::JavaScript | ExecutionLanguage::TypeScript => JS_RE.get_or_init(|| {
            Regex::new(r"(?m)^(?:async\s+)?function (test_\w+)\s*\(").expect("invalid pattern")
        }),
        ExecutionLanguage::Bash => BASH_RE.get_or_init(|| {
            Regex::new(r"(?m)^(?:function\s+)?(test_\w+)\s*\(\s*\)").expect("invalid pattern")
        }),
        ExecutionLanguage::Go | ExecutionLanguage::Rust => return Vec::new(),
    };

    re.captures_iter(tests).map(|c| c[1].to_string()).collect()
}

fn python_driver(names: &[String]) -> String {
    let list = names
        .iter()
        .map(|n| format!("\"{}\"", n))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"
if __name__ == "__main__":
    import sys
    _passed = 0
    _failed = 0
    for _name in [{list}]:
        try:
            globals()[_name]()
            _passed += 1
        except Exception as _exc:
            _failed += 1
            print("{{}}: {{}}".format(_name, _exc))
    print("{{}} passed, {{}} failed".format(_passed, _failed))
    sys.exit(0 if _failed == 0 else 1)
"#
    )
}

fn js_driver(names: &[String], language: ExecutionLanguage) -> String {
    let entries = names
        .iter()
        .map(|n| format!("[\"{n}\", {n}]"))
        .collect::<Vec<_>>()
        .join(", ");
    let exit = match language {
        ExecutionLanguage::TypeScript => "Deno.exit(failed === 0 ? 0 : 1);",
        _ => "process.exit(failed === 0 ? 0 : 1);",
    };
    format!(
        r#"
(async () => {{
    let passed = 0;
    let failed = 0;
    const cases = [{entries}];
    for (const [name, fn] of cases) {{
        try {{
            await fn();
            passed += 1;
        }} catch (err) {{
            failed += 1;
            console.log(name + ": " + (err && err.message ? err.message : err));
        }}
    }}
    console.log(passed + " passed, " + failed + " failed");
    {exit}
}})();
"#
    )
}

fn bash_driver(names: &[String]) -> String {
    let list = names.join(" ");
    format!(
        r#"
_passed=0
_failed=0
for _name in {list}; do
    if ( "$_name" ); then
        _passed=$((_passed + 1))
    else
        _failed=$((_failed + 1))
        echo "$_name: failed"
    fi
done
echo "$_passed passed, $_failed failed"
if [ "$_failed" -eq 0 ]; then exit 0; else exit 1; fi
"#
    )
}

/// Concatenates code, tests and the generated driver into one runnable unit.
pub fn combine_sources(
    code: &str,
    tests: &str,
    language: ExecutionLanguage,
) -> Result<String, SandboxError> {
    let names = discover_tests(tests, language);
    let driver = match language {
        ExecutionLanguage::Python => python_driver(&names),
        ExecutionLanguage::JavaScript | ExecutionLanguage::TypeScript => {
            js_driver(&names, language)
        }
        ExecutionLanguage::Bash => bash_driver(&names),
        ExecutionLanguage::Go | ExecutionLanguage::Rust => {
            return Err(SandboxError::Unsupported(format!(
                "code+test combination is not supported for {}; use the language's native harness",
                language
            )))
        }
    };

    Ok(format!("{}\n\n{}\n{}", code, tests, driver))
}

/// Scans stdout for the driver's summary line and fills in `test_summary`.
/// Absence of the pattern leaves the summary unset; it is never inferred
/// from the exit code.
pub fn annotate(mut result: ExecutionResult) -> ExecutionResult {
    if let Some(caps) = summary_regex().captures(&result.stdout) {
        let passed = caps[1].parse::<u32>().unwrap_or(0);
        let failed = caps[2].parse::<u32>().unwrap_or(0);
        result.test_summary = Some(TestSummary {
            passed,
            failed,
            total: passed + failed,
        });
    }
    result
}

/// Combines `code` and `tests`, runs the unit, and annotates the result
/// with the recovered pass/fail counts.
pub async fn combine_and_run(
    executor: &dyn Executor,
    code: &str,
    tests: &str,
    language: ExecutionLanguage,
    config: ExecutionConfig,
) -> ExecutionResult {
    let combined = match combine_sources(code, tests, language) {
        Ok(combined) => combined,
        Err(e) => return ExecutionResult::engine_error(e.to_string()),
    };

    let result = executor
        .execute(ExecutionRequest::new(combined, language).with_config(config))
        .await;
    annotate(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::ExecutionStatus;
    use async_trait::async_trait;

    #[test]
    fn test_discovery_finds_python_tests_in_order() {
        let tests = "def test_add():\n    assert add(1, 2) == 3\n\ndef helper():\n    pass\n\ndef test_sub():\n    assert sub(3, 1) == 2\n";
        let names = discover_tests(tests, ExecutionLanguage::Python);
        assert_eq!(names, vec!["test_add", "test_sub"]);
    }

    #[test]
    fn test_discovery_finds_js_and_bash_forms() {
        let js = "function test_one() {}\nasync function test_two() {}\n";
        assert_eq!(
            discover_tests(js, ExecutionLanguage::JavaScript),
            vec!["test_one", "test_two"]
        );

        let sh = "test_alpha() {\n  true\n}\nfunction test_beta() {\n  true\n}\n";
        assert_eq!(
            discover_tests(sh, ExecutionLanguage::Bash),
            vec!["test_alpha", "test_beta"]
        );
    }

    #[test]
    fn test_combined_unit_contains_code_tests_and_driver() {
        let combined = combine_sources(
            "def add(a, b):\n    return a + b\n",
            "def test_add():\n    assert add(1, 2) == 3\n",
            ExecutionLanguage::Python,
        )
        .unwrap();
        assert!(combined.contains("def add"));
        assert!(combined.contains("def test_add"));
        assert!(combined.contains("passed, {} failed"));
        assert!(combined.contains("\"test_add\""));
    }

    #[test]
    fn test_combination_rejected_for_compiled_harness_languages() {
        assert!(combine_sources("", "", ExecutionLanguage::Go).is_err());
        assert!(combine_sources("", "", ExecutionLanguage::Rust).is_err());
    }

    #[test]
    fn test_annotator_parses_summary_line() {
        let mut result = ExecutionResult::engine_error("placeholder");
        result.status = ExecutionStatus::RuntimeError;
        result.stdout = "test_bad: assertion failed\n1 passed, 1 failed\n".to_string();

        let annotated = annotate(result);
        let summary = annotated.test_summary.unwrap();
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total, 2);
    }

    #[test]
    fn test_annotator_leaves_summary_unset_without_pattern() {
        let mut result = ExecutionResult::engine_error("placeholder");
        result.stdout = "no counts here\n".to_string();
        assert!(annotate(result).test_summary.is_none());
    }

    /// Executor that simulates the driver's behavior for a one-pass,
    /// one-fail Python unit.
    struct DriverSimulator;

    #[async_trait]
    impl Executor for DriverSimulator {
        async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
            assert!(request.code.contains("__main__"));
            ExecutionResult {
                status: ExecutionStatus::RuntimeError,
                stdout: "test_fail: boom\n1 passed, 1 failed\n".to_string(),
                stderr: String::new(),
                exit_code: Some(1),
                duration_ms: 5,
                error: None,
                test_summary: None,
            }
        }
    }

    #[tokio::test]
    async fn test_combine_and_run_annotates_counts() {
        let result = combine_and_run(
            &DriverSimulator,
            "def f():\n    return 1\n",
            "def test_ok():\n    assert f() == 1\n\ndef test_fail():\n    assert f() == 2\n",
            ExecutionLanguage::Python,
            ExecutionConfig::default(),
        )
        .await;

        assert_eq!(
            result.test_summary,
            Some(TestSummary {
                passed: 1,
                failed: 1,
                total: 2
            })
        );
        assert_ne!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_unsupported_language_fails_without_spawning() {
        let result = combine_and_run(
            &DriverSimulator,
            "fn main() {}",
            "fn test_x() {}",
            ExecutionLanguage::Rust,
            ExecutionConfig::default(),
        )
        .await;
        assert_eq!(result.status, ExecutionStatus::Error);
    }
}
