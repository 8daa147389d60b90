//! The policy document: a decision program plus its regression tests.
//!
//! A document is TOML. `script` is the decision program, run by
//! `interpreter` with the script path and the request JSON appended as
//! arguments; it must print a JSON object `{"decision": ..., "rationale":
//! ...}` on its last non-empty stdout line. `[[tests]]` entries are the
//! embedded regression set that gates proposals before they can be
//! approved.
//!
//! ```toml
//! script = '''
//! case "$1" in
//!   '{"name":"runtime__exec"'*) echo '{"decision": "ask", "rationale": "exec needs review"}' ;;
//!   *) echo '{"decision": "allow", "rationale": "default allow"}' ;;
//! esac
//! '''
//!
//! [[tests]]
//! name = "exec is asked"
//! request = { name = "runtime__exec" }
//! expect = "ask"
//! ```

use serde::{Deserialize, Serialize};

use super::types::{ApprovalDecision, PolicyRequest};

fn default_interpreter() -> Vec<String> {
    vec!["/bin/sh".to_string()]
}

/// One embedded regression case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTestCase {
    pub name: String,
    pub request: PolicyRequest,
    pub expect: ApprovalDecision,
}

/// A parsed policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    /// Argv prefix used to run the script.
    #[serde(default = "default_interpreter")]
    pub interpreter: Vec<String>,
    /// Decision program source.
    pub script: String,
    /// Embedded regression tests.
    #[serde(default)]
    pub tests: Vec<PolicyTestCase>,
}

impl PolicyDocument {
    /// Parse policy text. Failures are [`PolicyError::Parse`] and block
    /// proposal creation.
    pub fn parse(text: &str) -> Result<Self, PolicyError> {
        let document: PolicyDocument =
            toml::from_str(text).map_err(|err| PolicyError::Parse(err.to_string()))?;
        if document.interpreter.is_empty() {
            return Err(PolicyError::Parse(
                "interpreter must not be empty".to_string(),
            ));
        }
        if document.script.trim().is_empty() {
            return Err(PolicyError::Parse("script must not be empty".to_string()));
        }
        Ok(document)
    }
}

/// Where validating a policy text failed. Attached to proposals; never
/// crashes the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "stage", content = "detail", rename_all = "snake_case")]
pub enum PolicyError {
    #[error("failed to read policy: {0}")]
    Read(String),
    #[error("failed to parse policy: {0}")]
    Parse(String),
    #[error("policy regression tests failed: {0}")]
    Tests(String),
}

/// Outcome of one regression case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TestOutcome {
    Passed,
    Mismatch {
        actual: ApprovalDecision,
        rationale: String,
    },
    Error {
        message: String,
    },
}

/// Result of one named case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub name: String,
    pub expected: ApprovalDecision,
    #[serde(flatten)]
    pub outcome: TestOutcome,
}

/// Report from running a document's embedded regression set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub cases: Vec<TestCaseResult>,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.cases
            .iter()
            .all(|case| case.outcome == TestOutcome::Passed)
    }

    pub fn failed_count(&self) -> usize {
        self.cases
            .iter()
            .filter(|case| case.outcome != TestOutcome::Passed)
            .count()
    }

    /// One-line summary suitable for a [`PolicyError::Tests`].
    pub fn summary(&self) -> String {
        format!("{} of {} cases failed", self.failed_count(), self.cases.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
script = '''
echo '{"decision": "allow", "rationale": "ok"}'
'''

[[tests]]
name = "anything is allowed"
request = { name = "backend__echo" }
expect = "allow"
"#;

    #[test]
    fn parses_well_formed_document() {
        let document = PolicyDocument::parse(SAMPLE).unwrap();
        assert_eq!(document.interpreter, vec!["/bin/sh"]);
        assert_eq!(document.tests.len(), 1);
        assert_eq!(document.tests[0].expect, ApprovalDecision::Allow);
    }

    #[test]
    fn rejects_invalid_toml() {
        let err = PolicyDocument::parse("script = [not toml").unwrap_err();
        assert!(matches!(err, PolicyError::Parse(_)));
    }

    #[test]
    fn rejects_missing_script() {
        let err = PolicyDocument::parse("interpreter = [\"/bin/sh\"]").unwrap_err();
        assert!(matches!(err, PolicyError::Parse(_)));
    }

    #[test]
    fn rejects_empty_script() {
        let err = PolicyDocument::parse("script = \"  \"").unwrap_err();
        assert!(matches!(err, PolicyError::Parse(_)));
    }

    #[test]
    fn rejects_empty_interpreter() {
        let err = PolicyDocument::parse("interpreter = []\nscript = \"true\"").unwrap_err();
        assert!(matches!(err, PolicyError::Parse(_)));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = PolicyDocument::parse("script = \"true\"\nmystery = 1").unwrap_err();
        assert!(matches!(err, PolicyError::Parse(_)));
    }

    #[test]
    fn report_summarizes_failures() {
        let report = TestReport {
            cases: vec![
                TestCaseResult {
                    name: "a".into(),
                    expected: ApprovalDecision::Allow,
                    outcome: TestOutcome::Passed,
                },
                TestCaseResult {
                    name: "b".into(),
                    expected: ApprovalDecision::DenyAbort,
                    outcome: TestOutcome::Mismatch {
                        actual: ApprovalDecision::Allow,
                        rationale: "oops".into(),
                    },
                },
            ],
        };
        assert!(!report.passed());
        assert_eq!(report.summary(), "1 of 2 cases failed");
    }
}
