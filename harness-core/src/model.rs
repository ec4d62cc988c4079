use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Source language of a task's repository. Drives recipe and log-parser
/// selection; mirrors `LANGUAGE_MAP` in the original harness.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cpp,
    Go,
    Java,
    JavaScript,
    TypeScript,
    Rust,
    Other(String),
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::C => write!(f, "c"),
            Language::Cpp => write!(f, "cpp"),
            Language::Go => write!(f, "go"),
            Language::Java => write!(f, "java"),
            Language::JavaScript => write!(f, "javascript"),
            Language::TypeScript => write!(f, "typescript"),
            Language::Rust => write!(f, "rust"),
            Language::Other(s) => write!(f, "{}", s),
        }
    }
}

/// An issue resolved by the reference patch, used to seed the agent's
/// initial context. Matches `resolved_issues[0]` read by the original
/// environment during reset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolvedIssue {
    pub title: String,
    pub body: String,
}

/// How to prepare the task's runtime environment inside the container
/// before handing control to the agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvironmentSetup {
    /// Path to a setup script, relative to the repo root once cloned.
    ScriptPath(PathBuf),
    /// Inline shell script body, written to a temp file and sourced.
    Inline(String),
    /// No environment setup beyond what the recipe's Dockerfile provides.
    None,
}

/// One unit of work: a single SWE-bench-style task instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskRecord {
    pub instance_id: String,
    pub org: String,
    pub repo: String,
    pub base_commit: String,
    pub language: Language,
    pub problem_statement: String,
    pub resolved_issues: Vec<ResolvedIssue>,
    pub environment_setup: EnvironmentSetup,
    #[serde(default)]
    pub test_patch: Option<String>,
    #[serde(default)]
    pub extra_env: BTreeMap<String, String>,
}

impl TaskRecord {
    pub fn repo_full_name(&self) -> String {
        format!("{}/{}", self.org, self.repo)
    }
}

/// A single command dispatched to a session's shell channel.
#[derive(Clone, Debug)]
pub struct Command {
    /// Short label for logging/error messages, not sent to the shell.
    pub label: String,
    pub raw: String,
    pub total_timeout_secs: u64,
    pub no_output_timeout_secs: u64,
}

impl Command {
    pub fn new(label: impl Into<String>, raw: impl Into<String>) -> Self {
        Command {
            label: label.into(),
            raw: raw.into(),
            total_timeout_secs: 25,
            no_output_timeout_secs: 25,
        }
    }

    pub fn with_timeouts(mut self, total_secs: u64, no_output_secs: u64) -> Self {
        self.total_timeout_secs = total_secs;
        self.no_output_timeout_secs = no_output_secs;
        self
    }
}

/// Structured result of running a task's test suite: three independent
/// name sets, mirroring `TestResult(passed_tests, failed_tests,
/// skipped_tests)` in every `original_source` per-repo `parse_log`. A name
/// can legitimately sit in more than one set at once (e.g. a Go subtest's
/// base name appearing in both `passed_tests` and `failed_tests` — see
/// `parsers::go`) since each parser applies its own, language-specific
/// retraction rule rather than a single shared one.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestResult {
    pub passed_tests: BTreeSet<String>,
    pub failed_tests: BTreeSet<String>,
    pub skipped_tests: BTreeSet<String>,
}

impl TestResult {
    pub fn passed(&self) -> impl Iterator<Item = &str> {
        self.passed_tests.iter().map(String::as_str)
    }

    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.failed_tests.iter().map(String::as_str)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.skipped_tests.iter().map(String::as_str)
    }

    pub fn passed_count(&self) -> usize {
        self.passed_tests.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed_tests.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped_tests.len()
    }
}
