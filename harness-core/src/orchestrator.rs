//! Task-level control flow: reset the repo to `base_commit`, dispatch
//! agent actions one at a time, and extract a submission once the agent
//! is done. Ported from `original_source/sweagent/environment/swe_env.py`
//! (`reset`, `step`, `close`, `on_run_done`).

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::error::{HarnessError, Result};
use crate::hooks::EnvHook;
use crate::model::{Command, Language, TaskRecord};
use crate::session::{Session, SessionState};

/// Env vars the original agent's file-viewing/search tools stash state
/// in; reset at the start of every task so a fresh task never inherits
/// another task's cursor position.
const RESET_ENV_VARS: &[&str] = &[
    "CURRENT_FILE",
    "CURRENT_LINE",
    "SEARCH_RESULTS",
    "SEARCH_FILES",
    "SEARCH_INDEX",
];

const TRUNCATION_THRESHOLD: usize = 40_000;
const TRUNCATION_HEAD: usize = 20_000;
const TRUNCATION_TAIL: usize = 20_000;

lazy_static! {
    static ref SUBMISSION_RE: Regex =
        Regex::new(r"(?s)<<SUBMISSION\|\|(.*)\|\|SUBMISSION>>").unwrap();
}

/// Result of classifying a raw action string before it's sent to the
/// session.
#[derive(Debug, PartialEq, Eq)]
pub enum StepAction {
    /// The agent wants this step to count as a no-op turn.
    Skip,
    /// One of the `exit_*` sentinels (`exit_cost`, `exit_context`,
    /// `exit_api`, `exit_error`, `exit_format`, `exit_environment`):
    /// the run is ending, not the shell command name `exit`.
    Exit(String),
    /// An ordinary shell command to run in the session.
    Run(String),
}

pub fn classify_action(action: &str) -> StepAction {
    let trimmed = action.trim();
    if trimmed == "skip" {
        StepAction::Skip
    } else if trimmed.starts_with("exit_") {
        StepAction::Exit(trimmed.to_string())
    } else {
        StepAction::Run(action.to_string())
    }
}

/// Truncates command output that would otherwise blow out the agent's
/// context window: keep the first and last 20000 bytes, joined by `...`,
/// for anything over 40000 bytes. Byte boundaries are snapped to the
/// nearest char boundary so the result is always valid UTF-8.
pub fn truncate_output(output: &str) -> String {
    if output.len() <= TRUNCATION_THRESHOLD {
        return output.to_string();
    }
    let head_end = floor_char_boundary(output, TRUNCATION_HEAD);
    let tail_start = ceil_char_boundary(output, output.len() - TRUNCATION_TAIL);
    format!("{}...{}", &output[..head_end], &output[tail_start..])
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Extracts the agent's submission payload from its final message, using
/// the same dot-all regex as the original so a multi-line diff is
/// captured whole.
pub fn extract_submission(text: &str) -> Option<String> {
    SUBMISSION_RE.captures(text).map(|caps| caps[1].to_string())
}

/// A git cleanup command's stderr is tolerated (not treated as a reset
/// failure) when it only reports these conditions, matching the original
/// harness's lenient git-cleanup step.
pub fn is_tolerable_git_stderr(stderr: &str) -> bool {
    stderr.is_empty() || stderr.contains("fatal") || stderr.contains("not a git command")
}

/// Build-artifact patterns appended to the task repo's `.gitignore` during
/// `reset()` step 5, so toolchain output from `run.sh`/`test-run.sh` never
/// shows up as "uncommitted changes" in `check_git_changes.sh`.
pub fn gitignore_override(language: &Language) -> &'static str {
    match language {
        Language::Go => "*.test\n",
        Language::Java => ".gradle/\nbuild/\n",
        Language::JavaScript | Language::TypeScript => "node_modules/\n",
        Language::Rust => "target/\n",
        Language::C | Language::Cpp | Language::Other(_) => "*.o\n*.so\n*.a\n",
    }
}

pub struct Orchestrator<'job> {
    session: Session<'job>,
    hooks: Box<dyn EnvHook>,
    config: Config,
}

impl<'job> Orchestrator<'job> {
    pub fn new(session: Session<'job>, hooks: Box<dyn EnvHook>, config: Config) -> Self {
        Orchestrator { session, hooks, config }
    }

    fn setup_command(&self, label: &'static str, raw: impl Into<String>) -> Command {
        Command::new(label, raw).with_timeouts(
            self.config.long_timeout.as_secs(),
            self.config.long_timeout.as_secs(),
        )
    }

    /// Brings the session's repo to `task.base_commit` with a clean
    /// working tree and resets per-task shell/container state. Assumes the
    /// session is already started and attached to a container whose image
    /// already contains a clone of the task's repo (the image builder is
    /// responsible for that, not the orchestrator) — this covers steps 2-8
    /// of the reset contract; step 1 (resolving the record and building the
    /// image) happens in the caller before the session is even started.
    #[instrument(skip(self, task), fields(instance_id = %task.instance_id))]
    pub async fn reset(&mut self, task: &TaskRecord, apply_test_patch: bool) -> Result<()> {
        self.hooks.on_init(task).await;

        let workdir = format!("/home/{}", task.repo);

        // 2. Sanity check: the image's warm-up already cloned and checked
        // out the base commit, so the repo directory must already exist.
        let verify = self
            .session
            .run(&self.setup_command("verify-repo-dir", format!("test -d {workdir}")))
            .await?;
        if verify.exit_code != 0 {
            return Err(HarnessError::Session {
                session: self.session.id().to_string(),
                reason: format!("expected repository directory `{workdir}` is missing"),
            });
        }

        self.hooks.on_copy_repo_started(task).await;

        // 3. Clean workspace.
        for git_cmd in [
            "git restore .",
            &format!("git reset --hard {}", task.base_commit),
            "git clean -fdxq",
        ] {
            let output = self
                .session
                .run(&self.setup_command("git-cleanup", format!("cd {workdir} && {git_cmd}")))
                .await?;
            if output.exit_code != 0 && !is_tolerable_git_stderr(&output.stdout) {
                debug!(cmd = git_cmd, exit_code = output.exit_code, "git cleanup step reported nonzero exit");
            }
        }

        // 4. Task-independent helpers.
        self.session
            .run(&self.setup_command(
                "install-helpers",
                "apt-get update -qq && apt-get install -y -qq --no-install-recommends jq build-essential > /dev/null 2>&1 || true",
            ))
            .await?;

        // 5. Language-specific gitignore override.
        let gitignore = gitignore_override(&task.language);
        self.session
            .run(&self.setup_command(
                "gitignore-override",
                format!("cd {workdir} && cat >> .gitignore <<'HARNESS_GITIGNORE_EOF'\n{gitignore}HARNESS_GITIGNORE_EOF"),
            ))
            .await?;

        // 6. Reset agent-tool env state.
        let unset = RESET_ENV_VARS.join(" ");
        self.session
            .run(&self.setup_command("env-reset", format!("unset {unset}")))
            .await?;

        // 7. Remove any leftover fix.patch from a prior run.
        self.session
            .run(&self.setup_command("remove-leftover-fix-patch", "rm -f /home/fix.patch"))
            .await?;

        // 8. Conditionally apply the task's test patch.
        if apply_test_patch {
            if let Some(test_patch) = &task.test_patch {
                let whitespace_nowarn = matches!(task.language, Language::C | Language::Cpp);
                let apply_flags = if whitespace_nowarn { " --whitespace=nowarn" } else { "" };
                self.session
                    .run(&self.setup_command(
                        "apply-test-patch",
                        format!(
                            "cat > /home/test.patch <<'HARNESS_PATCH_EOF'\n{test_patch}\nHARNESS_PATCH_EOF\ncd {workdir} && git apply{apply_flags} /home/test.patch"
                        ),
                    ))
                    .await?;
            }
        }

        if !matches!(task.environment_setup, crate::model::EnvironmentSetup::None) {
            self.hooks.on_install_env_started(task).await;
        }

        Ok(())
    }

    /// Dispatches one agent-issued action. Sentinel actions (`skip`,
    /// `exit_*`) short-circuit without touching the shell channel for
    /// `skip`; `exit_*` still attempts one last submission.
    pub async fn step(&mut self, action: &str) -> Result<StepOutcome> {
        match classify_action(action) {
            StepAction::Skip => Ok(StepOutcome::Skipped),
            StepAction::Exit(reason) => {
                let diff = self.attempt_final_submit().await;
                Ok(StepOutcome::Exited { reason, diff })
            }
            StepAction::Run(raw) => {
                let command = Command::new("agent-action", raw).with_timeouts(
                    self.config.long_timeout.as_secs(),
                    self.config.action_no_output_timeout.as_secs(),
                );
                match self.session.run(&command).await {
                    Ok(output) => Ok(StepOutcome::Ran {
                        stdout: truncate_output(&output.stdout),
                        exit_code: output.exit_code,
                    }),
                    Err(HarnessError::TotalTimeout { timeout_secs, .. }) => {
                        let banner = format!(
                            "\nEXECUTION TIMED OUT BECAUSE NO OUTPUT WAS PRODUCED FOR MORE THAN {timeout_secs} SECONDS.\n\
                             PLEASE REFINE YOUR RUNNING COMMAND SO IT WILL PRODUCE OUTPUT IN THE SPECIFIED TIME FRAME."
                        );
                        if self.session.state() == SessionState::Broken {
                            Ok(StepOutcome::EarlyExit {
                                reason: format!("{banner}\nEXECUTION TIMED OUT AND INTERRUPT FAILED."),
                            })
                        } else {
                            Ok(StepOutcome::Interrupted { banner })
                        }
                    }
                    // No-output expiry is reported straight back per §5 —
                    // this orchestrator doesn't escalate it itself, it's
                    // the caller's call whether to prod or give up.
                    Err(e @ HarnessError::NoOutputTimeout { .. }) => Err(e),
                    Err(e) => {
                        warn!(error = %e, "command failed to execute, closing session");
                        let _ = self.session.close().await;
                        Ok(StepOutcome::EarlyExit {
                            reason: format!("COMMAND FAILED TO EXECUTE: {e}"),
                        })
                    }
                }
            }
        }
    }

    /// Attempts one last `submit` round-trip and extracts whatever
    /// submission marker it produced, even if the command itself reports a
    /// nonzero exit or the session errors out entirely — an `exit_*`
    /// sentinel means the run is ending regardless, so this is a
    /// best-effort capture, not a step that can fail the episode further.
    async fn attempt_final_submit(&mut self) -> Option<String> {
        let command = Command::new("submit", "submit").with_timeouts(
            self.config.action_timeout.as_secs(),
            self.config.action_timeout.as_secs(),
        );
        match self.session.run(&command).await {
            Ok(output) => extract_submission(&output.stdout),
            Err(e) => {
                warn!(error = %e, "final submit attempt failed");
                None
            }
        }
    }

    /// Runs the recipe-provided test command and returns its raw log for
    /// a `parsers::parse` call to interpret.
    pub async fn run_tests(&mut self, test_command: &str) -> Result<String> {
        let command = Command::new("test-run", test_command).with_timeouts(500, 500);
        let output = self.session.run(&command).await?;
        Ok(output.stdout)
    }

    pub async fn close(&mut self, task: &TaskRecord) -> Result<()> {
        self.session.close().await?;
        self.hooks.on_close(task).await;
        Ok(())
    }
}

/// Outcome of dispatching a single step.
#[derive(Debug)]
pub enum StepOutcome {
    Skipped,
    /// An `exit_*` sentinel: `diff` is whatever the final `submit`
    /// round-trip captured, `None` if it failed or found nothing.
    Exited { reason: String, diff: Option<String> },
    Ran { stdout: String, exit_code: i32 },
    /// Total timeout fired but the interrupt protocol recovered the shell;
    /// `banner` is the explanatory text to append to the agent's observation.
    Interrupted { banner: String },
    /// Interrupt failed, or the command hit a broken pipe/unknown runtime
    /// error; the session has been closed and the episode should end.
    EarlyExit { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_skip_and_exit_sentinels() {
        assert_eq!(classify_action("skip"), StepAction::Skip);
        assert_eq!(
            classify_action("exit_cost"),
            StepAction::Exit("exit_cost".to_string())
        );
        assert_eq!(
            classify_action("ls -la"),
            StepAction::Run("ls -la".to_string())
        );
    }

    #[test]
    fn truncates_long_output_keeping_head_and_tail() {
        let output = "a".repeat(50_000);
        let truncated = truncate_output(&output);
        assert!(truncated.len() < output.len());
        assert!(truncated.starts_with(&"a".repeat(20_000)));
        assert!(truncated.contains("..."));
    }

    #[test]
    fn short_output_is_untouched() {
        let output = "ok\n";
        assert_eq!(truncate_output(output), output);
    }

    #[test]
    fn extracts_multiline_submission() {
        let text = "done.\n<<SUBMISSION||diff --git a/x b/x\n+line\n||SUBMISSION>>\n";
        let submission = extract_submission(text).unwrap();
        assert!(submission.contains("diff --git"));
        assert!(submission.contains("+line"));
    }

    #[test]
    fn missing_submission_marker_returns_none() {
        assert!(extract_submission("no submission here").is_none());
    }

    #[test]
    fn tolerable_git_stderr_cases() {
        assert!(is_tolerable_git_stderr(""));
        assert!(is_tolerable_git_stderr("fatal: not a git repository"));
        assert!(is_tolerable_git_stderr("git: 'lfs' is not a git command"));
        assert!(!is_tolerable_git_stderr("permission denied"));
    }

    #[test]
    fn gitignore_override_is_language_specific() {
        assert_eq!(gitignore_override(&Language::Go), "*.test\n");
        assert!(gitignore_override(&Language::Java).contains(".gradle/"));
        assert!(gitignore_override(&Language::Rust).contains("target/"));
        assert!(gitignore_override(&Language::C).contains("*.o"));
    }
}
