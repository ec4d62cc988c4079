use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "harness",
    version,
    author = "Wojciech Kepka <wojciech@wkepka.dev>",
    about = "Runs a single SWE-bench-style task against an isolated container"
)]
pub struct Opts {
    /// Path to a JSON file containing one `TaskRecord`.
    pub task: PathBuf,

    /// Shell command used to run the task's test suite inside the
    /// container; passed straight to `test-run.sh`.
    #[arg(long)]
    pub test_command: String,

    /// Enable debug-level tracing output.
    #[arg(short, long)]
    pub debug: bool,

    /// Reuse (or create) a named persistent container instead of a
    /// throwaway one-per-task container.
    #[arg(long)]
    pub container_name: Option<String>,

    /// Apply the task's `test_patch` during `reset()` before running the
    /// test command (the `test-run.sh`/`fix-run.sh` contract), instead of
    /// testing the unpatched base (`run.sh`).
    #[arg(long)]
    pub apply_test_patch: bool,
}

impl Opts {
    pub fn parse_args() -> Self {
        Opts::parse()
    }
}
