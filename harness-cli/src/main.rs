use std::fs;
use std::process;
use std::time::Duration;

use docker_api::Docker;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use harness_core::config::{CloneMethod, Config};
use harness_core::container::{CreateOpts, DockerContainer};
use harness_core::hooks::NoopHook;
use harness_core::orchestrator::{Orchestrator, StepOutcome};
use harness_core::parsers;
use harness_core::recipe::RecipeRegistry;
use harness_core::session::{Mode, Session};
use harness_core::TaskRecord;

mod opts;

use opts::Opts;

fn setup_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("harness_cli=debug,harness_core=debug")
    } else {
        EnvFilter::new("harness_cli=info,harness_core=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let opts = Opts::parse_args();
    setup_tracing(opts.debug);

    if let Err(e) = run(opts).await {
        error!(reason = %e, "task run failed");
        process::exit(1);
    }
}

async fn run(opts: Opts) -> harness_core::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(name) = opts.container_name.clone() {
        config.persistent_container = Some(name);
        config.clone_method = CloneMethod::Full;
    }

    let raw = fs::read_to_string(&opts.task)
        .map_err(|e| harness_core::HarnessError::io(&opts.task, e))?;
    let task: TaskRecord = serde_json::from_str(&raw)
        .map_err(|e| harness_core::HarnessError::config(format!("invalid task file: {e}")))?;

    info!(instance_id = %task.instance_id, repo = %task.repo_full_name(), "starting task");

    let docker = Docker::new("unix:///var/run/docker.sock")?;

    let registry = RecipeRegistry::new();
    let recipe = registry.resolve(&task);

    let builder = harness_core::image::ImageBuilder::new(&docker);
    let image = builder.build(recipe.as_ref()).await?;

    let container_name = config
        .persistent_container
        .clone()
        .unwrap_or_else(|| format!("harness-{}", task.instance_id));
    let create_opts = CreateOpts::new(image.full_name()).name(container_name);

    let container: Box<dyn harness_core::container::Container<'_> + '_> =
        Box::new(DockerContainer::new(&docker));
    let mode = if config.persistent_container.is_some() {
        Mode::Persistent
    } else {
        Mode::NonPersistent
    };
    let mut session = Session::new(container, mode, config.docker_start_up_delay);
    session.start(&create_opts).await?;

    let mut orchestrator = Orchestrator::new(session, Box::new(NoopHook), config.clone());
    orchestrator.reset(&task, opts.apply_test_patch).await?;

    let raw_log = orchestrator.run_tests(&opts.test_command).await?;
    let results = parsers::parse(&task.language, &raw_log);

    info!(
        passed = results.passed().count(),
        failed = results.failed().count(),
        skipped = results.skipped().count(),
        "test run complete"
    );
    for name in results.failed() {
        println!("FAIL {name}");
    }

    orchestrator.close(&task).await?;

    Ok(())
}

/// Kept for symmetry with the orchestrator's `StepOutcome`, in case a
/// future agent-loop front end drives `step()` directly instead of only
/// running the test suite; unused by this single-shot CLI today.
#[allow(dead_code)]
fn describe_step(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Skipped => "skipped".to_string(),
        StepOutcome::Exited { reason, diff } => {
            format!("exited: {reason} (diff captured: {})", diff.is_some())
        }
        StepOutcome::Ran { exit_code, .. } => format!("ran, exit code {exit_code}"),
        StepOutcome::Interrupted { .. } => "interrupted, shell recovered".to_string(),
        StepOutcome::EarlyExit { reason } => format!("early exit: {reason}"),
    }
}
