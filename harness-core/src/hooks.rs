//! Observer hooks into the orchestrator's task lifecycle, the Rust
//! equivalent of `EnvHook` in `swe_env.py`. Default methods are no-ops so
//! a caller only overrides what it needs (progress reporting, metrics,
//! trajectory recording).

use async_trait::async_trait;

use crate::model::TaskRecord;

#[async_trait]
pub trait EnvHook: Send + Sync {
    async fn on_init(&self, _task: &TaskRecord) {}
    async fn on_copy_repo_started(&self, _task: &TaskRecord) {}
    async fn on_install_env_started(&self, _task: &TaskRecord) {}
    async fn on_close(&self, _task: &TaskRecord) {}
}

/// A hook that does nothing, used as the default when the caller doesn't
/// need to observe the lifecycle.
pub struct NoopHook;

#[async_trait]
impl EnvHook for NoopHook {}

/// Fans a single set of lifecycle calls out to every hook in the list, so
/// an `Orchestrator` can hold `Vec<Box<dyn EnvHook>>` without callers
/// needing to write their own fan-out boilerplate.
pub struct HookList(pub Vec<Box<dyn EnvHook>>);

#[async_trait]
impl EnvHook for HookList {
    async fn on_init(&self, task: &TaskRecord) {
        for hook in &self.0 {
            hook.on_init(task).await;
        }
    }

    async fn on_copy_repo_started(&self, task: &TaskRecord) {
        for hook in &self.0 {
            hook.on_copy_repo_started(task).await;
        }
    }

    async fn on_install_env_started(&self, task: &TaskRecord) {
        for hook in &self.0 {
            hook.on_install_env_started(task).await;
        }
    }

    async fn on_close(&self, task: &TaskRecord) {
        for hook in &self.0 {
            hook.on_close(task).await;
        }
    }
}
