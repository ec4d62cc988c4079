pub mod generic;
pub mod scripts;

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{HarnessError, Result};
use crate::model::TaskRecord;

pub use generic::GenericRecipe;

/// A file to materialize inside the image build context, relative to the
/// Dockerfile's directory.
#[derive(Clone, Debug)]
pub struct RecipeFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
    pub executable: bool,
}

impl RecipeFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        RecipeFile {
            path: path.into(),
            contents: contents.into(),
            executable: false,
        }
    }

    pub fn executable(mut self) -> Self {
        self.executable = true;
        self
    }
}

/// Per-repository image recipe, the Rust equivalent of the `Image`/
/// `Instance` class contract used throughout `original_source`'s
/// per-repository harness files (`dependency`, `files`, `dockerfile`,
/// `image_name`, `image_tag`, `workdir`). One `ImageRecipe` is built per
/// task from its `TaskRecord` so it can bake the task's `base_commit` and
/// `environment_setup` into the Dockerfile.
pub trait ImageRecipe: Send + Sync {
    /// Extra OS packages the base image needs beyond the generic toolchain.
    fn dependency(&self) -> Vec<String> {
        Vec::new()
    }

    /// Files copied into the build context alongside the Dockerfile
    /// (helper scripts, patches, environment setup scripts).
    fn files(&self) -> Vec<RecipeFile>;

    /// Full Dockerfile contents for this task's image.
    fn dockerfile(&self) -> String;

    /// Base name used for the built image, before the content-hash tag is
    /// appended (see `image::ImageBuilder`).
    fn image_name(&self) -> String;

    /// A human-readable tag fragment (not the content hash) describing
    /// this recipe's version, e.g. a base-image revision.
    fn image_tag(&self) -> String {
        "latest".to_string()
    }

    /// Working directory the container's shell starts in.
    fn workdir(&self) -> PathBuf {
        PathBuf::from("/")
    }
}

type RecipeFactory = Box<dyn Fn(&TaskRecord) -> Box<dyn ImageRecipe> + Send + Sync>;

/// Maps `(org, repo)` to a recipe factory, mirroring how the original
/// harness's per-repository modules each call `Instance.register(org,
/// repo)` at import time. Lookups that miss fall back to `GenericRecipe`,
/// which is enough for any repo that only needs "install toolchain, clone,
/// run tests" without bespoke Dockerfile logic.
#[derive(Default)]
pub struct RecipeRegistry {
    factories: HashMap<(String, String), RecipeFactory>,
}

impl RecipeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        org: impl Into<String>,
        repo: impl Into<String>,
        factory: impl Fn(&TaskRecord) -> Box<dyn ImageRecipe> + Send + Sync + 'static,
    ) {
        self.factories
            .insert((org.into(), repo.into()), Box::new(factory));
    }

    /// Builds the recipe for a task, falling back to `GenericRecipe` when
    /// no bespoke factory is registered for `(org, repo)`.
    pub fn resolve(&self, task: &TaskRecord) -> Box<dyn ImageRecipe> {
        match self.factories.get(&(task.org.clone(), task.repo.clone())) {
            Some(factory) => factory(task),
            None => Box::new(GenericRecipe::from_task(task)),
        }
    }

    /// Like `resolve`, but errors instead of silently falling back; used
    /// where a caller specifically wants a registered recipe.
    pub fn resolve_strict(&self, task: &TaskRecord) -> Result<Box<dyn ImageRecipe>> {
        self.factories
            .get(&(task.org.clone(), task.repo.clone()))
            .map(|factory| factory(task))
            .ok_or_else(|| HarnessError::RecipeNotFound {
                org: task.org.clone(),
                repo: task.repo.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnvironmentSetup, Language};
    use std::collections::BTreeMap;

    fn sample_task() -> TaskRecord {
        TaskRecord {
            instance_id: "etcd-io__etcd-1".into(),
            org: "etcd-io".into(),
            repo: "etcd".into(),
            base_commit: "deadbeef".into(),
            language: Language::Go,
            problem_statement: "fix the thing".into(),
            resolved_issues: vec![],
            environment_setup: EnvironmentSetup::None,
            test_patch: None,
            extra_env: BTreeMap::new(),
        }
    }

    #[test]
    fn falls_back_to_generic_recipe_when_unregistered() {
        let registry = RecipeRegistry::new();
        let task = sample_task();
        let recipe = registry.resolve(&task);
        assert!(recipe.image_name().starts_with("swe-agent-task-env-"));
    }

    #[test]
    fn resolve_strict_errors_on_unregistered_repo() {
        let registry = RecipeRegistry::new();
        let task = sample_task();
        assert!(registry.resolve_strict(&task).is_err());
    }

    #[test]
    fn registered_factory_takes_precedence() {
        let mut registry = RecipeRegistry::new();
        registry.register("etcd-io", "etcd", |task| {
            Box::new(GenericRecipe::from_task(task))
        });
        let task = sample_task();
        assert!(registry.resolve_strict(&task).is_ok());
    }
}
