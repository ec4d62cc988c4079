use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::model::{EnvironmentSetup, Language, TaskRecord};

use super::scripts;
use super::{ImageRecipe, RecipeFile};

/// Default recipe for any repository without a bespoke factory
/// registered: installs the toolchain for the task's language, clones
/// nothing itself (the orchestrator's `reset()` does that against the
/// already-built image), and copies the standard helper scripts.
/// Grounded in the near-identical "install toolchain, set workdir, copy
/// scripts" shape shared by the valkey/etcd/logstash base images in
/// `original_source`.
pub struct GenericRecipe {
    org: String,
    repo: String,
    base_commit: String,
    language: Language,
    environment_setup: EnvironmentSetup,
}

impl GenericRecipe {
    pub fn from_task(task: &TaskRecord) -> Self {
        GenericRecipe {
            org: task.org.clone(),
            repo: task.repo.clone(),
            base_commit: task.base_commit.clone(),
            language: task.language.clone(),
            environment_setup: task.environment_setup.clone(),
        }
    }

    fn base_image(&self) -> &'static str {
        match self.language {
            Language::Go => "golang:1.21-bookworm",
            Language::Java => "eclipse-temurin:17-jdk-jammy",
            Language::JavaScript | Language::TypeScript => "node:20-bookworm",
            Language::Rust => "rust:1.75-bookworm",
            Language::C | Language::Cpp => "debian:bookworm",
            Language::Other(_) => "debian:bookworm",
        }
    }

    fn toolchain_install(&self) -> &'static str {
        match self.language {
            Language::C | Language::Cpp | Language::Other(_) => {
                "RUN apt-get update && apt-get install -y --no-install-recommends \\\n    build-essential tcl git ca-certificates && rm -rf /var/lib/apt/lists/*"
            }
            Language::Go | Language::Java | Language::Rust => {
                "RUN apt-get update && apt-get install -y --no-install-recommends \\\n    git ca-certificates && rm -rf /var/lib/apt/lists/*"
            }
            Language::JavaScript | Language::TypeScript => {
                "RUN apt-get update && apt-get install -y --no-install-recommends \\\n    git ca-certificates && corepack enable && rm -rf /var/lib/apt/lists/*"
            }
        }
    }

    /// Build+test invocation baked into `run.sh`/`test-run.sh`/`fix-run.sh`,
    /// one per language ecosystem (`go test`, `make test` for the C/TCL
    /// valkey-style suite, `./gradlew test` for JVM, …).
    fn build_test_cmd(&self) -> &'static str {
        match self.language {
            Language::Go => "go test -v -count=1 ./...",
            Language::Java => "./gradlew test --console=plain",
            Language::JavaScript | Language::TypeScript => "npm test",
            Language::Rust => "cargo test --workspace",
            Language::C | Language::Cpp | Language::Other(_) => "make test",
        }
    }

    /// Whether `test.patch`/`fix.patch` must be applied with
    /// `--whitespace=nowarn`, per `valkey.py`'s C-specific recipe.
    fn whitespace_nowarn(&self) -> bool {
        matches!(self.language, Language::C | Language::Cpp)
    }
}

impl ImageRecipe for GenericRecipe {
    fn files(&self) -> Vec<RecipeFile> {
        let build_test_cmd = self.build_test_cmd();
        let whitespace_nowarn = self.whitespace_nowarn();
        vec![
            RecipeFile::new("check_git_changes.sh", scripts::CHECK_GIT_CHANGES).executable(),
            RecipeFile::new("prepare.sh", scripts::prepare(&self.repo, &self.base_commit))
                .executable(),
            RecipeFile::new("run.sh", scripts::run(&self.repo, build_test_cmd)).executable(),
            RecipeFile::new(
                "test-run.sh",
                scripts::test_run(&self.repo, build_test_cmd, whitespace_nowarn),
            )
            .executable(),
            RecipeFile::new(
                "fix-run.sh",
                scripts::fix_run(&self.repo, build_test_cmd, whitespace_nowarn),
            )
            .executable(),
        ]
    }

    fn dockerfile(&self) -> String {
        format!(
            "FROM {base}\n\
             {toolchain}\n\
             COPY check_git_changes.sh prepare.sh run.sh test-run.sh fix-run.sh /usr/local/bin/\n\
             RUN chmod +x /usr/local/bin/*.sh\n\
             WORKDIR {workdir}\n\
             LABEL harness.org=\"{org}\" harness.repo=\"{repo}\" harness.base_commit=\"{commit}\"\n",
            base = self.base_image(),
            toolchain = self.toolchain_install(),
            workdir = self.workdir().display(),
            org = self.org,
            repo = self.repo,
            commit = self.base_commit,
        )
    }

    /// `swe-agent-task-env-<first-50-hex-of-sha256>`, hashed over
    /// `(repo, base_commit, environment_setup)` — the task-image cache
    /// name invariant from spec §3. Two tasks against the same repo at the
    /// same commit with the same environment setup always resolve to the
    /// same cached image; any of the three changing changes the name.
    fn image_name(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.repo.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.base_commit.as_bytes());
        hasher.update([0u8]);
        let env_repr = serde_json::to_string(&self.environment_setup).unwrap_or_default();
        hasher.update(env_repr.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("swe-agent-task-env-{}", &digest[..50])
    }

    fn workdir(&self) -> PathBuf {
        PathBuf::from(format!("/home/{}", self.repo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EnvironmentSetup;
    use std::collections::BTreeMap;

    fn task(language: Language) -> TaskRecord {
        TaskRecord {
            instance_id: "x".into(),
            org: "etcd-io".into(),
            repo: "etcd".into(),
            base_commit: "abc123".into(),
            language,
            problem_statement: String::new(),
            resolved_issues: vec![],
            environment_setup: EnvironmentSetup::None,
            test_patch: None,
            extra_env: BTreeMap::new(),
        }
    }

    #[test]
    fn dockerfile_picks_toolchain_by_language() {
        let recipe = GenericRecipe::from_task(&task(Language::Go));
        let dockerfile = recipe.dockerfile();
        assert!(dockerfile.starts_with("FROM golang:"));
        assert!(dockerfile.contains("harness.repo=\"etcd\""));
    }

    #[test]
    fn image_name_is_a_50_hex_char_content_hash() {
        let recipe = GenericRecipe::from_task(&task(Language::Rust));
        let name = recipe.image_name();
        let suffix = name.strip_prefix("swe-agent-task-env-").unwrap();
        assert_eq!(suffix.len(), 50);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn image_name_is_stable_across_identical_tasks() {
        let a = GenericRecipe::from_task(&task(Language::Go));
        let b = GenericRecipe::from_task(&task(Language::Go));
        assert_eq!(a.image_name(), b.image_name());
    }

    #[test]
    fn image_name_changes_with_base_commit() {
        let mut t2 = task(Language::Go);
        t2.base_commit = "different".into();
        let a = GenericRecipe::from_task(&task(Language::Go));
        let b = GenericRecipe::from_task(&t2);
        assert_ne!(a.image_name(), b.image_name());
    }

    #[test]
    fn image_name_is_unaffected_by_language_alone() {
        let a = GenericRecipe::from_task(&task(Language::Go));
        let b = GenericRecipe::from_task(&task(Language::Rust));
        assert_eq!(a.image_name(), b.image_name());
    }

    #[test]
    fn five_helper_scripts_are_always_present() {
        let recipe = GenericRecipe::from_task(&task(Language::Java));
        assert_eq!(recipe.files().len(), 5);
    }
}
