pub mod state;

pub use state::{ImageState, ImagesState};

use std::collections::BTreeMap;
use std::fs;

use docker_api::api::{BuildOpts, ImageBuildChunk};
use docker_api::opts::ImageRemoveOpts;
use docker_api::Docker;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::error::{HarnessError, Result};
use crate::recipe::ImageRecipe;

/// A built image, identified by the content hash of its recipe.
#[derive(Clone, Debug)]
pub struct Image {
    pub name: String,
    pub tag: String,
}

impl Image {
    pub fn full_name(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

/// Content hash of a recipe: sha256 over the Dockerfile body and every
/// file's path and bytes, in a stable order. Two recipes that would
/// produce byte-identical image contents hash identically, which is what
/// lets `ImageBuilder::build` skip a rebuild (spec's image-build
/// idempotence property).
pub fn content_hash(recipe: &dyn ImageRecipe) -> String {
    let mut hasher = Sha256::new();
    hasher.update(recipe.dockerfile().as_bytes());

    let mut files: BTreeMap<String, &[u8]> = BTreeMap::new();
    let file_list = recipe.files();
    for file in &file_list {
        files.insert(file.path.to_string_lossy().into_owned(), &file.contents);
    }
    for (path, contents) in files {
        hasher.update(path.as_bytes());
        hasher.update(contents);
    }

    hex::encode(hasher.finalize())
}

/// Builds images from `ImageRecipe`s, skipping the Docker build step
/// entirely when an image with the same content hash already exists.
pub struct ImageBuilder<'job> {
    docker: &'job Docker,
}

impl<'job> ImageBuilder<'job> {
    pub fn new(docker: &'job Docker) -> Self {
        Self { docker }
    }

    #[instrument(skip(self, recipe))]
    pub async fn build(&self, recipe: &dyn ImageRecipe) -> Result<Image> {
        let hash = content_hash(recipe);
        let tag = format!("{}-{}", recipe.image_tag(), &hash[..16]);
        let image = Image {
            name: recipe.image_name(),
            tag,
        };

        if self.exists(&image).await? {
            info!(image = %image.full_name(), "image already built, skipping");
            return Ok(image);
        }

        debug!(image = %image.full_name(), "building image");
        let build_dir = tempfile::tempdir()
            .map_err(|e| HarnessError::io("<tempdir>", e))?;
        fs::write(build_dir.path().join("Dockerfile"), recipe.dockerfile())
            .map_err(|e| HarnessError::io(build_dir.path().join("Dockerfile"), e))?;
        for file in recipe.files() {
            let dest = build_dir.path().join(&file.path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| HarnessError::io(parent, e))?;
            }
            fs::write(&dest, &file.contents).map_err(|e| HarnessError::io(dest.clone(), e))?;
        }

        let opts = BuildOpts::builder(build_dir.path())
            .tag(image.full_name())
            .build();

        let images = self.docker.images();
        let mut stream = images.build(&opts);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| HarnessError::ImageBuild {
                image: image.full_name(),
                reason: e.to_string(),
            })?;
            match chunk {
                ImageBuildChunk::Error {
                    error,
                    error_detail: _,
                } => {
                    return Err(HarnessError::ImageBuild {
                        image: image.full_name(),
                        reason: error,
                    })
                }
                ImageBuildChunk::Update { stream } => {
                    debug!(image = %image.full_name(), "{}", stream.trim_end());
                }
                ImageBuildChunk::Digest { aux } => {
                    debug!(image = %image.full_name(), id = %aux.id, "image build finished");
                }
            }
        }

        info!(image = %image.full_name(), "built image");
        Ok(image)
    }

    async fn exists(&self, image: &Image) -> Result<bool> {
        Ok(self
            .docker
            .images()
            .get(image.full_name())
            .inspect()
            .await
            .is_ok())
    }

    /// Per-task image cleanup; not on the hot path of a normal run, but
    /// lets a caller reclaim disk after a one-off task image is no longer
    /// needed.
    pub async fn remove(&self, image: &Image) -> Result<()> {
        self.docker
            .images()
            .get(image.full_name())
            .remove(&ImageRemoveOpts::builder().force(true).build())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::generic::GenericRecipe;
    use crate::model::{EnvironmentSetup, Language, TaskRecord};
    use std::collections::BTreeMap;

    fn task() -> TaskRecord {
        TaskRecord {
            instance_id: "x".into(),
            org: "etcd-io".into(),
            repo: "etcd".into(),
            base_commit: "abc123".into(),
            language: Language::Go,
            problem_statement: String::new(),
            resolved_issues: vec![],
            environment_setup: EnvironmentSetup::None,
            test_patch: None,
            extra_env: BTreeMap::new(),
        }
    }

    #[test]
    fn identical_recipes_hash_identically() {
        let a = GenericRecipe::from_task(&task());
        let b = GenericRecipe::from_task(&task());
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn different_base_commit_changes_hash() {
        let mut t2 = task();
        t2.base_commit = "different".into();
        let a = GenericRecipe::from_task(&task());
        let b = GenericRecipe::from_task(&t2);
        assert_ne!(content_hash(&a), content_hash(&b));
    }
}
