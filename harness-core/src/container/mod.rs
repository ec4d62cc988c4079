pub mod docker;

pub use docker::DockerContainer;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Length of significant characters of a container ID, matching Docker's
/// own short-ID convention.
const CONTAINER_ID_LEN: usize = 12;
pub const DEFAULT_SHELL: &str = "/bin/bash";

pub(crate) fn truncate(id: &str) -> &str {
    if id.len() > CONTAINER_ID_LEN {
        &id[..CONTAINER_ID_LEN]
    } else {
        id
    }
}

/// Strips characters a container/image name may not contain.
pub fn fix_name(name: &str) -> String {
    name.chars()
        .filter(|&c| c.is_alphanumeric() || c == '-' || c == '.' || c == '_')
        .collect()
}

#[derive(Debug, Default)]
pub struct Output<T> {
    pub stdout: Vec<T>,
    pub stderr: Vec<T>,
    pub exit_code: i64,
}

#[derive(Clone, Default, Debug)]
pub struct CreateOpts {
    image: String,
    name: Option<String>,
    cmd: Option<Vec<String>>,
    entrypoint: Option<Vec<String>>,
    labels: Option<Vec<(String, String)>>,
    env: Option<Vec<String>>,
    working_dir: Option<String>,
    open_stdin: bool,
    tty: bool,
}

impl CreateOpts {
    pub fn new(image: impl Into<String>) -> Self {
        CreateOpts {
            image: image.into(),
            open_stdin: true,
            tty: true,
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn cmd(mut self, command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cmd = Some(command.into_iter().map(|c| c.into()).collect());
        self
    }

    pub fn entrypoint(mut self, entrypoint: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.entrypoint = Some(entrypoint.into_iter().map(|e| e.into()).collect());
        self
    }

    pub fn labels(
        mut self,
        labels: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.labels = Some(
            labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn env(mut self, env: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.env = Some(env.into_iter().map(|e| e.into()).collect());
        self
    }

    pub fn working_dir(mut self, working_dir: impl Into<String>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn build_docker(self) -> docker_api::opts::ContainerCreateOpts {
        let mut builder = docker_api::opts::ContainerCreateOpts::builder()
            .image(self.image)
            .attach_stdin(self.open_stdin)
            .attach_stdout(true)
            .attach_stderr(true)
            .open_stdin(self.open_stdin)
            .tty(self.tty);

        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        if let Some(cmd) = self.cmd {
            builder = builder.cmd(cmd);
        }
        if let Some(entrypoint) = self.entrypoint {
            builder = builder.entrypoint(entrypoint);
        }
        if let Some(labels) = self.labels {
            builder = builder.labels(labels);
        }
        if let Some(env) = self.env {
            builder = builder.env(env);
        }
        if let Some(working_dir) = self.working_dir {
            builder = builder.working_dir(working_dir);
        }

        builder.build()
    }
}

#[derive(Clone, Debug)]
pub struct ExecOpts<'opts> {
    cmd: &'opts str,
    attach_stdout: bool,
    attach_stderr: bool,
    shell: &'opts str,
    working_dir: Option<&'opts Path>,
    env: Option<&'opts [String]>,
}

impl<'opts> Default for ExecOpts<'opts> {
    fn default() -> Self {
        Self {
            cmd: "",
            attach_stderr: true,
            attach_stdout: true,
            shell: DEFAULT_SHELL,
            working_dir: None,
            env: None,
        }
    }
}

impl<'opts> ExecOpts<'opts> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cmd(mut self, command: &'opts str) -> Self {
        self.cmd = command;
        self
    }

    pub fn shell(mut self, shell: &'opts str) -> Self {
        self.shell = shell;
        self
    }

    pub fn working_dir(mut self, working_dir: &'opts Path) -> Self {
        self.working_dir = Some(working_dir);
        self
    }

    pub fn env(mut self, env: &'opts [String]) -> Self {
        self.env = Some(env);
        self
    }

    pub fn build_docker(self) -> docker_api::opts::ExecCreateOpts {
        let mut builder = docker_api::opts::ExecCreateOpts::builder()
            .command(vec![self.shell, "-c", self.cmd])
            .attach_stdout(self.attach_stdout)
            .attach_stderr(self.attach_stderr);

        if let Some(working_dir) = self.working_dir {
            builder = builder.working_dir(working_dir.to_string_lossy());
        }
        if let Some(env) = self.env {
            builder = builder.env(env);
        }

        builder.build()
    }
}

/// One chunk read from the container's attached shell channel.
#[derive(Debug)]
pub enum ShellChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// A bidirectional channel to a container's long-lived shell process.
/// Unlike `Container::exec`, which runs one command to completion, a
/// `ShellChannel` stays open for the lifetime of a `Session`: writes go to
/// the shell's stdin, reads are polled chunk by chunk so the caller can
/// apply its own timeout policy (see `protocol::read_until_marker`).
#[async_trait]
pub trait ShellChannel: Send {
    async fn write_line(&mut self, line: &str) -> Result<()>;
    /// Returns `None` when the channel produced no chunk within the given
    /// poll window, distinct from EOF (`Some(Err(..))` on a broken pipe).
    async fn next_chunk(&mut self) -> Option<Result<ShellChunk>>;
}

#[async_trait]
pub trait Container<'job>: Send + Sync {
    fn id(&self) -> &str;
    async fn spawn(&mut self, opts: &CreateOpts) -> Result<()>;
    async fn remove(&self, force: bool) -> Result<()>;
    async fn is_running(&self) -> Result<bool>;
    async fn exec(&self, opts: &ExecOpts<'_>) -> Result<Output<String>>;
    async fn attach_shell(&self) -> Result<Box<dyn ShellChannel + 'job>>;
    async fn logs(&self, stdout: bool, stderr: bool) -> Result<Output<u8>>;
    async fn copy_from(&self, path: &Path) -> Result<Vec<u8>>;
    /// Takes owned entries rather than the teacher's generic
    /// `IntoIterator<Item = (impl AsRef<Path>, &[u8])>` so the trait stays
    /// dyn-compatible: `Session` holds its container behind `Box<dyn
    /// Container>`, and a generic trait method would rule that out.
    async fn upload_files(&self, files: &[(PathBuf, Vec<u8>)], destination: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_name_strips_invalid_characters() {
        assert_eq!(fix_name("swe-agent-task-env-abc123_9.x"), "swe-agent-task-env-abc123_9.x");
        assert_eq!(fix_name("foo/bar:baz@sha"), "foobarbazsha");
    }

    #[test]
    fn truncate_keeps_full_short_ids() {
        assert_eq!(truncate("abc123"), "abc123");
        assert_eq!(truncate("0123456789abcdef"), "0123456789ab");
    }
}
