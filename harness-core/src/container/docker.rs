use std::path::Path;
use std::str;

use async_trait::async_trait;
use docker_api::conn::TtyChunk;
use docker_api::opts::{ContainerRemoveOpts, ExecStartOpts, LogsOpts};
use docker_api::{Docker, Exec};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info, instrument};

use super::{truncate, Container, CreateOpts, ExecOpts, Output, ShellChannel, ShellChunk};
use crate::archive::create_tarball;
use crate::error::{HarnessError, Result};

/// Wrapper around `docker_api::Container` that implements the harness's
/// `Container` trait, plus an `attach_shell` channel for the long-lived
/// interactive session a one-shot build-and-exec flow never needed.
pub struct DockerContainer<'job> {
    container: docker_api::Container<'job>,
    docker: &'job Docker,
}

impl<'job> DockerContainer<'job> {
    pub fn new(docker: &'job Docker) -> DockerContainer<'job> {
        Self {
            container: docker.containers().get(""),
            docker,
        }
    }

    pub fn inner(&self) -> &docker_api::Container<'job> {
        &self.container
    }
}

#[async_trait]
impl<'job> Container<'job> for DockerContainer<'job> {
    fn id(&self) -> &str {
        truncate(self.container.id())
    }

    #[instrument(skip(self, opts))]
    async fn spawn(&mut self, opts: &CreateOpts) -> Result<()> {
        let id = self
            .docker
            .containers()
            .create(&opts.clone().build_docker())
            .await?
            .id()
            .to_owned();
        self.container = self.docker.containers().get(id);
        info!(container_id = %self.id(), "created container");

        self.container.start().await?;
        info!(container_id = %self.id(), "started container");

        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, force: bool) -> Result<()> {
        debug!(container_id = %self.id(), "removing container");
        self.container
            .remove(&ContainerRemoveOpts::builder().force(force).build())
            .await?;
        Ok(())
    }

    async fn is_running(&self) -> Result<bool> {
        let details = self.container.inspect().await?;
        Ok(details.state.and_then(|s| s.running).unwrap_or(false))
    }

    #[instrument(skip(self, opts))]
    async fn exec(&self, opts: &ExecOpts<'_>) -> Result<Output<String>> {
        let exec = Exec::create(self.docker, self.id(), &opts.clone().build_docker()).await?;
        let mut stream = exec.start(&ExecStartOpts::builder().build());

        let mut output = Output::default();
        while let Some(result) = stream.next().await {
            match result? {
                TtyChunk::StdOut(chunk) => {
                    let chunk = str::from_utf8(&chunk)?;
                    output.stdout.push(chunk.to_string());
                }
                TtyChunk::StdErr(chunk) => {
                    let chunk = str::from_utf8(&chunk)?;
                    output.stderr.push(chunk.to_string());
                }
                _ => {}
            }
        }

        output.exit_code = exec
            .inspect()
            .await
            .map(|details| details.exit_code.unwrap_or_default())?;

        Ok(output)
    }

    /// Attaches to the container's PID-1 shell (the container is spawned
    /// with `open_stdin`/`tty` so PID 1 itself is the interactive shell a
    /// `Session` drives for the whole task, rather than one-shot execs).
    async fn attach_shell(&self) -> Result<Box<dyn ShellChannel + 'job>> {
        let multiplexer = self
            .container
            .attach()
            .await
            .map_err(HarnessError::Engine)?;
        Ok(Box::new(DockerShellChannel { multiplexer }))
    }

    async fn logs(&self, stdout: bool, stderr: bool) -> Result<Output<u8>> {
        let mut logs_stream = self
            .container
            .logs(&LogsOpts::builder().stdout(stdout).stderr(stderr).build());

        let mut output = Output::default();
        while let Some(chunk) = logs_stream.next().await {
            match chunk? {
                TtyChunk::StdOut(mut bytes) => output.stdout.append(&mut bytes),
                TtyChunk::StdErr(mut bytes) => output.stderr.append(&mut bytes),
                _ => {}
            }
        }

        Ok(output)
    }

    async fn copy_from(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner()
            .copy_from(path)
            .try_concat()
            .await
            .map_err(HarnessError::Engine)
    }

    async fn upload_files(&self, files: &[(std::path::PathBuf, Vec<u8>)], destination: &Path) -> Result<()> {
        let entries = files.iter().map(|(p, bytes)| (p.as_path(), bytes.as_slice()));
        let tar = create_tarball(entries)?;
        let tar_path = destination.join("archive.tgz");

        self.inner()
            .copy_file_into(&tar_path, &tar)
            .await
            .map_err(HarnessError::Engine)?;

        self.exec(
            &ExecOpts::new()
                .cmd(&format!("tar -xf {}", tar_path.display()))
                .working_dir(destination),
        )
        .await
        .map(|_| ())
    }
}

/// `ShellChannel` implementation over a live `docker_api` attach stream.
struct DockerShellChannel<'job> {
    multiplexer: docker_api::conn::AttachedContainer<'job>,
}

#[async_trait]
impl<'job> ShellChannel for DockerShellChannel<'job> {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        use futures::SinkExt;
        let mut buf = line.as_bytes().to_vec();
        buf.push(b'\n');
        self.multiplexer
            .write_all(&buf)
            .await
            .map_err(|e| HarnessError::Session {
                session: "shell".into(),
                reason: format!("write to attached stdin failed: {e}"),
            })
    }

    async fn next_chunk(&mut self) -> Option<Result<ShellChunk>> {
        match self.multiplexer.next().await? {
            Ok(TtyChunk::StdOut(bytes)) => Some(Ok(ShellChunk::Stdout(bytes))),
            Ok(TtyChunk::StdErr(bytes)) => Some(Ok(ShellChunk::Stderr(bytes))),
            Ok(_) => None,
            Err(e) => Some(Err(HarnessError::Engine(e))),
        }
    }
}
