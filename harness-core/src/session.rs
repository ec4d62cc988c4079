//! Container session lifecycle: a single long-lived interactive shell
//! channel driven through an explicit state machine, grounded in
//! `original_source/sweagent/environment/utils.py`'s
//! `_get_persistent_container`/`_get_non_persistent_container`.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::container::{Container, CreateOpts, ExecOpts, ShellChannel};
use crate::error::{HarnessError, Result};
use crate::interrupt;
use crate::model::Command;
use crate::protocol::{self, action_hacking, syntax_check_command, wrap_with_marker};

/// Lifecycle states a `Session` moves through. `Idle -> Interrupting ->
/// Idle` is the side branch taken when a command overruns its timeout;
/// `Any -> Broken` is taken when the shell channel itself can no longer be
/// trusted (density-check failure, non-numeric exit code, confirmed-dead
/// interrupt).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Attached,
    Idle,
    InFlight,
    Interrupting,
    Closed,
    Broken,
}

/// Whether the container backing a session is reused across tasks
/// (`persistent`) or torn down at the end of the task (the default).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Persistent,
    NonPersistent,
}

pub struct Session<'job> {
    container: Box<dyn Container<'job> + 'job>,
    channel: Option<Box<dyn ShellChannel + 'job>>,
    state: SessionState,
    parent_pids: HashSet<u32>,
    mode: Mode,
    start_up_delay: Duration,
}

impl<'job> Session<'job> {
    pub fn new(container: Box<dyn Container<'job> + 'job>, mode: Mode, start_up_delay: Duration) -> Self {
        Session {
            container,
            channel: None,
            state: SessionState::Unstarted,
            parent_pids: HashSet::new(),
            mode,
            start_up_delay,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn id(&self) -> &str {
        self.container.id()
    }

    /// Spawns (or reuses, for a persistent session) the container, attaches
    /// the shell channel, and records the shell's own PID tree so later
    /// interrupts never kill the channel it's running through.
    #[instrument(skip(self, opts))]
    pub async fn start(&mut self, opts: &CreateOpts) -> Result<()> {
        if self.state != SessionState::Unstarted {
            return Err(HarnessError::Session {
                session: self.id().to_string(),
                reason: format!("start() called from state {:?}", self.state),
            });
        }

        if !self.container.is_running().await.unwrap_or(false) {
            self.container.spawn(opts).await?;
        }
        tokio::time::sleep(self.start_up_delay).await;

        let channel = self.container.attach_shell().await?;
        self.parent_pids = self.record_parent_pids().await?;
        self.channel = Some(channel);
        self.state = SessionState::Attached;
        info!(session = %self.id(), "session attached");
        self.state = SessionState::Idle;
        Ok(())
    }

    async fn record_parent_pids(&self) -> Result<HashSet<u32>> {
        let output = self
            .container
            .exec(&ExecOpts::new().cmd("ps -eo pid,ppid --no-headers"))
            .await?;
        let mut pids = HashSet::new();
        for line in output.stdout.concat().lines() {
            let mut parts = line.trim().split_whitespace();
            if let (Some(pid), Some(ppid)) = (parts.next(), parts.next()) {
                if let Ok(pid) = pid.parse::<u32>() {
                    pids.insert(pid);
                }
                if let Ok(ppid) = ppid.parse::<u32>() {
                    pids.insert(ppid);
                }
            }
        }
        Ok(pids)
    }

    /// Runs one command to completion: pre-flight `bash -n` syntax check,
    /// `action_hacking` rewrite, end-marker framing, dual-timeout read.
    /// `TotalTimeout` triggers the interrupt protocol before the error is
    /// returned; `NoOutputTimeout` (and any other read error) is returned
    /// straight back untouched, since only the caller (the orchestrator)
    /// knows whether to prod the command further or give up on it.
    #[instrument(skip(self, command), fields(label = %command.label))]
    pub async fn run(&mut self, command: &Command) -> Result<protocol::CommandOutput> {
        if self.state != SessionState::Idle {
            return Err(HarnessError::Session {
                session: self.id().to_string(),
                reason: format!("run() called from state {:?}", self.state),
            });
        }

        self.check_syntax(&command.raw).await?;

        self.state = SessionState::InFlight;
        let rewritten = action_hacking(&command.raw);
        let framed = wrap_with_marker(&rewritten);

        let channel = self.channel.as_deref_mut().ok_or_else(|| HarnessError::Session {
            session: self.id().to_string(),
            reason: "no shell channel attached".into(),
        })?;
        channel.write_line(&framed).await?;

        let result = protocol::read_until_marker(
            channel,
            &command.label,
            Duration::from_secs(command.total_timeout_secs),
            Duration::from_secs(command.no_output_timeout_secs),
        )
        .await;

        match result {
            Ok(output) => {
                self.state = SessionState::Idle;
                Ok(output)
            }
            Err(e @ HarnessError::TotalTimeout { .. }) => {
                warn!(error = %e, "command overran total timeout, interrupting");
                self.state = SessionState::Interrupting;
                let interrupted = {
                    let channel = self.channel.as_deref_mut().expect("channel checked above");
                    interrupt::interrupt(self.container.as_ref(), channel, &self.parent_pids).await
                };
                match interrupted {
                    Ok(()) => {
                        self.state = SessionState::Idle;
                    }
                    Err(interrupt_err) => {
                        warn!(error = %interrupt_err, "interrupt failed to recover the shell");
                        self.state = SessionState::Broken;
                    }
                }
                Err(e)
            }
            Err(e) => {
                // No-output expiry (and anything else read_until_marker can
                // raise) is reported straight back: the shell may still be
                // running the command, so the session stays `InFlight` and
                // it's the caller's call whether to prod it or interrupt.
                warn!(error = %e, "command reported an error other than total timeout");
                Err(e)
            }
        }
    }

    async fn check_syntax(&self, action: &str) -> Result<()> {
        let output = self
            .container
            .exec(&ExecOpts::new().cmd(&syntax_check_command(action)))
            .await?;
        if output.exit_code != 0 {
            return Err(HarnessError::Command {
                label: "syntax-check".into(),
                reason: output.stderr.concat(),
            });
        }
        Ok(())
    }

    /// Tears down the session: a persistent-mode container is left
    /// running (just detached from), a non-persistent one is removed.
    #[instrument(skip(self))]
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.channel = None;
        match self.mode {
            Mode::Persistent => {
                debug!(session = %self.id(), "leaving persistent container running");
            }
            Mode::NonPersistent => {
                self.container.remove(true).await?;
            }
        }
        self.state = SessionState::Closed;
        Ok(())
    }
}
