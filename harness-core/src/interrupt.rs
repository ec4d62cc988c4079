//! Process enumeration and the interrupt protocol used when an
//! agent-issued command overruns its timeout. Ported from
//! `original_source/sweagent/environment/swe_env.py`'s `get_pids` and
//! `interrupt` methods.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use crate::container::{Container, ExecOpts, ShellChannel};
use crate::error::{HarnessError, Result};
use crate::protocol::{self, wrap_with_marker};

/// Command names never killed by an interrupt: `ps` itself (we're mid-scan),
/// and the shells/package-manager wrappers the session's own plumbing runs
/// as (`sh`, `npm`, `yarn` — the latter two because `action_hacking`
/// backgrounds `npm run`/`yarn run` under them deliberately).
const EXCLUDED_COMMANDS: &[&str] = &["ps", "npm", "yarn", "sh"];

/// Parses `ps -eo pid,comm --no-headers` output into `(pid, command)`
/// pairs, skipping malformed lines rather than failing the whole scan.
pub fn parse_ps_output(output: &str) -> Vec<(u32, String)> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim().splitn(2, char::is_whitespace);
            let pid = parts.next()?.parse::<u32>().ok()?;
            let comm = parts.next()?.trim().to_string();
            Some((pid, comm))
        })
        .collect()
}

/// Which of the listed processes should be killed: anything not in
/// `parent_pids` (the session's own shell and its ancestry) and not one of
/// `EXCLUDED_COMMANDS`, returned in reverse-PID order so children are
/// killed before their parents can respawn them.
pub fn pids_to_kill(processes: &[(u32, String)], parent_pids: &HashSet<u32>) -> Vec<u32> {
    let mut victims: Vec<u32> = processes
        .iter()
        .filter(|(pid, comm)| !parent_pids.contains(pid) && !EXCLUDED_COMMANDS.contains(&comm.as_str()))
        .map(|(pid, _)| *pid)
        .collect();
    victims.sort_unstable_by(|a, b| b.cmp(a));
    victims
}

/// Runs the full interrupt protocol: enumerate, kill in reverse order,
/// drain whatever's left in the pipe, then confirm the shell is
/// responsive again with two `echo 'interrupted'` round-trips. Returns
/// `Err` (session-breaking) if the shell doesn't answer either
/// confirmation within its timeout.
pub async fn interrupt<'c>(
    container: &dyn Container<'c>,
    channel: &mut dyn ShellChannel,
    parent_pids: &HashSet<u32>,
) -> Result<()> {
    debug!("enumerating processes for interrupt");
    let ps_output = container
        .exec(&ExecOpts::new().cmd("ps -eo pid,comm --no-headers"))
        .await?;
    let processes = parse_ps_output(&ps_output.stdout.concat());
    let victims = pids_to_kill(&processes, parent_pids);

    for pid in victims {
        debug!(pid, "killing interrupted process");
        let _ = container
            .exec(&ExecOpts::new().cmd(&format!("kill -9 {pid}")))
            .await;
    }

    // Drain whatever is left buffered from the interrupted command; a
    // missing marker here is expected (that's why we're interrupting) so
    // timeouts are tolerated rather than propagated.
    let drain = protocol::read_until_marker(
        channel,
        "interrupt-drain",
        Duration::from_secs(20),
        Duration::from_secs(20),
    )
    .await;
    if let Err(e) = drain {
        debug!(error = %e, "drain after interrupt timed out, continuing");
    }

    for attempt in 0..2 {
        channel
            .write_line(&wrap_with_marker("echo 'interrupted'"))
            .await?;
        let confirmation = protocol::read_until_marker(
            channel,
            "interrupt-confirm",
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .await?;
        if !confirmation.stdout.contains("interrupted") {
            warn!(attempt, "interrupt confirmation missing expected echo");
            return Err(HarnessError::Session {
                session: "interrupt".into(),
                reason: "shell did not echo back after interrupt".into(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pid_and_command_pairs() {
        let output = "    1 sh\n   42 npm\n  108 pytest\n";
        let parsed = parse_ps_output(output);
        assert_eq!(
            parsed,
            vec![(1, "sh".to_string()), (42, "npm".to_string()), (108, "pytest".to_string())]
        );
    }

    #[test]
    fn excludes_parent_pids_and_excluded_commands() {
        let processes = vec![
            (1, "sh".to_string()),
            (2, "npm".to_string()),
            (3, "pytest".to_string()),
            (4, "pytest".to_string()),
        ];
        let mut parents = HashSet::new();
        parents.insert(1);
        let victims = pids_to_kill(&processes, &parents);
        assert_eq!(victims, vec![4, 3]);
    }

    #[test]
    fn empty_process_list_kills_nothing() {
        assert!(pids_to_kill(&[], &HashSet::new()).is_empty());
    }
}
