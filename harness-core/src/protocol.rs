//! Command-channel wire protocol: end-marker framing, dual-timeout
//! reading, and the action-rewriting rules the original harness applies
//! before sending a command to the shell. Ported bit-exact from
//! `original_source/sweagent/environment/utils.py`
//! (`read_with_timeout_experimental`, `action_hacking`,
//! `_check_for_too_many_non_unicode_bytes`).

use std::time::Duration;

use regex::Regex;
use tokio::time::{sleep, Instant};
use tracing::{trace, warn};

use crate::container::{ShellChannel, ShellChunk};
use crate::error::{HarnessError, Result};

pub const PROCESS_DONE_MARKER_START: &str = "///PROCESS-DONE:";
pub const PROCESS_DONE_MARKER_END: &str = ":PROCESS-DONE///";

/// Fraction of a command's output that may fail UTF-8 decoding before the
/// session is declared broken rather than just noisy.
pub const DECODED_BUFFER_FAILURE_THRESHOLD: f64 = 0.1;

fn marker_regex() -> Regex {
    Regex::new(&format!(
        r"{}(\d+){}",
        regex::escape(PROCESS_DONE_MARKER_START),
        regex::escape(PROCESS_DONE_MARKER_END)
    ))
    .expect("marker regex is a fixed, valid pattern")
}

/// Appends the end-marker echo to a command so its exit code can be read
/// back out of the same stdout stream the command's own output goes to.
pub fn wrap_with_marker(action: &str) -> String {
    let mut wrapped = action.trim_end().to_string();
    if !wrapped.ends_with('\n') {
        wrapped.push('\n');
    }
    wrapped.push_str(&format!(
        "echo {}$?{}\n",
        PROCESS_DONE_MARKER_START, PROCESS_DONE_MARKER_END
    ));
    wrapped
}

/// Applies the original harness's per-tool rewrites before an action is
/// sent to the shell: `./gradlew` invocations get the marker echo appended
/// directly (so a failing gradle daemon doesn't eat the exit code), and
/// `npm run`/`yarn run` get backgrounded with `nohup` so a long-lived dev
/// server doesn't block the channel.
pub fn action_hacking(action: &str) -> String {
    let trimmed = action.trim();
    if trimmed.starts_with("./gradlew") {
        format!(
            "{}; echo {}$?{}\n",
            trimmed, PROCESS_DONE_MARKER_START, PROCESS_DONE_MARKER_END
        )
    } else if trimmed.starts_with("npm run") || trimmed.starts_with("yarn run") {
        format!(
            "(nohup {trimmed} & > /dev/null) && sleep 30 && cat /dev/null \n",
            trimmed = trimmed
        )
    } else {
        action.to_string()
    }
}

/// Normalizes CRLF line endings a tty channel may introduce, matching the
/// original's `output.replace("\r\n", "\n")` before marker extraction.
pub fn normalize_crlf(output: &str) -> String {
    output.replace("\r\n", "\n")
}

/// Decodes a byte buffer as UTF-8, tolerating a bounded fraction of
/// invalid bytes (binary noise from a misbehaving test runner) before
/// treating the command as having broken the session.
pub fn decode_with_density_check(label: &str, buf: &[u8]) -> Result<String> {
    if buf.is_empty() {
        return Ok(String::new());
    }
    let decoded = String::from_utf8_lossy(buf);
    let replacement_count = decoded.matches('\u{FFFD}').count();
    let fraction = replacement_count as f64 / buf.len() as f64;
    if fraction > DECODED_BUFFER_FAILURE_THRESHOLD {
        return Err(HarnessError::Unicode {
            label: label.to_string(),
            invalid_fraction: fraction,
        });
    }
    Ok(decoded.into_owned())
}

/// Outcome of draining a command's output up to its end marker.
pub struct CommandOutput {
    pub stdout: String,
    pub exit_code: i32,
}

/// Reads from `channel` until the end marker appears, applying two
/// independent timeout budgets: `total_timeout` bounds the whole command
/// regardless of how much output it produces, `no_output_timeout` fires
/// only while the channel has gone quiet, so a command that's still
/// chatty (e.g. streaming test output) isn't killed just for running
/// long. Mirrors `read_with_timeout_experimental`'s two-clock design.
pub async fn read_until_marker(
    channel: &mut dyn ShellChannel,
    label: &str,
    total_timeout: Duration,
    no_output_timeout: Duration,
) -> Result<CommandOutput> {
    let marker_re = marker_regex();
    let started = Instant::now();
    let mut last_output = Instant::now();
    let mut buf: Vec<u8> = Vec::new();

    loop {
        if started.elapsed() >= total_timeout {
            return Err(HarnessError::TotalTimeout {
                label: label.to_string(),
                timeout_secs: total_timeout.as_secs(),
            });
        }

        let remaining_total = total_timeout - started.elapsed();
        let remaining_quiet = no_output_timeout.saturating_sub(last_output.elapsed());
        let poll_window = remaining_total.min(remaining_quiet).min(Duration::from_millis(200));

        tokio::select! {
            chunk = channel.next_chunk() => {
                match chunk {
                    Some(Ok(ShellChunk::Stdout(mut bytes))) => {
                        buf.append(&mut bytes);
                        last_output = Instant::now();
                    }
                    Some(Ok(ShellChunk::Stderr(mut bytes))) => {
                        buf.append(&mut bytes);
                        last_output = Instant::now();
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        trace!(label, "no chunk within poll window");
                    }
                }
            }
            _ = sleep(poll_window) => {}
        }

        if last_output.elapsed() >= no_output_timeout {
            return Err(HarnessError::NoOutputTimeout {
                label: label.to_string(),
                timeout_secs: no_output_timeout.as_secs(),
            });
        }

        let decoded = decode_with_density_check(label, &buf)?;
        let normalized = normalize_crlf(&decoded);
        // Take the *last* marker in the buffer, matching the original's
        // `reversed(decoded.splitlines())` scan: a command's own output can
        // legitimately contain marker-shaped text earlier in the stream
        // (e.g. echoing back the command we just sent), so only the final
        // occurrence is the one our own `wrap_with_marker` appended.
        if let Some(caps) = marker_re.captures_iter(&normalized).last() {
            let exit_code: i32 = caps[1].parse().map_err(|_| HarnessError::Session {
                session: label.to_string(),
                reason: format!("exit code `{}` is not a valid integer", &caps[1]),
            })?;
            let before_marker = marker_re.replace_all(&normalized, "").to_string();
            return Ok(CommandOutput {
                stdout: before_marker,
                exit_code,
            });
        }
    }
}

/// Builds the `bash -n` pre-flight syntax-check invocation for an action,
/// so a malformed command fails fast instead of wedging the shell channel
/// waiting for output that will never arrive.
pub fn syntax_check_command(action: &str) -> String {
    format!(
        "cat <<'HARNESS_SYNTAX_EOF' | bash -n\n{}\nHARNESS_SYNTAX_EOF",
        action
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradlew_commands_get_marker_appended() {
        let rewritten = action_hacking("./gradlew test");
        assert!(rewritten.starts_with("./gradlew test; echo "));
        assert!(rewritten.contains(PROCESS_DONE_MARKER_START));
    }

    #[test]
    fn npm_run_commands_are_backgrounded() {
        let rewritten = action_hacking("npm run dev");
        assert!(rewritten.starts_with("(nohup npm run dev & > /dev/null)"));
    }

    #[test]
    fn yarn_run_commands_are_backgrounded() {
        let rewritten = action_hacking("yarn run start");
        assert!(rewritten.contains("nohup yarn run start"));
    }

    #[test]
    fn ordinary_commands_pass_through_unchanged() {
        assert_eq!(action_hacking("ls -la"), "ls -la");
    }

    #[test]
    fn marker_is_extracted_and_stripped() {
        let re = marker_regex();
        let output = format!("hello\n{}0{}\n", PROCESS_DONE_MARKER_START, PROCESS_DONE_MARKER_END);
        let caps = re.captures_iter(&output).last().unwrap();
        assert_eq!(&caps[1], "0");
        let stripped = re.replace_all(&output, "");
        assert_eq!(stripped, "hello\n\n");
    }

    /// When the command's own output echoes marker-shaped text (e.g. it
    /// printed the command we sent, which itself contains the marker
    /// echo), only the *last* occurrence is our real completion marker.
    #[test]
    fn last_marker_occurrence_wins_when_several_are_present() {
        let re = marker_regex();
        let output = format!(
            "echo {start}$?{end}\n{start}0{end}\n",
            start = PROCESS_DONE_MARKER_START,
            end = PROCESS_DONE_MARKER_END
        );
        let caps = re.captures_iter(&output).last().unwrap();
        assert_eq!(&caps[1], "0");
    }

    #[test]
    fn density_check_tolerates_small_fraction_of_bad_bytes() {
        let mut buf = vec![b'a'; 1000];
        buf.push(0xFF);
        assert!(decode_with_density_check("cmd", &buf).is_ok());
    }

    #[test]
    fn density_check_rejects_mostly_binary_output() {
        let buf = vec![0xFFu8; 100];
        let result = decode_with_density_check("cmd", &buf);
        assert!(matches!(result, Err(HarnessError::Unicode { .. })));
    }

    #[test]
    fn crlf_is_normalized_to_lf() {
        assert_eq!(normalize_crlf("a\r\nb\r\n"), "a\nb\n");
    }
}
