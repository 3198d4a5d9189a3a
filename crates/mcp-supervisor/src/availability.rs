//! Checks whether a command can be found before trying to launch it.

use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

#[cfg(windows)]
const PROBE_TOOL: &str = "where";
#[cfg(not(windows))]
const PROBE_TOOL: &str = "which";

const PROBE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Whether `command` resolves to an executable on the search path.
///
/// Uses the platform lookup tool (`which`, or `where` on Windows) instead of
/// running the command itself. Blocks for at most `timeout`; any failure of
/// the probe resolves to `false`.
pub fn is_available(command: &str, timeout: Duration) -> bool {
    let command = command.trim();
    if command.is_empty() {
        return false;
    }

    if has_path_separator(command) {
        return is_existing_file(Path::new(command));
    }

    match run_probe(Command::new(PROBE_TOOL).arg(command), timeout) {
        Some(found) => found,
        None => fallback_probe(command, timeout),
    }
}

/// `which` is missing on some minimal images; `command -v` is POSIX.
#[cfg(unix)]
fn fallback_probe(command: &str, timeout: Duration) -> bool {
    let mut probe = Command::new("sh");
    probe
        .arg("-c")
        .arg("command -v -- \"$1\"")
        .arg("sh")
        .arg(command);
    run_probe(&mut probe, timeout).unwrap_or(false)
}

#[cfg(not(unix))]
fn fallback_probe(_command: &str, _timeout: Duration) -> bool {
    false
}

/// Runs a probe to completion or until `timeout`.
///
/// Returns `None` only when the probe tool itself could not be spawned.
fn run_probe(probe: &mut Command, timeout: Duration) -> Option<bool> {
    let mut child = match probe
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Availability probe {:?} missing", probe.get_program());
            return None;
        }
        Err(e) => {
            warn!("Availability probe failed to start: {e}");
            return Some(false);
        }
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status.success()),
            Ok(None) if Instant::now() >= deadline => {
                warn!("Availability probe timed out after {}ms", timeout.as_millis());
                child.kill().ok();
                child.wait().ok();
                return Some(false);
            }
            Ok(None) => std::thread::sleep(PROBE_POLL_INTERVAL),
            Err(e) => {
                warn!("Availability probe wait failed: {e}");
                child.kill().ok();
                return Some(false);
            }
        }
    }
}

fn has_path_separator(command: &str) -> bool {
    command.contains('/') || (cfg!(windows) && command.contains('\\'))
}

/// Existence only; a missing execute bit surfaces from the launcher as
/// permission denied.
fn is_existing_file(path: &Path) -> bool {
    path.is_file()
}
