//! Shared utilities: secret handling and time-bounded process execution

use std::fmt;
use std::io;
use std::process::{Command, ExitStatus, Output, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// How long to wait for the reader thread to hand back partial output after a kill.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// A string wrapper that masks its contents in Debug/Display output.
/// Prevents accidental logging of API keys and other secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Intentionally access the raw secret value (for headers, URLs, etc.)
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<&str> for SecretString {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command not found: {program}")]
    NotFound { program: String },
    #[error("command timed out after {timeout:?}")]
    TimedOut {
        timeout: Duration,
        partial_output: String,
    },
    #[error("failed to run command: {0}")]
    Io(#[from] io::Error),
}

/// Exit status plus stdout and stderr concatenated in that order.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub combined: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            status: output.status,
            combined: combine_output(&output),
        }
    }
}

fn combine_output(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

/// Shared slot holding the pid of the process a job is currently waiting on.
///
/// Lets a caller on another thread kill the process tree of a job it has given up on.
#[derive(Debug, Clone, Default)]
pub struct ProcessTracker {
    pid: Arc<Mutex<Option<u32>>>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, pid: u32) {
        *self.pid.lock().unwrap_or_else(|e| e.into_inner()) = Some(pid);
    }

    fn clear(&self) {
        self.pid.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Pid of the running process, if any.
    pub fn current(&self) -> Option<u32> {
        *self.pid.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Kill the tracked process tree. Returns false when nothing was running.
    pub fn kill(&self) -> bool {
        let pid = self.pid.lock().unwrap_or_else(|e| e.into_inner()).take();
        match pid {
            Some(pid) => {
                warn!("Killing process tree rooted at pid {}", pid);
                kill_process_tree(pid);
                true
            }
            None => false,
        }
    }
}

/// Kill a whole process group. Children are spawned as group leaders, so the
/// group id equals the child's pid.
#[cfg(unix)]
fn kill_process_tree(pid: u32) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a stale pgid yields ESRCH.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_tree(pid: u32) {
    let _ = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

/// Run a command with a timeout, killing its process tree on expiry.
///
/// The child gets its own process group so that shells and the tools they launch
/// die together. On timeout, whatever output was produced before the kill is
/// returned inside [`CommandError::TimedOut`].
pub fn run_cmd_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    tracker: &ProcessTracker,
) -> Result<CommandOutput, CommandError> {
    let program = cmd.get_program().to_string_lossy().into_owned();

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(CommandError::NotFound { program });
        }
        Err(e) => return Err(CommandError::Io(e)),
    };

    let pid = child.id();
    tracker.register(pid);
    debug!("Spawned {} (pid {}), timeout {:?}", program, pid, timeout);

    let (sender, receiver) = mpsc::channel();
    std::thread::spawn(move || {
        let result = child.wait_with_output();
        let _ = sender.send(result);
    });

    match receiver.recv_timeout(timeout) {
        Ok(result) => {
            tracker.clear();
            Ok(CommandOutput::from(result?))
        }
        Err(_) => {
            tracker.kill();
            let partial_output = receiver
                .recv_timeout(KILL_GRACE)
                .ok()
                .and_then(|r| r.ok())
                .map(|output| combine_output(&output))
                .unwrap_or_default();
            Err(CommandError::TimedOut {
                timeout,
                partial_output,
            })
        }
    }
}

/// Keep at most the last `limit` characters of `text`.
/// Returns the (possibly shortened) text and whether anything was cut.
pub fn tail_chars(text: &str, limit: usize) -> (String, bool) {
    let total = text.chars().count();
    if total <= limit {
        return (text.to_string(), false);
    }
    (text.chars().skip(total - limit).collect(), true)
}
