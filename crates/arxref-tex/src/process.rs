use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use thiserror::Error;

/// Exit code reported for commands that were killed on timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const ESCALATION_GRACE: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("failed to open {path} for redirection: {source}")]
    Redirect {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a supervised command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Exited(i32),
    TimedOut,
}

impl RunStatus {
    pub fn success(self) -> bool {
        matches!(self, RunStatus::Exited(0))
    }

    pub fn code(self) -> i32 {
        match self {
            RunStatus::Exited(code) => code,
            RunStatus::TimedOut => TIMEOUT_EXIT_CODE,
        }
    }
}

/// Run a command with stdin from the null device and all output suppressed.
pub fn run_quiet(
    timeout: Duration,
    cwd: &Path,
    program: &str,
    args: &[&str],
) -> Result<RunStatus, ProcessError> {
    let mut cmd = base_command(cwd, program, args);
    cmd.stdout(Stdio::null()).stderr(Stdio::null());
    supervise(cmd, program, timeout)
}

/// Run a command with stdout redirected to `stdout_path` and stderr suppressed.
pub fn run_stdout_to(
    timeout: Duration,
    cwd: &Path,
    program: &str,
    args: &[&str],
    stdout_path: &Path,
) -> Result<RunStatus, ProcessError> {
    let out = std::fs::File::create(stdout_path).map_err(|source| ProcessError::Redirect {
        path: stdout_path.to_path_buf(),
        source,
    })?;

    let mut cmd = base_command(cwd, program, args);
    cmd.stdout(Stdio::from(out)).stderr(Stdio::null());
    supervise(cmd, program, timeout)
}

fn base_command(cwd: &Path, program: &str, args: &[&str]) -> Command {
    use std::os::unix::process::CommandExt;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        // Own process group, so a timeout can kill the whole pipeline of
        // children the command may spawn.
        .process_group(0);
    cmd
}

/// Wait for the child to exit, enforcing a hard wall-clock timeout.
///
/// On timeout the entire process group is signalled, escalating
/// TERM -> HUP -> KILL with a short grace period between signals, and the
/// child is reaped so no zombie is left behind.
fn supervise(mut cmd: Command, program: &str, timeout: Duration) -> Result<RunStatus, ProcessError> {
    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(RunStatus::Exited(status.code().unwrap_or(-1)));
        }

        if Instant::now() >= deadline {
            tracing::warn!(program, timeout_s = timeout.as_secs(), "command timed out");
            kill_group(&mut child);
            return Ok(RunStatus::TimedOut);
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Terminate the child's process group, escalating through signals, then reap.
fn kill_group(child: &mut Child) {
    let pgid = Pid::from_raw(child.id() as i32);

    for signal in [Signal::SIGTERM, Signal::SIGHUP] {
        let _ = killpg(pgid, signal);

        let grace = Instant::now() + ESCALATION_GRACE;
        while Instant::now() < grace {
            if matches!(child.try_wait(), Ok(Some(_))) {
                return;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    let _ = killpg(pgid, Signal::SIGKILL);
    // SIGKILL cannot be ignored; a blocking wait reaps promptly.
    let _ = child.wait();
}
