//! Subprocess execution for external tools
//!
//! The compiler and the benchmark runner are both driven through the
//! [`CommandRunner`] trait so the pipeline can be exercised without either
//! binary installed.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{ConvBenchError, Result};

/// Interval between child status polls while a timeout is armed
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for the pipes to close once a timed child has exited
///
/// A grandchild that inherited the pipes can hold them open past the
/// child's exit. After this grace the readers are detached.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Captured result of one external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` if the process was killed by a signal or timed out
    pub status: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Whether the timeout expired and the process was killed
    pub timed_out: bool,
}

impl CommandOutput {
    /// Build a completed output with the given exit code
    #[must_use]
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    /// True only for a normal exit with code zero
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Exit code with signals and timeouts folded into `-1`
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.status.unwrap_or(-1)
    }
}

/// Launches external programs and captures their output
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, waiting at most `timeout` if given
    ///
    /// # Errors
    ///
    /// Returns `CommandError` if the program cannot be spawned. A nonzero
    /// exit or a timeout is not an error; it is reported in the output.
    fn run(&self, program: &str, args: &[String], timeout: Option<Duration>) -> Result<CommandOutput>;
}

/// Runs commands on the host with `std::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    /// Create a host runner
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], timeout: Option<Duration>) -> Result<CommandOutput> {
        debug!("Exec: {} {}", program, args.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // A timed child leads its own process group so the kill reaches
        // anything it spawned.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if timeout.is_some() {
                cmd.process_group(0);
            }
        }
        let mut child = cmd
            .spawn()
            .map_err(|e| ConvBenchError::CommandError {
                program: program.to_string(),
                reason: e.to_string(),
            })?;

        // Drain both pipes on their own threads so a chatty child cannot
        // block on a full pipe while we poll for exit.
        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let (status, timed_out) = wait_with_timeout(&mut child, timeout).map_err(|e| {
            ConvBenchError::CommandError {
                program: program.to_string(),
                reason: e.to_string(),
            }
        })?;

        if timed_out {
            warn!(
                "{} killed after {:?} timeout",
                program,
                timeout.unwrap_or_default()
            );
        }

        let drain_deadline = timeout.map(|_| Instant::now() + DRAIN_GRACE);
        let stdout = collect_reader(stdout_reader, drain_deadline);
        let stderr = collect_reader(stderr_reader, drain_deadline);
        if drain_deadline.is_some_and(|d| Instant::now() >= d) {
            debug!("{program}: output pipes still open after exit, detached readers");
        }

        Ok(CommandOutput {
            status,
            stdout,
            stderr,
            timed_out,
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
        rx
    })
}

/// Wait for a reader's text, giving up at `deadline` if one is set
fn collect_reader(reader: Option<Receiver<String>>, deadline: Option<Instant>) -> String {
    let Some(rx) = reader else {
        return String::new();
    };
    match deadline {
        Some(deadline) => rx
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .unwrap_or_default(),
        None => rx.recv().unwrap_or_default(),
    }
}

/// Kill the child and, on unix, the process group it leads
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        let _ = Command::new("kill")
            .args(["-s", "KILL", "--", group.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
}

fn wait_with_timeout(
    child: &mut Child,
    timeout: Option<Duration>,
) -> std::io::Result<(Option<i32>, bool)> {
    let Some(limit) = timeout else {
        let status = child.wait()?;
        return Ok((status.code(), false));
    };

    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status.code(), false));
        }
        if Instant::now() >= deadline {
            kill_tree(child);
            let _ = child.wait();
            return Ok((None, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_success() {
        let out = CommandOutput::exited(0, "ok", "");
        assert!(out.success());
        assert_eq!(out.exit_code(), 0);

        let failed = CommandOutput::exited(3, "", "boom");
        assert!(!failed.success());
        assert_eq!(failed.exit_code(), 3);

        let killed = CommandOutput {
            timed_out: true,
            ..Default::default()
        };
        assert!(!killed.success());
        assert_eq!(killed.exit_code(), -1);
    }

    #[test]
    fn test_spawn_failure_is_command_error() {
        let runner = SystemRunner::new();
        let err = runner
            .run("convbench-definitely-not-a-binary", &[], None)
            .unwrap_err();
        assert!(matches!(err, ConvBenchError::CommandError { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_stdout_and_exit_code() {
        let runner = SystemRunner::new();
        let args = vec!["-c".to_string(), "echo out; echo err 1>&2; exit 7".to_string()];
        let out = runner.run("sh", &args, None).unwrap();
        assert_eq!(out.status, Some(7));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert!(!out.timed_out);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_hung_child() {
        let runner = SystemRunner::new();
        let args = vec!["-c".to_string(), "exec sleep 30".to_string()];
        let start = Instant::now();
        let out = runner
            .run("sh", &args, Some(Duration::from_millis(200)))
            .unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_not_held_by_grandchild_pipes() {
        let runner = SystemRunner::new();
        // sh forks sleep, which inherits stdout and stderr
        let args = vec!["-c".to_string(), "sleep 6; true".to_string()];
        let start = Instant::now();
        let out = runner
            .run("sh", &args, Some(Duration::from_millis(200)))
            .unwrap();
        assert!(out.timed_out);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_timed_run_still_captures_output() {
        let runner = SystemRunner::new();
        let args = vec!["-c".to_string(), "echo done".to_string()];
        let out = runner
            .run("sh", &args, Some(Duration::from_secs(10)))
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "done");
    }
}
