//! Process utilities for child process management.

use crate::cli::signals::CancellationToken;
use std::path::Path;
use std::pin::pin;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

fn exit_status_code_parts(code: Option<i32>, _signal: Option<i32>) -> Option<i32> {
    if let Some(code) = code {
        return Some(code);
    }
    #[cfg(unix)]
    {
        if let Some(signal) = _signal {
            return Some(128 + signal);
        }
    }
    None
}

/// Extract exit code from ExitStatus, using 128+signal for signal-terminated processes on Unix.
pub(crate) fn exit_status_code(status: &std::process::ExitStatus) -> Option<i32> {
    let code = status.code();
    #[cfg(unix)]
    let signal = status.signal();
    #[cfg(not(unix))]
    let signal = None;
    exit_status_code_parts(code, signal)
}

/// Stream types for child processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Errors from spawning or waiting on a child process.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {stream}: {source}")]
    Read {
        stream: OutputStream,
        #[source]
        source: std::io::Error,
        /// The exit code of the process if it has already exited.
        exit_code: Option<i32>,
    },

    #[error("failed to wait for process: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },

    #[error("no shell configured")]
    NoShell,
}

/// How a child process came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Ran to completion on its own
    Exited,
    /// Killed after exceeding its time limit
    TimedOut,
    /// Killed because the run was cancelled
    Interrupted,
}

/// Captured result of a child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub termination: Termination,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited && self.exit_code == Some(0)
    }
}

/// Default shell for running command strings on this platform
pub fn default_shell() -> Vec<String> {
    if cfg!(windows) {
        vec!["cmd".into(), "/C".into()]
    } else {
        vec!["sh".into(), "-c".into()]
    }
}

/// Build a command that runs `script` through `shell` in `working_dir`.
///
/// On Unix the shell leads its own process group, so killing the group
/// also reaches subshells, pipeline stages and background jobs.
pub(crate) fn shell_command(
    shell: &[String],
    script: &str,
    working_dir: &Path,
) -> Result<Command, ProcessError> {
    let (program, args) = shell.split_first().ok_or(ProcessError::NoShell)?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .arg(script)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    Ok(cmd)
}

/// How long pipes may keep draining after the process group was killed
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Append everything read from `pipe` to `buf` as it arrives.
///
/// Bytes land in `buf` chunk by chunk, so a caller that stops waiting
/// still sees the partial output.
async fn read_into<R>(
    pipe: Option<R>,
    stream: OutputStream,
    buf: &mut Vec<u8>,
) -> Result<(), (OutputStream, std::io::Error)>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Ok(());
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = pipe.read(&mut chunk).await.map_err(|e| (stream, e))?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Kill the process group led by `pgid`, then the child itself, and reap it
async fn terminate(child: &mut Child, pgid: Option<u32>) -> Option<i32> {
    #[cfg(unix)]
    {
        if let Some(pgid) = pgid.filter(|&id| id > 0) {
            // SAFETY: killpg takes plain integers and touches no memory; a
            // group that is already gone yields ESRCH, which is ignored.
            unsafe {
                libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pgid;

    let _ = child.kill().await;
    child.wait().await.ok().and_then(|s| exit_status_code(&s))
}

enum Ending {
    Exited(std::process::ExitStatus),
    Killed(Termination),
}

/// Spawn `cmd` and capture its output, bounded by `timeout` and `cancel`.
///
/// Stdout and stderr are read concurrently and decoded lossily. On timeout
/// or cancellation the whole process group is killed and the child reaped
/// before returning; whatever output arrived until then is kept.
pub(crate) async fn run_captured(
    mut cmd: Command,
    timeout: Duration,
    mut cancel: CancellationToken,
) -> Result<ProcessOutput, ProcessError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .spawn()
        .map_err(|e| ProcessError::Spawn { program, source: e })?;
    let pgid = child.id();
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let (termination, exit_code) = {
        let reading = async {
            tokio::try_join!(
                read_into(stdout_pipe, OutputStream::Stdout, &mut stdout),
                read_into(stderr_pipe, OutputStream::Stderr, &mut stderr),
            )
        };
        let mut reading = pin!(reading);
        let mut deadline = pin!(tokio::time::sleep(timeout));
        let mut read_done = false;
        let mut status = None;

        let ending = loop {
            tokio::select! {
                result = &mut reading, if !read_done => {
                    read_done = true;
                    if let Err((stream, source)) = result {
                        let exit_code = terminate(&mut child, pgid).await;
                        return Err(ProcessError::Read { stream, source, exit_code });
                    }
                }
                waited = child.wait(), if status.is_none() => {
                    status = Some(waited.map_err(|e| ProcessError::Wait { source: e })?);
                }
                _ = &mut deadline => break Ending::Killed(Termination::TimedOut),
                _ = cancel.cancelled() => break Ending::Killed(Termination::Interrupted),
            }
            if let (true, Some(status)) = (read_done, status) {
                break Ending::Exited(status);
            }
        };

        match ending {
            Ending::Exited(status) => (Termination::Exited, exit_status_code(&status)),
            Ending::Killed(termination) => {
                let exit_code = terminate(&mut child, pgid).await;
                if !read_done {
                    let _ = tokio::time::timeout(DRAIN_GRACE, &mut reading).await;
                }
                (termination, exit_code)
            }
        }
    };

    Ok(ProcessOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
        termination,
    })
}
