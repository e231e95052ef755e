// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoped external processes for CLI-backed tiers.
//!
//! A [`ScopedProcess`] is spawned with `kill_on_drop`, has its pipes drained
//! concurrently, and runs under a hard deadline. On every exit path the child
//! is either waited to completion or killed and reaped, so a timed-out CLI
//! never outlives the call that started it.

use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use futures::stream::{self, Stream};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::TiergateError;

/// Description of a process to run.
#[derive(Debug, Clone)]
pub struct ScopedProcess {
    program: String,
    args: Vec<String>,
    env_set: Vec<(String, String)>,
    env_remove: Vec<String>,
    stdin: Option<String>,
    timeout: Duration,
}

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Items yielded by [`ScopedProcess::stream_lines`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// One stdout line, newline included.
    Line(String),
    /// The process exited; this is always the last item.
    Exited { success: bool, stderr: String },
}

/// Stream of stdout lines followed by one exit event.
pub type LineStream = Pin<Box<dyn Stream<Item = Result<LineEvent, TiergateError>> + Send>>;

impl ScopedProcess {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env_set: Vec::new(),
            env_remove: Vec::new(),
            stdin: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_set.push((key.into(), value.into()));
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Text fed to the child's standard input, which is then closed.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in &self.env_remove {
            cmd.env_remove(key);
        }
        for (key, value) in &self.env_set {
            cmd.env(key, value);
        }
        cmd
    }

    fn spawn(&self) -> Result<Child, TiergateError> {
        self.command().spawn().map_err(|e| TiergateError::Process {
            message: format!("failed to spawn `{}`: {e}", self.program),
            source: Some(e),
        })
    }

    /// Runs the process to completion and captures its output.
    ///
    /// Returns [`TiergateError::Timeout`] if the deadline passes first; the
    /// child has been killed and reaped by the time this returns.
    pub async fn run(&self) -> Result<ProcessOutput, TiergateError> {
        let mut child = self.spawn()?;
        debug!(program = %self.program, "spawned scoped process");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let input = self.stdin.clone();

        let outcome = tokio::time::timeout(self.timeout, async {
            let feed = async move {
                if let (Some(mut pipe), Some(input)) = (stdin, input) {
                    pipe.write_all(input.as_bytes()).await?;
                    pipe.shutdown().await?;
                }
                Ok::<_, std::io::Error>(())
            };
            let (fed, out, err, status) =
                tokio::join!(feed, drain(stdout), drain(stderr), child.wait());
            // A child that exits without reading stdin closes the pipe; that is not a failure.
            if let Err(e) = fed
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(e);
            }
            Ok((out?, err?, status?))
        })
        .await;

        match outcome {
            Ok(Ok((stdout, stderr, status))) => Ok(ProcessOutput {
                success: status.success(),
                code: status.code(),
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            }),
            Ok(Err(e)) => {
                reap(&mut child, &self.program).await;
                Err(TiergateError::Process {
                    message: format!("I/O with `{}` failed: {e}", self.program),
                    source: Some(e),
                })
            }
            Err(_) => {
                warn!(program = %self.program, timeout = ?self.timeout, "scoped process timed out");
                reap(&mut child, &self.program).await;
                Err(TiergateError::Timeout {
                    duration: self.timeout,
                })
            }
        }
    }

    /// Spawns the process and yields its stdout line by line.
    ///
    /// The whole stream shares one deadline. Stderr is drained in the
    /// background and reported with the final [`LineEvent::Exited`].
    /// Dropping the stream kills the child.
    pub fn stream_lines(&self) -> Result<LineStream, TiergateError> {
        let mut child = self.spawn()?;

        if let (Some(mut pipe), Some(input)) = (child.stdin.take(), self.stdin.clone()) {
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    debug!(error = %e, "stdin feed ended early");
                }
                let _ = pipe.shutdown().await;
            });
        }

        let stdout = child.stdout.take().ok_or_else(|| TiergateError::Process {
            message: format!("`{}` has no stdout pipe", self.program),
            source: None,
        })?;
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move { drain(stderr).await.unwrap_or_default() });

        let state = LineState {
            child,
            lines: BufReader::new(stdout).lines(),
            stderr_task: Some(stderr_task),
            deadline: Instant::now() + self.timeout,
            timeout: self.timeout,
            program: self.program.clone(),
            finished: false,
        };

        Ok(Box::pin(stream::unfold(state, next_line)))
    }
}

struct LineState {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<Vec<u8>>>,
    deadline: Instant,
    timeout: Duration,
    program: String,
    finished: bool,
}

async fn next_line(
    mut state: LineState,
) -> Option<(Result<LineEvent, TiergateError>, LineState)> {
    if state.finished {
        return None;
    }

    match tokio::time::timeout_at(state.deadline, state.lines.next_line()).await {
        Ok(Ok(Some(mut line))) => {
            line.push('\n');
            Some((Ok(LineEvent::Line(line)), state))
        }
        Ok(Ok(None)) => {
            state.finished = true;
            let status = tokio::time::timeout_at(state.deadline, state.child.wait()).await;
            let stderr = match state.stderr_task.take() {
                Some(task) => task.await.unwrap_or_default(),
                None => Vec::new(),
            };
            let event = match status {
                Ok(Ok(status)) => Ok(LineEvent::Exited {
                    success: status.success(),
                    stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
                }),
                Ok(Err(e)) => Err(TiergateError::Process {
                    message: format!("waiting on `{}` failed: {e}", state.program),
                    source: Some(e),
                }),
                Err(_) => {
                    reap(&mut state.child, &state.program).await;
                    Err(TiergateError::Timeout {
                        duration: state.timeout,
                    })
                }
            };
            Some((event, state))
        }
        Ok(Err(e)) => {
            state.finished = true;
            reap(&mut state.child, &state.program).await;
            Some((
                Err(TiergateError::Process {
                    message: format!("reading `{}` stdout failed: {e}", state.program),
                    source: Some(e),
                }),
                state,
            ))
        }
        Err(_) => {
            state.finished = true;
            warn!(program = %state.program, "scoped process stream timed out");
            reap(&mut state.child, &state.program).await;
            Some((
                Err(TiergateError::Timeout {
                    duration: state.timeout,
                }),
                state,
            ))
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Kills the child (if still running) and waits for it so no zombie remains.
async fn reap(child: &mut Child, program: &str) {
    if let Err(e) = child.kill().await {
        debug!(program, error = %e, "kill after failure returned an error");
    }
}
