//! Command execution
//!
//! Job commands are untrusted input. `ExecutionMode::Shell` hands the whole
//! string to the platform shell, so callers must vet commands before they
//! are enqueued; `ExecutionMode::Direct` runs a plain argument vector with no
//! shell expansion.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Exit code recorded when the process could not be launched or was killed.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -1;

/// How a job's `command` string is turned into a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// `sh -c <command>` (`cmd /C` on Windows)
    #[default]
    Shell,
    /// Whitespace-separated program and arguments, no quoting or expansion
    Direct,
}

/// Captured result of one execution attempt
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionResult {
    /// `None` when the process never ran to an exit status
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Set when the process could not be started or was cut short
    pub launch_error: Option<String>,
}

impl ExecutionResult {
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            launch_error: None,
        }
    }

    pub fn launch_failed(error: impl Into<String>) -> Self {
        Self {
            launch_error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.launch_error.is_none() && self.exit_code == Some(0)
    }

    /// Exit code as stored on the job record.
    pub fn recorded_exit_code(&self) -> i32 {
        self.exit_code.unwrap_or(LAUNCH_FAILURE_EXIT_CODE)
    }

    /// Stderr as stored on the job record; a launch error is appended so it
    /// stays visible in the DLQ.
    pub fn recorded_stderr(&self) -> String {
        match &self.launch_error {
            Some(error) if self.stderr.is_empty() => error.clone(),
            Some(error) => format!("{}\n{}", self.stderr, error),
            None => self.stderr.clone(),
        }
    }
}

/// Runs a job command to completion.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, command: &str) -> ExecutionResult;
}

/// Executes commands as child processes.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    mode: ExecutionMode,
    timeout: Option<Duration>,
}

impl CommandExecutor {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            timeout: None,
        }
    }

    /// Kill commands that run longer than `timeout`. Without one a hanging
    /// command holds its worker forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    fn build(&self, command: &str) -> Result<Command, String> {
        match self.mode {
            ExecutionMode::Shell => {
                #[cfg(windows)]
                let cmd = {
                    let mut c = Command::new("cmd");
                    c.args(["/C", command]);
                    c
                };

                #[cfg(not(windows))]
                let cmd = {
                    let mut c = Command::new("sh");
                    c.args(["-c", command]);
                    c
                };

                Ok(cmd)
            }
            ExecutionMode::Direct => {
                let mut parts = command.split_whitespace();
                let program = parts
                    .next()
                    .ok_or_else(|| "empty command".to_string())?;
                let mut cmd = Command::new(program);
                cmd.args(parts);
                Ok(cmd)
            }
        }
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    async fn run(&self, command: &str) -> ExecutionResult {
        let mut cmd = match self.build(command) {
            Ok(cmd) => cmd,
            Err(e) => return ExecutionResult::launch_failed(e),
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionResult::launch_failed(format!("failed to spawn command: {}", e))
            }
        };

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                // Dropping the future drops the child, which kills it
                Err(_) => {
                    return ExecutionResult::launch_failed(format!(
                        "timed out after {}s",
                        limit.as_secs_f64()
                    ))
                }
            },
            None => child.wait_with_output().await,
        };

        match output {
            Ok(output) => {
                debug!(status = %output.status, "command finished");
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                match output.status.code() {
                    Some(code) => ExecutionResult::exited(code, stdout, stderr),
                    // Terminated by a signal
                    None => ExecutionResult {
                        exit_code: None,
                        stdout,
                        stderr,
                        launch_error: Some(format!("command terminated: {}", output.status)),
                    },
                }
            }
            Err(e) => ExecutionResult::launch_failed(format!("failed to wait for command: {}", e)),
        }
    }
}
