//! External tool execution.
//!
//! [`ToolRunner`] is the only code that touches process lifecycle. It spawns
//! the tool with a closed stdin and captured stdout/stderr, enforces a hard
//! timeout (killing and reaping the child when it expires), and classifies
//! the outcome. Stages depend on the [`ToolExecutor`] trait so tests can
//! substitute scripted results.

use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use uuid::Uuid;

use crate::config::ToolPaths;
use crate::error::ToolExecutionError;
use crate::stealth::StealthPolicy;

/// How a tool invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitClassification {
    Success,
    /// Non-zero exit with diagnostics on stderr. Still a usable result.
    #[serde(rename = "nonzero")]
    NonZero,
    Timeout,
    NotFound,
    InternalError,
}

impl ExitClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NonZero => "nonzero",
            Self::Timeout => "timeout",
            Self::NotFound => "not-found",
            Self::InternalError => "internal-error",
        }
    }
}

impl fmt::Display for ExitClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool name plus the argument vector to launch it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Logical tool name used in logs and error records.
    pub tool: String,
    /// Executable path or bare name resolved through `PATH`.
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(tool: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
            args: Vec::new(),
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

    /// The command line as it would be typed, for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The captured result of one tool call.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: String,
    pub classification: ExitClassification,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl ToolInvocation {
    /// Non-blank stdout lines, trimmed.
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Runs one external tool to completion or timeout.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Launch `command`, waiting at most `timeout` for it to exit.
    ///
    /// Timeout and missing executables are errors; a non-zero exit is a
    /// normal result classified as [`ExitClassification::NonZero`].
    async fn execute(
        &self,
        command: &ToolCommand,
        timeout: Duration,
    ) -> Result<ToolInvocation, ToolExecutionError>;
}

/// Process-backed [`ToolExecutor`].
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    stealth: Option<Arc<StealthPolicy>>,
}

impl ToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pace every launch through `policy`.
    pub fn with_stealth(policy: Arc<StealthPolicy>) -> Self {
        Self {
            stealth: Some(policy),
        }
    }
}

#[async_trait]
impl ToolExecutor for ToolRunner {
    async fn execute(
        &self,
        command: &ToolCommand,
        timeout: Duration,
    ) -> Result<ToolInvocation, ToolExecutionError> {
        if let Some(policy) = &self.stealth {
            policy.pace().await;
        }

        let invocation_id = Uuid::new_v4();
        let start = Instant::now();

        tracing::info!(
            invocation_id = %invocation_id,
            tool = %command.tool,
            command = %command.display(),
            timeout_secs = timeout.as_secs_f64(),
            "Launching tool"
        );

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ToolExecutionError::NotFound {
                    tool: command.tool.clone(),
                    program: command.program.clone(),
                },
                _ => ToolExecutionError::Internal {
                    tool: command.tool.clone(),
                    message: e.to_string(),
                },
            })?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let waited = tokio::time::timeout(timeout, async {
            tokio::join!(child.wait(), drain(stdout_pipe), drain(stderr_pipe))
        })
        .await;

        let (status, stdout, stderr) = match waited {
            Ok(parts) => parts,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(
                        invocation_id = %invocation_id,
                        tool = %command.tool,
                        error = %e,
                        "Failed to kill timed-out tool"
                    );
                }
                tracing::warn!(
                    invocation_id = %invocation_id,
                    tool = %command.tool,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool timed out and was killed"
                );
                return Err(ToolExecutionError::Timeout {
                    tool: command.tool.clone(),
                    timeout,
                });
            }
        };

        let internal = |e: std::io::Error| ToolExecutionError::Internal {
            tool: command.tool.clone(),
            message: e.to_string(),
        };
        let status = status.map_err(internal)?;
        let stdout = String::from_utf8_lossy(&stdout.map_err(internal)?).into_owned();
        let stderr = String::from_utf8_lossy(&stderr.map_err(internal)?).into_owned();

        let duration = start.elapsed();
        let classification = classify(status.success(), &stderr);

        if classification == ExitClassification::NonZero {
            tracing::warn!(
                invocation_id = %invocation_id,
                tool = %command.tool,
                exit_code = ?status.code(),
                stderr = %first_line(&stderr),
                "Tool exited with non-zero status"
            );
        }
        tracing::info!(
            invocation_id = %invocation_id,
            tool = %command.tool,
            classification = %classification,
            duration_ms = duration.as_millis() as u64,
            stdout_bytes = stdout.len(),
            "Tool finished"
        );

        Ok(ToolInvocation {
            tool: command.tool.clone(),
            classification,
            stdout,
            stderr,
            exit_code: status.code(),
            duration,
        })
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Outcome of a process that exited on its own.
pub fn classify(exited_ok: bool, stderr: &str) -> ExitClassification {
    if !exited_ok && !stderr.trim().is_empty() {
        ExitClassification::NonZero
    } else {
        ExitClassification::Success
    }
}

fn first_line(text: &str) -> &str {
    text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("")
}

/// Parse newline-delimited JSON, skipping lines that do not parse.
pub fn parse_json_lines<T: DeserializeOwned>(tool: &str, text: &str) -> Vec<T> {
    let mut parsed = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(value) => parsed.push(value),
            Err(e) => tracing::warn!(
                tool = %tool,
                line = index + 1,
                error = %e,
                "Skipping malformed JSON line"
            ),
        }
    }
    parsed
}

/// Presence of one configured tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub tool: &'static str,
    pub program: String,
    pub installed: bool,
    /// Version banner when installed, otherwise the failure reason.
    pub detail: String,
}

/// Run each configured tool with `-version` and report which are usable.
pub async fn verify_installation(
    executor: &dyn ToolExecutor,
    tools: &ToolPaths,
    timeout: Duration,
) -> Vec<ToolStatus> {
    let mut statuses = Vec::new();
    for (tool, program) in tools.all() {
        let command = ToolCommand::new(tool, program).arg("-version");
        let status = match executor.execute(&command, timeout).await {
            Ok(result) => {
                let banner = match first_line(&result.stdout) {
                    "" => first_line(&result.stderr),
                    line => line,
                };
                ToolStatus {
                    tool,
                    program: program.to_string(),
                    installed: true,
                    detail: banner.to_string(),
                }
            }
            Err(e) => ToolStatus {
                tool,
                program: program.to_string(),
                installed: matches!(e, ToolExecutionError::Timeout { .. }),
                detail: e.to_string(),
            },
        };
        statuses.push(status);
    }
    statuses
}
