//! Scripted [`ToolExecutor`] for stage and orchestrator tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ToolExecutionError;
use crate::runner::{ExitClassification, ToolCommand, ToolExecutor, ToolInvocation};

#[derive(Debug, Clone)]
enum Script {
    Output {
        stdout: String,
        classification: ExitClassification,
    },
    Fail(ExitClassification),
}

/// One observed call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub tool: String,
    pub args: Vec<String>,
    /// Arguments that named an existing file at call time.
    pub existing_files: Vec<String>,
}

/// Returns canned results per tool name and records every call.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(mut self, tool: &str, stdout: &str) -> Self {
        self.scripts.insert(
            tool.to_string(),
            Script::Output {
                stdout: stdout.to_string(),
                classification: ExitClassification::Success,
            },
        );
        self
    }

    pub fn nonzero(mut self, tool: &str, stdout: &str) -> Self {
        self.scripts.insert(
            tool.to_string(),
            Script::Output {
                stdout: stdout.to_string(),
                classification: ExitClassification::NonZero,
            },
        );
        self
    }

    pub fn fail(mut self, tool: &str, classification: ExitClassification) -> Self {
        self.scripts
            .insert(tool.to_string(), Script::Fail(classification));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, tool: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.tool == tool)
            .collect()
    }
}

#[async_trait]
impl ToolExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        command: &ToolCommand,
        timeout: Duration,
    ) -> Result<ToolInvocation, ToolExecutionError> {
        let existing_files = command
            .args
            .iter()
            .filter(|a| Path::new(a.as_str()).is_file())
            .cloned()
            .collect();
        self.calls.lock().unwrap().push(RecordedCall {
            tool: command.tool.clone(),
            args: command.args.clone(),
            existing_files,
        });

        let script = self
            .scripts
            .get(&command.tool)
            .cloned()
            .unwrap_or(Script::Fail(ExitClassification::NotFound));

        match script {
            Script::Output {
                stdout,
                classification,
            } => Ok(ToolInvocation {
                tool: command.tool.clone(),
                classification,
                stdout,
                stderr: match classification {
                    ExitClassification::NonZero => "scripted failure".to_string(),
                    _ => String::new(),
                },
                exit_code: Some(match classification {
                    ExitClassification::NonZero => 1,
                    _ => 0,
                }),
                duration: Duration::from_millis(1),
            }),
            Script::Fail(ExitClassification::Timeout) => Err(ToolExecutionError::Timeout {
                tool: command.tool.clone(),
                timeout,
            }),
            Script::Fail(ExitClassification::NotFound) => Err(ToolExecutionError::NotFound {
                tool: command.tool.clone(),
                program: command.program.clone(),
            }),
            Script::Fail(_) => Err(ToolExecutionError::Internal {
                tool: command.tool.clone(),
                message: "scripted failure".to_string(),
            }),
        }
    }
}
