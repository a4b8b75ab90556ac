//! Failure context sent along with a diagnosis request.
//!
//! Captures what a model needs to reason about a failed command: the command
//! line, its exit code, and the tails of both output streams.

use crate::runner::CommandExecution;

/// Context from a failed shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    /// The command that was executed
    pub command: String,

    /// Exit code from the command
    pub exit_code: i32,

    /// Last lines of standard error
    pub stderr: String,

    /// Last lines of standard output
    pub stdout: String,

    /// Working directory where the command ran
    pub working_dir: Option<String>,
}

impl FailureContext {
    pub fn new(command: impl Into<String>, exit_code: i32) -> Self {
        Self {
            command: command.into(),
            exit_code,
            stderr: String::new(),
            stdout: String::new(),
            working_dir: None,
        }
    }

    /// Build context from a finished execution.
    pub fn from_execution(execution: &CommandExecution) -> Self {
        Self {
            command: execution.command.clone(),
            exit_code: execution.exit_code(),
            stderr: execution.stderr.joined(),
            stdout: execution.stdout.joined(),
            working_dir: Some(execution.working_dir.display().to_string()),
        }
    }

    /// Builder: set stderr
    pub fn stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Builder: set stdout
    pub fn stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Builder: set working directory
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Format context as the user message of a diagnosis request
    pub fn format_for_prompt(&self) -> String {
        let mut parts = vec![
            format!("# command\n{}", self.command),
            format!(
                "# exit code\n{} ({})",
                self.exit_code,
                interpret_exit_code(self.exit_code)
            ),
        ];

        if let Some(ref dir) = self.working_dir {
            parts.push(format!("# working directory\n{dir}"));
        }

        parts.push(format!("# stderr\n{}", or_placeholder(&self.stderr)));
        parts.push(format!("# stdout\n{}", or_placeholder(&self.stdout)));

        parts.join("\n\n")
    }
}

fn or_placeholder(text: &str) -> &str {
    if text.trim().is_empty() {
        "(empty)"
    } else {
        text
    }
}

/// Interpret common exit codes
pub fn interpret_exit_code(code: i32) -> &'static str {
    match code {
        0 => "success",
        1 => "general error",
        2 => "misuse of shell command",
        126 => "permission problem or command not executable",
        127 => "command not found",
        128 => "invalid exit argument",
        130 => "terminated by Ctrl+C (SIGINT)",
        137 => "killed (SIGKILL)",
        139 => "segmentation fault (SIGSEGV)",
        143 => "terminated (SIGTERM)",
        255 => "exit status out of range",
        _ if code > 128 && code < 256 => "terminated by signal",
        _ => "unknown",
    }
}
