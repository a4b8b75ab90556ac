//! Evaluation of one line of REPL input.
//!
//! Built-ins (`exit`, `on`, `off`, `status`, `cd`) are handled here and never
//! reach the runner or the orchestrator. Everything else runs under the host
//! shell and, if it fails, may be diagnosed.

use std::io::{self, Write};

use crate::diagnosis::{DiagnosisOrchestrator, DiagnosisOutcome};
use crate::output;
use crate::runner::{ProcessRunner, RunnerError};
use crate::session::SessionState;

/// A parsed line of input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input<'a> {
    Empty,
    Exit,
    /// `on`: turn diagnosis on
    Enable,
    /// `off`: turn diagnosis off
    Disable,
    Status,
    ChangeDir(&'a str),
    Run(&'a str),
}

impl<'a> Input<'a> {
    /// Built-ins are matched on the first word only.
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        let mut parts = line.splitn(2, char::is_whitespace);
        let word = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("").trim();

        match (word, rest.is_empty()) {
            ("", _) => Input::Empty,
            ("exit" | "quit", true) => Input::Exit,
            ("on", true) => Input::Enable,
            ("off", true) => Input::Disable,
            ("status", true) => Input::Status,
            ("cd", _) => Input::ChangeDir(rest),
            _ => Input::Run(line),
        }
    }
}

/// Whether the REPL should keep reading input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// What happened to a line that was run as a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Builtin,
    /// The command could not be started.
    LaunchFailed,
    Ran {
        exit_code: i32,
        diagnosis: DiagnosisOutcome,
    },
}

/// The interactive shell: session state plus the machinery to run commands
pub struct Shell {
    session: SessionState,
    runner: ProcessRunner,
    orchestrator: DiagnosisOrchestrator,
}

impl Shell {
    pub fn new(
        session: SessionState,
        runner: ProcessRunner,
        orchestrator: DiagnosisOrchestrator,
    ) -> Self {
        Self {
            session,
            runner,
            orchestrator,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Evaluate a line, writing diagnoses to stdout.
    pub async fn eval(&mut self, line: &str) -> Flow {
        let mut stdout = io::stdout();
        self.eval_with(line, &mut stdout).await.0
    }

    /// Evaluate a line, writing diagnoses to `out`.
    pub async fn eval_with<W>(&mut self, line: &str, out: &mut W) -> (Flow, Evaluation)
    where
        W: Write + Send,
    {
        match Input::parse(line) {
            Input::Empty => (Flow::Continue, Evaluation::Builtin),
            Input::Exit => {
                println!("Bye!");
                (Flow::Exit, Evaluation::Builtin)
            }
            Input::Enable => self.toggle(true),
            Input::Disable => self.toggle(false),
            Input::Status => {
                output::print_status(&self.session, self.orchestrator.model());
                (Flow::Continue, Evaluation::Builtin)
            }
            Input::ChangeDir(target) => {
                if let Err(err) = self.session.change_dir(target) {
                    output::print_error(&format!("{err:#}"), None);
                }
                (Flow::Continue, Evaluation::Builtin)
            }
            Input::Run(command) => (Flow::Continue, self.run(command, out).await),
        }
    }

    fn toggle(&mut self, enabled: bool) -> (Flow, Evaluation) {
        self.session.set_diagnosis(enabled);
        output::print_toggle(enabled);
        (Flow::Continue, Evaluation::Builtin)
    }

    async fn run<W>(&mut self, command: &str, out: &mut W) -> Evaluation
    where
        W: Write + Send,
    {
        let execution = match self.runner.run(command, self.session.cwd()).await {
            Ok(execution) => execution,
            Err(err) => {
                let tip = match &err {
                    RunnerError::Launch { .. } => {
                        Some("Check the `shell` setting and that the current directory still exists.")
                    }
                    _ => None,
                };
                output::print_error(&err.to_string(), tip);
                return Evaluation::LaunchFailed;
            }
        };

        if execution.failed() {
            eprintln!("{}", output::format_failure(execution.exit_code()));
        }

        let diagnosis = self
            .orchestrator
            .diagnose(&execution, &self.session, out)
            .await;

        Evaluation::Ran {
            exit_code: execution.exit_code(),
            diagnosis,
        }
    }
}
