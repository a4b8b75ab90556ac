//! Deciding when to diagnose a failed command, and driving the diagnosis.
//!
//! The orchestrator is either idle or has exactly one completion request in
//! flight. It goes back to idle whenever that request ends, successfully or
//! not; a failed diagnosis is reported and never stops the shell.

use std::io::Write;

use regex::Regex;

use crate::completion::{
    ChatMessage, CompletionBackend, CompletionError, CompletionRequest, DEFAULT_MODEL,
};
use crate::context::FailureContext;
use crate::output;
use crate::runner::CommandExecution;
use crate::session::SessionState;

/// System prompt for diagnosis; `{language}` is replaced by the session language.
const SYSTEM_PROMPT: &str = r#"You are an experienced programmer and shell expert.
A shell command has just failed. Analyze the error step by step.
Explain the most likely cause, then suggest several concrete options for fixing it.
Be concise and practical.
The output language should be {language}."#;

/// Build the completion request for a failed command.
pub fn build_request(
    context: &FailureContext,
    model: &str,
    language: &str,
    stream: bool,
) -> CompletionRequest {
    CompletionRequest::new(
        model,
        vec![
            ChatMessage::system(SYSTEM_PROMPT.replace("{language}", language)),
            ChatMessage::user(context.format_for_prompt()),
        ],
    )
    .streaming(stream)
}

/// Commands and exit codes that are never diagnosed
#[derive(Debug, Clone, Default)]
pub struct DiagnosisPolicy {
    skip_exit_codes: Vec<i32>,
    ignore_commands: Vec<Regex>,
}

impl DiagnosisPolicy {
    /// Invalid patterns are logged and dropped.
    pub fn new(skip_exit_codes: Vec<i32>, ignore_patterns: &[String]) -> Self {
        let ignore_commands = ignore_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    tracing::warn!(pattern, error = %err, "ignoring invalid ignore_commands pattern");
                    None
                }
            })
            .collect();

        Self {
            skip_exit_codes,
            ignore_commands,
        }
    }

    fn excludes(&self, execution: &CommandExecution) -> Option<SkipReason> {
        let code = execution.exit_code();
        if self.skip_exit_codes.contains(&code) {
            return Some(SkipReason::ExitCode(code));
        }
        if self
            .ignore_commands
            .iter()
            .any(|re| re.is_match(&execution.command))
        {
            return Some(SkipReason::IgnoredCommand);
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosisState {
    Idle,
    Diagnosing,
}

/// Why a failed (or successful) command was not diagnosed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Succeeded,
    Disabled,
    ExitCode(i32),
    IgnoredCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosisOutcome {
    Skipped(SkipReason),
    Delivered,
    /// The request failed; the error has already been reported.
    Failed,
}

/// Sends failure context to a completion backend and prints the answer
pub struct DiagnosisOrchestrator {
    backend: Box<dyn CompletionBackend>,
    model: String,
    stream: bool,
    policy: DiagnosisPolicy,
    state: DiagnosisState,
}

impl DiagnosisOrchestrator {
    pub fn new(backend: Box<dyn CompletionBackend>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            backend,
            model: if model.is_empty() {
                DEFAULT_MODEL.to_string()
            } else {
                model
            },
            stream: true,
            policy: DiagnosisPolicy::default(),
            state: DiagnosisState::Idle,
        }
    }

    /// Builder: stream tokens as they arrive (default) or print the whole answer
    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Builder: exclusion rules
    pub fn policy(mut self, policy: DiagnosisPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn state(&self) -> DiagnosisState {
        self.state
    }

    /// `None` when `execution` should be diagnosed.
    pub fn skip_reason(
        &self,
        execution: &CommandExecution,
        session: &SessionState,
    ) -> Option<SkipReason> {
        if !execution.failed() {
            return Some(SkipReason::Succeeded);
        }
        if !session.diagnosis_enabled() {
            return Some(SkipReason::Disabled);
        }
        self.policy.excludes(execution)
    }

    /// Diagnose `execution` if it qualifies, writing the answer to `out`.
    pub async fn diagnose<W>(
        &mut self,
        execution: &CommandExecution,
        session: &SessionState,
        out: &mut W,
    ) -> DiagnosisOutcome
    where
        W: Write + Send,
    {
        if let Some(reason) = self.skip_reason(execution, session) {
            tracing::debug!(?reason, command = %execution.command, "not diagnosing");
            return DiagnosisOutcome::Skipped(reason);
        }

        let context = FailureContext::from_execution(execution);
        let request = build_request(&context, &self.model, session.language(), self.stream);

        self.state = DiagnosisState::Diagnosing;
        let result = self.request(&request, out).await;
        self.state = DiagnosisState::Idle;

        match result {
            Ok(()) => DiagnosisOutcome::Delivered,
            Err(err) => {
                tracing::warn!(error = %err, "diagnosis failed");
                output::print_error(&format!("diagnosis failed: {err}"), error_tip(&err));
                DiagnosisOutcome::Failed
            }
        }
    }

    async fn request<W>(&self, request: &CompletionRequest, out: &mut W) -> Result<(), CompletionError>
    where
        W: Write + Send,
    {
        writeln!(out, "{}", output::format_diagnosis_header(&self.model))?;

        let result = if request.stream {
            let mut on_chunk = |delta: &str| -> std::io::Result<()> {
                out.write_all(delta.as_bytes())?;
                out.flush()
            };
            self.backend.complete_stream(request, &mut on_chunk).await
        } else {
            match self.backend.complete(request).await {
                Ok(answer) => out.write_all(answer.as_bytes()).map_err(CompletionError::from),
                Err(err) => Err(err),
            }
        };

        // Terminate whatever was printed, even after a mid-stream failure.
        let closed = writeln!(out).and_then(|_| out.flush());
        result.and(closed.map_err(CompletionError::from))
    }
}

fn error_tip(err: &CompletionError) -> Option<&'static str> {
    match err {
        CompletionError::MissingApiKey => Some("Run `lamp init` and set api_key, or export OPENAI_API_KEY."),
        CompletionError::Http { status: 401, .. } => Some("Check that your API key is valid."),
        CompletionError::Http { status: 429, .. } => Some("Rate limited. Wait a moment before the next failure."),
        CompletionError::Transport(_) => Some("Check your network connection and the configured endpoint."),
        _ => None,
    }
}
