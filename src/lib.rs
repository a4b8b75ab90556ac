//! Lamp - an interactive shell that explains failed commands
//!
//! Commands run under the host shell with their output echoed live. The
//! tail of stdout and stderr is kept, and when a command exits nonzero the
//! tails are sent to a chat completions endpoint whose answer is streamed
//! back to the terminal.

pub mod buffer;
pub mod cli;
pub mod completion;
pub mod config;
pub mod context;
pub mod diagnosis;
pub mod output;
pub mod repl;
pub mod runner;
pub mod session;
pub mod shell;

// Re-export commonly used types
pub use buffer::BoundedLineBuffer;
pub use cli::Cli;
pub use completion::client::CompletionClient;
pub use completion::{CompletionBackend, CompletionError, CompletionRequest};
pub use config::Config;
pub use context::FailureContext;
pub use diagnosis::{DiagnosisOrchestrator, DiagnosisPolicy};
pub use runner::{CommandExecution, ProcessRunner};
pub use session::SessionState;
pub use shell::Shell;
