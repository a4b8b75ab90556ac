//! Command-line interface definitions for the `lamp` shell.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::Config;

/// Interactive shell that explains failed commands
#[derive(Parser, Debug)]
#[command(
    name = "lamp",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("LAMP_GIT_SHA"), ")"),
    about,
    long_about = None
)]
#[command(
    after_help = "BUILT-INS:\n    on        turn the error analyzer on\n    off       turn the error analyzer off\n    status    show current settings\n    cd DIR    change directory\n    exit      leave the shell"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Model used for diagnosis
    #[arg(long, short = 'm', value_name = "MODEL")]
    pub model: Option<String>,

    /// Language the diagnosis is written in
    #[arg(long, short = 'l', value_name = "LANGUAGE")]
    pub language: Option<String>,

    /// Start with diagnosis switched on
    #[arg(long, conflicts_with = "no_diagnose")]
    pub diagnose: bool,

    /// Start with diagnosis switched off
    #[arg(long)]
    pub no_diagnose: bool,

    /// Wait for the whole diagnosis instead of streaming it
    #[arg(long)]
    pub no_stream: bool,

    /// Path to the config file
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Generate shell completions
    #[arg(long, value_enum, value_name = "SHELL")]
    pub completions: Option<Shell>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write a default config file if none exists
    Init,
}

impl Cli {
    /// Apply command-line overrides on top of file and environment settings
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(language) = &self.language {
            config.language = language.clone();
        }
        if self.diagnose {
            config.diagnose_by_default = true;
        }
        if self.no_diagnose {
            config.diagnose_by_default = false;
        }
        if self.no_stream {
            config.stream = false;
        }
    }
}
