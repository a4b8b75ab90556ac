use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell as CompletionShell};
use colored::Colorize;
use std::io;
use tracing_subscriber::EnvFilter;

use lamp::cli::{Cli, Command};
use lamp::config::{self, Config, InitOutcome};
use lamp::diagnosis::{DiagnosisOrchestrator, DiagnosisPolicy};
use lamp::output;
use lamp::repl;
use lamp::runner::ProcessRunner;
use lamp::session::SessionState;
use lamp::shell::Shell;
use lamp::CompletionClient;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("LAMP_GIT_SHA"), ")");

fn print_completions(shell: CompletionShell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "lamp", &mut io::stdout());
}

fn setup_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> Config {
    let loaded = match &cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };

    let mut config = loaded.unwrap_or_else(|err| {
        output::print_error(
            &err.to_string(),
            Some("Falling back to default settings. Run `lamp init` to create a fresh config."),
        );
        Config::default()
    });
    config.apply_env_overrides();
    cli.apply_to(&mut config);
    config
}

fn run_init(cli: &Cli) -> Result<()> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path().context("could not determine the configuration directory")?,
    };

    match config::init_config(&path)? {
        InitOutcome::Created => {
            println!("{} {}", "Created".green().bold(), path.display());
        }
        InitOutcome::AlreadyExists => {
            println!("{} {}", "Already exists:".yellow().bold(), path.display());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    // Handle completions
    if let Some(shell) = cli.completions {
        print_completions(shell);
        return Ok(());
    }

    if cli.command == Some(Command::Init) {
        return run_init(&cli);
    }

    let config = load_config(&cli);
    tracing::debug!(
        model = %config.model,
        stream = config.stream,
        diagnose = config.diagnose_by_default,
        "configuration loaded"
    );

    let session = SessionState::from_current_dir(config.diagnose_by_default, config.language.clone())?;

    let client = CompletionClient::new(config.api_key().map(String::from)).endpoint(config.endpoint.clone());
    if !client.has_api_key() && config.diagnose_by_default {
        output::print_error(
            "no API key configured, failed commands cannot be diagnosed",
            Some("Set OPENAI_API_KEY or `api_key` in the config file, or turn diagnosis off with `off`."),
        );
    }

    let orchestrator = DiagnosisOrchestrator::new(Box::new(client), config.model.clone())
        .stream(config.stream)
        .policy(DiagnosisPolicy::new(
            config.skip_exit_codes.clone(),
            &config.ignore_commands,
        ));
    let runner = ProcessRunner::new()
        .shell(config.shell.clone())
        .capacities(config.stdout_lines, config.stderr_lines);

    output::print_banner(VERSION, orchestrator.model(), session.diagnosis_enabled());
    let mut shell = Shell::new(session, runner, orchestrator);

    // The foreground child receives SIGINT from the terminal; the shell stays up.
    ctrlc::set_handler(|| tracing::trace!("interrupt received"))
        .context("failed to install Ctrl-C handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    repl::run(&mut shell, &runtime)
}
