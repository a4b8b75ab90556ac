//! Line-editing front end.
//!
//! Reads lines with rustyline on the main thread and hands each one to the
//! [`Shell`] on the tokio runtime, one at a time.

use std::borrow::Cow;

use anyhow::{Context as _, Result};
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tokio::runtime::Runtime;

use crate::shell::{Flow, Shell};

/// Commands offered by tab completion
pub const TOGGLE_COMMANDS: [(&str, &str); 2] = [
    ("on", "Turn on the error analyzer"),
    ("off", "Turn off the error analyzer"),
];

/// Completion candidates for the word before `pos`.
///
/// Only the first word of a line is completed; anything later is an
/// argument to some other command.
pub fn suggestions(line: &str, pos: usize) -> (usize, Vec<(&'static str, &'static str)>) {
    let before = &line[..pos.min(line.len())];
    let start = before.len() - before.trim_start().len();
    let word = &before[start..];

    if word.contains(char::is_whitespace) {
        return (pos, Vec::new());
    }

    let matches = TOGGLE_COMMANDS
        .iter()
        .copied()
        .filter(|(name, _)| name.starts_with(word))
        .collect();
    (start, matches)
}

/// Greyed-out completion shown after a unique, partially typed toggle.
pub fn hint_for(line: &str) -> Option<String> {
    let (start, matches) = suggestions(line, line.len());
    let typed = &line[start..];
    match matches.as_slice() {
        [(name, description)] if !typed.is_empty() => {
            Some(format!("{}  # {description}", &name[typed.len()..]))
        }
        _ => None,
    }
}

/// rustyline helper completing the toggle commands
#[derive(Debug, Default)]
pub struct ToggleCompleter;

impl Completer for ToggleCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let (start, matches) = suggestions(line, pos);
        let candidates = matches
            .into_iter()
            .map(|(name, description)| Pair {
                display: format!("{name:<4} {description}"),
                replacement: name.to_string(),
            })
            .collect();
        Ok((start, candidates))
    }
}

impl Hinter for ToggleCompleter {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        if pos < line.len() {
            return None;
        }
        hint_for(line)
    }
}

impl Highlighter for ToggleCompleter {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(hint.dimmed().to_string())
    }
}

impl Validator for ToggleCompleter {}

impl Helper for ToggleCompleter {}

/// Read and evaluate lines until `exit` or end of input.
pub fn run(shell: &mut Shell, runtime: &Runtime) -> Result<()> {
    let mut editor: Editor<ToggleCompleter, DefaultHistory> =
        Editor::new().context("failed to create line editor")?;
    editor.set_helper(Some(ToggleCompleter));

    loop {
        let prompt = format!("{}> ", shell.session().cwd().display());

        match editor.readline(&prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                if runtime.block_on(shell.eval(&line)) == Flow::Exit {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C clears the current line
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Bye!");
                break;
            }
            Err(err) => return Err(err).context("failed to read input"),
        }
    }

    Ok(())
}
