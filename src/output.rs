//! Terminal messages printed by the shell around commands and diagnoses.

use colored::Colorize;

use crate::context::interpret_exit_code;
use crate::session::SessionState;

/// Format an error message with an optional tip
pub fn format_error(message: &str, tip: Option<&str>) -> String {
    let mut output = format!("{} {}", "Error:".red().bold(), message);
    if let Some(tip) = tip {
        output.push('\n');
        output.push_str(&format!("{} {}", "Tip:".blue().bold(), tip));
    }
    output
}

pub fn print_error(message: &str, tip: Option<&str>) {
    eprintln!("{}", format_error(message, tip));
}

/// Startup banner
pub fn print_banner(version: &str, model: &str, diagnosis_enabled: bool) {
    println!("{} {}", "lamp".bold(), version.dimmed());
    println!("  {} {}", "Model:".blue().bold(), model.bright_white());
    println!(
        "  {} {}",
        "Diagnosis:".blue().bold(),
        on_off(diagnosis_enabled)
    );
    println!(
        "  {}",
        "Type `on` / `off` to toggle diagnosis, `exit` to quit.".dimmed()
    );
    println!();
}

/// Response to the `status` built-in
pub fn print_status(session: &SessionState, model: &str) {
    println!("{} {}", "▸".cyan(), "Session".cyan().bold());
    println!(
        "  {} {}",
        "Directory:".blue().bold(),
        session.cwd().display().to_string().bright_white()
    );
    println!("  {} {}", "Model:".blue().bold(), model.bright_white());
    println!(
        "  {} {}",
        "Language:".blue().bold(),
        session.language().bright_white()
    );
    println!(
        "  {} {}",
        "Diagnosis:".blue().bold(),
        on_off(session.diagnosis_enabled())
    );
}

/// Confirmation for `on` / `off`
pub fn print_toggle(enabled: bool) {
    println!("{} diagnosis {}", "✓".green(), on_off(enabled));
}

/// One-line summary after a command exits nonzero
pub fn format_failure(code: i32) -> String {
    format!(
        "{} {}",
        "✗".red(),
        format!("exit status {code} ({})", interpret_exit_code(code)).red()
    )
}

/// Header written before a streamed diagnosis
pub fn format_diagnosis_header(model: &str) -> String {
    format!(
        "{} {} {}",
        "▸".blue(),
        "Diagnosis".blue().bold(),
        format!("({model})").dimmed()
    )
}

fn on_off(enabled: bool) -> colored::ColoredString {
    if enabled {
        "on".green().bold()
    } else {
        "off".red().bold()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_with_tip() {
        let output = format_error("boom", Some("try again"));
        assert!(output.contains("Error:"));
        assert!(output.contains("boom"));
        assert!(output.contains("Tip:"));
        assert!(output.contains("try again"));
    }

    #[test]
    fn test_format_error_without_tip() {
        let output = format_error("boom", None);
        assert!(!output.contains("Tip:"));
        assert_eq!(output.lines().count(), 1);
    }

    #[test]
    fn test_format_failure_mentions_code() {
        let output = format_failure(127);
        assert!(output.contains("exit status 127"));
        assert!(output.contains("command not found"));
    }

    #[test]
    fn test_diagnosis_header_names_model() {
        assert!(format_diagnosis_header("gpt-4o-mini").contains("gpt-4o-mini"));
    }
}
