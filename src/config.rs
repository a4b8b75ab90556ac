//! Configuration system for the `lamp` shell.

use serde::Deserialize;
use std::env;
use std::io;
use std::path::{Path, PathBuf};

use crate::buffer::{DEFAULT_STDERR_LINES, DEFAULT_STDOUT_LINES};
use crate::completion::{API_KEY_ENV_VAR, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::runner::DEFAULT_SHELL;
use crate::session::DEFAULT_LANGUAGE;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// API key for the completion endpoint
    pub api_key: Option<String>,
    /// Model identifier sent with every request
    pub model: String,
    /// Whether diagnosis starts switched on
    pub diagnose_by_default: bool,
    /// Natural language the diagnosis is written in
    pub language: String,
    /// Stream tokens as they arrive instead of waiting for the full answer
    pub stream: bool,
    /// Chat completions endpoint URL
    pub endpoint: String,
    /// Interpreter used as `<shell> -c <command>`
    pub shell: String,
    /// Number of stdout lines sent with a diagnosis
    pub stdout_lines: usize,
    /// Number of stderr lines sent with a diagnosis
    pub stderr_lines: usize,
    /// Exit codes never diagnosed (e.g. 130 for Ctrl+C)
    pub skip_exit_codes: Vec<i32>,
    /// Regex patterns for commands never diagnosed
    pub ignore_commands: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            diagnose_by_default: true,
            language: DEFAULT_LANGUAGE.to_string(),
            stream: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            shell: DEFAULT_SHELL.to_string(),
            stdout_lines: DEFAULT_STDOUT_LINES,
            stderr_lines: DEFAULT_STDERR_LINES,
            skip_exit_codes: vec![130],
            ignore_commands: Vec::new(),
        }
    }
}

/// Error types for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine the configuration directory")]
    NoConfigDir,

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What `lamp init` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    AlreadyExists,
}

impl Config {
    /// Load config from the default location
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from_path(&path)
    }

    /// Load config from a specific path, returning defaults if it doesn't exist
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the config file path (~/.config/lamp/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("lamp").join("config.toml"))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // OPENAI_API_KEY wins over the file
        if let Some(key) = var(API_KEY_ENV_VAR) {
            self.api_key = Some(key);
        }
        if let Some(model) = var("LAMP_MODEL") {
            self.model = model;
        }
        if let Some(language) = var("LAMP_LANGUAGE") {
            self.language = language;
        }
        // LAMP_DIAGNOSE=0 starts with diagnosis off, 1 with it on
        match var("LAMP_DIAGNOSE").as_deref() {
            Some("1") => self.diagnose_by_default = true,
            Some("0") => self.diagnose_by_default = false,
            _ => {}
        }
    }

    /// API key, if one is configured and non-empty
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

/// Write the default config file unless one already exists.
pub fn init_config(path: &Path) -> Result<InitOutcome, ConfigError> {
    if path.exists() {
        return Ok(InitOutcome::AlreadyExists);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    std::fs::write(path, generate_default_config()).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(InitOutcome::Created)
}

/// Generate default config as TOML string
pub fn generate_default_config() -> String {
    r#"# lamp configuration
# Place this file at ~/.config/lamp/config.toml

# API key for the completion endpoint.
# OPENAI_API_KEY in the environment takes precedence.
api_key = ""

# Model used for diagnosis
model = "gpt-3.5-turbo"

# Start with diagnosis switched on (toggle at runtime with `on` / `off`)
diagnose_by_default = true

# Language the diagnosis is written in
language = "English"

# Print the diagnosis token by token as it arrives
stream = true

# Chat completions endpoint
endpoint = "https://api.openai.com/v1/chat/completions"

# Interpreter used to run commands (`<shell> -c <command>`)
shell = "sh"

# Lines of output kept and sent with a diagnosis
stdout_lines = 30
stderr_lines = 10

# Exit codes that are never diagnosed (130 = Ctrl+C)
skip_exit_codes = [130]

# Regex patterns for commands that are never diagnosed
ignore_commands = []

# Environment variable overrides:
# OPENAI_API_KEY  - API key
# LAMP_MODEL      - model
# LAMP_LANGUAGE   - diagnosis language
# LAMP_DIAGNOSE=0 - start with diagnosis off (1 = on)
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_default_config_file_matches_defaults() {
        let parsed: Config = toml::from_str(&generate_default_config()).unwrap();
        let expected = Config {
            api_key: Some(String::new()),
            ..Config::default()
        };
        assert_eq!(parsed, expected);
        assert_eq!(parsed.api_key(), None);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = \"gpt-4o-mini\"\ndiagnose_by_default = false\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert!(!config.diagnose_by_default);
        assert_eq!(config.stdout_lines, DEFAULT_STDOUT_LINES);
        assert_eq!(config.skip_exit_codes, vec![130]);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = [unterminated").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config {
            api_key: Some("from-file".to_string()),
            ..Config::default()
        };
        config.apply_overrides(lookup_from(&[
            ("OPENAI_API_KEY", "from-env"),
            ("LAMP_MODEL", "gpt-4o"),
            ("LAMP_LANGUAGE", "Japanese"),
            ("LAMP_DIAGNOSE", "0"),
        ]));

        assert_eq!(config.api_key(), Some("from-env"));
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.language, "Japanese");
        assert!(!config.diagnose_by_default);
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = Config {
            api_key: Some("from-file".to_string()),
            ..Config::default()
        };
        config.apply_overrides(lookup_from(&[("OPENAI_API_KEY", ""), ("LAMP_DIAGNOSE", "maybe")]));
        assert_eq!(config.api_key(), Some("from-file"));
        assert!(config.diagnose_by_default);
    }

    #[test]
    fn test_init_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert_eq!(init_config(&path).unwrap(), InitOutcome::Created);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), generate_default_config());

        std::fs::write(&path, "model = \"custom\"\n").unwrap();
        assert_eq!(init_config(&path).unwrap(), InitOutcome::AlreadyExists);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "model = \"custom\"\n");
    }
}
