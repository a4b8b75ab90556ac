//! Mutable state of one interactive session.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Default language diagnoses are written in.
pub const DEFAULT_LANGUAGE: &str = "English";

/// State owned by the REPL and only changed between commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    cwd: PathBuf,
    diagnosis_enabled: bool,
    language: String,
}

impl SessionState {
    pub fn new(cwd: impl Into<PathBuf>, diagnosis_enabled: bool, language: impl Into<String>) -> Self {
        Self {
            cwd: cwd.into(),
            diagnosis_enabled,
            language: language.into(),
        }
    }

    /// Start in the directory the process was launched from.
    pub fn from_current_dir(diagnosis_enabled: bool, language: impl Into<String>) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::new(cwd, diagnosis_enabled, language))
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn diagnosis_enabled(&self) -> bool {
        self.diagnosis_enabled
    }

    pub fn set_diagnosis(&mut self, enabled: bool) {
        self.diagnosis_enabled = enabled;
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Change the working directory. On error the session is left untouched.
    ///
    /// An empty target or `~` goes home, `~/x` is expanded, and relative
    /// paths are resolved against the current session directory.
    pub fn change_dir(&mut self, target: &str) -> Result<&Path> {
        let resolved = self.resolve(target.trim())?;
        let canonical = resolved
            .canonicalize()
            .with_context(|| format!("cd: {}", resolved.display()))?;
        if !canonical.is_dir() {
            bail!("cd: {}: not a directory", resolved.display());
        }

        tracing::debug!(from = %self.cwd.display(), to = %canonical.display(), "changing directory");
        self.cwd = canonical;
        Ok(&self.cwd)
    }

    fn resolve(&self, target: &str) -> Result<PathBuf> {
        let path = match target {
            "" | "~" => home_dir()?,
            _ => match target.strip_prefix("~/") {
                Some(rest) => home_dir()?.join(rest),
                None => PathBuf::from(target),
            },
        };
        Ok(self.cwd.join(path))
    }
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("cd: could not determine home directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_in(dir: &Path) -> SessionState {
        SessionState::new(dir.canonicalize().unwrap(), false, DEFAULT_LANGUAGE)
    }

    #[test]
    fn test_toggle_is_last_write_wins() {
        let mut session = SessionState::new("/", false, DEFAULT_LANGUAGE);
        session.set_diagnosis(true);
        session.set_diagnosis(false);
        assert!(!session.diagnosis_enabled());
        session.set_diagnosis(true);
        assert!(session.diagnosis_enabled());
    }

    #[test]
    fn test_cd_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let mut session = session_in(dir.path());

        session.change_dir("sub").unwrap();
        assert_eq!(session.cwd(), dir.path().canonicalize().unwrap().join("sub"));

        session.change_dir("..").unwrap();
        assert_eq!(session.cwd(), dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_cd_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = SessionState::new("/", true, DEFAULT_LANGUAGE);
        session.change_dir(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(session.cwd(), dir.path().canonicalize().unwrap());
        assert!(session.diagnosis_enabled());
    }

    #[test]
    fn test_cd_nonexistent_leaves_cwd_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_in(dir.path());
        let before = session.clone();

        let err = session.change_dir("does-not-exist").unwrap_err();
        assert!(err.to_string().contains("does-not-exist"));
        assert_eq!(session, before);
    }

    #[test]
    fn test_cd_into_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), "x").unwrap();
        let mut session = session_in(dir.path());
        let before = session.cwd().to_path_buf();

        let err = session.change_dir("file.txt").unwrap_err();
        assert!(err.to_string().contains("not a directory"));
        assert_eq!(session.cwd(), before);
    }

    #[test]
    fn test_cd_home() {
        let Some(home) = dirs::home_dir().and_then(|h| h.canonicalize().ok()) else {
            return;
        };
        let mut session = SessionState::new("/", false, DEFAULT_LANGUAGE);
        session.change_dir("~").unwrap();
        assert_eq!(session.cwd(), home);

        let mut session = SessionState::new("/", false, DEFAULT_LANGUAGE);
        session.change_dir("").unwrap();
        assert_eq!(session.cwd(), home);
    }
}
