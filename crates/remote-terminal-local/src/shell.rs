//! Shell selection for running terminal commands.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};

use thiserror::Error;

/// Shell resolution error.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Shell command line cannot be parsed: {0}")]
    Unparsable(String),
    #[error("Shell command line is empty")]
    Empty,
    #[error("Shell not found: {0}")]
    NotFound(String),
}

/// Returns the appropriate shell command and argument for the current platform.
///
/// Returns `(shell_program, shell_arg)` where:
/// - Windows: `("cmd", "/C")`
/// - Unix-like: the user's `$SHELL`, falling back to `/bin/sh`, with `-c`
#[must_use]
pub fn get_shell_command() -> (String, &'static str) {
    if cfg!(windows) {
        ("cmd".into(), "/C")
    } else {
        UnixShell::current_shell().get_shell_command()
    }
}

/// Resolve an executable by name.
///
/// Absolute paths are taken as they are if they exist; anything else is
/// looked up on `PATH`.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() && path.is_file() {
        return Some(path.to_path_buf());
    }

    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

/// Expand a leading `~` to the home directory.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path {
        "~" => Some(""),
        _ => path.strip_prefix("~/"),
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() => home,
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Unix shell types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnixShell {
    Zsh(PathBuf),
    Bash(PathBuf),
    Sh(PathBuf),
    Other(PathBuf),
}

impl UnixShell {
    /// Get the shell path.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Zsh(p) | Self::Bash(p) | Self::Sh(p) | Self::Other(p) => p,
        }
    }

    /// Get the current shell from `$SHELL`.
    #[must_use]
    pub fn current_shell() -> Self {
        if let Ok(shell) = std::env::var("SHELL") {
            if let Some(shell) = Self::from_path(Path::new(&shell)) {
                return shell;
            }
        }
        Self::Sh(PathBuf::from("/bin/sh"))
    }

    /// Create from a path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        if !(path.is_absolute() && path.is_file()) {
            return None;
        }
        let path_buf = path.to_path_buf();
        Some(match path.file_name().and_then(OsStr::to_str) {
            Some("zsh") => Self::Zsh(path_buf),
            Some("bash") => Self::Bash(path_buf),
            Some("sh") => Self::Sh(path_buf),
            _ => Self::Other(path_buf),
        })
    }

    /// Get shell command tuple.
    #[must_use]
    pub fn get_shell_command(&self) -> (String, &'static str) {
        (self.path().to_string_lossy().into_owned(), "-c")
    }
}

/// A resolved shell invocation: program, leading arguments, command flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ShellCommand {
    /// Resolve a shell from an optional command line such as
    /// `"bash --noprofile"`. `None` selects the platform default.
    ///
    /// # Errors
    /// Returns error if the command line does not parse or the program
    /// cannot be found.
    pub async fn resolve(line: Option<&str>) -> Result<Self, ShellError> {
        let Some(line) = line else {
            let (program, flag) = get_shell_command();
            return Ok(Self {
                program: PathBuf::from(program),
                args: vec![flag.to_string()],
            });
        };

        let mut parts =
            shlex::split(line).ok_or_else(|| ShellError::Unparsable(line.to_string()))?;
        if parts.is_empty() {
            return Err(ShellError::Empty);
        }
        let name = parts.remove(0);
        let program = resolve_executable_path(&name)
            .await
            .ok_or(ShellError::NotFound(name))?;

        let flag = if cfg!(windows) { "/C" } else { "-c" };
        parts.push(flag.to_string());
        Ok(Self {
            program,
            args: parts,
        })
    }

    /// Build a process running `line` through this shell.
    #[must_use]
    pub fn command(&self, line: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args).arg(line);
        cmd
    }
}
