use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::settings::ConfigError;

/// A git invocation that exited with a code outside its allow-list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationFailure {
    pub command: String,
    pub args: Vec<String>,
    pub exit_code: i32,
    pub stderr: String,
}

impl fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'git {}", self.command)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        write!(f, "' exited with code {}", self.exit_code)?;
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            write!(f, ": {}", stderr)?;
        }
        Ok(())
    }
}

/// Errors that can occur during git operations
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Not connected to a git project: {}", .0.display())]
    NotConnectedToProject(PathBuf),

    #[error("Invalid repository path: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("Failed to add files: {0}")]
    AddFailed(Box<InvocationFailure>),

    #[error("Ignore check failed: {0}")]
    CheckIgnoreFailed(Box<InvocationFailure>),

    #[error("Git command failed: {0}")]
    CommandFailed(Box<InvocationFailure>),

    #[error("Git command 'git {command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("Already a git repository: {}", .0.display())]
    AlreadyARepository(PathBuf),

    #[error("HEAD does not point at a branch")]
    NoCurrentBranch,

    #[error("Repository contents have not been analyzed")]
    IndexNotBuilt,

    #[error("Failed to parse git output: {0}")]
    ParseError(String),

    #[error("Git version {0} is too old. Minimum required: 2.20")]
    GitVersionTooOld(String),

    #[error("Failed to detect git version: {0}")]
    GitVersionDetectionFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<InvocationFailure> for GitError {
    fn from(failure: InvocationFailure) -> Self {
        GitError::CommandFailed(Box::new(failure))
    }
}

impl GitError {
    /// Exit code of the failed invocation, if this error came from one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            GitError::AddFailed(f) | GitError::CheckIgnoreFailed(f) | GitError::CommandFailed(f) => {
                Some(f.exit_code)
            }
            _ => None,
        }
    }
}

/// Result type for git operations
pub type Result<T> = std::result::Result<T, GitError>;
