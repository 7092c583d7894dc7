pub mod audit;
pub mod config;
pub mod error;
pub mod git;

// Re-export commonly used types for convenience
pub use audit::LogSinks;
pub use config::Settings;
pub use error::{GitError, InvocationFailure, Result};
pub use git::{
    CloneOptions, GitCommand, GitVersion, Outcome, RemoteInfo, RepoOptions, Repository,
    RepositoryState,
};
