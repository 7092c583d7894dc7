pub mod cache;
pub mod executor;
pub mod operations;
pub mod parser;
pub mod repository;
pub mod version;

// Re-export commonly used types
pub use cache::{CacheState, IgnoredFilesCache, RepoContentIndex};
pub use executor::{Capture, CommandOutput, GitCommand, GitExecutor};
pub use operations::CloneOptions;
pub use parser::{
    BranchEntry, RemoteInfo, StashEntry, StatusEntry, parse_branch_list, parse_remotes,
    parse_stash_list, parse_status_porcelain, to_lines,
};
pub use repository::{Outcome, RepoOptions, Repository, RepositoryState};
pub use version::GitVersion;
