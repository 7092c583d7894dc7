use crate::audit::{AuditLogger, LogSinks};
use crate::config::Settings;
use crate::error::{GitError, InvocationFailure, Result};
use crate::git::cache::{IgnoredFilesCache, RepoContentIndex};
use crate::git::executor::{CommandOutput, GitCommand, GitExecutor};
use crate::git::parser::{self, BranchEntry, RemoteInfo, StashEntry, StatusEntry};
use crate::git::version::GitVersion;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Files whose presence in the git directory means an operation is half done
const IN_PROGRESS_MARKERS: &[&str] = &[
    "MERGE_HEAD",
    "rebase-merge",
    "rebase-apply",
    "CHERRY_PICK_HEAD",
    "REVERT_HEAD",
];

/// Coarse repository state, derived from disk on every query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepositoryState {
    /// The handle's path is unusable or git could not report status
    Undefined,
    NonRepo,
    NoCommits,
    Dirty,
    Clean,
    OpInProgress,
}

/// Whether a mutating operation changed anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// git accepted the request but there was nothing to do
    Unchanged,
}

/// Construction options for a [`Repository`]
#[derive(Debug, Clone, Default)]
pub struct RepoOptions {
    pub settings: Settings,
    pub sinks: LogSinks,
}

impl RepoOptions {
    /// Options that suppress all log and error output
    pub fn silent() -> Self {
        Self {
            settings: Settings::default(),
            sinks: LogSinks::silent(),
        }
    }

    pub fn from_settings(settings: Settings) -> Self {
        Self {
            settings,
            sinks: LogSinks::new(),
        }
    }

    pub fn with_sinks(mut self, sinks: LogSinks) -> Self {
        self.sinks = sinks;
        self
    }
}

/// A handle on one working tree, driving the git binary
#[derive(Debug)]
pub struct Repository {
    path: PathBuf,
    executor: GitExecutor,
    settings: Settings,
    sinks: LogSinks,
    audit: Option<AuditLogger>,
    content_index: RepoContentIndex,
    ignored: IgnoredFilesCache,
}

impl Repository {
    /// Create a handle for `path` with default settings
    ///
    /// The path need not exist or be a repository yet (see [`Repository::init`]
    /// and [`Repository::clone_from`]).
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let options = RepoOptions::default();
        Self::build(path.as_ref(), options.settings, options.sinks, None)
    }

    /// Create a handle with explicit settings and sinks
    ///
    /// `settings.logging.silent` silences the sinks; a configured audit log
    /// file is opened (and its directory created) here.
    pub fn with_options<P: AsRef<Path>>(path: P, options: RepoOptions) -> Result<Self> {
        let mut sinks = options.sinks;
        if options.settings.logging.silent {
            sinks.set_silent(true);
        }
        let audit = match &options.settings.logging.audit_log {
            Some(log_path) => Some(AuditLogger::with_path(log_path)?),
            None => None,
        };
        Ok(Self::build(path.as_ref(), options.settings, sinks, audit))
    }

    fn build(path: &Path, settings: Settings, sinks: LogSinks, audit: Option<AuditLogger>) -> Self {
        let path = absolute(path);
        let executor = GitExecutor::with_settings(&path, &settings.git);

        Self {
            path,
            executor,
            settings,
            sinks,
            audit,
            content_index: RepoContentIndex::new(),
            ignored: IgnoredFilesCache::new(),
        }
    }

    /// Detect git repository from current working directory
    pub fn discover() -> Result<Self> {
        let current_dir = env::current_dir()?;
        Self::discover_from(current_dir)
    }

    /// Detect git repository starting from a specific directory
    pub fn discover_from<P: AsRef<Path>>(start_path: P) -> Result<Self> {
        let start = absolute(start_path.as_ref());
        match find_repo_root(&start) {
            Some(root) => Ok(Self::new(root)),
            None => Err(GitError::NotARepository(start)),
        }
    }

    /// Re-target this handle at the nearest directory at or above its path
    /// that holds a repository marker
    pub fn auto_connect(&mut self) -> Result<()> {
        match find_repo_root(&self.path) {
            Some(root) => {
                if root != self.path {
                    self.set_path(root);
                }
                Ok(())
            }
            None => Err(self.report(GitError::NotARepository(self.path.clone()))),
        }
    }

    /// Get the repository path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point the handle at another directory; both caches are dropped
    pub fn set_path<P: AsRef<Path>>(&mut self, path: P) {
        self.path = absolute(path.as_ref());
        self.executor.set_repo_path(&self.path);
        self.invalidate_caches();
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn sinks(&self) -> &LogSinks {
        &self.sinks
    }

    /// Get the git executor for this repository
    pub fn executor(&self) -> &GitExecutor {
        &self.executor
    }

    pub fn content_index(&self) -> &RepoContentIndex {
        &self.content_index
    }

    pub fn invalidate_caches(&mut self) {
        self.content_index.invalidate();
        self.ignored.invalidate();
    }

    /// Installed git version, rejecting versions below the supported minimum
    pub fn git_version(&self) -> Result<GitVersion> {
        GitVersion::validate_with(&self.executor).map_err(|e| self.report(e))
    }

    // ---------------------------------------------------------------------
    // Invocation plumbing
    // ---------------------------------------------------------------------

    pub(crate) fn invoke(&self, command: &GitCommand) -> Result<CommandOutput> {
        self.invoke_in(&self.path, command, GitError::CommandFailed)
    }

    /// Run `command` in `dir`; exit codes outside its allow-list become `wrap(failure)`
    pub(crate) fn invoke_in(
        &self,
        dir: &Path,
        command: &GitCommand,
        wrap: fn(Box<InvocationFailure>) -> GitError,
    ) -> Result<CommandOutput> {
        let result = self.executor.execute_in(dir, command);
        self.audit(dir, command, result.as_ref().ok().map(|o| o.exit_code));

        let output = result.map_err(|e| self.report(e))?;
        output
            .check(command)
            .map_err(|failure| self.report(wrap(Box::new(failure))))
    }

    /// Run a state-changing command; refused unless the path is a repository root
    pub(crate) fn mutate(&self, command: &GitCommand) -> Result<CommandOutput> {
        self.ensure_connected()?;
        self.sinks.log(&format!("git {}", command));
        self.invoke(command)
    }

    pub(crate) fn ensure_connected(&self) -> Result<()> {
        if self.is_repo() {
            Ok(())
        } else {
            Err(self.report(GitError::NotConnectedToProject(self.path.clone())))
        }
    }

    /// Send an error to the error sink and hand it back for propagation
    pub(crate) fn report(&self, err: GitError) -> GitError {
        self.sinks.error(&err.to_string());
        err
    }

    fn audit(&self, dir: &Path, command: &GitCommand, exit_code: Option<i32>) {
        let Some(audit) = &self.audit else {
            return;
        };
        let logged = audit.log_invocation(command.subcommand(), &command.display_args(), dir, exit_code);
        if let Err(e) = logged {
            self.sinks
                .error(&format!("Failed to write audit log {}: {}", audit.log_path().display(), e));
        }
    }

    /// Escape hatch: run any subcommand and return its output lines
    pub fn git_cmd<I, S>(&self, subcommand: &str, args: I, allowed: &[i32]) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let command = GitCommand::new(subcommand).args(args).allow(allowed);
        Ok(self.invoke(&command)?.lines())
    }

    // ---------------------------------------------------------------------
    // State
    // ---------------------------------------------------------------------

    /// True if the handle's path is a repository root
    pub fn is_repo(&self) -> bool {
        self.path.is_dir() && self.path.join(".git").exists()
    }

    /// True if HEAD resolves to a commit
    pub fn has_head(&self) -> bool {
        if !self.path.is_dir() {
            return false;
        }
        // 1: unborn branch, 128: not a repository
        let command = GitCommand::new("rev-parse")
            .args(["--verify", "--quiet", "HEAD"])
            .allow(&[0, 1, 128]);
        matches!(self.invoke(&command), Ok(output) if output.success())
    }

    /// Derive the current state from disk
    pub fn state(&self) -> RepositoryState {
        if !self.path.is_dir() {
            return RepositoryState::Undefined;
        }
        if find_repo_root(&self.path).is_none() {
            return RepositoryState::NonRepo;
        }
        if !self.has_head() {
            return RepositoryState::NoCommits;
        }

        let Ok(git_dir) = self.git_dir() else {
            return RepositoryState::Undefined;
        };
        if IN_PROGRESS_MARKERS
            .iter()
            .any(|marker| git_dir.join(marker).exists())
        {
            return RepositoryState::OpInProgress;
        }

        match self.parsed_status() {
            Ok(entries) if entries.is_empty() => RepositoryState::Clean,
            Ok(_) => RepositoryState::Dirty,
            Err(_) => RepositoryState::Undefined,
        }
    }

    /// Absolute path of the git directory (`.git`, or a worktree's private dir)
    pub fn git_dir(&self) -> Result<PathBuf> {
        let output = self.invoke(&GitCommand::new("rev-parse").arg("--absolute-git-dir"))?;
        let text = output.text();
        let dir = text.trim();
        if dir.is_empty() {
            return Err(GitError::ParseError("empty git directory".to_string()));
        }
        Ok(PathBuf::from(dir))
    }

    /// Show `git status` on the caller's terminal
    pub fn status(&self) -> Result<()> {
        self.invoke(&GitCommand::new("status").passthrough())?;
        Ok(())
    }

    /// Pending changes, one entry per path, untracked files included
    pub fn parsed_status(&self) -> Result<Vec<StatusEntry>> {
        let output = self.invoke(&GitCommand::new("status").args(["--porcelain", "-z"]))?;
        Ok(parser::parse_status_porcelain(&output.stdout))
    }

    pub fn stash_list(&self) -> Result<Vec<StashEntry>> {
        let output = self.invoke(&GitCommand::new("stash").args(["list", "--format=%gd%x00%s"]))?;
        Ok(parser::parse_stash_list(&output.text()))
    }

    pub fn stash_count(&self) -> Result<usize> {
        Ok(self.stash_list()?.len())
    }

    // ---------------------------------------------------------------------
    // Branches, tags, commits
    // ---------------------------------------------------------------------

    /// Branch HEAD points at, `None` when detached
    ///
    /// An unborn branch (no commits yet) still has a name.
    pub fn current_branch_or_none(&self) -> Result<Option<String>> {
        let command = GitCommand::new("symbolic-ref")
            .args(["--short", "-q", "HEAD"])
            .allow(&[0, 1]);
        let output = self.invoke(&command)?;
        let text = output.text();
        let branch = text.trim();
        if output.success() && !branch.is_empty() {
            Ok(Some(branch.to_string()))
        } else {
            Ok(None)
        }
    }

    pub fn current_branch(&self) -> Result<String> {
        self.current_branch_or_none()?
            .ok_or_else(|| self.report(GitError::NoCurrentBranch))
    }

    /// Local branches
    pub fn branches(&self) -> Result<Vec<BranchEntry>> {
        let output = self.invoke(&GitCommand::new("branch").arg("--list"))?;
        Ok(parser::parse_branch_list(&output.text()))
    }

    /// Description lines set via [`Repository::set_branch_description`]; empty if unset
    pub fn branch_description(&self, branch: &str) -> Result<Vec<String>> {
        let command = GitCommand::new("config")
            .args(["--get", &format!("branch.{}.description", branch)])
            .allow(&[0, 1]);
        Ok(self.invoke(&command)?.lines())
    }

    /// Draw the commit graph of all refs on the caller's terminal
    pub fn show_branching_graph(&self) -> Result<()> {
        let command = GitCommand::new("log")
            .args(["--graph", "--oneline", "--decorate", "--all"])
            .passthrough();
        self.invoke(&command)?;
        Ok(())
    }

    /// Commits reachable from HEAD; zero before the first commit
    pub fn commit_count(&self) -> Result<usize> {
        if !self.has_head() {
            return Ok(0);
        }
        let output = self.invoke(&GitCommand::new("rev-list").args(["--count", "HEAD"]))?;
        parser::parse_count(&output.text())
    }

    /// Tags whose names match a glob, filtered by git itself
    pub fn tags_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let output = self.invoke(&GitCommand::new("tag").args(["--list", pattern]))?;
        Ok(output.lines())
    }

    /// Paths touched by a commit, relative to the repository root
    pub fn files_in_commit(&self, commit: &str) -> Result<Vec<String>> {
        let command = GitCommand::new("diff-tree")
            .args(["--no-commit-id", "--name-only", "-r", "-z", "--root", commit]);
        let output = self.invoke(&command)?;
        Ok(parser::split_nul(&output.stdout))
    }

    /// Commit id a ref (branch, tag, expression) points at
    pub fn resolve_ref(&self, reference: &str) -> Result<String> {
        let command = GitCommand::new("rev-parse").args(["--verify", &format!("{}^{{commit}}", reference)]);
        let output = self.invoke(&command)?;
        Ok(output.text().trim().to_string())
    }

    // ---------------------------------------------------------------------
    // Files
    // ---------------------------------------------------------------------

    /// Tracked files, relative to the handle's path
    pub fn ls_files(&self) -> Result<Vec<String>> {
        let output = self.invoke(&GitCommand::new("ls-files").arg("-z"))?;
        Ok(parser::split_nul(&output.stdout))
    }

    /// Tracked files as absolute paths
    pub fn ls_files_as_abspath(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .ls_files()?
            .into_iter()
            .map(|rel| self.path.join(rel))
            .collect())
    }

    /// Tracked files, plus untracked unignored ones if `include_unadded`
    pub fn all_files_in_repo(&self, include_unadded: bool) -> Result<Vec<PathBuf>> {
        let mut command = GitCommand::new("ls-files").args(["-z", "--cached"]);
        if include_unadded {
            command = command.args(["--others", "--exclude-standard"]);
        }
        let output = self.invoke(&command)?;

        // Unmerged paths are listed once per stage
        let mut seen = HashSet::new();
        Ok(parser::split_nul(&output.stdout)
            .into_iter()
            .filter(|rel| seen.insert(rel.clone()))
            .map(|rel| self.path.join(rel))
            .collect())
    }

    /// Build the membership index used by [`Repository::fast_is_file_in_repo`]
    ///
    /// Does nothing if an index already exists, unless `reset` is set.
    pub fn analyze_repo_contents(&mut self, include_unadded: bool, reset: bool) -> Result<()> {
        if self.content_index.is_fresh() && !reset {
            return Ok(());
        }
        let files = self.all_files_in_repo(include_unadded)?;
        self.content_index.rebuild(files, include_unadded);
        tracing::debug!(
            repo = %self.path.display(),
            files = self.content_index.orig_file_count(),
            include_unadded,
            "repository contents analyzed"
        );
        Ok(())
    }

    /// Index lookup without spawning git; `None` until
    /// [`Repository::analyze_repo_contents`] has run
    pub fn fast_is_file_in_repo<P: AsRef<Path>>(&self, abspath: P) -> Option<bool> {
        self.content_index.contains(&absolute(abspath.as_ref()))
    }

    /// Re-count files and compare with the count at analysis time
    pub fn did_repo_filecount_change(&mut self) -> Result<bool> {
        if !self.content_index.is_fresh() {
            return Err(self.report(GitError::IndexNotBuilt));
        }
        let count = self
            .all_files_in_repo(self.content_index.include_unadded())?
            .len();
        self.content_index.record_count(count)
    }

    pub fn orig_file_count(&self) -> usize {
        self.content_index.orig_file_count()
    }

    pub fn new_file_count(&self) -> usize {
        self.content_index.new_file_count()
    }

    /// Fill the ignored-files cache if it is stale
    pub fn cache_ignored_files(&mut self) -> Result<()> {
        if self.ignored.is_fresh() {
            return Ok(());
        }
        let command = GitCommand::new("ls-files").args(["-z", "--others", "--ignored", "--exclude-standard"]);
        let output = self.invoke(&command)?;
        let files = parser::split_nul(&output.stdout)
            .into_iter()
            .map(|rel| self.path.join(rel))
            .collect();
        self.ignored.fill(files);
        Ok(())
    }

    /// Untracked files matched by ignore rules, as absolute paths
    pub fn all_ignored_files(&mut self) -> Result<Vec<PathBuf>> {
        self.cache_ignored_files()?;
        Ok(self.ignored.get().map(<[PathBuf]>::to_vec).unwrap_or_default())
    }

    /// Whether ignore rules match `path`
    pub fn check_ignore<P: AsRef<Path>>(&self, path: P) -> Result<bool> {
        // 0: ignored, 1: not ignored
        let command = GitCommand::new("check-ignore")
            .args([OsStr::new("-q"), path.as_ref().as_os_str()])
            .allow(&[0, 1]);
        let output = self.invoke_in(&self.path, &command, GitError::CheckIgnoreFailed)?;
        Ok(output.exit_code == 0)
    }

    // ---------------------------------------------------------------------
    // Remotes
    // ---------------------------------------------------------------------

    /// Configured remotes in the order git lists them
    pub fn remotes(&self) -> Result<Vec<RemoteInfo>> {
        let output = self.invoke(&GitCommand::new("remote").arg("-v"))?;
        Ok(parser::parse_remotes(&output.text()))
    }
}

/// Nearest directory at or above `start` holding a `.git` entry
fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if fs::symlink_metadata(current.join(".git")).is_ok() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Absolute form of `path` with `.` and `..` folded away lexically
///
/// Symlinks are left alone, so `a/link/..` becomes `a`.
pub(super) fn absolute(path: &Path) -> PathBuf {
    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn create_test_repo() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let repo_path = temp_dir.path().to_path_buf();

        for args in [
            vec!["init"],
            vec!["config", "user.name", "Test User"],
            vec!["config", "user.email", "test@example.com"],
        ] {
            Command::new("git")
                .args(&args)
                .current_dir(&repo_path)
                .output()
                .unwrap();
        }

        (temp_dir, repo_path)
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let (_temp, repo_path) = create_test_repo();
        let sub_dir = repo_path.join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        let repo = Repository::discover_from(&sub_dir).unwrap();
        assert_eq!(repo.path(), repo_path.as_path());
    }

    #[test]
    fn test_discover_not_a_repo() {
        let temp_dir = TempDir::new().unwrap();
        let result = Repository::discover_from(temp_dir.path());
        assert!(matches!(result, Err(GitError::NotARepository(_))));
    }

    #[test]
    fn test_auto_connect_moves_to_root() {
        let (_temp, repo_path) = create_test_repo();
        let sub_dir = repo_path.join("a").join("b");
        fs::create_dir_all(&sub_dir).unwrap();

        let mut repo = Repository::with_options(&sub_dir, RepoOptions::silent()).unwrap();
        assert!(!repo.is_repo());
        repo.auto_connect().unwrap();
        assert_eq!(repo.path(), repo_path.as_path());
        assert!(repo.is_repo());
    }

    #[test]
    fn test_relative_path_is_made_absolute() {
        let repo = Repository::new("some/relative/dir");
        assert!(repo.path().is_absolute());
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_folds_dot_segments() {
        assert_eq!(absolute(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(absolute(Path::new("/a/missing/../b/")), PathBuf::from("/a/b"));
        assert_eq!(absolute(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(absolute(Path::new("/")), PathBuf::from("/"));
    }

    #[test]
    fn test_dot_dot_path_is_repo_root() {
        let (temp, repo_path) = create_test_repo();
        let via_missing = temp.path().join("missing").join("..");
        let repo = Repository::new(via_missing);

        assert_eq!(repo.path(), repo_path.as_path());
        assert!(repo.is_repo());
    }

    #[test]
    fn test_empty_repo_state() {
        let (_temp, repo_path) = create_test_repo();
        let repo = Repository::new(&repo_path);

        assert!(repo.is_repo());
        assert!(!repo.has_head());
        assert_eq!(repo.state(), RepositoryState::NoCommits);
        assert_eq!(repo.commit_count().unwrap(), 0);
        assert!(repo.current_branch_or_none().unwrap().is_some());
    }

    #[test]
    fn test_state_of_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::new(temp_dir.path().join("missing"));
        assert_eq!(repo.state(), RepositoryState::Undefined);
    }

    #[test]
    fn test_errors_reach_error_sink() {
        let temp_dir = TempDir::new().unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink_errors = Arc::clone(&errors);
        let sinks = LogSinks::new().with_error(move |msg| sink_errors.lock().unwrap().push(msg.to_string()));

        let repo = Repository::with_options(temp_dir.path(), RepoOptions::default().with_sinks(sinks)).unwrap();
        assert!(repo.ls_files().is_err());

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("ls-files"));
    }

    #[test]
    fn test_audit_log_records_invocations() {
        let (_temp, repo_path) = create_test_repo();
        let log_dir = TempDir::new().unwrap();
        let log_path = log_dir.path().join("audit.log");

        let mut settings = Settings::default();
        settings.logging.audit_log = Some(log_path.clone());
        let repo = Repository::with_options(&repo_path, RepoOptions::from_settings(settings)).unwrap();
        repo.ls_files().unwrap();

        let content = fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("git ls-files -z"));
        assert!(content.contains("exit:0"));
    }

    #[test]
    fn test_git_version_supported() {
        let (_temp, repo_path) = create_test_repo();
        let repo = Repository::new(&repo_path);
        assert!(repo.git_version().unwrap().is_supported());
    }
}
