//! State-changing operations on a [`Repository`].
//!
//! Each method is one git invocation (two for a rebase from a point) with
//! its own exit-code allow-list. Apart from `init` and `clone_from`, all of
//! them refuse to run unless the handle's path is a repository root.

use crate::error::{GitError, InvocationFailure, Result};
use crate::git::executor::{CommandOutput, GitCommand};
use crate::git::parser;
use crate::git::repository::{Outcome, Repository, absolute};
use std::ffi::{OsStr, OsString};
use std::path::Path;

/// Follow-up configuration applied after a clone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOptions {
    /// Name for the source remote instead of `origin`
    pub as_remote: Option<String>,
    /// Branch to record as the remote's HEAD and check out
    pub head_branch: Option<String>,
}

const NOTHING_TO_COMMIT: &[&str] = &[
    "nothing to commit",
    "nothing added to commit",
    "no changes added to commit",
];

const ALREADY_UP_TO_DATE: &[&str] = &["Already up to date", "Already up-to-date"];

fn mentions_any(output: &CommandOutput, needles: &[&str]) -> bool {
    let text = output.text();
    needles.iter().any(|needle| text.contains(needle))
}

impl Repository {
    /// Turn an exit code that passed the allow-list but still means failure into an error
    fn unexpected(&self, command: &GitCommand, output: CommandOutput) -> GitError {
        self.report(GitError::CommandFailed(Box::new(InvocationFailure {
            command: command.subcommand().to_string(),
            args: command.display_args(),
            exit_code: output.exit_code,
            stderr: output.stderr,
        })))
    }

    /// Create a repository at the handle's path, which must already exist
    pub fn init(&mut self) -> Result<()> {
        self.sinks().log(&format!("git init {}", self.path().display()));
        self.invoke(&GitCommand::new("init"))?;
        self.invalidate_caches();
        Ok(())
    }

    /// Stage one or more paths
    pub fn add<I, P>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<OsStr>,
    {
        let paths: Vec<OsString> = paths
            .into_iter()
            .map(|p| p.as_ref().to_os_string())
            .collect();
        self.ensure_connected()?;
        if paths.is_empty() {
            return Ok(());
        }

        let command = GitCommand::new("add").arg("--").args(&paths);
        self.sinks().log(&format!("git {}", command));
        self.invoke_in(self.path(), &command, GitError::AddFailed)?;
        Ok(())
    }

    /// Commit staged changes; `Unchanged` if there was nothing to commit
    pub fn commit(&self, message: &str) -> Result<Outcome> {
        let command = GitCommand::new("commit").args(["-m", message]).allow(&[0, 1]);
        let output = self.mutate(&command)?;
        if output.success() {
            return Ok(Outcome::Applied);
        }
        if mentions_any(&output, NOTHING_TO_COMMIT) {
            return Ok(Outcome::Unchanged);
        }
        Err(self.unexpected(&command, output))
    }

    pub fn commit_allowing_empty(&self, message: &str) -> Result<()> {
        self.mutate(&GitCommand::new("commit").args(["--allow-empty", "-m", message]))?;
        Ok(())
    }

    pub fn checkout(&self, branch: &str) -> Result<()> {
        self.mutate(&GitCommand::new("checkout").arg(branch))?;
        Ok(())
    }

    /// Overwrite `dir` in the working tree with its content on `branch`
    pub fn checkout_dir_from_branch<P: AsRef<Path>>(&self, dir: P, branch: &str) -> Result<()> {
        let command = GitCommand::new("checkout")
            .args([OsStr::new(branch), OsStr::new("--"), dir.as_ref().as_os_str()]);
        self.mutate(&command)?;
        Ok(())
    }

    pub fn create_branch(&self, name: &str, branching_point: &str) -> Result<()> {
        self.mutate(&GitCommand::new("branch").args([name, branching_point]))?;
        Ok(())
    }

    /// Force-delete a local branch, merged or not
    pub fn delete_branch(&self, name: &str) -> Result<()> {
        self.mutate(&GitCommand::new("branch").args(["-D", name]))?;
        Ok(())
    }

    pub fn set_branch_description(&self, branch: &str, description: &str) -> Result<()> {
        let key = format!("branch.{}.description", branch);
        self.mutate(&GitCommand::new("config").args([key.as_str(), description]))?;
        Ok(())
    }

    /// Merge `branch` into the current branch; `Unchanged` if already up to date
    pub fn merge(&self, branch: &str) -> Result<Outcome> {
        let output = self.mutate(&GitCommand::new("merge").args(["--no-edit", branch]))?;
        if mentions_any(&output, ALREADY_UP_TO_DATE) {
            Ok(Outcome::Unchanged)
        } else {
            Ok(Outcome::Applied)
        }
    }

    /// Replay the commits of `branch` after `from_point` on top of `onto`
    pub fn rebase_branch_from_point_onto(
        &self,
        branch: &str,
        from_point: &str,
        onto: &str,
    ) -> Result<Vec<String>> {
        self.checkout(branch)?;
        let output = self.mutate(&GitCommand::new("rebase").args(["--onto", onto, from_point]))?;
        Ok(output.lines())
    }

    pub fn create_tag(&self, tag: &str) -> Result<()> {
        self.mutate(&GitCommand::new("tag").arg(tag))?;
        Ok(())
    }

    pub fn move_tag_to_head(&self, tag: &str) -> Result<()> {
        self.move_tag(tag, "HEAD")
    }

    /// Point `tag` at `reference`, creating it if needed
    pub fn move_tag(&self, tag: &str, reference: &str) -> Result<()> {
        self.mutate(&GitCommand::new("tag").args(["-f", tag, reference]))?;
        Ok(())
    }

    pub fn mv<P: AsRef<Path>, Q: AsRef<Path>>(&self, from: P, to: Q) -> Result<()> {
        let command = GitCommand::new("mv").args([from.as_ref().as_os_str(), to.as_ref().as_os_str()]);
        self.mutate(&command)?;
        Ok(())
    }

    /// Stash tracked and untracked changes, leaving everything under `dir_to_exclude` alone
    ///
    /// `dir_to_exclude` may be absolute or relative to the repository root.
    /// Returns `Unchanged` when nothing outside it is pending.
    pub fn stash_with_untracked_excluding<P: AsRef<Path>>(&self, dir_to_exclude: P) -> Result<Outcome> {
        self.ensure_connected()?;

        let dir = dir_to_exclude.as_ref();
        let dir = if dir.is_absolute() { absolute(dir) } else { dir.to_path_buf() };
        let relative = dir.strip_prefix(self.path()).unwrap_or(&dir);
        let relative = relative.to_string_lossy().replace('\\', "/");

        let status = self.invoke(
            &GitCommand::new("status").args(["--porcelain", "-z", "--untracked-files=all"]),
        )?;
        let pending = parser::exclude_dir(parser::parse_status_porcelain(&status.stdout), &relative);
        if pending.is_empty() {
            return Ok(Outcome::Unchanged);
        }

        // Literal so a directory named like a glob excludes only itself
        let exclude = format!(":(exclude,literal){}", relative);
        let command = GitCommand::new("stash")
            .args(["push", "--include-untracked", "--", "."])
            .arg(exclude);
        self.mutate(&command)?;
        Ok(Outcome::Applied)
    }

    /// Pop the newest stash; `Unchanged` if there is none
    pub fn stash_pop(&self) -> Result<Outcome> {
        self.ensure_connected()?;
        if self.stash_count()? == 0 {
            return Ok(Outcome::Unchanged);
        }
        self.mutate(&GitCommand::new("stash").arg("pop"))?;
        Ok(Outcome::Applied)
    }

    /// Add a remote, optionally tracking only `track_branch`
    pub fn add_remote(&self, name: &str, url: &str, track_branch: Option<&str>) -> Result<()> {
        let mut command = GitCommand::new("remote").arg("add");
        if let Some(branch) = track_branch {
            command = command.args(["-t", branch]);
        }
        self.mutate(&command.args([name, url]))?;
        Ok(())
    }

    pub fn remove_remote(&self, name: &str) -> Result<()> {
        self.mutate(&GitCommand::new("remote").args(["remove", name]))?;
        Ok(())
    }

    pub fn rename_remote(&self, from_name: &str, to_name: &str) -> Result<()> {
        self.mutate(&GitCommand::new("remote").args(["rename", from_name, to_name]))?;
        Ok(())
    }

    /// Fetch `remote`, or the default remote when `None`
    pub fn fetch(&self, remote: Option<&str>) -> Result<()> {
        let command = GitCommand::new("fetch")
            .args(remote)
            .timeout(self.settings().git.network_timeout());
        self.mutate(&command)?;
        Ok(())
    }

    /// Clone `remote_url` into the handle's path
    ///
    /// The path must not already be a repository. Its parent must exist;
    /// the path itself may be missing or an empty directory.
    pub fn clone_from<S: AsRef<OsStr>>(&mut self, remote_url: S, options: &CloneOptions) -> Result<()> {
        if self.is_repo() {
            return Err(self.report(GitError::AlreadyARepository(self.path().to_path_buf())));
        }
        let Some(parent) = self.path().parent().map(Path::to_path_buf) else {
            return Err(self.report(GitError::InvalidPath(self.path().to_path_buf())));
        };

        let command = GitCommand::new("clone")
            .arg(remote_url)
            .arg(self.path())
            .timeout(self.settings().git.network_timeout());
        self.sinks().log(&format!("git {}", command));
        self.invoke_in(&parent, &command, GitError::CommandFailed)?;
        self.invalidate_caches();

        let remote = match options.as_remote.as_deref() {
            Some(name) if name != "origin" => {
                self.rename_remote("origin", name)?;
                name
            }
            _ => "origin",
        };

        if let Some(branch) = options.head_branch.as_deref() {
            self.mutate(&GitCommand::new("remote").args(["set-head", remote, branch]))?;
            self.checkout(branch)?;
        }

        Ok(())
    }
}
