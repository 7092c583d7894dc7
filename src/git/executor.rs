use crate::config::GitSettings;
use crate::error::{GitError, InvocationFailure, Result};
use crate::git::parser;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const MAX_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Variables that make git ignore the working directory it is started in,
/// as set for a hook
const REPO_LOCATION_VARS: &[&str] = &[
    "GIT_DIR",
    "GIT_WORK_TREE",
    "GIT_INDEX_FILE",
    "GIT_COMMON_DIR",
    "GIT_PREFIX",
    "GIT_OBJECT_DIRECTORY",
    "GIT_ALTERNATE_OBJECT_DIRECTORIES",
    "GIT_NAMESPACE",
];

/// How the child's output streams are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capture {
    /// Buffer stdout and stderr in memory
    #[default]
    Piped,
    /// Inherit the caller's terminal; nothing is captured
    Passthrough,
}

/// One git invocation: subcommand, arguments, accepted exit codes and capture mode
#[derive(Debug, Clone)]
pub struct GitCommand {
    subcommand: String,
    args: Vec<OsString>,
    allowed: Vec<i32>,
    capture: Capture,
    timeout: Option<Duration>,
}

impl GitCommand {
    pub fn new(subcommand: impl Into<String>) -> Self {
        Self {
            subcommand: subcommand.into(),
            args: Vec::new(),
            allowed: vec![0],
            capture: Capture::Piped,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Replace the accepted exit codes (default: `[0]`)
    pub fn allow(mut self, codes: &[i32]) -> Self {
        self.allowed = codes.to_vec();
        self
    }

    pub fn passthrough(mut self) -> Self {
        self.capture = Capture::Passthrough;
        self
    }

    /// Override the executor's default timeout for this invocation
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn subcommand(&self) -> &str {
        &self.subcommand
    }

    pub fn allowed(&self) -> &[i32] {
        &self.allowed
    }

    pub fn capture(&self) -> Capture {
        self.capture
    }

    /// Arguments rendered lossily for logs and error messages
    pub fn display_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

impl fmt::Display for GitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.subcommand)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Result of executing a git command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout decoded lossily as UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stdout as non-empty trimmed lines
    pub fn lines(&self) -> Vec<String> {
        parser::to_lines(&self.stdout)
    }

    /// Accept this output if its exit code is in the command's allow-list
    pub fn check(self, command: &GitCommand) -> std::result::Result<Self, InvocationFailure> {
        if command.allowed.contains(&self.exit_code) {
            return Ok(self);
        }
        Err(InvocationFailure {
            command: command.subcommand.clone(),
            args: command.display_args(),
            exit_code: self.exit_code,
            stderr: self.stderr,
        })
    }
}

/// Executes git commands within a repository
///
/// The target directory is handed to each child process; the caller's
/// working directory is never touched.
#[derive(Debug, Clone)]
pub struct GitExecutor {
    repo_path: PathBuf,
    binary: String,
    timeout: Duration,
}

impl GitExecutor {
    /// Create a new GitExecutor for the given repository path
    pub fn new<P: AsRef<Path>>(repo_path: P) -> Self {
        Self::with_settings(repo_path, &GitSettings::default())
    }

    pub fn with_settings<P: AsRef<Path>>(repo_path: P, settings: &GitSettings) -> Self {
        Self {
            repo_path: repo_path.as_ref().to_path_buf(),
            binary: settings.binary.clone(),
            timeout: settings.timeout(),
        }
    }

    /// Execute and accept only the command's allowed exit codes
    pub fn run(&self, command: &GitCommand) -> Result<CommandOutput> {
        Ok(self.execute(command)?.check(command)?)
    }

    /// Execute in the repository directory, returning output for any exit code
    pub fn execute(&self, command: &GitCommand) -> Result<CommandOutput> {
        self.execute_in(&self.repo_path, command)
    }

    /// Execute in an explicit directory
    pub fn execute_in(&self, dir: &Path, command: &GitCommand) -> Result<CommandOutput> {
        if !dir.is_dir() {
            return Err(GitError::InvalidPath(dir.to_path_buf()));
        }

        let mut cmd = self.command_for(dir, command);
        let child = cmd.spawn()?;
        let timeout = command.timeout.unwrap_or(self.timeout);
        let output = wait_with_timeout(child, timeout).map_err(|e| match e {
            WaitError::TimedOut => GitError::Timeout {
                command: command.to_string(),
                timeout,
            },
            WaitError::Io(e) => GitError::IoError(e),
        })?;

        tracing::debug!(
            command = %command,
            cwd = %dir.display(),
            exit_code = output.exit_code,
            "git invocation finished"
        );

        Ok(output)
    }

    /// Build the process for `command` without starting it
    ///
    /// The child is pinned to `dir`: repository-location variables inherited
    /// from the caller are cleared. Passthrough runs get `--no-pager` so a
    /// pager can never hold the child open until the timeout kills it.
    fn command_for(&self, dir: &Path, command: &GitCommand) -> Command {
        let mut cmd = Command::new(&self.binary);
        if command.capture == Capture::Passthrough {
            cmd.arg("--no-pager");
        }
        cmd.arg(&command.subcommand)
            .args(&command.args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C");
        for var in REPO_LOCATION_VARS {
            cmd.env_remove(var);
        }

        match command.capture {
            Capture::Piped => {
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());
            }
            Capture::Passthrough => {
                cmd.stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
        }
        cmd
    }

    /// Get the repository path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn set_repo_path<P: AsRef<Path>>(&mut self, path: P) {
        self.repo_path = path.as_ref().to_path_buf();
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }
}

enum WaitError {
    TimedOut,
    Io(std::io::Error),
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    stream.map(|mut s| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            // A read error leaves whatever was collected so far
            let _ = s.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default()
}

/// Wait for the child, killing it once `timeout` elapses
///
/// Pipes are drained on their own threads so a chatty child cannot block
/// on a full pipe while we poll.
fn wait_with_timeout(mut child: Child, timeout: Duration) -> std::result::Result<CommandOutput, WaitError> {
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start = Instant::now();
    let mut interval = Duration::from_millis(1);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(WaitError::TimedOut);
                }
                thread::sleep(interval);
                interval = (interval * 2).min(MAX_POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(WaitError::Io(e));
            }
        }
    };

    Ok(CommandOutput {
        stdout: collect(stdout),
        stderr: String::from_utf8_lossy(&collect(stderr)).into_owned(),
        exit_code: status.code().unwrap_or(-1),
    })
}
