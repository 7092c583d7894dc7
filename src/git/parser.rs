use crate::error::{GitError, Result};
use serde::{Deserialize, Serialize};

/// Anything git output can arrive as: raw bytes, text, or already-split lines
pub trait LineSource {
    fn source_lines(&self) -> Vec<String>;
}

impl LineSource for str {
    fn source_lines(&self) -> Vec<String> {
        self.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl LineSource for String {
    fn source_lines(&self) -> Vec<String> {
        self.as_str().source_lines()
    }
}

impl LineSource for [u8] {
    fn source_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(self).source_lines()
    }
}

impl LineSource for Vec<u8> {
    fn source_lines(&self) -> Vec<String> {
        self.as_slice().source_lines()
    }
}

impl LineSource for [String] {
    fn source_lines(&self) -> Vec<String> {
        self.iter().flat_map(|s| s.source_lines()).collect()
    }
}

impl LineSource for Vec<String> {
    fn source_lines(&self) -> Vec<String> {
        self.as_slice().source_lines()
    }
}

/// Split output into trimmed, non-empty lines
pub fn to_lines<T: LineSource + ?Sized>(input: &T) -> Vec<String> {
    input.source_lines()
}

/// Split NUL-terminated output (`-z`) into its non-empty entries, untrimmed
pub fn split_nul(output: &[u8]) -> Vec<String> {
    output
        .split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .map(|entry| String::from_utf8_lossy(entry).into_owned())
        .collect()
}

/// A configured remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteInfo {
    pub name: String,
    pub url: String,
}

/// Parse `git remote -v` output
///
/// Each remote appears once per direction (fetch, push); only the first
/// line per name is kept, in the order git reported them.
pub fn parse_remotes(output: &str) -> Vec<RemoteInfo> {
    let mut remotes: Vec<RemoteInfo> = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((name, rest)) = line.split_once(char::is_whitespace) else {
            continue;
        };

        if remotes.iter().any(|r| r.name == name) {
            continue;
        }

        let rest = rest.trim();
        let url = rest
            .strip_suffix("(fetch)")
            .or_else(|| rest.strip_suffix("(push)"))
            .unwrap_or(rest)
            .trim_end();

        remotes.push(RemoteInfo {
            name: name.to_string(),
            url: url.to_string(),
        });
    }

    remotes
}

/// One line of `git status --porcelain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Index column (`X`)
    pub index: char,
    /// Worktree column (`Y`)
    pub worktree: char,
    pub path: String,
    /// Source path of a rename or copy
    pub orig_path: Option<String>,
}

impl StatusEntry {
    pub fn is_untracked(&self) -> bool {
        self.index == '?' && self.worktree == '?'
    }

    pub fn is_ignored(&self) -> bool {
        self.index == '!' && self.worktree == '!'
    }

    pub fn is_staged(&self) -> bool {
        !matches!(self.index, ' ' | '?' | '!')
    }

    pub fn is_unstaged(&self) -> bool {
        !matches!(self.worktree, ' ' | '?' | '!')
    }

    /// True if the entry is `dir` itself or lies beneath it
    pub fn is_under(&self, dir: &str) -> bool {
        let dir = dir.trim_end_matches('/');
        if dir.is_empty() {
            return true;
        }
        let path = self.path.trim_end_matches('/');
        path == dir
            || path
                .strip_prefix(dir)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Parse `git status --porcelain -z` output
///
/// Renames and copies carry their source path as the following NUL entry.
pub fn parse_status_porcelain(output: &[u8]) -> Vec<StatusEntry> {
    let mut entries = Vec::new();
    let mut fields = output.split(|b| *b == 0).filter(|f| !f.is_empty());

    while let Some(field) = fields.next() {
        let field = String::from_utf8_lossy(field);
        let mut chars = field.chars();
        let (Some(index), Some(worktree), Some(' ')) = (chars.next(), chars.next(), chars.next())
        else {
            continue;
        };
        let path = chars.as_str().to_string();
        if path.is_empty() {
            continue;
        }

        let orig_path = if matches!(index, 'R' | 'C') {
            fields
                .next()
                .map(|f| String::from_utf8_lossy(f).into_owned())
        } else {
            None
        };

        entries.push(StatusEntry {
            index,
            worktree,
            path,
            orig_path,
        });
    }

    entries
}

/// Drop every entry at or beneath `dir` (relative to the repository root)
pub fn exclude_dir(entries: Vec<StatusEntry>, dir: &str) -> Vec<StatusEntry> {
    entries.into_iter().filter(|e| !e.is_under(dir)).collect()
}

/// Parse `git branch --list` output
pub fn parse_branch_list(output: &str) -> Vec<BranchEntry> {
    let mut branches = Vec::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }

        // Format: "* main" or "  feature-x"
        let is_current = line.starts_with('*');
        let name = line.trim_start_matches('*').trim();

        // "(HEAD detached at 1a2b3c)" is not a branch
        if name.starts_with('(') {
            continue;
        }

        branches.push(BranchEntry {
            name: name.to_string(),
            is_current,
        });
    }

    branches
}

/// Parse `git stash list --format=%gd%x00%s` output
pub fn parse_stash_list(output: &str) -> Vec<StashEntry> {
    let mut stashes = Vec::new();

    for line in output.lines() {
        if line.is_empty() {
            continue;
        }

        if let Some((index, message)) = line.split_once('\0') {
            stashes.push(StashEntry {
                index: index.to_string(),
                message: message.to_string(),
            });
        }
    }

    stashes
}

/// Parse a single count such as `git rev-list --count` prints
pub fn parse_count(output: &str) -> Result<usize> {
    let trimmed = output.trim();
    trimmed
        .parse::<usize>()
        .map_err(|_| GitError::ParseError(format!("expected a count, got '{}'", trimmed)))
}

/// A local branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchEntry {
    pub name: String,
    pub is_current: bool,
}

/// A stash entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashEntry {
    pub index: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_lines_from_bytes() {
        let lines = to_lines(b"  a.txt\n\nb.txt  \n".as_slice());
        assert_eq!(lines, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_to_lines_from_str_and_vec() {
        assert_eq!(to_lines("one\r\ntwo\n"), vec!["one", "two"]);

        let already_split = vec!["x\ny".to_string(), "   ".to_string(), "z".to_string()];
        assert_eq!(to_lines(&already_split), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_to_lines_empty() {
        assert!(to_lines("").is_empty());
        assert!(to_lines("\n\n  \n").is_empty());
        assert!(to_lines(&Vec::<u8>::new()).is_empty());
    }

    #[test]
    fn test_split_nul_keeps_spaces() {
        let entries = split_nul(b"my file.txt\0dir/other\0");
        assert_eq!(entries, vec!["my file.txt", "dir/other"]);
        assert!(split_nul(b"").is_empty());
    }

    #[test]
    fn test_parse_remotes_dedups_directions() {
        let output = "origin\thttps://example.com/a.git (fetch)\n\
                      origin\thttps://example.com/a.git (push)\n\
                      backup\t/srv/backup.git (fetch)\n\
                      backup\t/srv/backup.git (push)\n";
        let remotes = parse_remotes(output);

        assert_eq!(
            remotes,
            vec![
                RemoteInfo {
                    name: "origin".to_string(),
                    url: "https://example.com/a.git".to_string(),
                },
                RemoteInfo {
                    name: "backup".to_string(),
                    url: "/srv/backup.git".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_remotes_preserves_first_seen_order() {
        let output = "zeta\tu1 (fetch)\nzeta\tu1 (push)\nalpha\tu2 (fetch)\nalpha\tu2 (push)\n";
        let names: Vec<String> = parse_remotes(output).into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_parse_remotes_empty() {
        assert!(parse_remotes("").is_empty());
    }

    #[test]
    fn test_parse_status_entries() {
        let output = b" M src/main.rs\0A  new.rs\0?? notes/todo.txt\0";
        let entries = parse_status_porcelain(output);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].path, "src/main.rs");
        assert!(entries[0].is_unstaged());
        assert!(!entries[0].is_staged());
        assert!(entries[1].is_staged());
        assert!(entries[2].is_untracked());
    }

    #[test]
    fn test_parse_status_rename_consumes_source() {
        let output = b"R  new name.rs\0old name.rs\0 D gone.rs\0";
        let entries = parse_status_porcelain(output);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "new name.rs");
        assert_eq!(entries[0].orig_path.as_deref(), Some("old name.rs"));
        assert_eq!(entries[1].path, "gone.rs");
        assert_eq!(entries[1].worktree, 'D');
    }

    #[test]
    fn test_parse_status_skips_malformed() {
        assert!(parse_status_porcelain(b"M\0??\0").is_empty());
        assert!(parse_status_porcelain(b"").is_empty());
    }

    #[test]
    fn test_exclude_dir() {
        let output = b"?? build/out.o\0?? build\0?? buildx/keep.txt\0 M src/lib.rs\0";
        let kept = exclude_dir(parse_status_porcelain(output), "build/");
        let paths: Vec<&str> = kept.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["buildx/keep.txt", "src/lib.rs"]);
    }

    #[test]
    fn test_is_under_untracked_directory_entry() {
        let entry = parse_status_porcelain(b"?? cache/\0").remove(0);
        assert!(entry.is_under("cache"));
        assert!(!entry.is_under("cach"));
    }

    #[test]
    fn test_parse_branch_current() {
        let branches = parse_branch_list("* main\n  feature-x\n");

        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].name, "main");
        assert!(branches[0].is_current);
        assert_eq!(branches[1].name, "feature-x");
        assert!(!branches[1].is_current);
    }

    #[test]
    fn test_parse_branch_skips_detached_head() {
        let branches = parse_branch_list("* (HEAD detached at 1a2b3c4)\n  main\n");
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].name, "main");
    }

    #[test]
    fn test_parse_stash_list() {
        let output = "stash@{0}\0WIP on main: fix bug\nstash@{1}\0Experimental feature";
        let stashes = parse_stash_list(output);

        assert_eq!(stashes.len(), 2);
        assert_eq!(stashes[0].index, "stash@{0}");
        assert_eq!(stashes[0].message, "WIP on main: fix bug");
        assert_eq!(stashes[1].index, "stash@{1}");
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("42\n").unwrap(), 42);
        assert!(matches!(parse_count("many"), Err(GitError::ParseError(_))));
    }
}
