//! Runs in its own test binary: it changes the process environment.

mod helpers;

use gitwrap::{RepoOptions, Repository};
use helpers::{create_commit, init_repo};
use tempfile::TempDir;

/// Inside a hook git exports `GIT_DIR` (and friends) for the hook's repository
#[test]
fn test_handle_ignores_inherited_git_dir() {
    let temp = TempDir::new().unwrap();
    let mine = temp.path().join("mine");
    let theirs = temp.path().join("theirs");
    init_repo(&mine);
    init_repo(&theirs);
    create_commit(&mine, "mine.txt", "m", "mine");
    create_commit(&theirs, "theirs.txt", "t", "theirs");

    // SAFETY: this binary has a single test, so no other thread reads the environment
    unsafe {
        std::env::set_var("GIT_DIR", theirs.join(".git"));
        std::env::set_var("GIT_WORK_TREE", &theirs);
        std::env::set_var("GIT_INDEX_FILE", theirs.join(".git").join("index"));
    }

    let repo = Repository::with_options(&mine, RepoOptions::silent()).unwrap();
    assert_eq!(repo.ls_files().unwrap(), vec!["mine.txt"]);
    assert_eq!(repo.files_in_commit("HEAD").unwrap(), vec!["mine.txt"]);
    assert_eq!(repo.commit_count().unwrap(), 1);
}
