#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::IssueTreeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub subject: String,
}

#[derive(Debug, Clone)]
pub struct Git {
    repo_root: PathBuf,
}

impl Git {
    pub fn from_cwd() -> Result<Self, IssueTreeError> {
        let cwd = std::env::current_dir()
            .map_err(|e| IssueTreeError::Other(format!("failed to get cwd: {e}")))?;
        Self::from_dir(&cwd)
    }

    /// Resolves to the main checkout even when `dir` sits inside a linked worktree.
    pub fn from_dir(dir: &Path) -> Result<Self, IssueTreeError> {
        let top = find_repo_root(dir).ok_or(IssueTreeError::NotInGitRepo)?;
        let toplevel = Self { repo_root: top };
        let repo_root = toplevel.main_worktree_root().unwrap_or(toplevel.repo_root);
        Ok(Self { repo_root })
    }

    #[must_use]
    pub fn new(repo_root: PathBuf) -> Self {
        Self { repo_root }
    }

    #[must_use]
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Folder name of the main checkout, used as the worktree name prefix.
    #[must_use]
    pub fn project_name(&self) -> String {
        self.repo_root
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("repo")
            .to_owned()
    }

    /// Directory the issue worktrees are created in (next to the main checkout).
    #[must_use]
    pub fn parent_dir(&self) -> PathBuf {
        self.repo_root
            .parent()
            .map_or_else(|| self.repo_root.clone(), Path::to_path_buf)
    }

    fn main_worktree_root(&self) -> Result<PathBuf, IssueTreeError> {
        let out = self.run(&["rev-parse", "--path-format=absolute", "--git-common-dir"])?;
        let common = PathBuf::from(out.trim());
        common
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| IssueTreeError::Other("git common dir has no parent".to_owned()))
    }

    pub fn list_worktrees_porcelain(&self) -> Result<String, IssueTreeError> {
        self.run(&["worktree", "list", "--porcelain"])
    }

    /// `git worktree add <path> <branch>` for a branch that already exists.
    pub fn add_worktree_for_branch(&self, path: &Path, branch: &str) -> Result<(), IssueTreeError> {
        let path = path.to_string_lossy();
        let _ = self.run(&["worktree", "add", &path, branch])?;
        Ok(())
    }

    /// `git worktree add -b <branch> <path> <start_point>`.
    pub fn add_worktree_new_branch(
        &self,
        path: &Path,
        branch: &str,
        start_point: &str,
    ) -> Result<(), IssueTreeError> {
        let path = path.to_string_lossy();
        let _ = self.run(&["worktree", "add", "-b", branch, &path, start_point])?;
        Ok(())
    }

    pub fn remove_worktree_forced(&self, path: &Path) -> Result<(), IssueTreeError> {
        let path = path.to_string_lossy();
        let _ = self.run(&["worktree", "remove", "--force", &path])?;
        Ok(())
    }

    pub fn prune_worktrees(&self) -> Result<(), IssueTreeError> {
        let _ = self.run(&["worktree", "prune"])?;
        Ok(())
    }

    pub fn delete_branch_forced(&self, branch: &str) -> Result<(), IssueTreeError> {
        let _ = self.run(&["branch", "-D", branch])?;
        Ok(())
    }

    pub fn branch_exists(&self, branch: &str) -> Result<bool, IssueTreeError> {
        let out = self.run_raw(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{branch}"),
        ])?;
        Ok(out.status.success())
    }

    pub fn remote_ref_exists(&self, remote: &str, branch: &str) -> Result<bool, IssueTreeError> {
        let out = self.run_raw(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/remotes/{remote}/{branch}"),
        ])?;
        Ok(out.status.success())
    }

    /// Local branches whose name starts with `prefix`.
    pub fn local_branches_with_prefix(&self, prefix: &str) -> Result<Vec<String>, IssueTreeError> {
        let pattern = format!("refs/heads/{prefix}*");
        let out = self.run(&["for-each-ref", "--format=%(refname:short)", &pattern])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }

    /// Remote HEAD first, then `develop` if it exists, else `main`.
    #[must_use]
    pub fn default_branch(&self) -> String {
        if let Ok(out) = self.run(&["symbolic-ref", "--quiet", "refs/remotes/origin/HEAD"])
            && let Some(branch) = out.trim().strip_prefix("refs/remotes/origin/")
            && !branch.is_empty()
        {
            return branch.to_owned();
        }
        let has_develop = self.branch_exists("develop").unwrap_or(false)
            || self.remote_ref_exists("origin", "develop").unwrap_or(false);
        if has_develop {
            return "develop".to_owned();
        }
        "main".to_owned()
    }

    pub fn fetch_branch(&self, remote: &str, branch: &str) -> Result<(), IssueTreeError> {
        let _ = self.run(&["fetch", remote, branch])?;
        Ok(())
    }

    pub fn push_branch(&self, dir: &Path, branch: &str) -> Result<(), IssueTreeError> {
        let _ = self.run_in_dir(dir, &["push", "-u", "origin", branch])?;
        Ok(())
    }

    pub fn head_sha(&self, dir: &Path) -> Result<String, IssueTreeError> {
        Ok(self.run_in_dir(dir, &["rev-parse", "HEAD"])?.trim().to_owned())
    }

    /// Commits in `dir` that are not on `base_ref` yet, newest first.
    pub fn commits_since(&self, dir: &Path, base_ref: &str) -> Result<Vec<CommitInfo>, IssueTreeError> {
        let range = format!("{base_ref}..HEAD");
        let out = self.run_in_dir(dir, &["log", &range, "--pretty=format:%h|%s"])?;
        Ok(parse_commit_lines(&out))
    }

    pub fn run(&self, args: &[&str]) -> Result<String, IssueTreeError> {
        self.run_in_dir(&self.repo_root, args)
    }

    pub fn run_raw(&self, args: &[&str]) -> Result<Output, IssueTreeError> {
        run_git(&self.repo_root, args)
    }

    pub fn run_in_dir(&self, dir: &Path, args: &[&str]) -> Result<String, IssueTreeError> {
        let out = run_git(dir, args)?;
        if out.status.success() {
            Ok(String::from_utf8_lossy(&out.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&out.stderr);
            Err(IssueTreeError::Other(format!(
                "git {}: {}",
                args.join(" "),
                stderr.trim()
            )))
        }
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<Output, IssueTreeError> {
    log::debug!("git {} (in {})", args.join(" "), dir.display());
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IssueTreeError::GitNotFound,
            _ => IssueTreeError::Other(format!("failed to run git: {e}")),
        })
}

fn parse_commit_lines(out: &str) -> Vec<CommitInfo> {
    out.lines()
        .filter_map(|line| {
            let (hash, subject) = line.trim().split_once('|')?;
            Some(CommitInfo {
                hash: hash.to_owned(),
                subject: subject.to_owned(),
            })
        })
        .collect()
}

/// Whether a `git branch -D` failure only means the branch is already gone.
#[must_use]
pub fn is_missing_branch_error(err: &IssueTreeError) -> bool {
    let IssueTreeError::Other(msg) = err else {
        return false;
    };
    msg.contains("error: branch '") && msg.contains("' not found")
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut cur = Some(start);
    while let Some(dir) = cur {
        let candidate = dir.join(".git");
        if candidate.is_dir() || candidate.is_file() {
            return Some(dir.to_path_buf());
        }
        cur = dir.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commit_log_lines() {
        let out = "abc1234|Add dark mode toggle\ndef5678|Fix: handle a|b in subject\n\n";
        let commits = parse_commit_lines(out);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].hash, "abc1234");
        assert_eq!(commits[1].subject, "Fix: handle a|b in subject");
    }

    #[test]
    fn recognises_missing_branch_errors() {
        let err = IssueTreeError::Other(
            "git branch -D issue-1-x: error: branch 'issue-1-x' not found.".to_owned(),
        );
        assert!(is_missing_branch_error(&err));
        let err = IssueTreeError::Other("git branch -D x: fatal: bad things".to_owned());
        assert!(!is_missing_branch_error(&err));
    }

    #[test]
    fn missing_git_binary_is_not_a_missing_branch() {
        assert!(!is_missing_branch_error(&IssueTreeError::GitNotFound));
        let err = IssueTreeError::Other("git branch -D x: remote ref not found".to_owned());
        assert!(!is_missing_branch_error(&err));
    }
}
