#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::core::git::Git;
use crate::core::naming::{parse_issue_branch, parse_issue_dir, worktree_path_marker};
use crate::core::worktree::{IssueWorktree, PorcelainEntry, parse_worktree_porcelain};
use crate::error::IssueTreeError;

/// Every issue worktree of the repository, registered or orphaned.
///
/// Git's registry and the filesystem drift apart (killed processes, manual
/// `rm -rf`, half-finished removals), so both are scanned and joined by path.
/// Order is not significant.
pub fn discover_issue_worktrees(git: &Git) -> Result<Vec<IssueWorktree>, IssueTreeError> {
    let porcelain = git.list_worktrees_porcelain()?;
    let entries = parse_worktree_porcelain(&porcelain);
    let project = git.project_name();
    let sibling_dirs = list_sibling_dirs(&git.parent_dir(), &project);
    Ok(reconcile(&project, &entries, &sibling_dirs))
}

/// Joins registered worktrees with convention-named folders found on disk.
pub(crate) fn reconcile(
    project_name: &str,
    entries: &[PorcelainEntry],
    sibling_dirs: &[PathBuf],
) -> Vec<IssueWorktree> {
    let marker = worktree_path_marker(project_name);
    let mut out = Vec::new();
    let mut matched: BTreeSet<PathBuf> = BTreeSet::new();

    for entry in entries {
        let Some(issue_number) = parse_issue_branch(&entry.branch) else {
            continue;
        };
        if !entry.path.contains(&marker) {
            continue;
        }
        let path = PathBuf::from(&entry.path);
        if !matched.insert(normalize(&path)) {
            continue;
        }
        out.push(IssueWorktree {
            path,
            branch: entry.branch.clone(),
            issue_number,
        });
    }

    for dir in sibling_dirs {
        let Some(name) = dir.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(issue_number) = parse_issue_dir(project_name, name) else {
            continue;
        };
        if !matched.insert(normalize(dir)) {
            continue;
        }
        out.push(IssueWorktree {
            path: dir.clone(),
            branch: String::new(),
            issue_number,
        });
    }

    out
}

/// Worktrees (usually one) belonging to `issue_number`.
#[must_use]
pub fn find_by_issue(worktrees: &[IssueWorktree], issue_number: u64) -> Vec<IssueWorktree> {
    worktrees
        .iter()
        .filter(|w| w.issue_number == issue_number)
        .cloned()
        .collect()
}

fn list_sibling_dirs(parent: &Path, project_name: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(parent) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| {
            p.file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|name| parse_issue_dir(project_name, name).is_some())
        })
        .collect()
}

/// Canonical form when the path exists, so `/var/...` and `/private/var/...` agree.
fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
