#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::SolveConfig;
use crate::core::git::Git;
use crate::core::naming;
use crate::error::IssueTreeError;

/// An issue worktree as found on disk and in git's registry.
///
/// `branch` is empty for an orphaned folder: a directory that follows the
/// naming convention but has no worktree registration.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IssueWorktree {
    pub path: PathBuf,
    pub branch: String,
    pub issue_number: u64,
}

impl IssueWorktree {
    #[must_use]
    pub fn is_orphaned(&self) -> bool {
        self.branch.is_empty()
    }
}

/// Where an issue's worktree ended up after [`WorktreeManager::create_or_attach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedWorktree {
    pub path: PathBuf,
    pub branch: String,
    pub base_branch: String,
    pub outcome: PrepareOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// Folder already existed; nothing was touched.
    Resumed,
    /// New worktree attached to a branch that survived an earlier removal.
    AttachedExistingBranch,
    /// New branch cut from the base branch.
    CreatedBranch,
}

#[derive(Debug, Clone)]
pub struct WorktreeManager {
    git: Git,
    solve: SolveConfig,
}

impl WorktreeManager {
    #[must_use]
    pub fn new(git: Git, solve: SolveConfig) -> Self {
        Self { git, solve }
    }

    #[must_use]
    pub fn base_branch(&self) -> String {
        match self.solve.base_branch.as_deref().map(str::trim) {
            Some(b) if !b.is_empty() => b.to_owned(),
            _ => self.git.default_branch(),
        }
    }

    #[must_use]
    pub fn path_for(&self, issue_number: u64, title: &str) -> PathBuf {
        naming::worktree_path(
            &self.git.parent_dir(),
            &self.git.project_name(),
            issue_number,
            title,
        )
    }

    /// Brings the issue's worktree into existence, or resumes the one already there.
    ///
    /// `existing` is the discovery snapshot of the command. The issue number,
    /// not the title, decides what counts as already there: a registered
    /// worktree for the issue is resumed and a surviving `issue-<n>-*` branch is
    /// attached, so a retitled issue never gets a second worktree or branch.
    /// Bootstrap files are only copied on first creation.
    pub fn create_or_attach(
        &self,
        issue_number: u64,
        title: &str,
        existing: &[IssueWorktree],
    ) -> Result<PreparedWorktree, IssueTreeError> {
        let base_branch = self.base_branch();

        let registered = existing
            .iter()
            .find(|w| w.issue_number == issue_number && !w.is_orphaned());
        if let Some(wt) = registered
            && wt.path.exists()
        {
            log::info!("resuming existing worktree {}", wt.path.display());
            return Ok(PreparedWorktree {
                path: wt.path.clone(),
                branch: wt.branch.clone(),
                base_branch,
                outcome: PrepareOutcome::Resumed,
            });
        }

        let path = self.path_for(issue_number, title);
        let branch = naming::branch_name(issue_number, title);
        if path.exists() {
            log::info!("resuming existing folder {}", path.display());
            return Ok(PreparedWorktree {
                path,
                branch,
                base_branch,
                outcome: PrepareOutcome::Resumed,
            });
        }

        let create_err = |e: IssueTreeError| IssueTreeError::WorktreeCreate {
            issue: issue_number,
            message: e.to_string(),
        };

        if let Some(surviving) = self.surviving_branch(issue_number, &branch).map_err(create_err)? {
            let path = naming::worktree_path_for_branch(
                &self.git.parent_dir(),
                &self.git.project_name(),
                &surviving,
            );
            // A registration whose folder vanished still holds the branch.
            if let Err(e) = self.git.prune_worktrees() {
                log::warn!("prune before attaching {surviving}: {e}");
            }
            self.git
                .add_worktree_for_branch(&path, &surviving)
                .map_err(create_err)?;
            bootstrap_worktree(self.git.repo_root(), &path, &self.solve);
            return Ok(PreparedWorktree {
                path,
                branch: surviving,
                base_branch,
                outcome: PrepareOutcome::AttachedExistingBranch,
            });
        }

        if let Err(e) = self.git.fetch_branch("origin", &base_branch) {
            eprintln!("Warning: could not fetch origin/{base_branch}: {e}");
        }
        let start_point = if self
            .git
            .remote_ref_exists("origin", &base_branch)
            .unwrap_or(false)
        {
            format!("origin/{base_branch}")
        } else {
            base_branch.clone()
        };
        if let Err(e) = self.git.add_worktree_new_branch(&path, &branch, &start_point) {
            self.discard_partial(&path, &branch);
            return Err(create_err(e));
        }

        bootstrap_worktree(self.git.repo_root(), &path, &self.solve);

        Ok(PreparedWorktree {
            path,
            branch,
            base_branch,
            outcome: PrepareOutcome::CreatedBranch,
        })
    }

    /// The issue's local branch left from an earlier run, preferring the one
    /// named after the current title.
    fn surviving_branch(
        &self,
        issue_number: u64,
        branch: &str,
    ) -> Result<Option<String>, IssueTreeError> {
        let mut branches = self
            .git
            .local_branches_with_prefix(&naming::issue_branch_prefix(issue_number))?;
        if let Some(i) = branches.iter().position(|b| b == branch) {
            return Ok(Some(branches.swap_remove(i)));
        }
        branches.sort();
        Ok(branches.into_iter().next())
    }

    /// Removes whatever a failed `worktree add -b` left behind. A folder that
    /// is registered by now belongs to a concurrent run and is kept.
    fn discard_partial(&self, path: &Path, branch: &str) {
        let registered = self
            .git
            .list_worktrees_porcelain()
            .map(|out| {
                parse_worktree_porcelain(&out)
                    .iter()
                    .any(|e| Path::new(&e.path) == path)
            })
            .unwrap_or(true);
        if path.exists()
            && !registered
            && let Err(e) = std::fs::remove_dir_all(path)
        {
            log::warn!("could not remove {}: {e}", path.display());
        }
        let _ = self.git.prune_worktrees();
        if self.git.branch_exists(branch).unwrap_or(false)
            && let Err(e) = self.git.delete_branch_forced(branch)
        {
            log::warn!("could not delete {branch}: {e}");
        }
    }
}

/// Copies env files and links dependency folders from the main checkout.
/// Missing sources are skipped; failures only warn.
pub fn bootstrap_worktree(main_root: &Path, worktree: &Path, solve: &SolveConfig) {
    for name in &solve.copy_files {
        let src = main_root.join(name);
        let dst = worktree.join(name);
        if !src.is_file() || dst.exists() {
            continue;
        }
        if let Err(e) = std::fs::copy(&src, &dst) {
            eprintln!("Warning: failed to copy {}: {e}", src.display());
        }
    }

    for name in &solve.link_dirs {
        let src = main_root.join(name);
        let dst = worktree.join(name);
        if !src.is_dir() || dst.exists() {
            continue;
        }
        if let Err(e) = symlink_dir(&src, &dst) {
            eprintln!("Warning: failed to link {}: {e}", src.display());
        }
    }
}

#[cfg(unix)]
fn symlink_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(src, dst)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PorcelainEntry {
    pub path: String,
    pub branch: String,
}

pub(crate) fn parse_worktree_porcelain(out: &str) -> Vec<PorcelainEntry> {
    let mut entries: Vec<PorcelainEntry> = Vec::new();

    let mut cur_path: Option<String> = None;
    let mut cur_branch = String::new();

    for line in out.lines() {
        let line = line.trim_end();
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(p) = cur_path.take() {
                entries.push(PorcelainEntry {
                    path: p,
                    branch: std::mem::take(&mut cur_branch),
                });
            }
            cur_path = Some(path.to_owned());
        } else if let Some(branch) = line.strip_prefix("branch ") {
            branch
                .trim()
                .trim_start_matches("refs/heads/")
                .clone_into(&mut cur_branch);
        }
    }
    if let Some(p) = cur_path.take() {
        entries.push(PorcelainEntry {
            path: p,
            branch: cur_branch,
        });
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_worktree_list_porcelain() {
        let out = r#"worktree /src/app
HEAD 1111111111111111111111111111111111111111
branch refs/heads/main

worktree /src/app-issue-42-add-dark-mode-support
HEAD 2222222222222222222222222222222222222222
branch refs/heads/issue-42-add-dark-mode-support

worktree /src/app-detached
HEAD 3333333333333333333333333333333333333333
detached
"#;

        let entries = parse_worktree_porcelain(out);
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[1],
            PorcelainEntry {
                path: "/src/app-issue-42-add-dark-mode-support".to_owned(),
                branch: "issue-42-add-dark-mode-support".to_owned(),
            }
        );
        assert_eq!(entries[0].branch, "main");
        assert_eq!(entries[2].branch, "");
    }

    #[test]
    fn bootstrap_copies_env_and_links_deps_without_clobbering() {
        let td = tempfile::tempdir().expect("tempdir");
        let main = td.path().join("app");
        let wt = td.path().join("app-issue-1-x");
        std::fs::create_dir_all(main.join("node_modules/pkg")).unwrap();
        std::fs::create_dir_all(&wt).unwrap();
        std::fs::write(main.join(".env"), "SECRET=1\n").unwrap();
        std::fs::write(wt.join(".env.local"), "mine\n").unwrap();
        std::fs::write(main.join(".env.local"), "theirs\n").unwrap();

        let solve = SolveConfig::default();
        bootstrap_worktree(&main, &wt, &solve);

        assert_eq!(
            std::fs::read_to_string(wt.join(".env")).unwrap(),
            "SECRET=1\n"
        );
        assert_eq!(
            std::fs::read_to_string(wt.join(".env.local")).unwrap(),
            "mine\n"
        );
        assert!(wt.join("node_modules/pkg").is_dir());
    }
}
