#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::git::{Git, is_missing_branch_error};
use crate::core::naming::issue_branch_prefix;
use crate::core::status::WorktreeWithStatus;
use crate::core::worktree::IssueWorktree;
use crate::error::IssueTreeError;
use crate::launch::{CloseTarget, WindowCloser};

const RM_ATTEMPTS: u32 = 3;
const RM_RETRY_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Skipped,
    Failed(String),
}

impl StepOutcome {
    fn from_result(r: Result<(), IssueTreeError>) -> Self {
        match r {
            Ok(()) => Self::Done,
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// What happened at each step of removing one worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub issue_number: u64,
    pub path: PathBuf,
    pub windows_closed: bool,
    pub worktree_removed: StepOutcome,
    pub directory_removed: StepOutcome,
    pub pruned: StepOutcome,
    pub branch_deleted: StepOutcome,
    /// Set when the directory survived every removal attempt.
    pub leftover: Option<PathBuf>,
}

impl TeardownReport {
    #[must_use]
    pub fn fully_cleaned(&self) -> bool {
        self.leftover.is_none() && !self.branch_deleted.is_failed() && !self.pruned.is_failed()
    }

    /// Command the user can run when the folder could not be deleted.
    #[must_use]
    pub fn manual_command(&self) -> Option<String> {
        self.leftover
            .as_ref()
            .map(|p| format!("rm -rf {}", crate::launch::shell_quote(&p.to_string_lossy())))
    }

    /// Step failures worth showing the user.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        let steps = [
            ("git worktree remove", &self.worktree_removed),
            ("delete directory", &self.directory_removed),
            ("git worktree prune", &self.pruned),
            ("git branch -D", &self.branch_deleted),
        ];
        steps
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                StepOutcome::Failed(msg) => Some(format!("{name}: {msg}")),
                _ => None,
            })
            .collect()
    }
}

/// The one removal routine behind `clean`, `clean --all`, `clean --merged` and `merge`.
///
/// Every step is attempted regardless of earlier failures and every step is
/// idempotent, so running it again on a half-removed worktree finishes the job.
pub struct Teardown {
    git: Git,
    closer: Box<dyn WindowCloser>,
    settle_delay: Duration,
}

impl Teardown {
    #[must_use]
    pub fn new(git: Git, closer: Box<dyn WindowCloser>, settle_delay: Duration) -> Self {
        Self {
            git,
            closer,
            settle_delay,
        }
    }

    pub fn tear_down(&self, worktree: &IssueWorktree, pr_number: Option<u64>) -> TeardownReport {
        let path = worktree.path.as_path();
        log::info!(
            "tearing down issue #{} at {}",
            worktree.issue_number,
            path.display()
        );

        let windows_closed = self.closer.close(&CloseTarget {
            path,
            issue_number: worktree.issue_number,
            pr_number,
        });
        if windows_closed && !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }

        let worktree_removed = if worktree.is_orphaned() || !path.exists() {
            StepOutcome::Skipped
        } else {
            StepOutcome::from_result(self.git.remove_worktree_forced(path))
        };

        let directory_removed = if path.exists() {
            StepOutcome::from_result(force_remove_dir(path))
        } else {
            StepOutcome::Skipped
        };

        let pruned = StepOutcome::from_result(self.git.prune_worktrees());

        let branch_deleted = if worktree.is_orphaned() {
            StepOutcome::Skipped
        } else {
            match self.git.delete_branch_forced(&worktree.branch) {
                Ok(()) => StepOutcome::Done,
                Err(e) if is_missing_branch_error(&e) => StepOutcome::Skipped,
                Err(e) => StepOutcome::Failed(e.to_string()),
            }
        };

        let leftover = path.exists().then(|| path.to_path_buf());
        if let Some(p) = &leftover {
            log::warn!("directory {} survived teardown", p.display());
        }

        TeardownReport {
            issue_number: worktree.issue_number,
            path: path.to_path_buf(),
            windows_closed,
            worktree_removed,
            directory_removed,
            pruned,
            branch_deleted,
            leftover,
        }
    }

    /// Tears down each target in order; a failure on one never stops the rest.
    pub fn tear_down_all(&self, targets: &[WorktreeWithStatus]) -> Vec<TeardownReport> {
        targets
            .iter()
            .map(|t| self.tear_down(&t.worktree, t.pr.as_ref().map(|pr| pr.number)))
            .collect()
    }

    /// Local `issue-<n>-*` branches left behind without a worktree.
    pub fn stray_branches(&self, issue_number: u64) -> Result<Vec<String>, IssueTreeError> {
        self.git
            .local_branches_with_prefix(&issue_branch_prefix(issue_number))
    }

    pub fn delete_branches(&self, branches: &[String]) -> Vec<(String, StepOutcome)> {
        branches
            .iter()
            .map(|b| {
                let outcome = match self.git.delete_branch_forced(b) {
                    Ok(()) => StepOutcome::Done,
                    Err(e) if is_missing_branch_error(&e) => StepOutcome::Skipped,
                    Err(e) => StepOutcome::Failed(e.to_string()),
                };
                (b.clone(), outcome)
            })
            .collect()
    }
}

/// `remove_dir_all`, then `rm -rf` a few times for files still held open.
fn force_remove_dir(path: &Path) -> Result<(), IssueTreeError> {
    if std::fs::remove_dir_all(path).is_ok() || !path.exists() {
        return Ok(());
    }

    for attempt in 1..=RM_ATTEMPTS {
        let ok = if cfg!(windows) {
            std::fs::remove_dir_all(path).is_ok()
        } else {
            std::process::Command::new("rm")
                .arg("-rf")
                .arg(path)
                .status()
                .is_ok_and(|s| s.success())
        };
        if ok && !path.exists() {
            return Ok(());
        }
        log::debug!("rm -rf {} attempt {attempt} failed", path.display());
        if attempt < RM_ATTEMPTS {
            std::thread::sleep(RM_RETRY_DELAY);
        }
    }

    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(_) if !path.exists() => Ok(()),
        Err(source) => Err(IssueTreeError::IoPath {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Targets whose folder contains `cwd`; removing them leaves the shell in a
/// deleted directory.
#[must_use]
pub fn worktrees_containing_cwd<'a>(
    targets: &'a [WorktreeWithStatus],
    cwd: &Path,
) -> Vec<&'a IssueWorktree> {
    let cwd = std::fs::canonicalize(cwd).unwrap_or_else(|_| cwd.to_path_buf());
    targets
        .iter()
        .map(|t| &t.worktree)
        .filter(|w| {
            let p = std::fs::canonicalize(&w.path).unwrap_or_else(|_| w.path.clone());
            cwd.starts_with(p)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::launch::NoopCloser;

    fn orphan(path: PathBuf, n: u64) -> IssueWorktree {
        IssueWorktree {
            path,
            branch: String::new(),
            issue_number: n,
        }
    }

    struct CountingCloser(Arc<AtomicUsize>);

    impl WindowCloser for CountingCloser {
        fn close(&self, target: &CloseTarget<'_>) -> bool {
            assert_eq!(target.pr_number, Some(8));
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn removes_orphaned_folder_without_touching_branches() {
        let td = tempfile::tempdir().expect("tempdir");
        let dir = td.path().join("app-issue-3-gamma");
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::write(dir.join("src/main.rs"), "fn main() {}\n").unwrap();

        // Not a repository: git steps fail, the folder still goes.
        let teardown = Teardown::new(Git::new(td.path().to_path_buf()), Box::new(NoopCloser), Duration::ZERO);
        let report = teardown.tear_down(&orphan(dir.clone(), 3), None);

        assert!(!dir.exists());
        assert_eq!(report.worktree_removed, StepOutcome::Skipped);
        assert_eq!(report.directory_removed, StepOutcome::Done);
        assert_eq!(report.branch_deleted, StepOutcome::Skipped);
        assert!(report.leftover.is_none());
        assert!(report.manual_command().is_none());
    }

    #[test]
    fn closer_sees_pr_number_and_runs_once_per_target() {
        let td = tempfile::tempdir().expect("tempdir");
        let calls = Arc::new(AtomicUsize::new(0));
        let teardown = Teardown::new(
            Git::new(td.path().to_path_buf()),
            Box::new(CountingCloser(Arc::clone(&calls))),
            Duration::from_millis(1),
        );
        let report = teardown.tear_down(&orphan(td.path().join("app-issue-1-x"), 1), Some(8));
        assert!(report.windows_closed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reports_leftovers_with_a_manual_command() {
        let report = TeardownReport {
            issue_number: 9,
            path: PathBuf::from("/src/app issue-9-x"),
            windows_closed: false,
            worktree_removed: StepOutcome::Failed("busy".to_owned()),
            directory_removed: StepOutcome::Failed("busy".to_owned()),
            pruned: StepOutcome::Done,
            branch_deleted: StepOutcome::Done,
            leftover: Some(PathBuf::from("/src/app issue-9-x")),
        };
        assert!(!report.fully_cleaned());
        assert_eq!(report.manual_command().as_deref(), Some("rm -rf '/src/app issue-9-x'"));
        assert_eq!(report.warnings().len(), 2);
    }

    #[test]
    fn detects_cwd_inside_a_target() {
        let td = tempfile::tempdir().expect("tempdir");
        let wt_dir = td.path().join("app-issue-4-x");
        std::fs::create_dir_all(wt_dir.join("nested")).unwrap();
        let targets = vec![WorktreeWithStatus {
            worktree: orphan(wt_dir.clone(), 4),
            issue: None,
            pr: None,
        }];

        assert_eq!(worktrees_containing_cwd(&targets, &wt_dir.join("nested")).len(), 1);
        assert!(worktrees_containing_cwd(&targets, td.path()).is_empty());
    }
}
