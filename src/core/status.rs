#![forbid(unsafe_code)]

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::core::worktree::IssueWorktree;
use crate::error::IssueTreeError;
use crate::host::{IssueHost, IssueState, IssueStatus, PrState, PrStatus};

/// An issue worktree joined with what the code host says about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeWithStatus {
    pub worktree: IssueWorktree,
    pub issue: Option<IssueStatus>,
    pub pr: Option<PrStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLabel {
    Orphaned,
    PrMerged,
    PrOpen,
    PrClosed,
    IssueClosed,
    IssueOpen,
    Unknown,
}

impl StatusLabel {
    /// Orphan first, then PR state, then issue state.
    #[must_use]
    pub fn classify(status: &WorktreeWithStatus) -> Self {
        if status.worktree.is_orphaned() {
            return Self::Orphaned;
        }
        if let Some(pr) = &status.pr {
            return match pr.state {
                PrState::Merged => Self::PrMerged,
                PrState::Open => Self::PrOpen,
                PrState::Closed => Self::PrClosed,
            };
        }
        match status.issue.map(|i| i.state) {
            Some(IssueState::Closed) => Self::IssueClosed,
            Some(IssueState::Open) => Self::IssueOpen,
            None => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Orphaned => "orphaned folder",
            Self::PrMerged => "PR merged",
            Self::PrOpen => "PR open",
            Self::PrClosed => "PR closed",
            Self::IssueClosed => "issue closed",
            Self::IssueOpen => "issue open",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WorktreeWithStatus {
    #[must_use]
    pub fn label(&self) -> StatusLabel {
        StatusLabel::classify(self)
    }

    /// Checked by default in the bulk-clean picker: merged PRs and orphans.
    #[must_use]
    pub fn preselect_for_cleanup(&self) -> bool {
        self.worktree.is_orphaned()
            || self.pr.as_ref().is_some_and(|pr| pr.state == PrState::Merged)
    }
}

/// Worktrees `clean --merged` removes without asking.
#[must_use]
pub fn safe_to_clean(statuses: Vec<WorktreeWithStatus>) -> Vec<WorktreeWithStatus> {
    statuses
        .into_iter()
        .filter(WorktreeWithStatus::preselect_for_cleanup)
        .collect()
}

/// Fetches issue and PR status for one worktree. Never fails.
pub fn collect_one<H: IssueHost + ?Sized>(host: &H, worktree: &IssueWorktree) -> WorktreeWithStatus {
    let issue = host.issue_status(worktree.issue_number);
    let pr = if worktree.is_orphaned() {
        None
    } else {
        host.pr_for_branch(&worktree.branch).map(|pr| pr.status())
    };
    WorktreeWithStatus {
        worktree: worktree.clone(),
        issue,
        pr,
    }
}

#[derive(Debug, Clone)]
pub struct StatusCollector<H> {
    host: Arc<H>,
    concurrency: usize,
}

impl<H: IssueHost + 'static> StatusCollector<H> {
    #[must_use]
    pub fn new(host: Arc<H>, concurrency: usize) -> Self {
        Self { host, concurrency }
    }

    /// Fetches every status concurrently and returns once all of them are in,
    /// in the same order as `worktrees`.
    pub async fn collect_all(
        &self,
        worktrees: &[IssueWorktree],
    ) -> Result<Vec<WorktreeWithStatus>, IssueTreeError> {
        let sem = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut handles = Vec::with_capacity(worktrees.len());

        for wt in worktrees {
            let wt = wt.clone();
            let host = Arc::clone(&self.host);
            let sem = Arc::clone(&sem);
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                tokio::task::spawn_blocking(move || collect_one(host.as_ref(), &wt)).await
            }));
        }

        let mut statuses = Vec::with_capacity(handles.len());
        for h in handles {
            match h.await {
                Ok(Ok(s)) => statuses.push(s),
                Ok(Err(e)) | Err(e) => {
                    return Err(IssueTreeError::Other(format!(
                        "status task join error: {e}"
                    )));
                }
            }
        }

        Ok(statuses)
    }
}
