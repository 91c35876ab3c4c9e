#![forbid(unsafe_code)]

use crate::core::naming::parse_issue_branch;
use crate::core::teardown::{Teardown, TeardownReport};
use crate::core::worktree::IssueWorktree;
use crate::host::{IssueHost, PullRequest};

/// An open PR offered in the merge picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCandidate {
    pub pr: PullRequest,
    pub worktree: Option<IssueWorktree>,
}

impl MergeCandidate {
    #[must_use]
    pub fn preselected(&self) -> bool {
        self.pr.is_mergeable()
    }

    #[must_use]
    pub fn display_line(&self) -> String {
        let review = self.pr.review_decision.as_deref().unwrap_or("-");
        let mergeable = self.pr.mergeable.as_deref().unwrap_or("-");
        format!(
            "#{} {} [{review}, {mergeable}]",
            self.pr.number, self.pr.title
        )
    }
}

/// Pairs each open PR with the worktree of the issue its head branch names.
#[must_use]
pub fn merge_candidates(prs: Vec<PullRequest>, worktrees: &[IssueWorktree]) -> Vec<MergeCandidate> {
    prs.into_iter()
        .map(|pr| {
            let worktree = worktrees
                .iter()
                .find(|w| !w.is_orphaned() && w.branch == pr.head_ref_name)
                .or_else(|| {
                    let n = parse_issue_branch(&pr.head_ref_name)?;
                    worktrees.iter().find(|w| w.issue_number == n)
                })
                .cloned();
            MergeCandidate { pr, worktree }
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct MergeSummary {
    pub merged: Vec<u64>,
    pub failed: Vec<(u64, String)>,
    pub teardowns: Vec<TeardownReport>,
}

/// Tears down each selected PR's worktree, then squash-merges it.
///
/// The worktree goes first because `--delete-branch` cannot delete a branch
/// that is still checked out.
pub fn merge_selected<H: IssueHost + ?Sized>(
    host: &H,
    teardown: &Teardown,
    selected: &[MergeCandidate],
) -> MergeSummary {
    let mut summary = MergeSummary::default();
    for candidate in selected {
        if let Some(wt) = &candidate.worktree {
            summary
                .teardowns
                .push(teardown.tear_down(wt, Some(candidate.pr.number)));
        }
        match host.merge_pr(candidate.pr.number) {
            Ok(()) => {
                log::info!("merged PR #{}", candidate.pr.number);
                summary.merged.push(candidate.pr.number);
            }
            Err(e) => summary.failed.push((candidate.pr.number, e.to_string())),
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::core::git::Git;
    use crate::host::PrState;
    use crate::host::fake::FakeHost;
    use crate::launch::NoopCloser;

    fn pr(number: u64, head: &str, review: Option<&str>, mergeable: Option<&str>) -> PullRequest {
        PullRequest {
            number,
            title: format!("PR {number}"),
            state: PrState::Open,
            url: String::new(),
            head_ref_name: head.to_owned(),
            review_decision: review.map(str::to_owned),
            mergeable: mergeable.map(str::to_owned),
        }
    }

    #[test]
    fn pairs_prs_with_worktrees_and_preselects_mergeable() {
        let worktrees = vec![
            IssueWorktree {
                path: PathBuf::from("/src/app-issue-1-a"),
                branch: "issue-1-a".to_owned(),
                issue_number: 1,
            },
            IssueWorktree {
                path: PathBuf::from("/src/app-issue-2-b"),
                branch: String::new(),
                issue_number: 2,
            },
        ];
        let candidates = merge_candidates(
            vec![
                pr(10, "issue-1-a", Some("APPROVED"), Some("MERGEABLE")),
                pr(11, "issue-2-b", Some("APPROVED"), Some("CONFLICTING")),
                pr(12, "feature/x", None, None),
            ],
            &worktrees,
        );

        assert_eq!(candidates[0].worktree.as_ref().map(|w| w.issue_number), Some(1));
        assert_eq!(candidates[1].worktree.as_ref().map(|w| w.issue_number), Some(2));
        assert!(candidates[2].worktree.is_none());

        let pre: Vec<bool> = candidates.iter().map(MergeCandidate::preselected).collect();
        assert_eq!(pre, vec![true, false, false]);
        assert_eq!(candidates[0].display_line(), "#10 PR 10 [APPROVED, MERGEABLE]");
    }

    #[test]
    fn failed_merges_do_not_stop_the_rest() {
        let mut host = FakeHost::default();
        host.failing_merges.insert(21);
        let td = tempfile::tempdir().expect("tempdir");
        let teardown = Teardown::new(Git::new(td.path().to_path_buf()), Box::new(NoopCloser), Duration::ZERO);

        let selected = vec![
            MergeCandidate {
                pr: pr(20, "issue-1-a", None, None),
                worktree: None,
            },
            MergeCandidate {
                pr: pr(21, "issue-2-b", None, None),
                worktree: None,
            },
            MergeCandidate {
                pr: pr(22, "issue-3-c", None, None),
                worktree: Some(IssueWorktree {
                    path: td.path().join("app-issue-3-c"),
                    branch: String::new(),
                    issue_number: 3,
                }),
            },
        ];
        let summary = merge_selected(&host, &teardown, &selected);

        assert_eq!(summary.merged, vec![20, 22]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, 21);
        assert_eq!(summary.teardowns.len(), 1);
        assert_eq!(
            host.calls(),
            vec!["merge_pr 20", "merge_pr 21", "merge_pr 22"]
        );
    }
}
