#![forbid(unsafe_code)]

use std::path::PathBuf;

use crate::core::git::{CommitInfo, Git};
use crate::error::IssueTreeError;
use crate::host::{IssueHost, PrState};

/// Everything PR sync needs to know about one solved issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrContext {
    pub issue_number: u64,
    pub issue_title: String,
    pub branch: String,
    pub base_branch: String,
    pub worktree: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    NothingToPush,
    Updated { number: u64, url: String },
    Created { url: String },
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NothingToPush => f.write_str("no commits ahead of base; nothing to push"),
            Self::Updated { number, url } => write!(f, "updated PR #{number}: {url}"),
            Self::Created { url } => write!(f, "created PR: {url}"),
        }
    }
}

#[must_use]
pub fn pr_body(issue_number: u64, commits: &[CommitInfo]) -> String {
    let mut body = String::from("## Changes\n\n");
    for c in commits.iter().rev() {
        body.push_str(&format!("- {} {}\n", c.hash, c.subject));
    }
    body.push_str(&format!("\nCloses #{issue_number}\n"));
    body
}

/// Pushes the issue branch and opens or refreshes its pull request.
///
/// Never creates a second PR while one is open for the branch.
pub fn sync_pull_request<H: IssueHost + ?Sized>(
    git: &Git,
    host: &H,
    ctx: &PrContext,
) -> Result<SyncOutcome, IssueTreeError> {
    let base_ref = if git
        .remote_ref_exists("origin", &ctx.base_branch)
        .unwrap_or(false)
    {
        format!("origin/{}", ctx.base_branch)
    } else {
        ctx.base_branch.clone()
    };

    let commits = git.commits_since(&ctx.worktree, &base_ref)?;
    if commits.is_empty() {
        log::debug!("issue #{}: no commits ahead of {base_ref}", ctx.issue_number);
        return Ok(SyncOutcome::NothingToPush);
    }

    git.push_branch(&ctx.worktree, &ctx.branch)?;

    let body = pr_body(ctx.issue_number, &commits);
    match host.pr_for_branch(&ctx.branch) {
        Some(pr) if pr.state == PrState::Open => {
            host.edit_pr_body(pr.number, &body)?;
            Ok(SyncOutcome::Updated {
                number: pr.number,
                url: pr.url,
            })
        }
        _ => {
            let url = host.create_pr(&ctx.issue_title, &body, &ctx.branch, &ctx.base_branch)?;
            Ok(SyncOutcome::Created { url })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_lists_commits_oldest_first_and_closes_the_issue() {
        let commits = vec![
            CommitInfo {
                hash: "bbb2222".to_owned(),
                subject: "Persist theme choice".to_owned(),
            },
            CommitInfo {
                hash: "aaa1111".to_owned(),
                subject: "Add dark mode toggle".to_owned(),
            },
        ];
        let body = pr_body(42, &commits);
        assert_eq!(
            body,
            "## Changes\n\n- aaa1111 Add dark mode toggle\n- bbb2222 Persist theme choice\n\nCloses #42\n"
        );
    }

    #[test]
    fn sync_outcome_messages_name_the_pr() {
        let o = SyncOutcome::Updated {
            number: 7,
            url: "https://example.com/pull/7".to_owned(),
        };
        assert_eq!(o.to_string(), "updated PR #7: https://example.com/pull/7");
    }
}
