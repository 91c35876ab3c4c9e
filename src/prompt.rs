#![forbid(unsafe_code)]

use crate::core::worktree::PreparedWorktree;
use crate::host::{Issue, PullRequest};

/// Diffs above this size are cut so the prompt stays usable.
const MAX_DIFF_CHARS: usize = 60_000;

#[must_use]
pub fn solve_prompt(issue: &Issue, prepared: &PreparedWorktree) -> String {
    let labels = if issue.labels.is_empty() {
        String::new()
    } else {
        let names: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
        format!("Labels: {}\n", names.join(", "))
    };
    let body = if issue.body.trim().is_empty() {
        "(no description)"
    } else {
        issue.body.trim()
    };

    format!(
        "Solve GitHub issue #{number}: {title}\n\
         {url}\n\
         {labels}\n\
         {body}\n\n\
         You are working in a dedicated git worktree on branch `{branch}` (based on `{base}`).\n\
         Commit your changes as you go with clear messages. Pushing and the pull request\n\
         are handled for you after each commit.\n",
        number = issue.number,
        title = issue.title,
        url = issue.url,
        branch = prepared.branch,
        base = prepared.base_branch,
    )
}

#[must_use]
pub fn review_prompt(pr: &PullRequest, diff: &str) -> String {
    let (diff, truncated) = truncate_chars(diff, MAX_DIFF_CHARS);
    let note = if truncated {
        "\n(diff truncated; run `gh pr diff` for the rest)\n"
    } else {
        ""
    };
    format!(
        "Review pull request #{number}: {title}\n\
         {url}\n\n\
         Read the diff below and the surrounding code. Then submit the review with\n\
         `gh pr review {number} --approve` or `gh pr review {number} --request-changes`,\n\
         passing your findings with `--body`.\n\n\
         ```diff\n{diff}\n```\n{note}",
        number = pr.number,
        title = pr.title,
        url = pr.url,
    )
}

fn truncate_chars(s: &str, max: usize) -> (&str, bool) {
    match s.char_indices().nth(max) {
        Some((idx, _)) => (&s[..idx], true),
        None => (s, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::core::worktree::PrepareOutcome;
    use crate::host::{IssueState, Label, PrState};

    #[test]
    fn solve_prompt_carries_issue_and_branch() {
        let issue = Issue {
            number: 42,
            title: "[Bug] Add dark mode support".to_owned(),
            body: "Users want a dark theme.".to_owned(),
            url: "https://github.com/o/app/issues/42".to_owned(),
            state: IssueState::Open,
            labels: vec![Label {
                name: "bug".to_owned(),
            }],
        };
        let prepared = PreparedWorktree {
            path: PathBuf::from("/src/app-issue-42-add-dark-mode-support"),
            branch: "issue-42-add-dark-mode-support".to_owned(),
            base_branch: "main".to_owned(),
            outcome: PrepareOutcome::CreatedBranch,
        };
        let p = solve_prompt(&issue, &prepared);
        assert!(p.starts_with("Solve GitHub issue #42: [Bug] Add dark mode support\n"));
        assert!(p.contains("Labels: bug\n"));
        assert!(p.contains("Users want a dark theme."));
        assert!(p.contains("`issue-42-add-dark-mode-support` (based on `main`)"));
    }

    #[test]
    fn review_prompt_truncates_huge_diffs() {
        let pr = PullRequest {
            number: 7,
            title: "Dark mode".to_owned(),
            state: PrState::Open,
            url: String::new(),
            head_ref_name: "issue-42-x".to_owned(),
            review_decision: None,
            mergeable: None,
        };
        let small = review_prompt(&pr, "+a\n");
        assert!(small.contains("gh pr review 7 --approve"));
        assert!(!small.contains("diff truncated"));

        let huge = "é".repeat(MAX_DIFF_CHARS + 10);
        assert!(review_prompt(&pr, &huge).contains("diff truncated"));
    }
}
