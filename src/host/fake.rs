#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::IssueTreeError;
use crate::host::{Issue, IssueHost, IssueState, IssueStatus, PrState, PullRequest, ReviewEvent};

/// In-memory host that records every call it receives.
#[derive(Debug, Default)]
pub(crate) struct FakeHost {
    pub issues: HashMap<u64, IssueState>,
    pub prs: HashMap<String, PullRequest>,
    pub failing_merges: HashSet<u64>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeHost {
    pub(crate) fn with_pr(mut self, branch: &str, number: u64, state: PrState) -> Self {
        self.prs.insert(
            branch.to_owned(),
            PullRequest {
                number,
                title: format!("Work on {branch}"),
                state,
                url: format!("https://example.com/pull/{number}"),
                head_ref_name: branch.to_owned(),
                review_decision: None,
                mergeable: None,
            },
        );
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl IssueHost for FakeHost {
    fn issue(&self, number: u64) -> Option<Issue> {
        let state = *self.issues.get(&number)?;
        Some(Issue {
            number,
            title: format!("Issue {number}"),
            body: String::new(),
            url: format!("https://example.com/issues/{number}"),
            state,
            labels: Vec::new(),
        })
    }

    fn issue_status(&self, number: u64) -> Option<IssueStatus> {
        self.issues.get(&number).map(|&state| IssueStatus { state })
    }

    fn list_open_issues(&self, _limit: usize) -> Vec<Issue> {
        let mut numbers: Vec<u64> = self
            .issues
            .iter()
            .filter(|(_, s)| **s == IssueState::Open)
            .map(|(n, _)| *n)
            .collect();
        numbers.sort_unstable();
        numbers.into_iter().filter_map(|n| self.issue(n)).collect()
    }

    fn pr_for_branch(&self, branch: &str) -> Option<PullRequest> {
        self.record(format!("pr_for_branch {branch}"));
        self.prs.get(branch).cloned()
    }

    fn pull_request(&self, number: u64) -> Option<PullRequest> {
        self.prs.values().find(|p| p.number == number).cloned()
    }

    fn list_open_prs(&self, _limit: usize) -> Vec<PullRequest> {
        let mut prs: Vec<PullRequest> = self
            .prs
            .values()
            .filter(|p| p.state == PrState::Open)
            .cloned()
            .collect();
        prs.sort_by_key(|p| p.number);
        prs
    }

    fn pr_diff(&self, _number: u64) -> Option<String> {
        None
    }

    fn create_issue(&self, title: &str, _body: &str) -> Result<String, IssueTreeError> {
        self.record(format!("create_issue {title}"));
        Ok("https://example.com/issues/100".to_owned())
    }

    fn create_pr(
        &self,
        _title: &str,
        _body: &str,
        head: &str,
        base: &str,
    ) -> Result<String, IssueTreeError> {
        self.record(format!("create_pr {head} -> {base}"));
        Ok("https://example.com/pull/100".to_owned())
    }

    fn edit_pr_body(&self, number: u64, _body: &str) -> Result<(), IssueTreeError> {
        self.record(format!("edit_pr_body {number}"));
        Ok(())
    }

    fn merge_pr(&self, number: u64) -> Result<(), IssueTreeError> {
        self.record(format!("merge_pr {number}"));
        if self.failing_merges.contains(&number) {
            return Err(IssueTreeError::Other(format!("PR #{number} is not mergeable")));
        }
        Ok(())
    }

    fn review_pr(&self, number: u64, _event: ReviewEvent, _body: &str) -> Result<(), IssueTreeError> {
        self.record(format!("review_pr {number}"));
        Ok(())
    }
}
