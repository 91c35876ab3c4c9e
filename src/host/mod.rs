#![forbid(unsafe_code)]

#[cfg(test)]
pub(crate) mod fake;
pub mod github;

use serde::{Deserialize, Serialize};

use crate::error::IssueTreeError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueStatus {
    pub state: IssueState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrStatus {
    pub number: u64,
    pub state: PrState,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub url: String,
    pub state: IssueState,
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    pub state: PrState,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub head_ref_name: String,
    #[serde(default)]
    pub review_decision: Option<String>,
    #[serde(default)]
    pub mergeable: Option<String>,
}

impl PullRequest {
    #[must_use]
    pub fn status(&self) -> PrStatus {
        PrStatus {
            number: self.number,
            state: self.state,
            url: self.url.clone(),
        }
    }

    /// Approved and without reported conflicts.
    #[must_use]
    pub fn is_mergeable(&self) -> bool {
        let approved = self.review_decision.as_deref() == Some("APPROVED");
        let conflicting = self.mergeable.as_deref() == Some("CONFLICTING");
        approved && !conflicting
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewEvent {
    Approve,
    RequestChanges,
    Comment,
}

/// Issue and pull request operations on the code host.
///
/// Read methods never fail: any error (network, auth, deleted issue) is
/// reported as `None` or an empty list. Mutations return errors.
pub trait IssueHost: Send + Sync {
    fn issue(&self, number: u64) -> Option<Issue>;
    fn issue_status(&self, number: u64) -> Option<IssueStatus>;
    fn list_open_issues(&self, limit: usize) -> Vec<Issue>;
    /// Most recent PR whose head is `branch`, in any state.
    fn pr_for_branch(&self, branch: &str) -> Option<PullRequest>;
    fn pull_request(&self, number: u64) -> Option<PullRequest>;
    fn list_open_prs(&self, limit: usize) -> Vec<PullRequest>;
    fn pr_diff(&self, number: u64) -> Option<String>;

    fn create_issue(&self, title: &str, body: &str) -> Result<String, IssueTreeError>;
    fn create_pr(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<String, IssueTreeError>;
    fn edit_pr_body(&self, number: u64, body: &str) -> Result<(), IssueTreeError>;
    fn merge_pr(&self, number: u64) -> Result<(), IssueTreeError>;
    fn review_pr(&self, number: u64, event: ReviewEvent, body: &str) -> Result<(), IssueTreeError>;
}
