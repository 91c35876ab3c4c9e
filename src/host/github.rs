#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::de::DeserializeOwned;

use crate::error::IssueTreeError;
use crate::host::{Issue, IssueHost, IssueStatus, PullRequest, ReviewEvent};

const ISSUE_FIELDS: &str = "number,title,body,url,state,labels";
const PR_FIELDS: &str = "number,title,state,url,headRefName,reviewDecision,mergeable";

/// [`IssueHost`] backed by the `gh` CLI, run inside the repository.
#[derive(Debug, Clone)]
pub struct GhCli {
    repo_root: PathBuf,
    gh_command: String,
    token: Option<String>,
}

impl GhCli {
    #[must_use]
    pub fn new(repo_root: PathBuf, gh_command: String) -> Self {
        Self {
            repo_root,
            gh_command,
            token: None,
        }
    }

    /// Run every `gh` call as another account (exported as `GH_TOKEN`).
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    #[must_use]
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn ensure_available(&self) -> Result<(), IssueTreeError> {
        self.run_raw(&["--version"]).map(|_| ())
    }

    pub fn run(&self, args: &[&str]) -> Result<String, IssueTreeError> {
        let out = self.run_raw(args)?;
        if out.status.success() {
            Ok(String::from_utf8_lossy(&out.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&out.stderr);
            Err(IssueTreeError::Other(format!(
                "gh {}: {}",
                args.join(" "),
                stderr.trim()
            )))
        }
    }

    pub fn run_raw(&self, args: &[&str]) -> Result<Output, IssueTreeError> {
        log::debug!("gh {}", args.join(" "));
        let mut cmd = Command::new(&self.gh_command);
        cmd.args(args).current_dir(&self.repo_root);
        if let Some(token) = &self.token {
            cmd.env("GH_TOKEN", token);
        }
        cmd.output().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IssueTreeError::GhNotFound,
            _ => IssueTreeError::Other(format!("failed to run gh: {e}")),
        })
    }

    fn query<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, IssueTreeError> {
        let out = self.run(args)?;
        serde_json::from_str(&out)
            .map_err(|e| IssueTreeError::Other(format!("unexpected gh output: {e}")))
    }

    /// Read queries degrade to `None`; the failure is only logged.
    fn query_or_none<T: DeserializeOwned>(&self, what: &str, args: &[&str]) -> Option<T> {
        match self.query(args) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("{what}: {e}");
                None
            }
        }
    }
}

impl IssueHost for GhCli {
    fn issue(&self, number: u64) -> Option<Issue> {
        let n = number.to_string();
        self.query_or_none(
            &format!("issue #{number}"),
            &["issue", "view", &n, "--json", ISSUE_FIELDS],
        )
    }

    fn issue_status(&self, number: u64) -> Option<IssueStatus> {
        #[derive(serde::Deserialize)]
        struct StateOnly {
            state: crate::host::IssueState,
        }
        let n = number.to_string();
        let s: StateOnly = self.query_or_none(
            &format!("issue #{number} state"),
            &["issue", "view", &n, "--json", "state"],
        )?;
        Some(IssueStatus { state: s.state })
    }

    fn list_open_issues(&self, limit: usize) -> Vec<Issue> {
        let limit = limit.to_string();
        self.query_or_none(
            "open issues",
            &[
                "issue", "list", "--state", "open", "--limit", &limit, "--json", ISSUE_FIELDS,
            ],
        )
        .unwrap_or_default()
    }

    fn pr_for_branch(&self, branch: &str) -> Option<PullRequest> {
        let prs: Vec<PullRequest> = self.query_or_none(
            &format!("pull request for {branch}"),
            &[
                "pr", "list", "--head", branch, "--state", "all", "--limit", "1", "--json",
                PR_FIELDS,
            ],
        )?;
        prs.into_iter().next()
    }

    fn pull_request(&self, number: u64) -> Option<PullRequest> {
        let n = number.to_string();
        self.query_or_none(
            &format!("PR #{number}"),
            &["pr", "view", &n, "--json", PR_FIELDS],
        )
    }

    fn list_open_prs(&self, limit: usize) -> Vec<PullRequest> {
        let limit = limit.to_string();
        self.query_or_none(
            "open pull requests",
            &[
                "pr", "list", "--state", "open", "--limit", &limit, "--json", PR_FIELDS,
            ],
        )
        .unwrap_or_default()
    }

    fn pr_diff(&self, number: u64) -> Option<String> {
        let n = number.to_string();
        match self.run(&["pr", "diff", &n]) {
            Ok(diff) => Some(diff),
            Err(e) => {
                log::warn!("diff of PR #{number}: {e}");
                None
            }
        }
    }

    fn create_issue(&self, title: &str, body: &str) -> Result<String, IssueTreeError> {
        let out = self.run(&["issue", "create", "--title", title, "--body", body])?;
        Ok(out.trim().to_owned())
    }

    fn create_pr(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<String, IssueTreeError> {
        let out = self.run(&[
            "pr", "create", "--title", title, "--body", body, "--head", head, "--base", base,
        ])?;
        Ok(out.trim().to_owned())
    }

    fn edit_pr_body(&self, number: u64, body: &str) -> Result<(), IssueTreeError> {
        let n = number.to_string();
        let _ = self.run(&["pr", "edit", &n, "--body", body])?;
        Ok(())
    }

    fn merge_pr(&self, number: u64) -> Result<(), IssueTreeError> {
        let n = number.to_string();
        let _ = self.run(&["pr", "merge", &n, "--squash", "--delete-branch"])?;
        Ok(())
    }

    fn review_pr(&self, number: u64, event: ReviewEvent, body: &str) -> Result<(), IssueTreeError> {
        let n = number.to_string();
        let flag = match event {
            ReviewEvent::Approve => "--approve",
            ReviewEvent::RequestChanges => "--request-changes",
            ReviewEvent::Comment => "--comment",
        };
        let _ = self.run(&["pr", "review", &n, flag, "--body", body])?;
        Ok(())
    }
}

/// Issue number from a `https://github.com/o/r/issues/<n>` URL printed by `gh issue create`.
#[must_use]
pub fn number_from_url(url: &str) -> Option<u64> {
    url.trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|s| s.parse().ok())
}
