#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IssueTreeError {
    #[error("not inside a git repository")]
    NotInGitRepo,

    #[error("git is required but was not found in PATH")]
    GitNotFound,

    #[error("gh (GitHub CLI) is required but was not found in PATH")]
    GhNotFound,

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config key '{0}'")]
    InvalidConfigKey(String),

    #[error("invalid config value for '{key}': {msg}")]
    InvalidConfigValue { key: String, msg: String },

    #[error("issue #{0} not found")]
    IssueNotFound(u64),

    #[error("no worktree found for issue #{0}")]
    WorktreeNotFound(u64),

    #[error("failed to create worktree for issue #{issue}: {message}")]
    WorktreeCreate { issue: u64, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("io error at {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}
