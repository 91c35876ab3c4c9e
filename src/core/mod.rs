#![forbid(unsafe_code)]

pub mod discovery;
pub mod git;
pub mod merge;
pub mod naming;
pub mod pull_request;
pub mod status;
pub mod teardown;
pub mod worktree;
