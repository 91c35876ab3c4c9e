#![forbid(unsafe_code)]

//! What runs inside a launched pane: the assistant in the foreground, plus a
//! background watcher that keeps the issue's pull request in sync.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::discovery::discover_issue_worktrees;
use crate::core::git::Git;
use crate::core::pull_request::{PrContext, SyncOutcome, sync_pull_request};
use crate::core::worktree::WorktreeManager;
use crate::error::IssueTreeError;
use crate::host::IssueHost;
use crate::host::github::GhCli;
use crate::prompt::{review_prompt, solve_prompt};

/// Polls the worktree's HEAD and syncs the PR whenever it moves.
pub struct CommitWatcher<H: ?Sized> {
    git: Git,
    host: Arc<H>,
    ctx: PrContext,
    poll_interval: Duration,
}

impl<H: IssueHost + ?Sized + 'static> CommitWatcher<H> {
    #[must_use]
    pub fn new(git: Git, host: Arc<H>, ctx: PrContext, poll_interval: Duration) -> Self {
        Self {
            git,
            host,
            ctx,
            poll_interval,
        }
    }

    /// Runs until `token` is cancelled, then performs one last sync.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(token).await })
    }

    async fn run(self, token: CancellationToken) {
        let mut last = self.head().await;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let current = self.head().await;
            if head_moved(last.as_deref(), current.as_deref()) {
                log::debug!("HEAD moved to {current:?} in {}", self.ctx.worktree.display());
                self.sync().await;
                last = current;
            }
        }

        self.sync().await;
    }

    async fn head(&self) -> Option<String> {
        let git = self.git.clone();
        let dir = self.ctx.worktree.clone();
        tokio::task::spawn_blocking(move || git.head_sha(&dir).ok())
            .await
            .ok()
            .flatten()
    }

    async fn sync(&self) {
        let git = self.git.clone();
        let host = Arc::clone(&self.host);
        let ctx = self.ctx.clone();
        let res = tokio::task::spawn_blocking(move || sync_pull_request(&git, host.as_ref(), &ctx)).await;
        match res {
            Ok(Ok(SyncOutcome::NothingToPush)) => {}
            Ok(Ok(outcome)) => eprintln!("[{}] {outcome}", timestamp()),
            Ok(Err(e)) => eprintln!(
                "[{}] PR sync for issue #{} failed: {e}",
                timestamp(),
                self.ctx.issue_number
            ),
            Err(e) => log::warn!("PR sync task failed: {e}"),
        }
    }
}

/// A failed read never counts as movement.
fn head_moved(last: Option<&str>, current: Option<&str>) -> bool {
    match (last, current) {
        (Some(a), Some(b)) => a != b,
        (None, Some(_)) => true,
        (_, None) => false,
    }
}

fn timestamp() -> String {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    now.format(time::macros::format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| "--:--:--".to_owned())
}

fn host_for(cfg: &Config, git: &Git) -> GhCli {
    GhCli::new(git.repo_root().to_path_buf(), cfg.github.gh_command.clone())
}

async fn run_assistant(
    cfg: &Config,
    cwd: &Path,
    prompt: &str,
    gh_token: Option<&str>,
) -> anyhow::Result<i32> {
    let mut cmd = tokio::process::Command::new(&cfg.assistant.command);
    cmd.current_dir(cwd).args(&cfg.assistant.args).arg(prompt);
    if let Some(token) = gh_token {
        cmd.env("GH_TOKEN", token);
    }
    let status = cmd
        .status()
        .await
        .with_context(|| format!("failed to start {}", cfg.assistant.command))?;
    Ok(status.code().unwrap_or(1))
}

/// `issuetree session <n>`: resume the worktree, run the assistant, keep the PR current.
pub async fn run_solve_session(cfg: &Config, git: Git, issue_number: u64) -> anyhow::Result<i32> {
    let host = Arc::new(host_for(cfg, &git));
    let issue = host
        .issue(issue_number)
        .ok_or(IssueTreeError::IssueNotFound(issue_number))?;

    let manager = WorktreeManager::new(git.clone(), cfg.solve.clone());
    let snapshot = discover_issue_worktrees(&git)?;
    let prepared = manager.create_or_attach(issue.number, &issue.title, &snapshot)?;
    let prompt = solve_prompt(&issue, &prepared);

    let token = CancellationToken::new();
    let watcher = cfg.watch.enabled.then(|| {
        let ctx = PrContext {
            issue_number: issue.number,
            issue_title: issue.title.clone(),
            branch: prepared.branch.clone(),
            base_branch: prepared.base_branch.clone(),
            worktree: prepared.path.clone(),
        };
        CommitWatcher::new(
            git.clone(),
            Arc::clone(&host),
            ctx,
            Duration::from_millis(cfg.watch.poll_interval_ms),
        )
        .spawn(token.clone())
    });

    // Ctrl-C in the pane is meant for the assistant; stay alive for the final sync.
    let sigint = tokio::spawn(async { while tokio::signal::ctrl_c().await.is_ok() {} });
    let code = run_assistant(cfg, &prepared.path, &prompt, None).await;
    sigint.abort();

    token.cancel();
    if let Some(handle) = watcher
        && let Err(e) = handle.await
    {
        log::warn!("commit watcher for issue #{issue_number} ended abnormally: {e}");
    }
    code
}

/// `issuetree session --review <pr>`: run the assistant on a PR, as the bot when configured.
pub async fn run_review_session(cfg: &Config, git: Git, pr_number: u64) -> anyhow::Result<i32> {
    let host = host_for(cfg, &git);
    let pr = host
        .pull_request(pr_number)
        .ok_or_else(|| anyhow::anyhow!("PR #{pr_number} not found"))?;
    let diff = host.pr_diff(pr_number).unwrap_or_default();

    let cwd = discover_issue_worktrees(&git)?
        .into_iter()
        .find(|w| !w.is_orphaned() && w.branch == pr.head_ref_name)
        .map_or_else(|| git.repo_root().to_path_buf(), |w| w.path);

    let prompt = review_prompt(&pr, &diff);
    let token = cfg.bot.token.as_deref().filter(|t| !t.trim().is_empty());
    run_assistant(cfg, &cwd, &prompt, token).await
}
