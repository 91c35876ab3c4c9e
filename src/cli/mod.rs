#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{CommandFactory as _, Parser, Subcommand};

use crate::config::{self, Config};
use crate::core::discovery::{discover_issue_worktrees, find_by_issue};
use crate::core::git::Git;
use crate::core::merge::{MergeCandidate, merge_candidates, merge_selected};
use crate::core::pull_request::{PrContext, sync_pull_request};
use crate::core::status::{self, StatusCollector, WorktreeWithStatus, collect_one};
use crate::core::teardown::{StepOutcome, Teardown, TeardownReport, worktrees_containing_cwd};
use crate::core::worktree::{IssueWorktree, PrepareOutcome, PreparedWorktree, WorktreeManager};
use crate::error::IssueTreeError;
use crate::host::github::{GhCli, number_from_url};
use crate::host::{Issue, IssueHost as _, ReviewEvent};
use crate::launch::{self, LaunchSpec};
use crate::output::table::Table;
use crate::session;
use crate::tui;
use crate::tui::picker::{self, PickerItem};

#[derive(Debug, Parser)]
#[command(
    name = "issuetree",
    version,
    about = "Solve GitHub issues in dedicated git worktrees"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create or resume issue worktrees and start the assistant in them
    Solve(SolveArgs),
    /// List open issues
    List(ListArgs),
    /// Show an issue with its worktree and PR state
    Show(IssueArg),
    /// Open a new issue
    New(NewArgs),
    /// Push the issue branch and open or update its PR
    Pr(IssueArg),
    /// Show every issue worktree with its status
    Status(StatusArgs),
    /// Remove issue worktrees, their branches and folders
    #[command(alias = "rm")]
    Clean(CleanArgs),
    /// Print the path of an issue worktree
    Go(GoArgs),
    /// Start an AI review of a pull request
    Review(ReviewArgs),
    /// Squash-merge approved PRs after removing their worktrees
    Merge(MergeArgs),
    /// Check prerequisites and store optional credentials
    Init(InitArgs),
    Config(ConfigArgs),
    Completion(CompletionArgs),
    Version,
    /// Runs inside a launched pane
    #[command(hide = true)]
    Session(SessionArgs),
}

#[derive(Debug, Parser)]
pub struct SolveArgs {
    /// Issue numbers (`42` or `#42`); pick from open issues when omitted
    #[arg(value_parser = parse_issue_number)]
    pub issues: Vec<u64>,
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Maximum number of issues to fetch
    #[arg(short = 'n', long = "limit")]
    pub limit: Option<usize>,
    /// Output as CSV
    #[arg(long = "csv")]
    pub csv: bool,
}

#[derive(Debug, Parser)]
pub struct IssueArg {
    #[arg(value_parser = parse_issue_number)]
    pub issue: u64,
}

#[derive(Debug, Parser)]
pub struct NewArgs {
    pub title: String,
    #[arg(short = 'b', long = "body", default_value = "")]
    pub body: String,
    /// Start solving the new issue right away
    #[arg(long = "solve")]
    pub solve: bool,
}

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as CSV
    #[arg(long = "csv")]
    pub csv: bool,
}

#[derive(Debug, Parser)]
pub struct CleanArgs {
    /// Issue whose worktree to remove
    #[arg(value_parser = parse_issue_number, conflicts_with_all = ["all", "merged"])]
    pub issue: Option<u64>,
    /// Choose from every issue worktree (merged and orphaned pre-checked)
    #[arg(long = "all", conflicts_with = "merged")]
    pub all: bool,
    /// Remove merged and orphaned worktrees without asking
    #[arg(long = "merged")]
    pub merged: bool,
    /// Skip the confirmation prompt
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

#[derive(Debug, Parser)]
pub struct GoArgs {
    #[arg(value_parser = parse_issue_number)]
    pub issue: Option<u64>,
}

#[derive(Debug, Parser)]
pub struct ReviewArgs {
    #[arg(value_parser = parse_issue_number)]
    pub pr: u64,
    /// Submit an approval directly instead of launching the assistant
    #[arg(long = "approve", group = "verdict", requires = "body")]
    pub approve: bool,
    /// Submit a change request directly
    #[arg(long = "request-changes", group = "verdict", requires = "body")]
    pub request_changes: bool,
    /// Submit a plain review comment directly
    #[arg(long = "comment", group = "verdict", requires = "body")]
    pub comment: bool,
    #[arg(long = "body")]
    pub body: Option<String>,
}

#[derive(Debug, Parser)]
pub struct MergeArgs {
    /// Merge every approved, conflict-free PR without asking
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

#[derive(Debug, Parser)]
pub struct InitArgs {
    /// Token of a secondary account used to review your own PRs
    #[arg(long = "bot-token")]
    pub bot_token: Option<String>,
}

#[derive(Debug, Parser)]
pub struct CompletionArgs {
    pub shell: clap_complete::Shell,
}

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    List,
    Set(ConfigSetArgs),
    Get(ConfigGetArgs),
}

#[derive(Debug, Parser)]
pub struct ConfigSetArgs {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Parser)]
pub struct ConfigGetArgs {
    pub key: String,
}

#[derive(Debug, Parser)]
pub struct SessionArgs {
    #[arg(value_parser = parse_issue_number, required_unless_present = "review")]
    pub issue: Option<u64>,
    /// Review this PR instead of solving an issue
    #[arg(long = "review", value_parser = parse_issue_number)]
    pub review: Option<u64>,
}

fn parse_issue_number(s: &str) -> Result<u64, String> {
    let digits = s.trim().trim_start_matches('#');
    match digits.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("'{s}' is not an issue number")),
    }
}

pub async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            if matches!(
                err.downcast_ref::<IssueTreeError>(),
                Some(IssueTreeError::Cancelled)
            ) {
                eprintln!("Cancelled.");
                return ExitCode::SUCCESS;
            }
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn init_logging() {
    let env = env_logger::Env::new().filter_or("ISSUETREE_LOG", "warn");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.cmd {
        None => cmd_solve(SolveArgs { issues: Vec::new() }).await,
        Some(Commands::Solve(args)) => cmd_solve(args).await,
        Some(Commands::List(args)) => cmd_list(args).await,
        Some(Commands::Show(args)) => cmd_show(args.issue).await,
        Some(Commands::New(args)) => cmd_new(args).await,
        Some(Commands::Pr(args)) => cmd_pr(args.issue).await,
        Some(Commands::Status(args)) => cmd_status(args).await,
        Some(Commands::Clean(args)) => cmd_clean(args).await,
        Some(Commands::Go(args)) => cmd_go(args).await,
        Some(Commands::Review(args)) => cmd_review(args).await,
        Some(Commands::Merge(args)) => cmd_merge(args).await,
        Some(Commands::Init(args)) => cmd_init(args).await,
        Some(Commands::Completion(args)) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "issuetree", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Config(args)) => match args.cmd {
            ConfigCmd::List => {
                print!("{}", config::list_resolved_toml()?);
                Ok(ExitCode::SUCCESS)
            }
            ConfigCmd::Set(set) => {
                config::set_value_string(&set.key, &set.value)?;
                println!("Set {}", set.key);
                Ok(ExitCode::SUCCESS)
            }
            ConfigCmd::Get(get) => match config::get_value_string(&get.key)? {
                Some(v) => {
                    println!("{v}");
                    Ok(ExitCode::SUCCESS)
                }
                None => anyhow::bail!(
                    "configuration key '{}' not found - use 'issuetree config list' to see available keys",
                    get.key
                ),
            },
        },
        Some(Commands::Version) => Ok(cmd_version()),
        Some(Commands::Session(args)) => cmd_session(args).await,
    }
}

async fn load_cfg() -> anyhow::Result<Config> {
    let cfg = tokio::task::spawn_blocking(|| -> anyhow::Result<Config> {
        let (cfg, _paths) = config::load()?;
        Ok(cfg)
    })
    .await??;
    Ok(cfg)
}

/// Config, repository and code host for one command invocation.
struct Ctx {
    cfg: Config,
    git: Git,
    host: Arc<GhCli>,
}

impl Ctx {
    async fn load() -> anyhow::Result<Self> {
        let cfg = load_cfg().await?;
        let git = Git::from_cwd()?;
        let host = Arc::new(GhCli::new(
            git.repo_root().to_path_buf(),
            cfg.github.gh_command.clone(),
        ));
        Ok(Self { cfg, git, host })
    }

    fn manager(&self) -> WorktreeManager {
        WorktreeManager::new(self.git.clone(), self.cfg.solve.clone())
    }

    fn teardown(&self) -> Teardown {
        Teardown::new(
            self.git.clone(),
            launch::closer_from_config(&self.cfg),
            Duration::from_millis(self.cfg.cleanup.settle_delay_ms),
        )
    }

    fn worktrees(&self) -> anyhow::Result<Vec<IssueWorktree>> {
        let mut worktrees = discover_issue_worktrees(&self.git)?;
        worktrees.sort_by_key(|w| w.issue_number);
        Ok(worktrees)
    }

    async fn statuses(&self, worktrees: &[IssueWorktree]) -> anyhow::Result<Vec<WorktreeWithStatus>> {
        let collector = StatusCollector::new(Arc::clone(&self.host), self.cfg.status.concurrency);
        Ok(collector.collect_all(worktrees).await?)
    }
}

fn self_exe() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.to_str().map(str::to_owned))
        .unwrap_or_else(|| "issuetree".to_owned())
}

async fn cmd_solve(args: SolveArgs) -> anyhow::Result<ExitCode> {
    let ctx = Ctx::load().await?;

    let issues: Vec<Issue> = if args.issues.is_empty() {
        pick_open_issues(&ctx)?
    } else {
        let mut found = Vec::new();
        for &n in &args.issues {
            match ctx.host.issue(n) {
                Some(issue) => found.push(issue),
                None => eprintln!("✗ {}", IssueTreeError::IssueNotFound(n)),
            }
        }
        found
    };
    let mut failed = args.issues.len().saturating_sub(issues.len());

    let manager = ctx.manager();
    let snapshot = ctx.worktrees()?;
    let (prepared, setup_failures) =
        prepare_each(&issues, |issue| manager.create_or_attach(issue.number, &issue.title, &snapshot));
    failed += setup_failures.len();

    let Some(launcher) = launch::launcher_from_config(&ctx.cfg) else {
        if let [(issue, _)] = prepared.as_slice() {
            let code = session::run_solve_session(&ctx.cfg, ctx.git.clone(), issue.number).await?;
            return Ok(exit_code(code));
        }
        for (issue, p) in &prepared {
            println!(
                "  run: cd {} && issuetree session {}",
                launch::shell_quote(&p.path.to_string_lossy()),
                issue.number
            );
        }
        return Ok(failure_code(failed));
    };

    for (issue, p) in &prepared {
        let spec = LaunchSpec {
            key: format!("issue-{}", issue.number),
            title: format!("issue-{} {}", issue.number, issue.title),
            cwd: p.path.clone(),
            argv: vec![self_exe(), "session".to_owned(), issue.number.to_string()],
        };
        if let Err(e) = launcher.launch(&spec) {
            eprintln!("✗ #{}: {e}", issue.number);
            failed += 1;
        } else if launcher.name() == "zellij" {
            println!(
                "  attach: {} attach {}-{}",
                ctx.cfg.launcher.zellij_command, ctx.cfg.launcher.zellij_session, spec.key
            );
        }
    }

    Ok(failure_code(failed))
}

/// Prepares every issue's worktree; a failure is reported and only skips that issue.
fn prepare_each<'a, F>(
    issues: &'a [Issue],
    mut prepare: F,
) -> (Vec<(&'a Issue, PreparedWorktree)>, Vec<u64>)
where
    F: FnMut(&Issue) -> Result<PreparedWorktree, IssueTreeError>,
{
    let mut prepared = Vec::new();
    let mut failed = Vec::new();
    for issue in issues {
        match prepare(issue) {
            Ok(p) => {
                let how = match p.outcome {
                    PrepareOutcome::Resumed => "resumed".to_owned(),
                    PrepareOutcome::AttachedExistingBranch => format!("attached to {}", p.branch),
                    PrepareOutcome::CreatedBranch => {
                        format!("created {} from {}", p.branch, p.base_branch)
                    }
                };
                println!("✓ #{} {} ({how})", issue.number, p.path.display());
                prepared.push((issue, p));
            }
            Err(e) => {
                eprintln!("✗ #{}: {e}", issue.number);
                failed.push(issue.number);
            }
        }
    }
    (prepared, failed)
}

fn pick_open_issues(ctx: &Ctx) -> anyhow::Result<Vec<Issue>> {
    let issues = ctx.host.list_open_issues(ctx.cfg.github.issue_limit);
    if issues.is_empty() {
        anyhow::bail!("no open issues found");
    }
    let worktrees = ctx.worktrees()?;
    let items: Vec<PickerItem> = issues
        .iter()
        .map(|i| {
            let marker = if find_by_issue(&worktrees, i.number).is_empty() {
                ""
            } else {
                " ●"
            };
            PickerItem {
                title: format!("#{} {}{marker}", i.number, i.title),
                preview: issue_preview(i),
            }
        })
        .collect();
    let chosen = picker::pick_many("Solve issues (Space to check, Enter to start)", &items)?;
    if chosen.is_empty() {
        return Err(IssueTreeError::Cancelled.into());
    }
    Ok(chosen.into_iter().map(|i| issues[i].clone()).collect())
}

fn issue_preview(issue: &Issue) -> String {
    let labels: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
    format!(
        "#{} {}\n{}\nLabels: {}\n\n{}",
        issue.number,
        issue.title,
        issue.url,
        if labels.is_empty() { "-".to_owned() } else { labels.join(", ") },
        issue.body.trim()
    )
}

async fn cmd_list(args: ListArgs) -> anyhow::Result<ExitCode> {
    let ctx = Ctx::load().await?;
    let issues = ctx
        .host
        .list_open_issues(args.limit.unwrap_or(ctx.cfg.github.issue_limit));
    let worktrees = ctx.worktrees()?;

    let mut table = Table::new(["NUMBER", "TITLE", "LABELS", "WORKTREE"]);
    for issue in &issues {
        let wts = find_by_issue(&worktrees, issue.number);
        let marker = match wts.first() {
            None => "",
            Some(w) if w.is_orphaned() => "orphaned",
            Some(_) => "yes",
        };
        let labels: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
        table.row([
            format!("#{}", issue.number),
            truncate(&issue.title, 60),
            labels.join(","),
            marker.to_owned(),
        ]);
    }
    if table.is_empty() && !args.csv {
        println!("No open issues.");
        return Ok(ExitCode::SUCCESS);
    }
    table.print(args.csv)?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_show(number: u64) -> anyhow::Result<ExitCode> {
    let ctx = Ctx::load().await?;
    let issue = ctx
        .host
        .issue(number)
        .ok_or(IssueTreeError::IssueNotFound(number))?;

    println!("#{} {}", issue.number, issue.title);
    println!("State:    {:?}", issue.state);
    println!("URL:      {}", issue.url);
    if !issue.labels.is_empty() {
        let labels: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
        println!("Labels:   {}", labels.join(", "));
    }

    let worktrees = find_by_issue(&ctx.worktrees()?, number);
    if worktrees.is_empty() {
        println!(
            "Worktree: none (would be {})",
            ctx.manager().path_for(number, &issue.title).display()
        );
    }
    for wt in &worktrees {
        let status = collect_one(ctx.host.as_ref(), wt);
        println!("Worktree: {}", wt.path.display());
        if !wt.is_orphaned() {
            println!("Branch:   {}", wt.branch);
        }
        println!("Status:   {}", status.label());
        if let Some(pr) = &status.pr {
            println!("PR:       #{} {}", pr.number, pr.url);
        }
    }

    if !issue.body.trim().is_empty() {
        println!("\n{}", issue.body.trim());
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_new(args: NewArgs) -> anyhow::Result<ExitCode> {
    let ctx = Ctx::load().await?;
    let url = ctx.host.create_issue(&args.title, &args.body)?;
    println!("Created {url}");

    if !args.solve {
        return Ok(ExitCode::SUCCESS);
    }
    let number = number_from_url(&url)
        .with_context(|| format!("could not read the issue number from '{url}'"))?;
    cmd_solve(SolveArgs {
        issues: vec![number],
    })
    .await
}

async fn cmd_pr(number: u64) -> anyhow::Result<ExitCode> {
    let ctx = Ctx::load().await?;
    let worktree = find_by_issue(&ctx.worktrees()?, number)
        .into_iter()
        .find(|w| !w.is_orphaned())
        .ok_or(IssueTreeError::WorktreeNotFound(number))?;

    let title = ctx
        .host
        .issue(number)
        .map_or_else(|| worktree.branch.clone(), |i| i.title);
    let pr_ctx = PrContext {
        issue_number: number,
        issue_title: title,
        branch: worktree.branch.clone(),
        base_branch: ctx.manager().base_branch(),
        worktree: worktree.path.clone(),
    };
    let outcome = sync_pull_request(&ctx.git, ctx.host.as_ref(), &pr_ctx)?;
    println!("#{number}: {outcome}");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_status(args: StatusArgs) -> anyhow::Result<ExitCode> {
    let ctx = Ctx::load().await?;
    let worktrees = ctx.worktrees()?;
    if worktrees.is_empty() && !args.csv {
        println!("No issue worktrees.");
        return Ok(ExitCode::SUCCESS);
    }
    let statuses = ctx.statuses(&worktrees).await?;

    let mut table = Table::new(["ISSUE", "STATUS", "BRANCH", "PR", "PATH"]);
    for s in &statuses {
        table.row([
            format!("#{}", s.worktree.issue_number),
            s.label().to_string(),
            s.worktree.branch.clone(),
            s.pr.as_ref().map(|p| format!("#{}", p.number)).unwrap_or_default(),
            s.worktree.path.display().to_string(),
        ]);
    }
    table.print(args.csv)?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_clean(args: CleanArgs) -> anyhow::Result<ExitCode> {
    let ctx = Ctx::load().await?;
    let teardown = ctx.teardown();

    if let Some(number) = args.issue {
        return clean_one(&ctx, &teardown, number, args.yes).await;
    }

    let worktrees = ctx.worktrees()?;
    if worktrees.is_empty() {
        println!("No issue worktrees.");
        return Ok(ExitCode::SUCCESS);
    }
    // Status for the whole batch is in before anything is removed.
    let statuses = ctx.statuses(&worktrees).await?;

    let targets: Vec<WorktreeWithStatus> = if args.merged {
        status::safe_to_clean(statuses)
    } else {
        let chosen = pick_cleanup_targets(&statuses)?;
        let targets: Vec<WorktreeWithStatus> =
            chosen.into_iter().map(|i| statuses[i].clone()).collect();
        if !targets.is_empty()
            && !args.yes
            && !tui::confirm(&format!("Remove {} worktree(s)?", targets.len()))?
        {
            return Err(IssueTreeError::Cancelled.into());
        }
        targets
    };

    if targets.is_empty() {
        println!("Nothing to clean.");
        return Ok(ExitCode::SUCCESS);
    }

    warn_if_inside(&targets);
    let reports = teardown.tear_down_all(&targets);
    print_reports(&reports);
    Ok(ExitCode::SUCCESS)
}

async fn clean_one(
    ctx: &Ctx,
    teardown: &Teardown,
    number: u64,
    yes: bool,
) -> anyhow::Result<ExitCode> {
    let worktrees = find_by_issue(&ctx.worktrees()?, number);

    if worktrees.is_empty() {
        let branches = teardown.stray_branches(number)?;
        if branches.is_empty() {
            return Err(IssueTreeError::WorktreeNotFound(number).into());
        }
        println!("No worktree for #{number}, but these branches remain: {}", branches.join(", "));
        if !yes && !tui::confirm("Delete them?")? {
            return Err(IssueTreeError::Cancelled.into());
        }
        for (branch, outcome) in teardown.delete_branches(&branches) {
            match outcome {
                StepOutcome::Failed(msg) => eprintln!("✗ {branch}: {msg}"),
                _ => println!("✓ Deleted branch {branch}"),
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let targets = ctx.statuses(&worktrees).await?;
    if !yes {
        for t in &targets {
            println!("#{number} {} [{}]", t.worktree.path.display(), t.label());
        }
        if !tui::confirm(&format!("Remove the worktree of #{number}?"))? {
            return Err(IssueTreeError::Cancelled.into());
        }
    }
    warn_if_inside(&targets);
    print_reports(&teardown.tear_down_all(&targets));
    Ok(ExitCode::SUCCESS)
}

fn pick_cleanup_targets(statuses: &[WorktreeWithStatus]) -> anyhow::Result<Vec<usize>> {
    let items: Vec<PickerItem> = statuses
        .iter()
        .map(|s| PickerItem {
            title: format!("#{} [{}]", s.worktree.issue_number, s.label()),
            preview: format!(
                "Path:   {}\nBranch: {}\nStatus: {}\nPR:     {}",
                s.worktree.path.display(),
                if s.worktree.is_orphaned() { "-" } else { s.worktree.branch.as_str() },
                s.label(),
                s.pr.as_ref().map_or_else(|| "-".to_owned(), |p| p.url.clone()),
            ),
        })
        .collect();
    let preselected: Vec<bool> = statuses
        .iter()
        .map(WorktreeWithStatus::preselect_for_cleanup)
        .collect();
    Ok(picker::pick_many_with("Clean worktrees", &items, &preselected)?)
}

fn warn_if_inside(targets: &[WorktreeWithStatus]) {
    let Ok(cwd) = std::env::current_dir() else {
        return;
    };
    for wt in worktrees_containing_cwd(targets, &cwd) {
        eprintln!(
            "Warning: your shell is inside {}; cd out of it after cleanup.",
            wt.path.display()
        );
    }
}

fn print_reports(reports: &[TeardownReport]) {
    let mut partial = 0usize;
    for r in reports {
        if r.fully_cleaned() {
            println!("✓ Cleaned #{} ({})", r.issue_number, r.path.display());
            continue;
        }
        partial += 1;
        eprintln!("⚠ Partially cleaned #{} ({})", r.issue_number, r.path.display());
        for w in r.warnings() {
            eprintln!("    {w}");
        }
        if let Some(cmd) = r.manual_command() {
            eprintln!("    remove it manually: {cmd}");
        }
    }
    if reports.len() > 1 {
        println!(
            "{} cleaned, {partial} partial",
            reports.len().saturating_sub(partial)
        );
    }
}

async fn cmd_go(args: GoArgs) -> anyhow::Result<ExitCode> {
    let ctx = Ctx::load().await?;
    let worktrees = ctx.worktrees()?;

    let path = if let Some(number) = args.issue {
        let mut found = find_by_issue(&worktrees, number);
        found.sort_by_key(IssueWorktree::is_orphaned);
        found
            .into_iter()
            .next()
            .map(|w| w.path)
            .ok_or(IssueTreeError::WorktreeNotFound(number))?
    } else {
        if worktrees.is_empty() {
            anyhow::bail!("no issue worktrees");
        }
        let items: Vec<PickerItem> = worktrees
            .iter()
            .map(|w| PickerItem {
                title: format!("#{} {}", w.issue_number, w.path.display()),
                preview: format!(
                    "Path:   {}\nBranch: {}",
                    w.path.display(),
                    if w.is_orphaned() { "(orphaned folder)" } else { w.branch.as_str() }
                ),
            })
            .collect();
        let idx = picker::pick_one("Go to worktree", &items)?;
        worktrees[idx].path.clone()
    };

    println!("{}", path.display());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_review(args: ReviewArgs) -> anyhow::Result<ExitCode> {
    let ctx = Ctx::load().await?;

    let verdict = if args.approve {
        Some(ReviewEvent::Approve)
    } else if args.request_changes {
        Some(ReviewEvent::RequestChanges)
    } else if args.comment {
        Some(ReviewEvent::Comment)
    } else {
        None
    };
    if let Some(event) = verdict {
        let reviewer = GhCli::new(
            ctx.git.repo_root().to_path_buf(),
            ctx.cfg.github.gh_command.clone(),
        )
        .with_token(ctx.cfg.bot.token.clone());
        reviewer.review_pr(args.pr, event, args.body.as_deref().unwrap_or_default())?;
        println!("Submitted review on PR #{}", args.pr);
        return Ok(ExitCode::SUCCESS);
    }

    let pr = ctx
        .host
        .pull_request(args.pr)
        .with_context(|| format!("PR #{} not found", args.pr))?;

    let Some(launcher) = launch::launcher_from_config(&ctx.cfg) else {
        let code = session::run_review_session(&ctx.cfg, ctx.git.clone(), args.pr).await?;
        return Ok(exit_code(code));
    };

    let cwd = ctx
        .worktrees()?
        .into_iter()
        .find(|w| !w.is_orphaned() && w.branch == pr.head_ref_name)
        .map_or_else(|| ctx.git.repo_root().to_path_buf(), |w| w.path);
    let spec = LaunchSpec {
        key: format!("pr-{}", pr.number),
        title: format!("pr-{} review: {}", pr.number, pr.title),
        cwd,
        argv: vec![
            self_exe(),
            "session".to_owned(),
            "--review".to_owned(),
            pr.number.to_string(),
        ],
    };
    launcher.launch(&spec)?;
    println!("Started review of PR #{} ({})", pr.number, pr.url);
    if ctx.cfg.bot.token.is_none() {
        println!("  note: no bot.token configured; you cannot approve your own PRs");
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_merge(args: MergeArgs) -> anyhow::Result<ExitCode> {
    let ctx = Ctx::load().await?;
    let prs = ctx.host.list_open_prs(ctx.cfg.github.issue_limit);
    if prs.is_empty() {
        println!("No open pull requests.");
        return Ok(ExitCode::SUCCESS);
    }
    let candidates = merge_candidates(prs, &ctx.worktrees()?);

    let selected: Vec<MergeCandidate> = if args.yes {
        candidates.into_iter().filter(MergeCandidate::preselected).collect()
    } else {
        let items: Vec<PickerItem> = candidates
            .iter()
            .map(|c| PickerItem {
                title: c.display_line(),
                preview: format!(
                    "{}\nBranch:   {}\nWorktree: {}",
                    c.pr.url,
                    c.pr.head_ref_name,
                    c.worktree
                        .as_ref()
                        .map_or_else(|| "-".to_owned(), |w| w.path.display().to_string())
                ),
            })
            .collect();
        let preselected: Vec<bool> = candidates.iter().map(MergeCandidate::preselected).collect();
        let chosen = picker::pick_many_with("Merge pull requests", &items, &preselected)?;
        let selected: Vec<MergeCandidate> =
            chosen.into_iter().map(|i| candidates[i].clone()).collect();
        if !selected.is_empty()
            && !tui::confirm(&format!("Squash-merge {} PR(s)?", selected.len()))?
        {
            return Err(IssueTreeError::Cancelled.into());
        }
        selected
    };

    if selected.is_empty() {
        println!("Nothing to merge.");
        return Ok(ExitCode::SUCCESS);
    }

    let summary = merge_selected(ctx.host.as_ref(), &ctx.teardown(), &selected);
    print_reports(&summary.teardowns);
    for n in &summary.merged {
        println!("✓ Merged PR #{n}");
    }
    for (n, e) in &summary.failed {
        eprintln!("✗ PR #{n}: {e}");
    }
    println!(
        "{} merged, {} failed",
        summary.merged.len(),
        summary.failed.len()
    );
    Ok(failure_code(summary.failed.len()))
}

async fn cmd_init(args: InitArgs) -> anyhow::Result<ExitCode> {
    let cfg = load_cfg().await?;
    let mut ok = true;

    match Git::from_cwd() {
        Ok(git) => match git.run(&["--version"]) {
            Ok(v) => println!("✓ {}", v.trim()),
            Err(e) => {
                ok = false;
                eprintln!("✗ {e}");
            }
        },
        Err(e) => {
            ok = false;
            eprintln!("✗ {e}");
        }
    }

    let gh = GhCli::new(PathBuf::from("."), cfg.github.gh_command.clone());
    match gh.ensure_available() {
        Ok(()) => match gh.run(&["auth", "status"]) {
            Ok(_) => println!("✓ gh is installed and authenticated"),
            Err(e) => {
                ok = false;
                eprintln!("✗ gh is installed but not authenticated: {e}");
            }
        },
        Err(e) => {
            ok = false;
            eprintln!("✗ {e}");
        }
    }

    if let Some(token) = args.bot_token {
        config::set_value_string("bot.token", token.trim())?;
        println!("✓ Stored bot token in {}", config::default_paths()?.config_file.display());
    } else if cfg.bot.token.is_some() {
        println!("✓ Bot token configured");
    } else {
        println!("  No bot token; set one with `issuetree init --bot-token <TOKEN>` to review your own PRs");
    }

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::from(1) })
}

async fn cmd_session(args: SessionArgs) -> anyhow::Result<ExitCode> {
    let cfg = load_cfg().await?;
    let git = Git::from_cwd()?;
    let code = match (args.review, args.issue) {
        (Some(pr), _) => session::run_review_session(&cfg, git, pr).await?,
        (None, Some(issue)) => session::run_solve_session(&cfg, git, issue).await?,
        (None, None) => anyhow::bail!("session needs an issue number or --review <PR>"),
    };
    Ok(exit_code(code))
}

fn cmd_version() -> ExitCode {
    println!("issuetree version {}", env!("CARGO_PKG_VERSION"));
    println!("  rust: {}", rustc_version_runtime::version());
    println!(
        "  os/arch: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    ExitCode::SUCCESS
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::from(1), ExitCode::from)
}

fn failure_code(failed: usize) -> ExitCode {
    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn truncate(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if s.chars().count() > max {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_issue_numbers_with_or_without_hash() {
        assert_eq!(parse_issue_number("42"), Ok(42));
        assert_eq!(parse_issue_number("#42"), Ok(42));
        assert!(parse_issue_number("0").is_err());
        assert!(parse_issue_number("abc").is_err());
    }

    #[test]
    fn solve_is_the_default_and_takes_many_issues() {
        let cli = Cli::try_parse_from(["issuetree"]).unwrap();
        assert!(cli.cmd.is_none());
        let cli = Cli::try_parse_from(["issuetree", "solve", "3", "#5"]).unwrap();
        let Some(Commands::Solve(args)) = cli.cmd else {
            panic!("expected solve");
        };
        assert_eq!(args.issues, vec![3, 5]);
    }

    #[test]
    fn clean_modes_are_exclusive() {
        assert!(Cli::try_parse_from(["issuetree", "clean", "--all", "--merged"]).is_err());
        assert!(Cli::try_parse_from(["issuetree", "clean", "4", "--merged"]).is_err());
        assert!(Cli::try_parse_from(["issuetree", "clean", "--merged", "--yes"]).is_ok());
    }

    #[test]
    fn direct_review_verdicts_need_a_body() {
        assert!(Cli::try_parse_from(["issuetree", "review", "7", "--approve"]).is_err());
        assert!(Cli::try_parse_from(["issuetree", "review", "7", "--approve", "--body", "LGTM"]).is_ok());
        assert!(
            Cli::try_parse_from([
                "issuetree", "review", "7", "--approve", "--comment", "--body", "x"
            ])
            .is_err()
        );
    }

    #[test]
    fn session_accepts_issue_or_review() {
        assert!(Cli::try_parse_from(["issuetree", "session", "42"]).is_ok());
        assert!(Cli::try_parse_from(["issuetree", "session", "--review", "7"]).is_ok());
        assert!(Cli::try_parse_from(["issuetree", "session"]).is_err());
    }

    fn issue(number: u64) -> Issue {
        Issue {
            number,
            title: format!("Issue {number}"),
            body: String::new(),
            url: String::new(),
            state: crate::host::IssueState::Open,
            labels: Vec::new(),
        }
    }

    #[test]
    fn one_failed_setup_does_not_stop_the_others() {
        let issues = vec![issue(1), issue(2), issue(3)];
        let mut attempted = Vec::new();
        let (prepared, failed) = prepare_each(&issues, |i| {
            attempted.push(i.number);
            if i.number == 2 {
                return Err(IssueTreeError::WorktreeCreate {
                    issue: 2,
                    message: "invalid reference: nope".to_owned(),
                });
            }
            Ok(PreparedWorktree {
                path: PathBuf::from(format!("/src/app-issue-{}-x", i.number)),
                branch: format!("issue-{}-x", i.number),
                base_branch: "main".to_owned(),
                outcome: PrepareOutcome::CreatedBranch,
            })
        });

        assert_eq!(attempted, vec![1, 2, 3]);
        assert_eq!(failed, vec![2]);
        let ok: Vec<u64> = prepared.iter().map(|(i, _)| i.number).collect();
        assert_eq!(ok, vec![1, 3]);
    }

    #[test]
    fn long_titles_are_shortened() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd...");
    }
}
