#![forbid(unsafe_code)]

#[cfg(target_os = "macos")]
pub mod applescript;
pub mod terminal;
pub mod zellij;

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt as _;

use crate::config::{Config, LauncherBackend};
use crate::error::IssueTreeError;

/// A command to start in its own terminal pane or window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// `issue-<n>` or `pr-<n>`; names the session and lets closers find it.
    pub key: String,
    /// Pane or window title, starts with `key`.
    pub title: String,
    pub cwd: PathBuf,
    pub argv: Vec<String>,
}

impl LaunchSpec {
    /// The argv rendered for `sh -lc`.
    #[must_use]
    pub fn shell_command(&self) -> String {
        self.argv
            .iter()
            .map(|a| shell_quote(a))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub trait Launcher: Send + Sync {
    fn name(&self) -> &'static str;
    fn launch(&self, spec: &LaunchSpec) -> Result<(), IssueTreeError>;
}

/// What a closer looks for when tearing an issue down.
#[derive(Debug, Clone, Copy)]
pub struct CloseTarget<'a> {
    pub path: &'a Path,
    pub issue_number: u64,
    pub pr_number: Option<u64>,
}

impl CloseTarget<'_> {
    /// Launch keys a session for this target may have been started under.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys = vec![format!("issue-{}", self.issue_number)];
        if let Some(pr) = self.pr_number {
            keys.push(format!("pr-{pr}"));
        }
        keys
    }

    /// Substrings identifying a window that belongs to this target.
    #[must_use]
    pub fn needles(&self) -> Vec<String> {
        let mut needles = vec![self.path.to_string_lossy().into_owned()];
        needles.extend(self.keys());
        needles
    }
}

/// Closes terminal UI attached to a worktree before it is deleted.
///
/// Best-effort: implementations never fail, they report whether anything
/// was asked to close.
pub trait WindowCloser: Send + Sync {
    fn close(&self, target: &CloseTarget<'_>) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCloser;

impl WindowCloser for NoopCloser {
    fn close(&self, _target: &CloseTarget<'_>) -> bool {
        false
    }
}

/// Runs every closer; true if any of them closed something.
pub struct ChainCloser(pub Vec<Box<dyn WindowCloser>>);

impl WindowCloser for ChainCloser {
    fn close(&self, target: &CloseTarget<'_>) -> bool {
        self.0
            .iter()
            .fold(false, |closed, c| c.close(target) || closed)
    }
}

/// `None` means run in the foreground of the current terminal.
#[must_use]
pub fn launcher_from_config(cfg: &Config) -> Option<Box<dyn Launcher>> {
    match cfg.launcher.backend {
        LauncherBackend::Zellij => Some(Box::new(zellij::ZellijLauncher::new(
            cfg.launcher.zellij_command.clone(),
            cfg.launcher.zellij_session.clone(),
        ))),
        LauncherBackend::Terminal => Some(Box::new(terminal::TerminalLauncher::new(
            cfg.launcher.terminal_command.clone(),
        ))),
        LauncherBackend::None => None,
    }
}

#[must_use]
pub fn closer_from_config(cfg: &Config) -> Box<dyn WindowCloser> {
    if !cfg.cleanup.close_windows {
        return Box::new(NoopCloser);
    }
    let mut closers: Vec<Box<dyn WindowCloser>> = Vec::new();
    if cfg.launcher.backend == LauncherBackend::Zellij {
        closers.push(Box::new(zellij::ZellijCloser::new(
            cfg.launcher.zellij_command.clone(),
            cfg.launcher.zellij_session.clone(),
        )));
    }
    #[cfg(target_os = "macos")]
    closers.push(Box::new(applescript::AppleScriptCloser::default()));

    if closers.is_empty() {
        Box::new(NoopCloser)
    } else {
        Box::new(ChainCloser(closers))
    }
}

/// How long a closing helper may run before it is killed.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Runs `cmd` and returns its stdout, or `None` on spawn failure, non-zero
/// exit or timeout. A timed-out child is killed and reaped.
///
/// Stdout is drained on a separate thread so a chatty helper cannot stall
/// on a full pipe while we wait on it.
pub fn output_with_timeout(cmd: &mut Command, timeout: Duration) -> Option<String> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;
    let mut stdout = child.stdout.take()?;
    let reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf);
        buf
    });

    match child.wait_timeout(timeout) {
        Ok(Some(status)) if status.success() => {
            let buf = reader.join().ok()?;
            Some(String::from_utf8_lossy(&buf).into_owned())
        }
        Ok(Some(_)) | Err(_) => None,
        Ok(None) => {
            log::debug!("closing helper timed out after {timeout:?}");
            let _ = child.kill();
            let _ = child.wait();
            None
        }
    }
}

/// Single-quotes `s` for POSIX shells unless it is plainly safe.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c));
    if safe {
        s.to_owned()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
