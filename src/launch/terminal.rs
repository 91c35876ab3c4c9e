#![forbid(unsafe_code)]

use std::process::{Command, Stdio};

use crate::error::IssueTreeError;
use crate::launch::{LaunchSpec, Launcher, shell_quote};

/// Opens a new terminal window per issue.
#[derive(Debug, Clone)]
pub struct TerminalLauncher {
    terminal_command: Vec<String>,
}

impl TerminalLauncher {
    #[must_use]
    pub fn new(terminal_command: Vec<String>) -> Self {
        Self { terminal_command }
    }

    /// `cd` into the worktree, name the window, then replace the shell with the command.
    fn script(spec: &LaunchSpec) -> String {
        format!(
            "printf '\\033]0;%s\\007' {title}; cd {cwd} && exec {cmd}",
            title = shell_quote(&spec.title),
            cwd = shell_quote(&spec.cwd.to_string_lossy()),
            cmd = spec.shell_command(),
        )
    }

    fn command(&self, spec: &LaunchSpec) -> Result<Command, IssueTreeError> {
        let Some((program, args)) = self.terminal_command.split_first() else {
            return self.fallback_command(spec);
        };
        let mut command = Command::new(program);
        command
            .args(args)
            .args(["sh", "-lc", &Self::script(spec)])
            .current_dir(&spec.cwd);
        Ok(command)
    }

    #[cfg(target_os = "macos")]
    fn fallback_command(&self, spec: &LaunchSpec) -> Result<Command, IssueTreeError> {
        let script = Self::script(spec)
            .replace('\\', "\\\\")
            .replace('"', "\\\"");
        let mut command = Command::new("osascript");
        command
            .arg("-e")
            .arg(format!("tell application \"Terminal\" to do script \"{script}\""))
            .arg("-e")
            .arg(format!(
                "tell application \"Terminal\" to set custom title of front window to \"{}\"",
                spec.title
            ));
        Ok(command)
    }

    #[cfg(not(target_os = "macos"))]
    fn fallback_command(&self, _spec: &LaunchSpec) -> Result<Command, IssueTreeError> {
        Err(IssueTreeError::Config(
            "launcher.terminal_command is empty".to_owned(),
        ))
    }
}

impl Launcher for TerminalLauncher {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn launch(&self, spec: &LaunchSpec) -> Result<(), IssueTreeError> {
        let mut command = self.command(spec)?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // The window outlives us; the child is not waited on.
        command.spawn().map_err(|e| {
            IssueTreeError::Other(format!(
                "failed to open a terminal for {}: {e}",
                spec.key
            ))
        })?;
        log::info!("launched {} in a new terminal", spec.key);
        Ok(())
    }
}
