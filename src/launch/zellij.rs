#![forbid(unsafe_code)]

use std::process::{Command, Stdio};

use crate::error::IssueTreeError;
use crate::launch::{
    CLOSE_TIMEOUT, CloseTarget, LaunchSpec, Launcher, WindowCloser, output_with_timeout,
};

/// One background zellij session per launch key, so teardown can kill it whole.
#[must_use]
pub fn session_name(prefix: &str, key: &str) -> String {
    format!("{prefix}-{key}")
}

fn parse_session_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        // Some versions print "name [Created ...]".
        .filter_map(|l| l.split_whitespace().next())
        .map(str::to_owned)
        .collect()
}

#[derive(Debug, Clone)]
pub struct ZellijLauncher {
    zellij_command: String,
    session_prefix: String,
}

impl ZellijLauncher {
    #[must_use]
    pub fn new(zellij_command: String, session_prefix: String) -> Self {
        Self {
            zellij_command,
            session_prefix,
        }
    }

    #[must_use]
    pub fn session_for(&self, key: &str) -> String {
        session_name(&self.session_prefix, key)
    }

    fn ensure_available(&self) -> Result<(), IssueTreeError> {
        match Command::new(&self.zellij_command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(IssueTreeError::Other(
                format!("'{}' was not found in PATH", self.zellij_command),
            )),
            Err(e) => Err(IssueTreeError::Other(format!("failed to run zellij: {e}"))),
        }
    }

    fn list_sessions(&self) -> Vec<String> {
        let Ok(out) = Command::new(&self.zellij_command)
            .args(["list-sessions", "--short", "--no-formatting"])
            .output()
        else {
            return Vec::new();
        };
        // zellij exits non-zero when there are no sessions.
        if !out.status.success() {
            return Vec::new();
        }
        parse_session_list(&String::from_utf8_lossy(&out.stdout))
    }

    fn status(&self, command: &mut Command, what: &str) -> Result<(), IssueTreeError> {
        let status = command
            .status()
            .map_err(|e| IssueTreeError::Other(format!("failed to run zellij {what}: {e}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(IssueTreeError::Other(format!(
                "zellij {what} failed with exit code {code}",
                code = status.code().unwrap_or(1)
            )))
        }
    }
}

impl Launcher for ZellijLauncher {
    fn name(&self) -> &'static str {
        "zellij"
    }

    fn launch(&self, spec: &LaunchSpec) -> Result<(), IssueTreeError> {
        self.ensure_available()?;
        let session = self.session_for(&spec.key);

        if !self.list_sessions().iter().any(|s| *s == session) {
            self.status(
                Command::new(&self.zellij_command).args([
                    "attach",
                    "--create-background",
                    &session,
                ]),
                "attach --create-background",
            )?;
        }

        let mut command = Command::new(&self.zellij_command);
        command
            .args(["--session", &session, "run", "--close-on-exit"])
            .args(["--cwd", &spec.cwd.to_string_lossy()])
            .args(["-n", &spec.title])
            .args(["--", "sh", "-lc", &spec.shell_command()]);
        self.status(&mut command, "run")?;

        log::info!("launched {} in zellij session {session}", spec.key);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ZellijCloser {
    zellij_command: String,
    session_prefix: String,
}

impl ZellijCloser {
    #[must_use]
    pub fn new(zellij_command: String, session_prefix: String) -> Self {
        Self {
            zellij_command,
            session_prefix,
        }
    }
}

impl WindowCloser for ZellijCloser {
    fn close(&self, target: &CloseTarget<'_>) -> bool {
        let Some(list) = output_with_timeout(
            Command::new(&self.zellij_command).args(["list-sessions", "--short", "--no-formatting"]),
            CLOSE_TIMEOUT,
        ) else {
            return false;
        };
        let running = parse_session_list(&list);

        let mut closed = false;
        for key in target.keys() {
            let session = session_name(&self.session_prefix, &key);
            if !running.contains(&session) {
                continue;
            }
            let killed = output_with_timeout(
                Command::new(&self.zellij_command).args(["kill-session", &session]),
                CLOSE_TIMEOUT,
            )
            .is_some();
            if killed {
                log::info!("killed zellij session {session}");
            }
            closed |= killed;
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_names_carry_the_launch_key() {
        assert_eq!(session_name("issuetree", "issue-42"), "issuetree-issue-42");
        assert_eq!(session_name("issuetree", "pr-7"), "issuetree-pr-7");
    }

    #[test]
    fn parses_short_and_decorated_session_lists() {
        let out = "issuetree-issue-1\nissuetree-issue-2 [Created 3m ago]\n\n";
        assert_eq!(
            parse_session_list(out),
            vec!["issuetree-issue-1", "issuetree-issue-2"]
        );
    }

    #[test]
    fn missing_binary_closes_nothing() {
        let closer = ZellijCloser::new(
            "issuetree-definitely-missing-zellij".to_owned(),
            "issuetree".to_owned(),
        );
        let path = std::path::PathBuf::from("/x");
        let target = CloseTarget {
            path: &path,
            issue_number: 1,
            pr_number: None,
        };
        assert!(!closer.close(&target));
    }
}
