#![forbid(unsafe_code)]

use std::process::Command;
use std::time::Duration;

use crate::launch::{CLOSE_TIMEOUT, CloseTarget, WindowCloser, output_with_timeout};

/// Closes Terminal.app and iTerm2 windows whose title mentions the target.
#[derive(Debug, Clone)]
pub struct AppleScriptCloser {
    timeout: Duration,
}

impl Default for AppleScriptCloser {
    fn default() -> Self {
        Self {
            timeout: CLOSE_TIMEOUT,
        }
    }
}

fn applescript_list(needles: &[String]) -> String {
    let quoted: Vec<String> = needles
        .iter()
        .map(|n| format!("\"{}\"", n.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("{{{}}}", quoted.join(", "))
}

fn close_script(needles: &[String]) -> String {
    let list = applescript_list(needles);
    format!(
        r#"set needles to {list}
set closed to 0
if application "Terminal" is running then
  tell application "Terminal"
    repeat with w in (every window)
      repeat with n in needles
        if (name of w) contains (n as text) then
          close w saving no
          set closed to closed + 1
          exit repeat
        end if
      end repeat
    end repeat
  end tell
end if
if application "iTerm2" is running then
  tell application "iTerm2"
    repeat with w in (every window)
      repeat with n in needles
        if (name of w) contains (n as text) then
          close w
          set closed to closed + 1
          exit repeat
        end if
      end repeat
    end repeat
  end tell
end if
return closed"#
    )
}

impl WindowCloser for AppleScriptCloser {
    fn close(&self, target: &CloseTarget<'_>) -> bool {
        let script = close_script(&target.needles());
        let Some(out) = output_with_timeout(
            Command::new("osascript").args(["-e", &script]),
            self.timeout,
        ) else {
            return false;
        };
        let closed = out.trim().parse::<u32>().unwrap_or(0);
        if closed > 0 {
            log::info!("closed {closed} window(s) for issue #{}", target.issue_number);
        }
        closed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_needles_for_applescript() {
        let list = applescript_list(&["/a \"b\"".to_owned(), "issue-3".to_owned()]);
        assert_eq!(list, r#"{"/a \"b\"", "issue-3"}"#);
        assert!(close_script(&["issue-3".to_owned()]).starts_with(r#"set needles to {"issue-3"}"#));
    }
}
