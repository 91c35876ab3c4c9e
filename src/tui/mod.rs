#![forbid(unsafe_code)]

pub mod picker;

use std::io::{self, BufRead as _, IsTerminal as _, Write as _};

use ratatui::backend::CrosstermBackend;

use crate::error::IssueTreeError;

pub type Term = ratatui::Terminal<CrosstermBackend<io::Stdout>>;

#[must_use]
pub fn is_tty() -> bool {
    io::stdout().is_terminal() && io::stdin().is_terminal()
}

pub fn init_terminal() -> Result<Term, IssueTreeError> {
    crossterm::terminal::enable_raw_mode()
        .map_err(|e| IssueTreeError::Other(format!("failed to enable raw mode: {e}")))?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)
        .map_err(|e| IssueTreeError::Other(format!("failed to enter alt screen: {e}")))?;
    ratatui::Terminal::new(CrosstermBackend::new(stdout))
        .map_err(|e| IssueTreeError::Other(format!("failed to create terminal: {e}")))
}

pub fn restore_terminal(mut terminal: Term) -> Result<(), IssueTreeError> {
    crossterm::terminal::disable_raw_mode()
        .map_err(|e| IssueTreeError::Other(format!("failed to disable raw mode: {e}")))?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )
    .map_err(|e| IssueTreeError::Other(format!("failed to leave alt screen: {e}")))?;
    terminal
        .show_cursor()
        .map_err(|e| IssueTreeError::Other(format!("failed to show cursor: {e}")))
}

/// `y/N` question on stderr. Anything but y/yes (including EOF) is no.
pub fn confirm(question: &str) -> Result<bool, IssueTreeError> {
    eprint!("{question} [y/N] ");
    io::stderr()
        .flush()
        .map_err(|e| IssueTreeError::Other(format!("failed to write prompt: {e}")))?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| IssueTreeError::Other(format!("failed to read answer: {e}")))?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("yep"));
    }
}
