#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

use crate::error::IssueTreeError;
use crate::tui;

#[derive(Debug, Clone)]
pub struct PickerItem {
    pub title: String,
    pub preview: String,
}

pub fn pick_one(title: &str, items: &[PickerItem]) -> Result<usize, IssueTreeError> {
    let state = PickerState::new(items, false, &[]);
    let chosen = run_picker(title, items, state)?;
    chosen.into_iter().next().ok_or(IssueTreeError::Cancelled)
}

/// Multi-select; items whose `preselected` flag is true start checked.
/// May return an empty selection when the user unchecks everything.
pub fn pick_many_with(
    title: &str,
    items: &[PickerItem],
    preselected: &[bool],
) -> Result<Vec<usize>, IssueTreeError> {
    let state = PickerState::new(items, true, preselected);
    run_picker(title, items, state)
}

pub fn pick_many(title: &str, items: &[PickerItem]) -> Result<Vec<usize>, IssueTreeError> {
    pick_many_with(title, items, &[])
}

#[derive(Debug, PartialEq, Eq)]
enum KeyOutcome {
    Continue,
    Accept,
    Cancel,
}

/// Everything the picker tracks between key presses.
#[derive(Debug)]
struct PickerState {
    lower_titles: Vec<String>,
    multi: bool,
    query: String,
    filtered: Vec<usize>,
    cursor: usize,
    checked: BTreeSet<usize>,
}

impl PickerState {
    fn new(items: &[PickerItem], multi: bool, preselected: &[bool]) -> Self {
        let checked = preselected
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| (on && i < items.len()).then_some(i))
            .collect();
        Self {
            lower_titles: items.iter().map(|i| i.title.to_lowercase()).collect(),
            multi,
            query: String::new(),
            filtered: (0..items.len()).collect(),
            cursor: 0,
            checked,
        }
    }

    fn current(&self) -> Option<usize> {
        self.filtered.get(self.cursor).copied()
    }

    fn selection(&self) -> Vec<usize> {
        if self.multi {
            self.checked.iter().copied().collect()
        } else {
            self.current().into_iter().collect()
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => return KeyOutcome::Cancel,
            KeyCode::Char('a') if ctrl && self.multi => self.toggle_all_visible(),
            KeyCode::Esc => return KeyOutcome::Cancel,
            KeyCode::Enter => return KeyOutcome::Accept,
            KeyCode::Tab | KeyCode::Char(' ') if self.multi => self.toggle_current(),
            KeyCode::Up => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Down => {
                if self.cursor + 1 < self.filtered.len() {
                    self.cursor += 1;
                }
            }
            KeyCode::PageUp => self.cursor = self.cursor.saturating_sub(10),
            KeyCode::PageDown => {
                self.cursor = (self.cursor + 10).min(self.filtered.len().saturating_sub(1));
            }
            KeyCode::Backspace => {
                self.query.pop();
                self.refilter();
            }
            KeyCode::Char(c) if !ctrl && !key.modifiers.contains(KeyModifiers::ALT) => {
                self.query.push(c);
                self.refilter();
            }
            _ => {}
        }
        KeyOutcome::Continue
    }

    fn toggle_current(&mut self) {
        if let Some(idx) = self.current()
            && !self.checked.insert(idx)
        {
            self.checked.remove(&idx);
        }
    }

    fn toggle_all_visible(&mut self) {
        let all_on = self.filtered.iter().all(|i| self.checked.contains(i));
        for &i in &self.filtered {
            if all_on {
                self.checked.remove(&i);
            } else {
                self.checked.insert(i);
            }
        }
    }

    /// An empty match keeps the list empty so Enter cannot pick a hidden item.
    fn refilter(&mut self) {
        let q = self.query.to_lowercase();
        self.filtered = self
            .lower_titles
            .iter()
            .enumerate()
            .filter_map(|(i, t)| (q.is_empty() || t.contains(&q)).then_some(i))
            .collect();
        if self.cursor >= self.filtered.len() {
            self.cursor = 0;
        }
    }
}

fn run_picker(
    title: &str,
    items: &[PickerItem],
    mut state: PickerState,
) -> Result<Vec<usize>, IssueTreeError> {
    if items.is_empty() {
        return Err(IssueTreeError::Other("nothing to choose from".to_owned()));
    }
    if !tui::is_tty() {
        return Err(IssueTreeError::Other(
            "interactive selection requires a TTY".to_owned(),
        ));
    }

    let mut guard = TerminalGuard(Some(tui::init_terminal()?));
    let mut list_state = ListState::default();

    loop {
        let terminal = guard
            .0
            .as_mut()
            .ok_or_else(|| IssueTreeError::Other("terminal unavailable".to_owned()))?;
        list_state.select(state.current().map(|_| state.cursor));
        terminal
            .draw(|f| draw(f, title, items, &state, &mut list_state))
            .map_err(|e| IssueTreeError::Other(format!("failed to draw picker: {e}")))?;

        if !event::poll(Duration::from_millis(50))
            .map_err(|e| IssueTreeError::Other(format!("event poll failed: {e}")))?
        {
            continue;
        }
        let Event::Key(key) =
            event::read().map_err(|e| IssueTreeError::Other(format!("event read failed: {e}")))?
        else {
            continue;
        };
        match state.handle_key(key) {
            KeyOutcome::Continue => {}
            KeyOutcome::Cancel => return Err(IssueTreeError::Cancelled),
            KeyOutcome::Accept => return Ok(state.selection()),
        }
    }
}

fn draw(
    f: &mut Frame<'_>,
    title: &str,
    items: &[PickerItem],
    state: &PickerState,
    list_state: &mut ListState,
) {
    let area = f.area();
    let outer = Block::default().title(title).borders(Borders::ALL);
    let inner = outer.inner(area);
    f.render_widget(outer, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(inner);
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[0]);

    let list_items: Vec<ListItem> = state
        .filtered
        .iter()
        .map(|&idx| {
            let text = if state.multi {
                let mark = if state.checked.contains(&idx) { "[x]" } else { "[ ]" };
                format!("{mark} {}", items[idx].title)
            } else {
                items[idx].title.clone()
            };
            ListItem::new(Line::from(text))
        })
        .collect();
    let list = List::new(list_items)
        .block(Block::default().borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">");
    f.render_stateful_widget(list, cols[0], list_state);

    let preview = state
        .current()
        .map(|i| items[i].preview.clone())
        .unwrap_or_default();
    f.render_widget(
        Paragraph::new(preview)
            .block(Block::default().borders(Borders::ALL))
            .wrap(Wrap { trim: false }),
        cols[1],
    );

    let keys = if state.multi {
        format!(
            "{} checked • Space/Tab toggle • Ctrl-A all • Enter confirm • Esc cancel",
            state.checked.len()
        )
    } else {
        "↑/↓ move • Enter choose • Esc cancel".to_owned()
    };
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("Filter: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(state.query.as_str()),
            Span::raw("  "),
            Span::styled(keys, Style::default().fg(Color::DarkGray)),
        ])),
        rows[1],
    );
}

struct TerminalGuard(Option<tui::Term>);

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Some(terminal) = self.0.take() {
            let _ = tui::restore_terminal(terminal);
        }
    }
}
