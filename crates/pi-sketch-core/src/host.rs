//! Contract with the host application that runs commands.
//!
//! The host owns the terminal: it draws mounted components, feeds them key
//! input, shows notices, and owns the composition buffer the user is typing
//! into. Commands only talk to it through [`Host`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A key press delivered to a mounted component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyToken {
    Escape,
    Enter,
    Char(char),
    Other(String),
}

/// A status view drawn by the host.
pub trait Component: Send {
    /// Lines to draw, none wider than `width` columns.
    fn render(&self, width: usize) -> Vec<String>;

    fn handle_input(&mut self, key: &KeyToken);
}

pub trait Host: Send + Sync {
    /// Whether an interactive UI is attached.
    fn has_ui(&self) -> bool;

    fn notify(&self, message: &str, level: NoticeLevel);

    /// Current contents of the composition buffer.
    fn editor_text(&self) -> String;

    fn set_editor_text(&self, text: &str);

    /// Mount `component`, replacing anything already mounted.
    fn show(&self, component: Box<dyn Component>);

    /// Unmount the current component. No-op if nothing is mounted.
    fn dismiss(&self);
}

/// Append `line` to the composition buffer, keeping whatever is already there.
pub fn append_to_editor(host: &dyn Host, line: &str) {
    let current = host.editor_text();
    let next = if current.is_empty() {
        line.to_string()
    } else if current.ends_with('\n') {
        format!("{current}{line}")
    } else {
        format!("{current}\n{line}")
    };
    host.set_editor_text(&next);
}

/// Shorten `line` to at most `width` characters.
pub fn truncate_to_width(line: &str, width: usize) -> String {
    if line.chars().count() <= width {
        return line.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out: String = line.chars().take(width - 1).collect();
    out.push('…');
    out
}
