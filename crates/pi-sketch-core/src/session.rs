//! Sketch session model.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The browser posted a payload to `/submit`.
    Submitted(String),
    /// The browser posted to `/cancel`.
    Cancelled,
    /// The host closed the session before the browser did anything terminal.
    Aborted,
    /// The deadline passed with no terminal request.
    TimedOut,
    /// The listener failed.
    Failed(String),
}

impl Resolution {
    pub fn state(&self) -> SessionState {
        match self {
            Self::Submitted(_) => SessionState::ResolvedWithData,
            Self::Cancelled | Self::Aborted | Self::TimedOut => SessionState::ResolvedEmpty,
            Self::Failed(_) => SessionState::Errored,
        }
    }

    /// The submitted payload, if any. Every non-submit ending reads as "none".
    pub fn into_payload(self) -> Option<String> {
        match self {
            Self::Submitted(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Completion state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    ResolvedWithData,
    ResolvedEmpty,
    Errored,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Descriptive data about a running session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub addr: SocketAddr,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

impl SessionInfo {
    pub fn new(session_id: String, addr: SocketAddr, path: &str, timeout: Duration) -> Self {
        let created_at = Utc::now();
        let deadline = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|d| created_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            session_id,
            addr,
            url: format!("http://{addr}/{path}"),
            created_at,
            deadline,
        }
    }
}
