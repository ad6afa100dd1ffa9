//! `/sketch`: draw something in the browser and attach it to the prompt.
//!
//! One invocation owns one [`SessionServer`]. The command opens the drawing
//! page, mounts a status view in the host, then waits for whichever comes
//! first: the browser's submit/cancel (or the session deadline), or Esc in the
//! host. The losing side is torn down before the result is handled.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use pi_sketch_core::config::SketchConfig;
use pi_sketch_core::error::SketchError;
use pi_sketch_core::host::{append_to_editor, truncate_to_width, Component, Host, KeyToken, NoticeLevel};
use pi_sketch_server::{ServerOptions, SessionServer};

use crate::artifact::ArtifactStore;
use crate::opener::{NoopOpener, SystemOpener, UrlOpener};
use crate::Command;

/// How long to wait for open browser connections to drain after a session ends.
const LISTENER_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// What a sketch invocation ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SketchReport {
    /// The sketch was written to this path.
    Saved(PathBuf),
    /// Cancelled in the browser or host, timed out, or the listener failed.
    Cancelled,
    /// Something went wrong; the message was shown to the user.
    Failed(String),
}

pub struct SketchCommand {
    config: SketchConfig,
    store: ArtifactStore,
    opener: Arc<dyn UrlOpener>,
    active: AtomicBool,
}

impl Default for SketchCommand {
    fn default() -> Self {
        Self::new(SketchConfig::default())
    }
}

impl SketchCommand {
    pub fn new(config: SketchConfig) -> Self {
        let opener: Arc<dyn UrlOpener> = if config.open_browser {
            Arc::new(SystemOpener)
        } else {
            Arc::new(NoopOpener)
        };
        Self {
            store: ArtifactStore::new(config.scratch_dir()),
            config,
            opener,
            active: AtomicBool::new(false),
        }
    }

    /// Replace the browser launcher.
    pub fn with_opener(mut self, opener: Arc<dyn UrlOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Run one sketch session against `host`.
    pub async fn run(&self, host: &dyn Host) -> SketchReport {
        if !host.has_ui() {
            let err = SketchError::Unavailable("/sketch".into());
            host.notify(&err.to_string(), NoticeLevel::Error);
            return SketchReport::Failed(err.to_string());
        }

        let Some(_active) = ActiveGuard::acquire(&self.active) else {
            let message = "A sketch session is already running".to_string();
            host.notify(&message, NoticeLevel::Warning);
            return SketchReport::Failed(message);
        };
        self.run_session(host).await
    }

    async fn run_session(&self, host: &dyn Host) -> SketchReport {
        let server = match self.start_server().await {
            Ok(server) => server,
            Err(SketchError::Bind(e)) => {
                warn!(error = %e, "Sketch server failed to bind");
                host.notify("Sketch cancelled", NoticeLevel::Info);
                return SketchReport::Cancelled;
            }
            Err(e) => return fail(host, &e),
        };

        let url = server.url().to_string();
        if let Err(e) = self.opener.open(&url) {
            debug!(url = %url, error = %e, "Could not open browser");
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        host.show(Box::new(SketchStatus::new(url, cancel_tx)));

        let payload = tokio::select! {
            payload = server.outcome() => payload,
            Ok(()) = cancel_rx => {
                info!(session_id = %server.info().session_id, "Sketch cancelled from host");
                server.shutdown();
                None
            }
        };

        host.dismiss();
        server.shutdown();
        if tokio::time::timeout(LISTENER_CLOSE_GRACE, server.closed())
            .await
            .is_err()
        {
            debug!(session_id = %server.info().session_id, "Listener still draining connections");
        }

        let Some(payload) = payload else {
            host.notify("Sketch cancelled", NoticeLevel::Info);
            return SketchReport::Cancelled;
        };

        match self.store.save(&payload).await {
            Ok(path) => {
                info!(path = %path.display(), "Sketch saved");
                append_to_editor(host, &format!("Sketch: {}", path.display()));
                SketchReport::Saved(path)
            }
            Err(e) => fail(host, &e),
        }
    }

    async fn start_server(&self) -> pi_sketch_core::error::Result<SessionServer> {
        let options = ServerOptions::from_config(&self.config)?;
        SessionServer::start(options).await
    }
}

/// Marks a command busy for as long as it lives, including when the
/// surrounding future is dropped mid-session.
struct ActiveGuard<'a>(&'a AtomicBool);

impl<'a> ActiveGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn fail(host: &dyn Host, err: &SketchError) -> SketchReport {
    warn!(error = %err, "Sketch failed");
    let message = format!("Sketch failed: {err}");
    host.notify(&message, NoticeLevel::Error);
    SketchReport::Failed(message)
}

#[async_trait]
impl Command for SketchCommand {
    fn name(&self) -> &str {
        "sketch"
    }

    fn description(&self) -> &str {
        "Open a drawing canvas in the browser and attach the sketch to the prompt"
    }

    async fn execute(&self, _args: &str, host: &dyn Host) -> anyhow::Result<()> {
        self.run(host).await;
        Ok(())
    }
}

/// Status view shown while the browser is open. Esc cancels.
pub struct SketchStatus {
    url: String,
    cancel: Option<oneshot::Sender<()>>,
}

impl SketchStatus {
    pub fn new(url: String, cancel: oneshot::Sender<()>) -> Self {
        Self {
            url,
            cancel: Some(cancel),
        }
    }
}

impl Component for SketchStatus {
    fn render(&self, width: usize) -> Vec<String> {
        let hint = if self.cancel.is_some() {
            "Draw your sketch, then press Submit. Press Esc to cancel."
        } else {
            "Cancelling..."
        };
        [
            "Sketch canvas opened in your browser".to_string(),
            format!("  {}", self.url),
            hint.to_string(),
        ]
        .iter()
        .map(|line| truncate_to_width(line, width))
        .collect()
    }

    fn handle_input(&mut self, key: &KeyToken) {
        if *key != KeyToken::Escape {
            return;
        }
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}
