//! Session server lifecycle: bind, serve, settle, tear down.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pi_sketch_core::config::SketchConfig;
use pi_sketch_core::error::{Result, SketchError};
use pi_sketch_core::session::{Resolution, SessionInfo, SessionState};
use pi_sketch_core::settle::Settle;

use crate::routes::{self, SharedState};

/// Path of the drawing page in the access URL.
pub const SKETCH_PATH: &str = "sketch";

/// Knobs for a single session server.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub bind: IpAddr,
    pub timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        let config = SketchConfig::default();
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            timeout: config.timeout(),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

impl ServerOptions {
    pub fn from_config(config: &SketchConfig) -> Result<Self> {
        Ok(Self {
            bind: config.bind_addr()?,
            timeout: config.timeout(),
            max_body_bytes: config.max_body_bytes,
        })
    }
}

/// A running single-use sketch server.
///
/// Dropping the server shuts it down.
pub struct SessionServer {
    info: SessionInfo,
    resolution: Arc<Settle<Resolution>>,
    shutdown: CancellationToken,
    closed: Arc<Settle<()>>,
}

impl SessionServer {
    /// Bind an ephemeral loopback port and start serving.
    ///
    /// Binding happens before this returns, so the URL is immediately usable.
    pub async fn start(options: ServerOptions) -> Result<Self> {
        if !options.bind.is_loopback() {
            return Err(SketchError::Config(format!(
                "bind address {} is not a loopback address",
                options.bind
            )));
        }

        let listener = TcpListener::bind(SocketAddr::new(options.bind, 0))
            .await
            .map_err(|e| SketchError::Bind(e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| SketchError::Bind(e.to_string()))?;

        let session_id = uuid::Uuid::new_v4().to_string();
        let info = SessionInfo::new(session_id.clone(), addr, SKETCH_PATH, options.timeout);
        let resolution = Arc::new(Settle::new());
        let shutdown = CancellationToken::new();
        let closed = Arc::new(Settle::new());

        let state = Arc::new(SharedState {
            session_id: session_id.clone(),
            resolution: resolution.clone(),
            shutdown: shutdown.clone(),
        });
        let app = routes::router(state, options.max_body_bytes);

        tokio::spawn(run_listener(
            listener,
            app,
            session_id.clone(),
            resolution.clone(),
            shutdown.clone(),
            closed.clone(),
        ));
        tokio::spawn(run_deadline(
            options.timeout,
            session_id.clone(),
            resolution.clone(),
            shutdown.clone(),
        ));

        info!(session_id = %session_id, %addr, url = %info.url, "Sketch session started");

        Ok(Self {
            info,
            resolution,
            shutdown,
            closed,
        })
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn url(&self) -> &str {
        &self.info.url
    }

    pub fn addr(&self) -> SocketAddr {
        self.info.addr
    }

    /// Completion state right now.
    pub fn state(&self) -> SessionState {
        self.resolution
            .peek()
            .map(|r| r.state())
            .unwrap_or(SessionState::Pending)
    }

    /// Wait for the session to end and report how.
    pub async fn resolution(&self) -> Resolution {
        self.resolution.settled().await
    }

    /// Wait for the submitted payload. Anything other than a submit yields `None`.
    pub async fn outcome(&self) -> Option<String> {
        self.resolution().await.into_payload()
    }

    /// Wait until the listener has stopped accepting connections.
    pub async fn closed(&self) {
        self.closed.settled().await
    }

    /// Close the session. Safe to call any number of times.
    pub fn shutdown(&self) {
        if self.resolution.settle(Resolution::Aborted) {
            info!(session_id = %self.info.session_id, "Sketch session closed by host");
        }
        self.shutdown.cancel();
    }
}

impl Drop for SessionServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_listener(
    listener: TcpListener,
    app: axum::Router,
    session_id: String,
    resolution: Arc<Settle<Resolution>>,
    shutdown: CancellationToken,
    closed: Arc<Settle<()>>,
) {
    let signal = shutdown.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await;

    // Graceful shutdown only follows a settle, so only a transport error can
    // leave the session pending here.
    if let Err(e) = result {
        warn!(session_id = %session_id, error = %e, "Sketch listener failed");
        resolution.settle(Resolution::Failed(e.to_string()));
    }

    shutdown.cancel();
    closed.settle(());
    debug!(session_id = %session_id, "Sketch listener closed");
}

async fn run_deadline(
    timeout: Duration,
    session_id: String,
    resolution: Arc<Settle<Resolution>>,
    shutdown: CancellationToken,
) {
    tokio::select! {
        _ = tokio::time::sleep(timeout) => {
            if resolution.settle(Resolution::TimedOut) {
                info!(session_id = %session_id, "Sketch session timed out");
            }
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}
