//! Launching the user's browser.

use tracing::debug;

/// Something that can show a URL to the user.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Opens URLs with the OS default handler (`open`, `xdg-open`, `start`).
pub struct SystemOpener;

impl UrlOpener for SystemOpener {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that_detached(url)
    }
}

/// Never opens anything. Used when browser launch is disabled.
pub struct NoopOpener;

impl UrlOpener for NoopOpener {
    fn open(&self, url: &str) -> std::io::Result<()> {
        debug!(url, "Browser launch disabled");
        Ok(())
    }
}
