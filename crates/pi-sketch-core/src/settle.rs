//! Settle-once cell: the first value wins, every later attempt is a no-op.
//!
//! Every racing trigger in a sketch session (HTTP handlers, the deadline timer,
//! listener errors, UI cancellation) resolves through one [`Settle`], which makes
//! it the only mutual exclusion device the session needs.

use tokio::sync::watch;

/// A value that can be resolved exactly once and awaited any number of times.
#[derive(Debug)]
pub struct Settle<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> Default for Settle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Settle<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Resolve with `value`. Returns `false` if something else got there first.
    pub fn settle(&self, value: T) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            true
        })
    }

    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Current value without waiting.
    pub fn peek(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Wait for the settled value.
    pub async fn settled(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(value) = rx.borrow_and_update().clone() {
                return value;
            }
            // `self.tx` outlives this borrow, so the channel cannot close here.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
