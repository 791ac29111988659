//! Single-shot completion signal for the accept loop.

use tokio::sync::watch;

/// Fired exactly once when the accept loop has fully exited.
///
/// Any number of tasks may wait on it, before or after it fires.
#[derive(Debug)]
pub struct DoneSignal {
    tx: watch::Sender<bool>,
}

impl DoneSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal. Returns `true` only for the first call.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn is_done(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal has fired.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this cannot fail while we wait.
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl Default for DoneSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn fires_once() {
        let done = DoneSignal::new();
        assert!(!done.is_done());
        assert!(done.fire());
        assert!(!done.fire());
        assert!(done.is_done());
    }

    #[tokio::test]
    async fn wait_after_fire_returns_immediately() {
        let done = DoneSignal::new();
        done.fire();
        tokio::time::timeout(Duration::from_secs(1), done.wait())
            .await
            .expect("already fired");
    }

    #[tokio::test]
    async fn every_waiter_is_released() {
        let done = Arc::new(DoneSignal::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let done = Arc::clone(&done);
                tokio::spawn(async move { done.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        done.fire();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter released")
                .unwrap();
        }
    }
}
