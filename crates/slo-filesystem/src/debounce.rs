//! Coalesces bursts of reload signals into one reload.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::reload::Reloader;

/// Waits for reload signals and reloads once no signal arrived for the
/// debounce period.
///
/// Every signal pushes the deadline out again. A failed reload is logged and
/// not retried.
#[derive(Debug)]
pub struct ReloadDebouncer<R> {
    reloader: R,
    signals: mpsc::Receiver<()>,
    debounce: Duration,
}

impl<R: Reloader> ReloadDebouncer<R> {
    /// Creates a debouncer reading from `signals`.
    pub const fn new(reloader: R, signals: mpsc::Receiver<()>, debounce: Duration) -> Self {
        Self {
            reloader,
            signals,
            debounce,
        }
    }

    /// Runs until cancelled or until every sender is dropped. A pending
    /// reload is abandoned on cancellation and flushed when the senders go
    /// away.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("reload debouncer stopped");
                    return;
                }
                signal = self.signals.recv() => {
                    if signal.is_none() {
                        if deadline.is_some() {
                            self.reload().await;
                        }
                        return;
                    }
                    deadline = Some(Instant::now() + self.debounce);
                }
                () = wait(deadline) => {
                    deadline = None;
                    self.reload().await;
                }
            }
        }
    }

    async fn reload(&self) {
        match self.reloader.reload().await {
            Ok(()) => info!("reloaded prometheus"),
            Err(e) => warn!(error = %e, "failed to reload prometheus"),
        }
    }
}

async fn wait(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::advance;

    use super::*;
    use crate::error::ReloadError;

    const DEBOUNCE: Duration = Duration::from_secs(5);

    #[derive(Debug, Clone, Default)]
    struct CountingReloader {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Reloader for CountingReloader {
        async fn reload(&self) -> Result<(), ReloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ReloadError::Status {
                    status: 500,
                    body: String::new(),
                });
            }
            Ok(())
        }
    }

    fn start(reloader: CountingReloader) -> (mpsc::Sender<()>, CancellationToken, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let debouncer = ReloadDebouncer::new(reloader, rx, DEBOUNCE);
        let handle = tokio::spawn(debouncer.run(cancel.clone()));
        (tx, cancel, handle)
    }

    /// Lets the debouncer task observe everything sent so far.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_reloads_once() {
        let reloader = CountingReloader::default();
        let (tx, cancel, handle) = start(reloader.clone());

        for _ in 0..5 {
            tx.send(()).await.unwrap();
            settle().await;
            advance(Duration::from_secs(1)).await;
        }
        assert_eq!(reloader.calls.load(Ordering::SeqCst), 0);

        // The last signal was 1s ago; fires 5s after it.
        advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(reloader.calls.load(Ordering::SeqCst), 0);

        advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(reloader.calls.load(Ordering::SeqCst), 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_signals_reload_each_time() {
        let reloader = CountingReloader::default();
        let (tx, cancel, handle) = start(reloader.clone());

        for expected in 1..=3 {
            tx.send(()).await.unwrap();
            settle().await;
            advance(Duration::from_secs(6)).await;
            settle().await;
            assert_eq!(reloader.calls.load(Ordering::SeqCst), expected);
        }

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_not_retried() {
        let reloader = CountingReloader {
            fail: true,
            ..CountingReloader::default()
        };
        let (tx, cancel, handle) = start(reloader.clone());

        tx.send(()).await.unwrap();
        settle().await;
        advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(reloader.calls.load(Ordering::SeqCst), 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_pending_reload() {
        let reloader = CountingReloader::default();
        let (tx, cancel, handle) = start(reloader.clone());

        tx.send(()).await.unwrap();
        settle().await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(reloader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_channel_flushes_pending_reload() {
        let reloader = CountingReloader::default();
        let (tx, _cancel, handle) = start(reloader.clone());

        tx.send(()).await.unwrap();
        drop(tx);
        handle.await.unwrap();
        assert_eq!(reloader.calls.load(Ordering::SeqCst), 1);
    }
}
