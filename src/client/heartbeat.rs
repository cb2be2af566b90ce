use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Background task calling `tick` every `interval` while the member is stable.
///
/// Dropping the scheduler stops it, a tick in flight is cancelled.
#[derive(Debug)]
pub(crate) struct HeartbeatScheduler {
    stop: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatScheduler {
    /// Starts the loop, the first tick fires one `interval` from now.
    ///
    /// `interval` must not be zero.
    pub(crate) fn spawn<F, Fut>(interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let stop = Arc::new(Notify::new());
        let signal = Arc::clone(&stop);
        let first = Instant::now() + interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = signal.notified() => break,
                    _ = ticker.tick() => {}
                }

                if tick().await.is_break() {
                    break;
                }
            }

            debug!("heartbeat loop finished");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stops the loop. No tick starts after this returns.
    pub(crate) fn stop(self) {
        drop(self)
    }

    /// Lets a running tick finish on its own, used when the loop itself
    /// decided to end.
    pub(crate) fn detach(mut self) {
        self.handle.take();
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop.notify_one();
            handle.abort();
        }
    }
}
