// ── Loop timers ──
//
// One-shot timers that post a message back into the controller loop.
// All timers share a generation token; `cancel_all` kills every pending
// timer at once and starts a fresh generation.

use std::time::Duration;

use tokio::sync::mpsc::WeakUnboundedSender;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub(super) struct TimerSet {
    generation: CancellationToken,
}

impl TimerSet {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Post `msg` to `tx` after `delay`, unless cancelled first.
    pub(super) fn schedule<M>(&self, delay: Duration, tx: &WeakUnboundedSender<M>, msg: M)
    where
        M: Send + 'static,
    {
        let cancel = self.generation.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    if let Some(tx) = tx.upgrade() {
                        let _ = tx.send(msg);
                    }
                }
            }
        });
    }

    pub(super) fn cancel_all(&mut self) {
        self.generation.cancel();
        self.generation = CancellationToken::new();
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.generation.cancel();
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = TimerSet::new();
        timers.schedule(Duration::from_secs(3), &tx.downgrade(), 7_u32);

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.try_recv().unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_drops_pending() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerSet::new();
        timers.schedule(Duration::from_secs(1), &tx.downgrade(), 1_u32);
        timers.cancel_all();
        timers.schedule(Duration::from_secs(2), &tx.downgrade(), 2_u32);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(rx.try_recv().unwrap(), 2);
        assert!(rx.try_recv().is_err());
    }
}
