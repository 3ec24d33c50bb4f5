use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Collapses bursts of keystrokes into the last one.
///
/// Each call to [`Debouncer::settle`] cancels the wait of the previous
/// call, so only the keystroke that is followed by a full quiet period
/// proceeds.
pub struct Debouncer {
    latest: AtomicU64,
    waiting: Mutex<Option<CancellationToken>>,
    duration: Duration,
}

impl Debouncer {
    pub fn new(duration: Duration) -> Self {
        Debouncer {
            latest: AtomicU64::new(0),
            waiting: Mutex::new(None),
            duration,
        }
    }

    /// Waits out the quiet period.
    ///
    /// Returns the keystroke's ticket, or `None` if a newer keystroke arrived first.
    pub async fn settle(&self) -> Option<u64> {
        let canceller = CancellationToken::new();

        // The ticket and the waiter slot change together, so the newest
        // ticket always belongs to the waiter left uncancelled.
        let (ticket, previous) = {
            let mut waiting = self.lock();
            let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
            (ticket, waiting.replace(canceller.clone()))
        };
        if let Some(previous) = previous {
            previous.cancel();
        }

        tokio::select! {
            _ = canceller.cancelled() => None,
            _ = tokio::time::sleep(self.duration) => self.is_current(ticket).then_some(ticket),
        }
    }

    /// Supersedes any waiting keystroke without starting a new wait.
    pub fn interrupt(&self) {
        let previous = {
            let mut waiting = self.lock();
            self.latest.fetch_add(1, Ordering::SeqCst);
            waiting.take()
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// Whether no keystroke has arrived since `ticket` was issued.
    pub fn is_current(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn only_the_last_keystroke_settles() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(300)));

        let first = tokio::spawn({
            let debouncer = debouncer.clone();
            async move { debouncer.settle().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = tokio::spawn({
            let debouncer = debouncer.clone();
            async move { debouncer.settle().await }
        });

        assert_eq!(first.await.unwrap(), None);
        let ticket = second.await.unwrap();
        assert!(ticket.is_some());
        assert!(debouncer.is_current(ticket.unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_cancels_the_waiter() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(300)));
        let waiter = tokio::spawn({
            let debouncer = debouncer.clone();
            async move { debouncer.settle().await }
        });
        tokio::task::yield_now().await;

        debouncer.interrupt();
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn simultaneous_keystrokes_settle_exactly_once() {
        for _ in 0..20 {
            let debouncer = Arc::new(Debouncer::new(Duration::from_millis(50)));
            let barrier = Arc::new(tokio::sync::Barrier::new(8));

            let waiters: Vec<_> = (0..8)
                .map(|_| {
                    let debouncer = debouncer.clone();
                    let barrier = barrier.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        debouncer.settle().await
                    })
                })
                .collect();

            let mut settled = Vec::new();
            for waiter in waiters {
                settled.extend(waiter.await.unwrap());
            }
            assert_eq!(settled.len(), 1);
            assert!(debouncer.is_current(settled[0]));
        }
    }
}
