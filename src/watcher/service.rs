use crate::store::{ChangeFeed, ShelfChange};
use crate::watcher::handler::ShelfChangeHandler;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Background task feeding a [`ChangeFeed`] into a reconciler.
///
/// A lagging subscription triggers a full reload of the viewed shelves.
pub struct WatcherService {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl WatcherService {
    /// Subscribes to `feed` and starts applying its changes on the current runtime.
    ///
    /// Changes committed before this call are not replayed.
    pub fn start(feed: &dyn ChangeFeed, handler: ShelfChangeHandler) -> Self {
        Self::run(feed.subscribe(), handler)
    }

    pub fn run(mut changes: broadcast::Receiver<ShelfChange>, handler: ShelfChangeHandler) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            info!("shelf watcher started for {}", handler.reconciler().viewer());
            loop {
                let received = tokio::select! {
                    _ = token.cancelled() => break,
                    received = changes.recv() => received,
                };

                match received {
                    Ok(change) => {
                        if handler.handle(&change) {
                            debug!("applied remote change for {}", change.user_id());
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("shelf watcher missed {missed} changes, reloading");
                        handler.resync().await;
                    }
                    Err(RecvError::Closed) => {
                        debug!("change feed closed");
                        break;
                    }
                }
            }
            info!("shelf watcher stopped");
        });

        WatcherService {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the task and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for WatcherService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
