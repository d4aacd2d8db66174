use crate::catalog::{Catalog, CatalogService, WaitIndex};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::warn;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A catalog update for one watched dependency.
pub(crate) struct WatchEvent {
    pub key: String,
    pub services: Vec<CatalogService>,
}

/// Aborts the underlying blocking-query task when dropped, so dropping a
/// cache entry unsubscribes its dependency before the slot is reused.
pub(crate) struct WatchHandle {
    task: tokio::task::JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns one long-poll task per watched service; all tasks feed a single
/// event channel whose consumer owns cache updates.
pub(crate) struct Watcher {
    catalog: Arc<dyn Catalog>,
    events: mpsc::Sender<WatchEvent>,
    wait: Duration,
}

// === impl Watcher ===

impl Watcher {
    pub(crate) fn new(
        catalog: Arc<dyn Catalog>,
        events: mpsc::Sender<WatchEvent>,
        wait: Duration,
    ) -> Self {
        Self {
            catalog,
            events,
            wait,
        }
    }

    pub(crate) fn add(&self, function: &str, key: String) -> WatchHandle {
        let catalog = self.catalog.clone();
        let events = self.events.clone();
        let wait = self.wait;
        let function = function.to_string();
        WatchHandle {
            task: tokio::spawn(poll(catalog, function, key, events, wait)),
        }
    }
}

/// Runs Consul blocking queries until the event channel closes or the
/// handle is dropped. Errors back off; the query library's index contract
/// drives wakeups on change.
async fn poll(
    catalog: Arc<dyn Catalog>,
    function: String,
    key: String,
    events: mpsc::Sender<WatchEvent>,
    wait: Duration,
) {
    let mut index = 0;
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match catalog.service(&function, Some(WaitIndex { index, wait })).await {
            Ok(response) => {
                backoff = INITIAL_BACKOFF;
                // An index of zero would disable blocking and busy-loop.
                index = response.index.max(1);
                let event = WatchEvent {
                    key: key.clone(),
                    services: response.services,
                };
                if events.send(event).await.is_err() {
                    return;
                }
            }
            Err(error) => {
                warn!(%function, %error, "catalog watch failed");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}
