use crate::{
    catalog::{Catalog, CatalogService},
    watch::{WatchEvent, WatchHandle, Watcher},
};
use ahash::AHashMap as HashMap;
use faas_provider_core::{ResolveError, Resolver};
use parking_lot::RwLock;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, info_span, trace, Instrument};

/// How long each blocking query parks on the catalog before re-polling.
const WATCH_WAIT: Duration = Duration::from_secs(10);

const EVENT_BUFFER: usize = 64;

type Cache = Arc<RwLock<HashMap<String, CacheEntry>>>;

struct CacheEntry {
    endpoints: Vec<String>,
    // Dropping the handle aborts the watch before the slot goes away.
    _handle: WatchHandle,
}

/// Function-name resolver backed by a push-updated catalog cache.
///
/// A miss fetches once, installs the result, and subscribes the service to
/// the watcher; later updates land asynchronously. Two concurrent cold
/// lookups may both fetch; the install is an idempotent upsert so either
/// order is correct.
pub struct CachingResolver {
    cache: Cache,
    catalog: Arc<dyn Catalog>,
    watcher: Watcher,
    loopback_alias: Option<String>,
}

// === impl CachingResolver ===

impl CachingResolver {
    pub fn new(catalog: Arc<dyn Catalog>, loopback_alias: Option<String>) -> Self {
        let (events, rx) = mpsc::channel(EVENT_BUFFER);
        let cache = Cache::default();
        tokio::spawn(
            apply_updates(cache.clone(), rx, loopback_alias.clone())
                .instrument(info_span!("catalog_watch")),
        );
        Self {
            cache,
            catalog: catalog.clone(),
            watcher: Watcher::new(catalog, events, WATCH_WAIT),
            loopback_alias,
        }
    }
}

#[async_trait::async_trait]
impl Resolver for CachingResolver {
    async fn resolve(&self, function: &str) -> Result<Vec<String>, ResolveError> {
        let key = cache_key(function);
        if let Some(endpoints) = self.cache.read().get(&key).map(|e| e.endpoints.clone()) {
            trace!(%function, "resolved from cache");
            return Ok(endpoints);
        }

        debug!(%function, "resolving via catalog");
        let response = self
            .catalog
            .service(function, None)
            .await
            .map_err(|e| ResolveError::Discovery(e.to_string()))?;
        let endpoints = format_endpoints(&response.services, self.loopback_alias.as_deref());

        let handle = self.watcher.add(function, key.clone());
        let mut cache = self.cache.write();
        let entry = cache.entry(key).or_insert_with(|| CacheEntry {
            endpoints: endpoints.clone(),
            _handle: handle,
        });
        Ok(entry.endpoints.clone())
    }

    async fn evict(&self, function: &str) {
        // Removing the entry drops its watch handle, so the subscription is
        // gone before the slot can be repopulated by a fresh resolve.
        if self.cache.write().remove(&cache_key(function)).is_some() {
            debug!(%function, "evicted cached endpoints");
        }
    }
}

/// Applies watcher events to the cache. Updates are in-place only: an event
/// for an evicted dependency must not resurrect the entry.
async fn apply_updates(cache: Cache, mut events: mpsc::Receiver<WatchEvent>, alias: Option<String>) {
    while let Some(event) = events.recv().await {
        let endpoints = format_endpoints(&event.services, alias.as_deref());
        match cache.write().get_mut(&event.key) {
            Some(entry) => {
                debug!(key = %event.key, endpoints = endpoints.len(), "service catalog updated");
                entry.endpoints = endpoints;
            }
            None => trace!(key = %event.key, "dropping update for evicted dependency"),
        }
    }
}

fn cache_key(function: &str) -> String {
    format!("catalog.service({function})")
}

fn format_endpoints(services: &[CatalogService], alias: Option<&str>) -> Vec<String> {
    services
        .iter()
        .map(|s| {
            let mut host = if s.service_address.is_empty() {
                s.address.as_str()
            } else {
                s.service_address.as_str()
            };
            if let Some(alias) = alias {
                if host == "127.0.0.1" || host == "localhost" {
                    host = alias;
                }
            }
            format!("http://{}:{}", host, s.service_port)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogError, CatalogResponse, WaitIndex};
    use hyper::StatusCode;
    use parking_lot::Mutex;
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
    };

    struct MockCatalog {
        fetches: Mutex<VecDeque<Result<Vec<CatalogService>, CatalogError>>>,
        fetch_count: AtomicUsize,
        watch_rx: tokio::sync::Mutex<mpsc::Receiver<Vec<CatalogService>>>,
    }

    impl MockCatalog {
        fn new() -> (Arc<Self>, mpsc::Sender<Vec<CatalogService>>) {
            let (tx, rx) = mpsc::channel(8);
            let mock = Arc::new(Self {
                fetches: Mutex::new(VecDeque::new()),
                fetch_count: AtomicUsize::new(0),
                watch_rx: tokio::sync::Mutex::new(rx),
            });
            (mock, tx)
        }

        fn push_fetch(&self, services: Vec<CatalogService>) {
            self.fetches.lock().push_back(Ok(services));
        }

        fn push_fetch_error(&self) {
            self.fetches
                .lock()
                .push_back(Err(CatalogError::Status(StatusCode::INTERNAL_SERVER_ERROR)));
        }

        fn fetches(&self) -> usize {
            self.fetch_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Catalog for MockCatalog {
        async fn service(
            &self,
            _name: &str,
            wait: Option<WaitIndex>,
        ) -> Result<CatalogResponse, CatalogError> {
            match wait {
                None => {
                    self.fetch_count.fetch_add(1, Ordering::SeqCst);
                    let services = self.fetches.lock().pop_front().unwrap_or(Ok(vec![]))?;
                    Ok(CatalogResponse { services, index: 1 })
                }
                Some(_) => {
                    let mut rx = self.watch_rx.lock().await;
                    match rx.recv().await {
                        Some(services) => Ok(CatalogResponse { services, index: 2 }),
                        // Updates exhausted; park like a real blocking query.
                        None => std::future::pending().await,
                    }
                }
            }
        }
    }

    fn service(address: &str, port: u16) -> CatalogService {
        CatalogService {
            node: "node-1".to_string(),
            address: "10.0.0.1".to_string(),
            service_name: "hello".to_string(),
            service_address: address.to_string(),
            service_port: port,
        }
    }

    async fn eventually<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn resolve_installs_and_serves_from_cache() {
        let (catalog, _tx) = MockCatalog::new();
        catalog.push_fetch(vec![service("10.0.0.2", 8080)]);
        let resolver = CachingResolver::new(catalog.clone(), None);

        let endpoints = resolver.resolve("hello").await.unwrap();
        assert_eq!(endpoints, vec!["http://10.0.0.2:8080".to_string()]);

        let endpoints = resolver.resolve("hello").await.unwrap();
        assert_eq!(endpoints, vec!["http://10.0.0.2:8080".to_string()]);
        assert_eq!(catalog.fetches(), 1, "cache hit must not refetch");
    }

    #[tokio::test]
    async fn empty_catalog_result_is_cached_as_no_replicas() {
        let (catalog, _tx) = MockCatalog::new();
        catalog.push_fetch(vec![]);
        let resolver = CachingResolver::new(catalog.clone(), None);

        assert!(resolver.resolve("hello").await.unwrap().is_empty());
        assert!(resolver.resolve("hello").await.unwrap().is_empty());
        assert_eq!(catalog.fetches(), 1);
    }

    #[tokio::test]
    async fn watch_event_rewrites_entry_in_place() {
        let (catalog, tx) = MockCatalog::new();
        catalog.push_fetch(vec![service("10.0.0.2", 8080)]);
        let resolver = CachingResolver::new(catalog.clone(), None);

        assert_eq!(resolver.resolve("hello").await.unwrap().len(), 1);

        tx.send(vec![service("10.0.0.2", 8080), service("10.0.0.3", 8080)])
            .await
            .unwrap();
        eventually(|| cached_len(&resolver) == Some(2)).await;

        // An empty update still installs an empty list.
        tx.send(vec![]).await.unwrap();
        eventually(|| cached_len(&resolver) == Some(0)).await;

        assert_eq!(catalog.fetches(), 1, "watch updates must not refetch");
    }

    fn cached_len(resolver: &CachingResolver) -> Option<usize> {
        resolver
            .cache
            .read()
            .get(&cache_key("hello"))
            .map(|e| e.endpoints.len())
    }

    #[tokio::test]
    async fn evict_forces_a_fresh_catalog_query() {
        let (catalog, _tx) = MockCatalog::new();
        catalog.push_fetch(vec![service("10.0.0.2", 8080)]);
        catalog.push_fetch(vec![service("10.0.0.4", 9090)]);
        let resolver = CachingResolver::new(catalog.clone(), None);

        assert_eq!(
            resolver.resolve("hello").await.unwrap(),
            vec!["http://10.0.0.2:8080".to_string()]
        );

        resolver.evict("hello").await;
        assert_eq!(
            resolver.resolve("hello").await.unwrap(),
            vec!["http://10.0.0.4:9090".to_string()]
        );
        assert_eq!(catalog.fetches(), 2);
    }

    #[tokio::test]
    async fn discovery_errors_surface_to_the_caller() {
        let (catalog, _tx) = MockCatalog::new();
        catalog.push_fetch_error();
        let resolver = CachingResolver::new(catalog.clone(), None);

        let error = resolver.resolve("hello").await.unwrap_err();
        assert!(matches!(error, ResolveError::Discovery(_)));
    }

    #[tokio::test]
    async fn loopback_addresses_are_rewritten_when_configured() {
        let (catalog, _tx) = MockCatalog::new();
        catalog.push_fetch(vec![service("127.0.0.1", 8080)]);
        let resolver =
            CachingResolver::new(catalog.clone(), Some("docker.for.mac.localhost".to_string()));

        assert_eq!(
            resolver.resolve("hello").await.unwrap(),
            vec!["http://docker.for.mac.localhost:8080".to_string()]
        );
    }

    #[test]
    fn cache_keys_match_the_watcher_dependency_string() {
        assert_eq!(cache_key("hello"), "catalog.service(hello)");
    }
}
