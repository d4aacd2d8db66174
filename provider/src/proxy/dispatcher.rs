use super::{
    balance::{Strategy, StrategyKind},
    breaker::{Breaker, BreakerConfig},
    client::{CallError, UpstreamCall, UpstreamResponse},
};
use ahash::AHashMap as HashMap;
use bytes::Bytes;
use hyper::header::HeaderMap;
use parking_lot::{Mutex, RwLock};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// End-to-end deadline per upstream attempt.
    pub timeout: Duration,
    /// Retry budget when the endpoint set is large enough.
    pub retries: usize,
    /// Base of the exponential backoff between attempts.
    pub backoff_base: Duration,
    pub breaker: BreakerConfig,
    /// Idle lifetime of a per-function entry.
    pub entry_idle: Duration,
    /// How often idle entries are swept out.
    pub sweep_interval: Duration,
    pub strategy: StrategyKind,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 5,
            backoff_base: Duration::from_secs(2),
            breaker: BreakerConfig::default(),
            entry_idle: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            strategy: StrategyKind::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no endpoints available")]
    NoEndpoints,

    #[error("circuit open")]
    CircuitOpen,

    #[error("{0}")]
    Upstream(String),
}

/// Per-function load-balancing state: the strategy, a breaker per endpoint
/// URL, and the endpoint snapshot the strategy indexes into.
struct Entry {
    strategy: Mutex<Box<dyn Strategy>>,
    breakers: Mutex<HashMap<String, Arc<Breaker>>>,
    endpoints: RwLock<Arc<Vec<String>>>,
    last_used: Mutex<Instant>,
}

// === impl Entry ===

impl Entry {
    fn new(strategy: Box<dyn Strategy>) -> Self {
        Self {
            strategy: Mutex::new(strategy),
            breakers: Mutex::new(HashMap::default()),
            endpoints: RwLock::new(Arc::new(Vec::new())),
            last_used: Mutex::new(Instant::now()),
        }
    }

    /// Replaces the endpoint snapshot when resolution has moved on, dropping
    /// breakers for endpoints that no longer exist.
    fn sync_endpoints(&self, endpoints: &[String]) -> Arc<Vec<String>> {
        {
            let current = self.endpoints.read();
            if current.as_slice() == endpoints {
                return current.clone();
            }
        }
        let mut current = self.endpoints.write();
        if current.as_slice() != endpoints {
            *current = Arc::new(endpoints.to_vec());
            self.breakers
                .lock()
                .retain(|url, _| endpoints.iter().any(|e| e == url));
        }
        current.clone()
    }

    fn breaker(&self, address: &str, config: &BreakerConfig) -> Arc<Breaker> {
        self.breakers
            .lock()
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(Breaker::new(config.clone())))
            .clone()
    }
}

/// Routes one invocation to one endpoint of a function, guarded by a
/// per-endpoint breaker and retried across the endpoint set with
/// exponential backoff.
///
/// Retried attempts re-consult the strategy, so retries are never pinned to
/// the endpoint that just failed. The budget gives at-least-once semantics
/// across endpoints; non-idempotent functions must guard themselves.
pub struct Dispatcher {
    entries: Mutex<HashMap<String, Arc<Entry>>>,
    client: Arc<dyn UpstreamCall>,
    config: DispatcherConfig,
}

// === impl Dispatcher ===

impl Dispatcher {
    pub fn new(client: Arc<dyn UpstreamCall>, config: DispatcherConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::default()),
            client,
            config,
        }
    }

    /// Sweeps idle entries on an interval. Holds only a weak handle so the
    /// janitor dies with the dispatcher.
    pub fn spawn_janitor(self: Arc<Self>) {
        let interval = self.config.sweep_interval;
        let dispatcher = Arc::downgrade(&self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(dispatcher) = dispatcher.upgrade() else {
                    return;
                };
                dispatcher.sweep();
            }
        });
    }

    fn sweep(&self) {
        let idle = self.config.entry_idle;
        self.entries
            .lock()
            .retain(|_, entry| entry.last_used.lock().elapsed() < idle);
    }

    pub async fn dispatch(
        &self,
        function: &str,
        endpoints: &[String],
        query: Option<&str>,
        body: Bytes,
        headers: &HeaderMap,
    ) -> Result<UpstreamResponse, DispatchError> {
        if endpoints.is_empty() {
            return Err(DispatchError::NoEndpoints);
        }

        let entry = self.entry(function);
        let snapshot = entry.sync_endpoints(endpoints);
        let count = snapshot.len();

        // With few endpoints there is no point burning the full budget on
        // hosts that were already tried.
        let retries = if count <= self.config.retries {
            count.saturating_sub(1).max(1)
        } else {
            self.config.retries
        };

        let mut last_error = None;
        let mut last_response: Option<UpstreamResponse> = None;
        for attempt in 0..=retries {
            if attempt > 0 {
                let exponent = (attempt - 1).min(16) as u32;
                tokio::time::sleep(self.config.backoff_base * 2u32.pow(exponent)).await;
            }

            let address = {
                let index = entry.strategy.lock().next_index(count);
                snapshot[index].clone()
            };
            let breaker = entry.breaker(&address, &self.config.breaker);
            if let Err(error) = breaker.admit() {
                debug!(%function, %address, %error, "attempt rejected");
                last_error = Some(DispatchError::CircuitOpen);
                continue;
            }

            let call = self.client.call(&address, query, body.clone(), headers);
            match tokio::time::timeout(self.config.timeout, call).await {
                Err(_) => {
                    breaker.record(false);
                    warn!(%function, %address, "upstream call timed out");
                    last_error = Some(DispatchError::Upstream(format!(
                        "request to {} timed out after {:?}",
                        address, self.config.timeout
                    )));
                }
                Ok(Err(CallError(error))) => {
                    breaker.record(false);
                    warn!(%function, %address, %error, "upstream call failed");
                    last_error = Some(DispatchError::Upstream(error));
                }
                Ok(Ok(response)) => {
                    if response.status.is_server_error() {
                        // A 5xx consumes a retry; the final one is mirrored
                        // verbatim once the budget runs out.
                        breaker.record(false);
                        warn!(%function, %address, status = %response.status, "upstream error response");
                        last_response = Some(response);
                    } else {
                        // 2xx flows back; a 4xx is the function's answer and
                        // is never retried.
                        breaker.record(true);
                        return Ok(response);
                    }
                }
            }
        }

        if let Some(response) = last_response {
            return Ok(response);
        }
        Err(last_error.unwrap_or(DispatchError::CircuitOpen))
    }

    fn entry(&self, function: &str) -> Arc<Entry> {
        let entry = self
            .entries
            .lock()
            .entry(function.to_string())
            .or_insert_with(|| Arc::new(Entry::new(self.config.strategy.build())))
            .clone();
        *entry.last_used.lock() = Instant::now();
        entry
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }
}
