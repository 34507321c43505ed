use std::{
    collections::VecDeque,
    fmt::{Debug, Formatter},
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, warn_span};

use crate::{ChainCommunicationError, ChainResult};

/// Default number of distinct endpoint selections per call.
pub const DEFAULT_MAX_RETRIES: usize = 3;
/// Default deadline for a single attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
/// How many usage outcomes are kept per endpoint.
const USAGE_HISTORY_LEN: usize = 50;

/// One recorded call against an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Unix timestamp in seconds
    pub timestamp: u64,
    /// Whether the call succeeded
    pub success: bool,
    /// Wall time of the attempt in milliseconds
    pub latency_ms: u64,
}

/// Serializable view of an endpoint, used for persistence and the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// Endpoint URL
    pub url: String,
    /// Current reputation
    pub reputation: u64,
    /// Whether it came from configuration
    pub primary: bool,
    /// Whether a liveness probe succeeded
    pub tested: bool,
    /// Recent outcomes, oldest first
    #[serde(default)]
    pub usage: Vec<UsageRecord>,
}

/// A single endpoint of the pool.
pub struct Endpoint<T> {
    /// Endpoint URL
    pub url: String,
    client: T,
    reputation: AtomicU64,
    primary: bool,
    tested: AtomicBool,
    usage: Mutex<VecDeque<UsageRecord>>,
}

impl<T> Endpoint<T> {
    fn new(url: String, client: T, primary: bool) -> Self {
        Self {
            url,
            client,
            reputation: AtomicU64::new(0),
            primary,
            tested: AtomicBool::new(false),
            usage: Mutex::new(VecDeque::with_capacity(USAGE_HISTORY_LEN)),
        }
    }

    /// Current reputation.
    pub fn reputation(&self) -> u64 {
        self.reputation.load(Ordering::Relaxed)
    }

    /// Whether this endpoint came from configuration.
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Whether a liveness probe succeeded.
    pub fn is_tested(&self) -> bool {
        self.tested.load(Ordering::Relaxed)
    }

    fn reward(&self) {
        self.reputation.fetch_add(1, Ordering::Relaxed);
    }

    fn penalize(&self) {
        // saturate at zero
        let _ = self
            .reputation
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |r| {
                Some(r.saturating_sub(1))
            });
    }

    fn record(&self, success: bool, latency: Duration) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let mut usage = self.usage.lock();
        if usage.len() == USAGE_HISTORY_LEN {
            usage.pop_front();
        }
        usage.push_back(UsageRecord {
            timestamp,
            success,
            latency_ms: latency.as_millis() as u64,
        });
    }

    /// Serializable snapshot.
    pub fn info(&self) -> EndpointInfo {
        EndpointInfo {
            url: self.url.clone(),
            reputation: self.reputation(),
            primary: self.primary,
            tested: self.is_tested(),
            usage: self.usage.lock().iter().copied().collect(),
        }
    }
}

impl<T> Debug for Endpoint<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url)
            .field("reputation", &self.reputation())
            .field("primary", &self.primary)
            .finish()
    }
}

/// How the pool picks an endpoint for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Uniformly at random among endpoints not tried yet in this call
    Random,
    /// Advance a shared round-robin index
    RoundRobin,
}

/// Tunables of the pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Distinct selections per call
    pub max_retries: usize,
    /// Deadline of a single attempt
    pub attempt_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

struct PoolInner<T> {
    name: String,
    endpoints: RwLock<Vec<Arc<Endpoint<T>>>>,
    next: AtomicUsize,
    closed: AtomicBool,
    config: PoolConfig,
}

/// A set of endpoints for one chain. Every call picks an endpoint, runs the
/// operation under a deadline and moves on to another endpoint on failure.
pub struct RpcPool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for RpcPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for RpcPool<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcPool")
            .field("name", &self.inner.name)
            .field(
                "endpoints",
                &self.inner.endpoints.read().iter().map(|e| &e.url).join(", "),
            )
            .finish()
    }
}

/// Boxed future returned by pool operations.
pub type PoolFuture<V> = Pin<Box<dyn Future<Output = ChainResult<V>> + Send>>;

impl<T> RpcPool<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Convenience method for creating a `RpcPoolBuilder`
    pub fn builder(name: impl Into<String>) -> RpcPoolBuilder<T> {
        RpcPoolBuilder::new(name)
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of endpoints.
    pub fn len(&self) -> usize {
        self.inner.endpoints.read().len()
    }

    /// Whether the pool has no endpoints.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Add an endpoint at runtime. It starts untested with zero reputation.
    /// Returns false if the URL is already known.
    pub fn add_endpoint(&self, url: impl Into<String>, client: T) -> bool {
        let url = url.into();
        let mut endpoints = self.inner.endpoints.write();
        if endpoints.iter().any(|e| e.url == url) {
            return false;
        }
        info!(pool = %self.inner.name, %url, "Adding endpoint to pool");
        endpoints.push(Arc::new(Endpoint::new(url, client, false)));
        true
    }

    /// Restore the reputation and tested flag of a known endpoint.
    pub fn restore(&self, info: &EndpointInfo) {
        if let Some(endpoint) = self.find(&info.url) {
            endpoint.reputation.store(info.reputation, Ordering::Relaxed);
            endpoint.tested.store(info.tested, Ordering::Relaxed);
        }
    }

    /// Mark an endpoint as having passed a liveness probe.
    pub fn mark_tested(&self, url: &str, tested: bool) {
        if let Some(endpoint) = self.find(url) {
            endpoint.tested.store(tested, Ordering::Relaxed);
        }
    }

    /// Whether `url` is already part of the pool.
    pub fn contains(&self, url: &str) -> bool {
        self.find(url).is_some()
    }

    fn find(&self, url: &str) -> Option<Arc<Endpoint<T>>> {
        self.inner
            .endpoints
            .read()
            .iter()
            .find(|e| e.url == url)
            .cloned()
    }

    /// Snapshot of every endpoint, in pool order.
    pub fn endpoints(&self) -> Vec<EndpointInfo> {
        self.inner.endpoints.read().iter().map(|e| e.info()).collect()
    }

    /// Advance the round-robin index so the next `call_rpc` uses another endpoint.
    pub fn rotate(&self) {
        let previous = self.inner.next.fetch_add(1, Ordering::AcqRel);
        debug!(pool = %self.inner.name, previous, "Rotated endpoint");
    }

    /// Drop every endpoint. Safe to call more than once.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.endpoints.write().clear();
        info!(pool = %self.inner.name, "Closed rpc pool");
    }

    /// Run `f` against randomly selected endpoints.
    pub async fn call_eth<V>(&self, f: impl FnMut(T) -> PoolFuture<V>) -> ChainResult<V> {
        self.call_with(Selection::Random, f).await.map(|(v, _)| v)
    }

    /// Run `f` against endpoints in round-robin order.
    pub async fn call_rpc<V>(&self, f: impl FnMut(T) -> PoolFuture<V>) -> ChainResult<V> {
        self.call_with(Selection::RoundRobin, f).await.map(|(v, _)| v)
    }

    /// Run `f` and also return the URL of the endpoint that served it.
    pub async fn call_with<V>(
        &self,
        selection: Selection,
        mut f: impl FnMut(T) -> PoolFuture<V>,
    ) -> ChainResult<(V, String)> {
        let mut tried: Vec<String> = Vec::new();
        let mut last_error = None;

        for attempt in 0..self.inner.config.max_retries.max(1) {
            let Some(endpoint) = self.select(selection, &tried) else {
                break;
            };
            tried.push(endpoint.url.clone());

            let started = Instant::now();
            let result =
                match tokio::time::timeout(self.inner.config.attempt_timeout, f(endpoint.client.clone()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ChainCommunicationError::Timeout(
                        self.inner.config.attempt_timeout,
                    )),
                };
            endpoint.record(result.is_ok(), started.elapsed());

            match result {
                Ok(value) => {
                    endpoint.reward();
                    return Ok((value, endpoint.url.clone()));
                }
                Err(error) => {
                    endpoint.penalize();
                    let _span = warn_span!(
                        "RpcPool::call",
                        pool = %self.inner.name,
                        attempt,
                        url = %endpoint.url,
                    )
                    .entered();
                    warn!(?error, "Got error from pool endpoint");
                    if matches!(error, ChainCommunicationError::Cancelled) {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or(ChainCommunicationError::NoClients))
    }

    fn select(&self, selection: Selection, tried: &[String]) -> Option<Arc<Endpoint<T>>> {
        if self.is_closed() {
            return None;
        }
        let endpoints = self.inner.endpoints.read();
        if endpoints.is_empty() {
            return None;
        }
        match selection {
            Selection::RoundRobin => {
                let index = self.inner.next.fetch_add(1, Ordering::AcqRel) % endpoints.len();
                Some(endpoints[index].clone())
            }
            Selection::Random => {
                let untried: Vec<&Arc<Endpoint<T>>> = endpoints
                    .iter()
                    .filter(|e| !tried.contains(&e.url))
                    .collect();
                let mut rng = rand::thread_rng();
                if untried.is_empty() {
                    let index = rng.gen_range(0..endpoints.len());
                    Some(endpoints[index].clone())
                } else {
                    let index = rng.gen_range(0..untried.len());
                    Some(untried[index].clone())
                }
            }
        }
    }
}

/// Builder to create a new rpc pool.
pub struct RpcPoolBuilder<T> {
    name: String,
    endpoints: Vec<(String, T, bool)>,
    config: PoolConfig,
}

impl<T> RpcPoolBuilder<T> {
    /// Start an empty builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoints: Vec::new(),
            config: PoolConfig::default(),
        }
    }

    /// Add a configured endpoint.
    pub fn add_primary(mut self, url: impl Into<String>, client: T) -> Self {
        self.endpoints.push((url.into(), client, true));
        self
    }

    /// Add an endpoint discovered at runtime or loaded from disk.
    pub fn add_secondary(mut self, url: impl Into<String>, client: T) -> Self {
        self.endpoints.push((url.into(), client, false));
        self
    }

    /// Override the tunables.
    pub fn with_config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Create the pool. Duplicate URLs keep their first occurrence.
    pub fn build(self) -> RpcPool<T> {
        let endpoints = self
            .endpoints
            .into_iter()
            .unique_by(|(url, _, _)| url.clone())
            .map(|(url, client, primary)| Arc::new(Endpoint::new(url, client, primary)))
            .collect();
        RpcPool {
            inner: Arc::new(PoolInner {
                name: self.name,
                endpoints: RwLock::new(endpoints),
                next: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                config: self.config,
            }),
        }
    }
}
