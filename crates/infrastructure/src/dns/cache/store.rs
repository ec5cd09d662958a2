use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use hickory_proto::op::Query;
use spuddns_application::ports::{
    CachePersistence, DnsQueryClient, ExpireCallback, MetricsSink, ResponseCache,
};
use spuddns_domain::{question_cache_key, DnsQuery, DnsResponse, DomainError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::time::delay_queue::{DelayQueue, Key as TimerKey};
use tracing::{debug, warn};

use super::entry::CacheEntry;

/// How far ahead of natural expiry the expire callback fires.
const EXPIRE_LEAD: Duration = Duration::from_secs(10);

enum TimerCmd {
    Schedule {
        key: String,
        question: Query,
        response: DnsResponse,
        fire_in: Duration,
    },
    Cancel {
        key: String,
    },
}

struct CacheInner {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    callback: RwLock<Option<ExpireCallback>>,
    metrics: Arc<dyn MetricsSink>,
}

/// The shared response cache: a readers-writer-locked map of serialized
/// entries plus one timer task that drives the expire callback.
///
/// Writes are whole-value replacements, so the best-effort hit counting on
/// the read path can race without corrupting an entry. Two concurrent misses
/// on the same key may both resolve upstream; the last writer wins.
#[derive(Clone)]
pub struct SpudCache {
    inner: Arc<CacheInner>,
    timer_tx: mpsc::UnboundedSender<TimerCmd>,
}

impl SpudCache {
    pub fn new(metrics: Arc<dyn MetricsSink>, shutdown: CancellationToken) -> Arc<Self> {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let cache = Arc::new(Self {
            inner: Arc::new(CacheInner {
                entries: RwLock::new(HashMap::new()),
                callback: RwLock::new(None),
                metrics,
            }),
            timer_tx,
        });

        tokio::spawn(run_expire_timers(cache.as_ref().clone(), timer_rx, shutdown));
        cache
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    /// Inserts a pre-serialized blob. Used by persistence restore; tests use
    /// it to plant hostile data.
    pub fn insert_raw(&self, key: &str, value: Vec<u8>) {
        self.write_entries().insert(key.to_string(), value);
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<u8>>> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<u8>>> {
        self.inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_key(&self, key: &str) {
        self.write_entries().remove(key);
        let _ = self.timer_tx.send(TimerCmd::Cancel {
            key: key.to_string(),
        });
    }

    /// Hit count currently recorded for a key, zero when absent.
    pub fn request_count(&self, key: &str) -> u32 {
        let raw = match self.read_entries().get(key) {
            Some(raw) => raw.clone(),
            None => return 0,
        };
        serde_json::from_slice::<CacheEntry>(&raw)
            .map(|entry| entry.request_count)
            .unwrap_or(0)
    }

    fn get_response(&self, question: &Query) -> Result<Option<DnsResponse>, DomainError> {
        let key = question_cache_key(question);

        let raw = match self.read_entries().get(&key) {
            Some(raw) => raw.clone(),
            None => return Ok(None),
        };

        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                // A blob that does not decode is evicted, never served.
                self.remove_key(&key);
                return Err(DomainError::CacheSerde(e.to_string()));
            }
        };

        if entry.is_expired() {
            self.remove_key(&key);
            return Ok(None);
        }

        let mut response = DnsResponse::from_answers(&entry.answers).map_err(|e| {
            self.remove_key(&key);
            DomainError::CacheSerde(e.to_string())
        })?;
        response.from_cache = true;
        response.expires = Some(entry.expires);
        response.resolver = if entry.resolver.is_empty() {
            None
        } else {
            Some(entry.resolver.clone())
        };

        // Count the hit off the hot path; the whole-value write makes the
        // race with other readers harmless.
        let mut counted = entry;
        counted.request_count += 1;
        let store = self.clone();
        tokio::spawn(async move {
            if let Ok(raw) = serde_json::to_vec(&counted) {
                store.write_entries().insert(key, raw);
            }
        });

        Ok(Some(response))
    }

    fn fire_expired(&self, key: String, question: Query, response: DnsResponse) {
        let callback = self
            .inner
            .callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(callback) = callback else {
            return;
        };

        // User logic runs in its own task, holding no cache lock.
        let store = self.clone();
        tokio::spawn(async move {
            let retrieve_count = store.request_count(&key);
            let handle: Arc<dyn ResponseCache> = Arc::new(store.clone());
            let keep = callback(question, response, retrieve_count, handle).await;
            if !keep {
                store.remove_key(&key);
            }
        });
    }
}

#[async_trait]
impl DnsQueryClient for SpudCache {
    async fn query_dns(&self, query: &DnsQuery) -> Result<Option<DnsResponse>, DomainError> {
        let started = Instant::now();
        let question = query
            .first_question()
            .ok_or_else(|| DomainError::InvalidQuery("query question was missing".into()))?;

        debug!(qname = %question.name(), "attempting to resolve from cache");
        let result = self.get_response(question);
        self.inner.metrics.observe_cache_read(started.elapsed());
        result
    }
}

impl ResponseCache for SpudCache {
    fn cache_response(
        &self,
        question: &Query,
        response: &DnsResponse,
    ) -> Result<(), DomainError> {
        if response.is_empty() {
            return Ok(());
        }

        let key = question_cache_key(question);
        let entry = CacheEntry {
            answers: response.answers()?,
            expires: response.expires.unwrap_or_else(Utc::now),
            request_count: 0,
            resolver: response.resolver.clone().unwrap_or_default(),
        };

        let raw = serde_json::to_vec(&entry).map_err(|e| DomainError::CacheSerde(e.to_string()))?;
        self.write_entries().insert(key.clone(), raw);

        let has_callback = self
            .inner
            .callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if has_callback {
            let fire_in = response.ttl().saturating_sub(EXPIRE_LEAD);
            let _ = self.timer_tx.send(TimerCmd::Schedule {
                key,
                question: question.clone(),
                response: response.clone(),
                fire_in,
            });
        }

        Ok(())
    }

    fn set_expire_callback(&self, callback: ExpireCallback) {
        *self
            .inner
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn remove(&self, question: &Query) {
        self.remove_key(&question_cache_key(question));
    }

    fn as_dns_client(self: Arc<Self>) -> Arc<dyn DnsQueryClient> {
        self
    }
}

impl CachePersistence for SpudCache {
    fn persist(&self, path: &str) -> Result<(), DomainError> {
        let mut decoded: HashMap<String, CacheEntry> = HashMap::new();
        {
            let entries = self.read_entries();
            for (key, raw) in entries.iter() {
                match serde_json::from_slice::<CacheEntry>(raw) {
                    Ok(entry) if !entry.is_expired() => {
                        decoded.insert(key.clone(), entry);
                    }
                    _ => {}
                }
            }
        }

        let data =
            serde_json::to_vec(&decoded).map_err(|e| DomainError::CacheSerde(e.to_string()))?;
        std::fs::write(path, data).map_err(|e| DomainError::IoError(e.to_string()))
    }

    fn restore(&self, path: &str) -> Result<(), DomainError> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(DomainError::IoError(e.to_string())),
        };

        let decoded: HashMap<String, CacheEntry> =
            serde_json::from_slice(&data).map_err(|e| DomainError::CacheSerde(e.to_string()))?;

        let mut restored = 0usize;
        for (key, entry) in decoded {
            if entry.is_expired() {
                continue;
            }
            if let Ok(raw) = serde_json::to_vec(&entry) {
                self.insert_raw(&key, raw);
                restored += 1;
            }
        }

        debug!(restored, "restored cache entries from disk");
        Ok(())
    }
}

async fn run_expire_timers(
    store: SpudCache,
    mut rx: mpsc::UnboundedReceiver<TimerCmd>,
    shutdown: CancellationToken,
) {
    let mut queue: DelayQueue<String> = DelayQueue::new();
    let mut pending: HashMap<String, (TimerKey, Query, DnsResponse)> = HashMap::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("expire timer task stopped");
                break;
            }
            cmd = rx.recv() => match cmd {
                Some(TimerCmd::Schedule { key, question, response, fire_in }) => {
                    if let Some((old, _, _)) = pending.remove(&key) {
                        queue.try_remove(&old);
                    }
                    let timer_key = queue.insert(key.clone(), fire_in);
                    pending.insert(key, (timer_key, question, response));
                }
                Some(TimerCmd::Cancel { key }) => {
                    if let Some((timer_key, _, _)) = pending.remove(&key) {
                        queue.try_remove(&timer_key);
                    }
                }
                None => break,
            },
            expired = futures::future::poll_fn(|cx| queue.poll_expired(cx)), if !queue.is_empty() => {
                let Some(expired) = expired else { continue };
                let key = expired.into_inner();
                if let Some((_, question, response)) = pending.remove(&key) {
                    store.fire_expired(key, question, response);
                } else {
                    warn!(key = %key, "expire timer fired for unknown entry");
                }
            }
        }
    }
}
