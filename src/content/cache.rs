//! Content Cache
//! Mission: One shared content snapshot with TTL and change-detection polling
//!
//! The cache is an explicit service object: it owns the snapshot, the
//! committed fingerprint and the subscriber list, and is passed by reference
//! from the application root. Loads are serialized through an async mutex so
//! concurrent callers observe one fetch instead of issuing their own. The
//! background fingerprint poll lives exactly as long as at least one
//! subscriber is registered.

use crate::clock::Clock;
use crate::content::models::{PortfolioData, SiteCopy};
use crate::store::{ContentTable, LocalStateStore, RecordStore};
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Snapshot age beyond which a non-forced load refetches.
pub const CACHE_TTL_MS: i64 = 5 * 60 * 1000;
/// Fingerprint poll cadence.
const POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Delay before the first fingerprint check.
const POLL_INITIAL_DELAY: Duration = Duration::from_secs(2);

/// Persisted mirror entry names.
const KEY_DATA: &str = "portfolio_data";
const KEY_VERSION: &str = "portfolio_data_version";
const KEY_LAST_FETCH: &str = "portfolio_last_fetch";

/// What subscribers observe.
#[derive(Debug, Clone, Default)]
pub struct ContentSnapshot {
    pub data: PortfolioData,
    pub error: Option<String>,
    pub is_loading: bool,
}

struct CacheState {
    data: PortfolioData,
    error: Option<String>,
    last_fetch_ms: i64,
    fingerprint: String,
}

/// Subscriber count and poll task handle share one lock, so starting the
/// task and tearing it down are atomic with the count they depend on.
#[derive(Default)]
struct PollState {
    subscribers: usize,
    task: Option<JoinHandle<()>>,
}

pub struct ContentCache {
    store: Arc<dyn RecordStore>,
    local: Arc<LocalStateStore>,
    clock: Arc<dyn Clock>,
    state: RwLock<CacheState>,
    /// Serializes loads so a second caller rides on the first fetch.
    load_gate: tokio::sync::Mutex<()>,
    snapshot_tx: watch::Sender<ContentSnapshot>,
    poll: Mutex<PollState>,
}

impl ContentCache {
    pub fn new(
        store: Arc<dyn RecordStore>,
        local: Arc<LocalStateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (snapshot_tx, _rx) = watch::channel(ContentSnapshot {
            is_loading: true,
            ..ContentSnapshot::default()
        });
        Self {
            store,
            local,
            clock,
            state: RwLock::new(CacheState {
                data: PortfolioData::default(),
                error: None,
                last_fetch_ms: 0,
                fingerprint: String::new(),
            }),
            load_gate: tokio::sync::Mutex::new(()),
            snapshot_tx,
            poll: Mutex::new(PollState::default()),
        }
    }

    fn publish(&self, is_loading: bool) {
        let state = self.state.read();
        self.snapshot_tx.send_replace(ContentSnapshot {
            data: state.data.clone(),
            error: state.error.clone(),
            is_loading,
        });
    }

    /// The last committed fingerprint, empty before the first load.
    pub fn committed_fingerprint(&self) -> String {
        self.state.read().fingerprint.clone()
    }

    /// Age of the in-memory snapshot in milliseconds.
    pub fn age_ms(&self) -> i64 {
        let last_fetch = self.state.read().last_fetch_ms;
        if last_fetch == 0 {
            i64::MAX
        } else {
            self.clock.now_ms() - last_fetch
        }
    }

    /// Load the aggregate snapshot.
    ///
    /// Without `force`, a fresh all-essential snapshot in memory or in the
    /// persisted mirror is returned as-is. Otherwise every content domain is
    /// fetched in parallel, the aggregate validated and committed to both
    /// tiers together with a fresh fingerprint.
    pub async fn load(&self, force: bool) -> Result<PortfolioData> {
        let _gate = self.load_gate.lock().await;

        if !force {
            let now = self.clock.now_ms();
            {
                let state = self.state.read();
                if state.data.has_essential() && now - state.last_fetch_ms < CACHE_TTL_MS {
                    debug!("Content still fresh, skipping fetch");
                    return Ok(state.data.clone());
                }
            }

            if let Some((data, last_fetch_ms)) = self.read_mirror() {
                debug!("Hydrating content from the persisted mirror");
                let fingerprint = self
                    .local
                    .get(KEY_VERSION)
                    .ok()
                    .flatten()
                    .unwrap_or_default();
                {
                    let mut state = self.state.write();
                    state.data = data.clone();
                    state.last_fetch_ms = last_fetch_ms;
                    state.fingerprint = fingerprint;
                    state.error = None;
                }
                self.publish(false);
                return Ok(data);
            }
        }

        self.publish(true);
        info!("Fetching portfolio content (force: {})", force);

        let (config, skills, projects) = tokio::join!(
            self.store.active_site_config(),
            self.store.active_skills(),
            self.store.active_projects(),
        );

        let assembled: Result<PortfolioData> = (|| {
            let copy = SiteCopy::from_records(config?);
            Ok(PortfolioData {
                personal: copy.personal,
                about: copy.about,
                contact: copy.contact,
                why_choose_me: copy.why_choose_me,
                skills: skills?,
                projects: projects?,
            })
        })();

        let data = match assembled {
            Ok(data) if data.has_essential() => data,
            Ok(_) => {
                let message = "Essential portfolio data missing".to_string();
                self.state.write().error = Some(message.clone());
                self.publish(false);
                anyhow::bail!(message);
            }
            Err(e) => {
                self.state.write().error = Some("Failed to load portfolio data".to_string());
                self.publish(false);
                return Err(e).context("Content fetch failed");
            }
        };

        let now = self.clock.now_ms();
        let fingerprint = match self.current_fingerprint().await {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                warn!("Fingerprint computation failed, using timestamp: {}", e);
                now.to_string()
            }
        };

        {
            let mut state = self.state.write();
            state.data = data.clone();
            state.last_fetch_ms = now;
            state.fingerprint = fingerprint.clone();
            state.error = None;
        }
        self.write_mirror(&data, now, &fingerprint);
        self.publish(false);

        info!("Portfolio content committed (fingerprint: {})", fingerprint);
        Ok(data)
    }

    /// Short fingerprint over the latest modification timestamps of the
    /// watched tables. Staleness detection only, no security property.
    pub async fn current_fingerprint(&self) -> Result<String> {
        let (config, skills, projects) = tokio::join!(
            self.store.latest_content_update(ContentTable::SiteConfig),
            self.store.latest_content_update(ContentTable::Skills),
            self.store.latest_content_update(ContentTable::Projects),
        );

        let timestamps: Vec<String> = [config?, skills?, projects?]
            .into_iter()
            .flatten()
            .collect();
        let encoded = BASE64.encode(timestamps.join("|").as_bytes());
        Ok(encoded.chars().take(16).collect())
    }

    /// One fingerprint comparison; reloads when the remote content changed.
    pub async fn poll_once(&self) {
        let committed = self.committed_fingerprint();
        if committed.is_empty() {
            return;
        }
        match self.current_fingerprint().await {
            Ok(current) if current != committed => {
                info!("Content fingerprint changed, reloading");
                if let Err(e) = self.load(true).await {
                    warn!("Background reload failed: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Fingerprint poll failed: {}", e),
        }
    }

    /// Drop the snapshot, the persisted mirror and the committed fingerprint.
    /// The next `load` refetches.
    pub fn clear(&self) {
        if let Err(e) = self
            .local
            .delete_many(&[KEY_DATA, KEY_VERSION, KEY_LAST_FETCH])
        {
            warn!("Failed to clear persisted content mirror: {}", e);
        }
        {
            let mut state = self.state.write();
            state.data = PortfolioData::default();
            state.error = None;
            state.last_fetch_ms = 0;
            state.fingerprint = String::new();
        }
        self.publish(true);
        info!("Content cache cleared");
    }

    /// Register a consumer. The poll task starts with the first subscriber
    /// and stops when the last subscription is dropped.
    pub fn subscribe(cache: &Arc<Self>) -> CacheSubscription {
        let receiver = cache.snapshot_tx.subscribe();

        {
            let mut poll = cache.poll.lock();
            poll.subscribers += 1;
            if poll.task.is_none() {
                let poller = Arc::clone(cache);
                poll.task = Some(tokio::spawn(async move {
                    sleep(POLL_INITIAL_DELAY).await;
                    loop {
                        poller.poll_once().await;
                        sleep(POLL_INTERVAL).await;
                    }
                }));
                debug!("Content poll task started");
            }
        }

        CacheSubscription {
            receiver,
            _guard: PollGuard {
                cache: Arc::clone(cache),
            },
        }
    }

    fn read_mirror(&self) -> Option<(PortfolioData, i64)> {
        let raw = self.local.get(KEY_DATA).ok().flatten()?;
        let last_fetch_ms = self
            .local
            .get(KEY_LAST_FETCH)
            .ok()
            .flatten()?
            .parse::<i64>()
            .ok()?;

        if self.clock.now_ms() - last_fetch_ms >= CACHE_TTL_MS {
            return None;
        }

        let data: PortfolioData = serde_json::from_str(&raw).ok()?;
        data.has_essential().then_some((data, last_fetch_ms))
    }

    fn write_mirror(&self, data: &PortfolioData, now_ms: i64, fingerprint: &str) {
        let serialized = match serde_json::to_string(data) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!("Failed to serialize content mirror: {}", e);
                return;
            }
        };
        let result = self
            .local
            .set(KEY_DATA, &serialized, CACHE_TTL_MS)
            .and_then(|_| self.local.set(KEY_LAST_FETCH, &now_ms.to_string(), CACHE_TTL_MS))
            .and_then(|_| self.local.set(KEY_VERSION, fingerprint, CACHE_TTL_MS));
        if let Err(e) = result {
            // The in-memory snapshot stays authoritative.
            warn!("Failed to persist content mirror: {}", e);
        }
    }
}

/// Handle tying a consumer to the cache; dropping the last one stops the poll.
pub struct CacheSubscription {
    pub receiver: watch::Receiver<ContentSnapshot>,
    _guard: PollGuard,
}

struct PollGuard {
    cache: Arc<ContentCache>,
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        let mut poll = self.cache.poll.lock();
        poll.subscribers -= 1;
        if poll.subscribers == 0 {
            if let Some(handle) = poll.task.take() {
                handle.abort();
                debug!("Content poll task stopped");
            }
        }
    }
}
