//! # Provider Rate Limiter
//!
//! Sliding-window call budget tracking per external provider. Windows are
//! persisted to disk (throttled, atomic rename, restrictive permissions) so
//! limits survive a process restart; on load, timestamps that have fallen out
//! of their window are discarded.
//!
//! Entries are keyed by provider name, optionally refined with a caller
//! identifier (`provider:identifier`). Each key gets its own mutex so
//! concurrent workers checking different providers never contend, and
//! idle keys are garbage-collected to bound memory under many identifiers.

use crate::constants::system;
use crate::error::{Result, ScribeError};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Call budget for one provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimit {
    /// Maximum calls allowed inside the window
    pub max_calls: u32,

    /// Window length in seconds
    pub window_seconds: u64,
}

impl RateLimit {
    pub fn new(max_calls: u32, window_seconds: u64) -> Self {
        Self {
            max_calls,
            window_seconds,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_calls == 0 {
            return Err("max_calls must be greater than 0".to_string());
        }
        if self.window_seconds == 0 {
            return Err("window_seconds must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_calls: 60,
            window_seconds: 60,
        }
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    /// Whether the call may proceed now
    pub allowed: bool,

    /// On denial, time until the oldest in-window call expires
    pub retry_in: Option<Duration>,
}

/// One provider key's sliding window
#[derive(Debug)]
struct WindowEntry {
    /// Epoch timestamps (seconds) of in-window calls
    calls: Vec<f64>,

    /// Window length for this key
    window_seconds: u64,

    /// Last touch, for idle collection
    last_used: Instant,
}

impl WindowEntry {
    fn new(window_seconds: u64) -> Self {
        Self {
            calls: Vec::new(),
            window_seconds,
            last_used: Instant::now(),
        }
    }

    /// Drop timestamps older than the window. Returns pruned count.
    fn prune(&mut self, now: f64) -> usize {
        let cutoff = now - self.window_seconds as f64;
        let before = self.calls.len();
        self.calls.retain(|ts| *ts > cutoff);
        before - self.calls.len()
    }
}

/// Serialized form of one window, matching the on-disk layout
#[derive(Debug, Serialize, Deserialize)]
struct PersistedWindow {
    calls: Vec<f64>,
    window_seconds: u64,
}

/// Sliding-window rate limiter with disk persistence
pub struct RateLimiter {
    /// Per-provider budgets
    limits: HashMap<String, RateLimit>,

    /// Budget applied to providers without an explicit entry
    default_limit: RateLimit,

    /// Window state per key, each behind its own lock
    entries: DashMap<String, Arc<Mutex<WindowEntry>>>,

    /// Where window state is persisted; `None` disables persistence
    state_path: Option<PathBuf>,

    /// Last successful save, for write throttling
    last_save: Mutex<Option<Instant>>,

    /// Minimum interval between saves
    save_interval: Duration,

    /// Idle expiry after which a key's entry is collected
    idle_expiry: Duration,
}

impl RateLimiter {
    pub fn new(limits: HashMap<String, RateLimit>, default_limit: RateLimit) -> Self {
        Self {
            limits,
            default_limit,
            entries: DashMap::new(),
            state_path: None,
            last_save: Mutex::new(None),
            save_interval: Duration::from_secs(system::RATE_LIMIT_SAVE_INTERVAL_SECS),
            idle_expiry: Duration::from_secs(system::RATE_LIMIT_IDLE_EXPIRY_SECS),
        }
    }

    /// Enable persistence at `path`, loading any existing state first.
    pub fn with_persistence(mut self, path: PathBuf) -> Result<Self> {
        if path.exists() {
            self.load_state(&path)?;
        }
        self.state_path = Some(path);
        Ok(self)
    }

    /// Override the save throttle interval (test hook and config override).
    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    /// Override the idle expiry for per-key entries.
    pub fn with_idle_expiry(mut self, expiry: Duration) -> Self {
        self.idle_expiry = expiry;
        self
    }

    fn limit_for(&self, provider: &str) -> RateLimit {
        self.limits
            .get(provider)
            .copied()
            .unwrap_or(self.default_limit)
    }

    fn key_for(provider: &str, identifier: Option<&str>) -> String {
        match identifier {
            Some(id) => format!("{provider}:{id}"),
            None => provider.to_string(),
        }
    }

    fn epoch_now() -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64()
    }

    /// Sliding-window check. On success the call is recorded; on denial the
    /// decision carries the time until the oldest in-window call expires.
    pub fn check_rate_limit(&self, provider: &str, identifier: Option<&str>) -> RateLimitDecision {
        let limit = self.limit_for(provider);
        let key = Self::key_for(provider, identifier);
        let now = Self::epoch_now();

        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(WindowEntry::new(limit.window_seconds))))
            .clone();

        let decision = {
            let mut window = entry.lock();
            window.last_used = Instant::now();
            window.prune(now);

            if window.calls.len() < limit.max_calls as usize {
                window.calls.push(now);
                RateLimitDecision {
                    allowed: true,
                    retry_in: None,
                }
            } else {
                // Oldest in-window call determines when a slot frees up.
                let oldest = window.calls.iter().copied().fold(f64::INFINITY, f64::min);
                let expires_at = oldest + limit.window_seconds as f64;
                let wait = (expires_at - now).max(0.0);
                RateLimitDecision {
                    allowed: false,
                    retry_in: Some(Duration::from_secs_f64(wait)),
                }
            }
        };

        if !decision.allowed {
            debug!(
                provider = provider,
                key = %key,
                retry_in_ms = decision.retry_in.map(|d| d.as_millis() as u64),
                "Rate limit denial"
            );
        }

        self.collect_idle_entries();
        self.maybe_save();

        decision
    }

    /// Wait until the provider budget admits a call, then record it.
    pub async fn acquire(&self, provider: &str, identifier: Option<&str>) {
        loop {
            let decision = self.check_rate_limit(provider, identifier);
            if decision.allowed {
                return;
            }
            let wait = decision.retry_in.unwrap_or(Duration::from_millis(100));
            debug!(
                provider = provider,
                wait_ms = wait.as_millis() as u64,
                "Waiting for rate limit window"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of in-window calls currently recorded for a key.
    pub fn in_window_count(&self, provider: &str, identifier: Option<&str>) -> usize {
        let key = Self::key_for(provider, identifier);
        match self.entries.get(&key) {
            Some(entry) => {
                let mut window = entry.lock();
                let now = Self::epoch_now();
                window.prune(now);
                window.calls.len()
            }
            None => 0,
        }
    }

    /// Drop per-key entries unused longer than the idle expiry.
    fn collect_idle_entries(&self) {
        let expiry = self.idle_expiry;
        self.entries
            .retain(|_, entry| entry.lock().last_used.elapsed() < expiry);
    }

    /// Persist window state if a path is configured and the throttle allows.
    fn maybe_save(&self) {
        let Some(path) = &self.state_path else {
            return;
        };

        {
            let mut last_save = self.last_save.lock();
            if let Some(at) = *last_save {
                if at.elapsed() < self.save_interval {
                    return;
                }
            }
            *last_save = Some(Instant::now());
        }

        if let Err(err) = self.save_state(path) {
            warn!(path = %path.display(), error = %err, "Failed to persist rate limiter state");
        }
    }

    /// Force an immediate save regardless of the throttle (shutdown path).
    pub fn save_now(&self) -> Result<()> {
        match &self.state_path {
            Some(path) => self.save_state(path),
            None => Ok(()),
        }
    }

    fn save_state(&self, path: &Path) -> Result<()> {
        let mut snapshot: HashMap<String, PersistedWindow> = HashMap::new();
        let now = Self::epoch_now();

        for item in self.entries.iter() {
            let mut window = item.value().lock();
            window.prune(now);
            if !window.calls.is_empty() {
                snapshot.insert(
                    item.key().clone(),
                    PersistedWindow {
                        calls: window.calls.clone(),
                        window_seconds: window.window_seconds,
                    },
                );
            }
        }

        let payload = serde_json::to_vec_pretty(&snapshot)?;

        // Write to a sibling temp file and rename so readers never observe a
        // torn write; state carries call patterns, so keep permissions tight.
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, payload)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp_path, path)?;

        debug!(
            path = %path.display(),
            keys = snapshot.len(),
            "Persisted rate limiter state"
        );
        Ok(())
    }

    fn load_state(&mut self, path: &Path) -> Result<()> {
        let raw = fs::read_to_string(path)?;
        let persisted: HashMap<String, PersistedWindow> = serde_json::from_str(&raw)
            .map_err(|e| ScribeError::Validation(format!("Corrupt rate limiter state: {e}")))?;

        let now = Self::epoch_now();
        let mut restored = 0usize;

        for (key, window) in persisted {
            let mut entry = WindowEntry::new(window.window_seconds);
            entry.calls = window.calls;
            entry.prune(now);
            if !entry.calls.is_empty() {
                restored += 1;
                self.entries.insert(key, Arc::new(Mutex::new(entry)));
            }
        }

        info!(
            path = %path.display(),
            keys = restored,
            "Restored rate limiter state"
        );
        Ok(())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limits", &self.limits)
            .field("keys", &self.entries.len())
            .field("state_path", &self.state_path)
            .finish()
    }
}
