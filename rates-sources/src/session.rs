//! Session pool for the rate-limited market-data vendor.
//!
//! A fixed set of pseudo-identities is rotated through a queue. A single
//! adaptive delay paces every checkout. It grows on rate-limit failures and
//! shrinks after a sustained run of successes.

use rand::seq::IndexedRandom;
use rates_types::{SessionPoolStats, SessionStats};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// Client signatures rotated across sessions.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

/// Exponent cap for the block backoff; far beyond any sane cooldown cap.
const MAX_BACKOFF_EXPONENT: u64 = 16;

/// Tuning knobs for the pool.
#[derive(Debug, Clone)]
pub struct SessionPoolConfig {
    pub pool_size: usize,
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub initial_interval: Duration,
    /// First rate-limit block length before doubling.
    pub base_cooldown: Duration,
    pub max_cooldown: Duration,
    /// Outcomes required before the delay may shrink.
    pub min_samples: usize,
    /// Size of the rolling outcome window.
    pub window: usize,
    pub success_threshold: f64,
    /// Sleep between scan attempts while waiting out the delay.
    pub poll_interval: Duration,
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            min_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            initial_interval: Duration::from_secs(2),
            base_cooldown: Duration::from_secs(15),
            max_cooldown: Duration::from_secs(600),
            min_samples: 10,
            window: 20,
            success_threshold: 0.9,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// One pooled identity.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: usize,
    pub last_call_time: Option<Instant>,
    pub call_count: u64,
    pub success_count: u64,
    pub fail_count: u64,
    pub is_blocked: bool,
    pub block_until: Option<Instant>,
    pub identity_tag: String,
}

impl SessionInfo {
    fn new(id: usize) -> Self {
        Self {
            id,
            last_call_time: None,
            call_count: 0,
            success_count: 0,
            fail_count: 0,
            is_blocked: false,
            block_until: None,
            identity_tag: USER_AGENTS[id % USER_AGENTS.len()].to_string(),
        }
    }

    /// Clears a block whose deadline has passed.
    fn refresh_block(&mut self, now: Instant) {
        if self.is_blocked && self.block_until.is_none_or(|until| until <= now) {
            self.is_blocked = false;
            self.block_until = None;
        }
    }

    fn rested_enough(&self, now: Instant, delay: Duration) -> bool {
        self.last_call_time
            .is_none_or(|last| now.saturating_duration_since(last) >= delay)
    }

    fn rotate_identity(&mut self) {
        let candidates: Vec<&&str> = USER_AGENTS
            .iter()
            .filter(|ua| **ua != self.identity_tag)
            .collect();
        if let Some(ua) = candidates.choose(&mut rand::rng()) {
            self.identity_tag = ua.to_string();
        }
    }
}

struct PoolState {
    sessions: Vec<SessionInfo>,
    queue: VecDeque<usize>,
    delay: Duration,
    outcomes: VecDeque<bool>,
}

impl PoolState {
    fn refresh_blocks(&mut self, now: Instant) {
        for session in &mut self.sessions {
            session.refresh_block(now);
        }
    }

    fn record_outcome(&mut self, success: bool, window: usize) {
        self.outcomes.push_back(success);
        while self.outcomes.len() > window.max(1) {
            self.outcomes.pop_front();
        }
    }

    fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let successes = self.outcomes.iter().filter(|ok| **ok).count();
        successes as f64 / self.outcomes.len() as f64
    }
}

struct PoolInner {
    config: SessionPoolConfig,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Puts a session back without touching counters.
    fn release(&self, id: usize) {
        let mut state = self.state();
        if !state.queue.contains(&id) {
            state.queue.push_back(id);
        }
    }
}

/// A checked-out session.
///
/// Hand it back with [`SessionPool::report_success`] or
/// [`SessionPool::report_failure`]. Dropping it unreported returns the
/// session to the rotation unchanged.
pub struct SessionLease {
    id: usize,
    identity_tag: String,
    pool: Arc<PoolInner>,
    reported: bool,
}

impl SessionLease {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn identity_tag(&self) -> &str {
        &self.identity_tag
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("id", &self.id)
            .field("reported", &self.reported)
            .finish()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if !self.reported {
            self.pool.release(self.id);
        }
    }
}

enum Scan {
    Leased(SessionLease),
    Skipped,
    Wait,
}

/// Rotating pool of pseudo-identities with adaptive pacing.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new(SessionPoolConfig::default())
    }
}

impl SessionPool {
    pub fn new(config: SessionPoolConfig) -> Self {
        let sessions: Vec<SessionInfo> = (0..config.pool_size).map(SessionInfo::new).collect();
        let queue = (0..config.pool_size).collect();
        let delay = config
            .initial_interval
            .clamp(config.min_interval, config.max_interval.max(config.min_interval));

        Self {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(PoolState {
                    sessions,
                    queue,
                    delay,
                    outcomes: VecDeque::new(),
                }),
            }),
        }
    }

    pub fn config(&self) -> &SessionPoolConfig {
        &self.inner.config
    }

    /// Checks out the next usable session.
    ///
    /// Returns `None` only for an empty pool. After `2 × pool_size` scan
    /// attempts the least-recently-used queued session is handed out even if
    /// the adaptive delay has not elapsed.
    pub async fn checkout(&self) -> Option<SessionLease> {
        let config = &self.inner.config;
        if config.pool_size == 0 {
            return None;
        }

        for _ in 0..config.pool_size * 2 {
            match self.scan_once() {
                Scan::Leased(lease) => return Some(lease),
                Scan::Skipped => continue,
                Scan::Wait => sleep(config.poll_interval).await,
            }
        }

        loop {
            if let Some(lease) = self.checkout_least_recent() {
                debug!(session = lease.id, "Adaptive delay not met, using least-recently-used session");
                return Some(lease);
            }
            // Every session is checked out; wait for one to come back.
            sleep(config.poll_interval).await;
        }
    }

    fn scan_once(&self) -> Scan {
        let mut state = self.inner.state();
        let now = Instant::now();
        state.refresh_blocks(now);

        let Some(id) = state.queue.pop_front() else {
            return Scan::Wait;
        };
        let delay = state.delay;
        let (blocked, rested) = {
            let session = &state.sessions[id];
            (session.is_blocked, session.rested_enough(now, delay))
        };

        if blocked {
            state.queue.push_back(id);
            return Scan::Skipped;
        }
        if !rested {
            state.queue.push_back(id);
            return Scan::Wait;
        }

        Scan::Leased(self.lease(&state.sessions[id]))
    }

    fn checkout_least_recent(&self) -> Option<SessionLease> {
        let mut state = self.inner.state();
        state.refresh_blocks(Instant::now());

        let position = state
            .queue
            .iter()
            .enumerate()
            .min_by_key(|(_, id)| {
                let session = &state.sessions[**id];
                (session.is_blocked, session.last_call_time)
            })
            .map(|(position, _)| position)?;
        let id = state.queue.remove(position)?;

        Some(self.lease(&state.sessions[id]))
    }

    fn lease(&self, session: &SessionInfo) -> SessionLease {
        SessionLease {
            id: session.id,
            identity_tag: session.identity_tag.clone(),
            pool: Arc::clone(&self.inner),
            reported: false,
        }
    }

    /// Records a successful call and returns the session to the rotation.
    pub fn report_success(&self, mut lease: SessionLease) {
        lease.reported = true;
        let config = &self.inner.config;
        let mut state = self.inner.state();
        let now = Instant::now();

        let session = &mut state.sessions[lease.id];
        session.call_count += 1;
        session.success_count += 1;
        session.last_call_time = Some(now);

        state.record_outcome(true, config.window);
        if state.outcomes.len() >= config.min_samples
            && state.success_rate() > config.success_threshold
        {
            let shrunk = state.delay.mul_f64(0.9).max(config.min_interval);
            if shrunk < state.delay {
                debug!(delay_ms = shrunk.as_millis() as u64, "Adaptive delay decreased");
            }
            state.delay = shrunk;
        }

        state.queue.push_back(lease.id);
    }

    /// Records a failed call and returns the session to the rotation.
    ///
    /// Rate-limit failures block the session with capped exponential backoff,
    /// rotate its identity and grow the adaptive delay.
    pub fn report_failure(&self, mut lease: SessionLease, is_rate_limit: bool) {
        lease.reported = true;
        let config = &self.inner.config;
        let mut state = self.inner.state();
        let now = Instant::now();

        let session = &mut state.sessions[lease.id];
        session.call_count += 1;
        session.fail_count += 1;
        session.last_call_time = Some(now);

        if is_rate_limit {
            let exponent = session.fail_count.min(MAX_BACKOFF_EXPONENT) as u32;
            let cooldown = config
                .base_cooldown
                .saturating_mul(2u32.saturating_pow(exponent))
                .min(config.max_cooldown);
            session.is_blocked = true;
            session.block_until = Some(now + cooldown);
            session.rotate_identity();

            let grown = state.delay.mul_f64(1.5).min(config.max_interval);
            warn!(
                session = lease.id,
                cooldown_secs = cooldown.as_secs(),
                delay_ms = grown.as_millis() as u64,
                "Session rate limited, blocking"
            );
            state.delay = grown;
        }

        state.record_outcome(false, config.window);
        state.queue.push_back(lease.id);
    }

    /// Current shared spacing between checkouts of any session.
    pub fn adaptive_delay(&self) -> Duration {
        self.inner.state().delay
    }

    /// Snapshot of one session.
    pub fn session(&self, id: usize) -> Option<SessionInfo> {
        let mut state = self.inner.state();
        state.refresh_blocks(Instant::now());
        state.sessions.get(id).cloned()
    }

    pub fn stats(&self) -> SessionPoolStats {
        let mut state = self.inner.state();
        let now = Instant::now();
        state.refresh_blocks(now);

        let sessions: Vec<SessionStats> = state
            .sessions
            .iter()
            .map(|s| SessionStats {
                id: s.id,
                identity_tag: s.identity_tag.clone(),
                call_count: s.call_count,
                success_count: s.success_count,
                fail_count: s.fail_count,
                is_blocked: s.is_blocked,
                blocked_for_secs: s
                    .block_until
                    .filter(|_| s.is_blocked)
                    .map(|until| until.saturating_duration_since(now).as_secs_f64()),
                checked_out: !state.queue.contains(&s.id),
            })
            .collect();

        SessionPoolStats {
            total_calls: sessions.iter().map(|s| s.call_count).sum(),
            total_success: sessions.iter().map(|s| s.success_count).sum(),
            total_fail: sessions.iter().map(|s| s.fail_count).sum(),
            adaptive_delay_secs: state.delay.as_secs_f64(),
            sessions,
        }
    }
}
