//! Session/connection manager: assigns session ids, tracks live
//! transports, evicts idle sessions, and coordinates shutdown.
//!
//! A transport-agnostic record: a stdio transport and an SSE transport
//! both register one [`SessionRecord`] each, and the protocol state
//! machine lives on that record rather than in the transport itself.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use crate::frame::Frame;

/// Per-session protocol handshake state. Mutated only from the
/// session's own reader task — no cross-session locking is needed, but
/// the record itself still guards it with a lock since the sweeper and
/// `closeAll` observe it from other tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Only `initialize` is accepted.
    Opening,
    /// Only `notifications/initialized` is accepted.
    AwaitingInitialized,
    /// All registered methods are accepted.
    Initialized,
    /// Shutting down; all calls fail.
    Closing,
    /// Fully torn down; the record is about to be removed.
    Closed,
}

impl SessionState {
    /// Human-readable name used in `InvalidRequest` error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::AwaitingInitialized => "awaiting_initialized",
            Self::Initialized => "initialized",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

/// Generate a fresh session id carrying a full 128 bits of randomness:
/// 16 bytes straight from the OS CSPRNG, formatted through
/// [`Uuid::from_bytes`] for a familiar hyphenated shape. A plain
/// `Uuid::new_v4()` would only give 122 random bits -- 6 are fixed by
/// the version/variant nibbles -- so this skips the v4 constructor and
/// stamps the raw bytes directly instead.
#[must_use]
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    Uuid::from_bytes(bytes).to_string()
}

/// A single session's live state: handshake phase, activity clock, and a
/// bounded outbound queue for transports (like SSE) that deliver frames
/// out-of-band from the request that produced them.
pub struct SessionRecord {
    /// Opaque session identifier.
    pub id: String,
    state: RwLock<SessionState>,
    /// When the session was registered.
    pub created_at: Instant,
    last_active: RwLock<Instant>,
    outbound: RwLock<VecDeque<Frame>>,
    outbound_capacity: usize,
    /// Woken whenever a frame is pushed to `outbound`, or on close.
    outbound_ready: Notify,
    closed: RwLock<bool>,
}

impl SessionRecord {
    /// Create a new record in [`SessionState::Opening`].
    #[must_use]
    pub fn new(id: String, outbound_capacity: usize) -> Self {
        let now = Instant::now();
        Self {
            id,
            state: RwLock::new(SessionState::Opening),
            created_at: now,
            last_active: RwLock::new(now),
            outbound: RwLock::new(VecDeque::with_capacity(outbound_capacity.min(1024))),
            outbound_capacity,
            outbound_ready: Notify::new(),
            closed: RwLock::new(false),
        }
    }

    /// Current handshake state.
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Transition to a new state, logging the edge.
    pub async fn transition(&self, next: SessionState) {
        let mut state = self.state.write().await;
        tracing::info!(session_id = %self.id, from = state.as_str(), to = next.as_str(), "session state transition");
        *state = next;
    }

    /// Refresh the idle clock; called by the session manager on every
    /// inbound frame.
    pub async fn touch(&self) {
        *self.last_active.write().await = Instant::now();
    }

    /// Whether this session has had no activity for longer than
    /// `idle_timeout`.
    pub async fn is_idle(&self, idle_timeout: Duration) -> bool {
        self.last_active.read().await.elapsed() > idle_timeout
    }

    /// Push a frame onto the outbound queue for out-of-band delivery
    /// (the SSE writer). Drops the oldest unsent frame on overflow,
    /// logging a warning, rather than blocking the handler that produced
    /// the frame.
    pub async fn push_outbound(&self, frame: Frame) {
        let mut queue = self.outbound.write().await;
        if queue.len() >= self.outbound_capacity {
            queue.pop_front();
            tracing::warn!(session_id = %self.id, "outbound queue full, dropping oldest frame");
        }
        queue.push_back(frame);
        drop(queue);
        self.outbound_ready.notify_one();
    }

    /// Drain all currently queued outbound frames.
    pub async fn drain_outbound(&self) -> Vec<Frame> {
        self.outbound.write().await.drain(..).collect()
    }

    /// Wait until a frame is available or the session closes, then
    /// return everything currently queued (possibly empty, if woken by
    /// close).
    pub async fn wait_for_outbound(&self) -> Vec<Frame> {
        loop {
            let pending = self.drain_outbound().await;
            if !pending.is_empty() || *self.closed.read().await {
                return pending;
            }
            self.outbound_ready.notified().await;
        }
    }

    /// Mark the session closed and wake any writer blocked on
    /// [`SessionRecord::wait_for_outbound`].
    pub async fn close(&self) {
        *self.closed.write().await = true;
        self.transition(SessionState::Closed).await;
        self.outbound_ready.notify_waiters();
    }

    /// Whether [`SessionRecord::close`] has been called.
    pub async fn is_closed(&self) -> bool {
        *self.closed.read().await
    }
}

/// Owns every live session. Thread-safe; cheap to clone (the map is
/// behind an `Arc`).
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Arc<SessionRecord>>>>,
    idle_timeout: Duration,
    sweep_interval: Duration,
    outbound_capacity: usize,
}

impl SessionManager {
    /// Create a manager with the given idle-eviction policy.
    #[must_use]
    pub fn new(idle_timeout: Duration, sweep_interval: Duration, outbound_capacity: usize) -> Self {
        Self { sessions: Arc::new(RwLock::new(HashMap::new())), idle_timeout, sweep_interval, outbound_capacity }
    }

    /// Register a freshly created session and return its record.
    pub async fn register(&self) -> Arc<SessionRecord> {
        let id = generate_session_id();
        let record = Arc::new(SessionRecord::new(id.clone(), self.outbound_capacity));
        self.sessions.write().await.insert(id.clone(), record.clone());
        tracing::info!(session_id = %id, "session registered");
        record
    }

    /// Look up a session by id, refreshing its activity clock on hit.
    pub async fn lookup(&self, id: &str) -> Option<Arc<SessionRecord>> {
        let record = self.sessions.read().await.get(id).cloned();
        if let Some(record) = &record {
            record.touch().await;
        }
        record
    }

    /// Remove a session from the map and close its record. Double-remove
    /// is a no-op.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        if let Some(record) = removed {
            record.close().await;
            tracing::info!(session_id = %id, "session removed");
            true
        } else {
            false
        }
    }

    /// Close every live session in parallel, bounded by `drain_budget`.
    /// Sessions still open after the budget are force-closed anyway —
    /// the budget only controls how long we wait for a graceful finish.
    pub async fn close_all(&self, drain_budget: Duration) {
        let records: Vec<Arc<SessionRecord>> = self.sessions.read().await.values().cloned().collect();
        let closes = records.iter().map(|record| record.close());
        if tokio::time::timeout(drain_budget, futures::future::join_all(closes)).await.is_err() {
            tracing::warn!("session drain budget exceeded; remaining sessions force-closed");
        }
        self.sessions.write().await.clear();
    }

    /// Current number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Evict every session idle for longer than `idle_timeout`. Returns
    /// the number evicted.
    pub async fn sweep_idle(&self) -> usize {
        let candidates: Vec<String> = {
            let sessions = self.sessions.read().await;
            let mut ids = Vec::new();
            for (id, record) in sessions.iter() {
                if record.is_idle(self.idle_timeout).await {
                    ids.push(id.clone());
                }
            }
            ids
        };
        for id in &candidates {
            self.remove(id).await;
        }
        if !candidates.is_empty() {
            tracing::debug!(count = candidates.len(), "idle sweep evicted sessions");
        }
        candidates.len()
    }

    /// Spawn the background idle sweeper. Runs until the process exits;
    /// there is no explicit stop handle since `close_all` already removes
    /// every session at shutdown, making further sweeps harmless no-ops.
    pub fn spawn_sweeper(self: &Self) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let interval = self.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.sweep_idle().await;
            }
        })
    }
}
