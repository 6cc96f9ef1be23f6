//! Room store
//!
//! Rooms live in a [`DashMap`] keyed by id; each room carries its own lock so
//! a busy negotiation never serializes with another. Expired rooms are
//! treated as absent the moment they expire and are physically removed by
//! the periodic sweep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lanshare_core::{CoreError, CoreResult, SignalConfig};
use parking_lot::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::messages::{PollResponse, Signal};
use crate::room::Room;
use crate::{MAX_ROOM_ID_LEN, ROOM_ID_BYTES, ROOM_LIFETIME_SECS};

/// Attempts at drawing an unused id before giving up
const CREATE_ATTEMPTS: usize = 4;

/// Store of live signaling rooms
pub struct RoomStore {
    rooms: DashMap<String, Arc<Mutex<Room>>>,
    lifetime: Duration,
}

impl RoomStore {
    /// Create a store with the default room lifetime
    pub fn new() -> Self {
        Self::with_lifetime(Duration::from_secs(ROOM_LIFETIME_SECS))
    }

    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            lifetime,
        }
    }

    pub fn from_config(config: &SignalConfig) -> Self {
        Self::with_lifetime(config.room_lifetime())
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Create an empty room and return its id
    pub fn create_room(&self) -> CoreResult<String> {
        self.create_room_at(Instant::now())
    }

    /// [`create_room`](Self::create_room) with an explicit creation time
    pub fn create_room_at(&self, now: Instant) -> CoreResult<String> {
        for _ in 0..CREATE_ATTEMPTS {
            let id = generate_room_id()?;
            if let Entry::Vacant(slot) = self.rooms.entry(id.clone()) {
                slot.insert(Arc::new(Mutex::new(Room::new(id.clone(), now))));
                info!("Room created: {} ({} active)", id, self.rooms.len());
                return Ok(id);
            }
            debug!("Room id collision on {}, retrying", id);
        }
        Err(CoreError::unavailable("could not allocate a room id"))
    }

    /// Append a signal to a room's log
    pub fn append_signal(&self, room_id: &str, signal: Signal) -> CoreResult<()> {
        self.append_signal_at(room_id, signal, Instant::now())
    }

    pub fn append_signal_at(&self, room_id: &str, signal: Signal, now: Instant) -> CoreResult<()> {
        if signal.from.trim().is_empty() {
            return Err(CoreError::invalid("missing sender role"));
        }
        if signal.kind.trim().is_empty() {
            return Err(CoreError::invalid("missing signal type"));
        }

        let room = self.room(room_id, now)?;
        let mut room = room.lock();
        debug!(
            "Signal in room {}: {} from {} (#{})",
            room_id,
            signal.kind,
            signal.from,
            room.len()
        );
        room.append(signal);
        Ok(())
    }

    /// Signals at or after `since` not sent by `role`, plus the log length
    pub fn poll(&self, room_id: &str, role: &str, since: usize) -> CoreResult<PollResponse> {
        self.poll_at(room_id, role, since, Instant::now())
    }

    pub fn poll_at(&self, room_id: &str, role: &str, since: usize, now: Instant) -> CoreResult<PollResponse> {
        let room = self.room(room_id, now)?;
        let (signals, index) = room.lock().signals_since(since, role);
        Ok(PollResponse { signals, index })
    }

    /// Whether a room is retrievable at `now`
    pub fn contains_at(&self, room_id: &str, now: Instant) -> bool {
        self.room(room_id, now).is_ok()
    }

    /// Drop every room past its lifetime
    pub fn remove_expired(&self) -> usize {
        self.remove_expired_at(Instant::now())
    }

    pub fn remove_expired_at(&self, now: Instant) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|id, room| {
            let keep = !room.lock().is_expired(now, self.lifetime);
            if !keep {
                debug!("Room expired: {}", id);
            }
            keep
        });
        let removed = before.saturating_sub(self.rooms.len());
        if removed > 0 {
            info!("Room sweep: removed {} expired rooms ({} remain)", removed, self.rooms.len());
        }
        removed
    }

    /// Run the expiry sweep until cancelled (call from a tokio task)
    pub async fn run_sweep_loop(self: Arc<Self>, every: Duration, cancel: CancellationToken) {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Room sweeper stopped");
                    return;
                }
                _ = tick.tick() => {
                    self.remove_expired();
                }
            }
        }
    }

    /// Number of rooms held, expired or not
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Resolve a live room; the map shard lock is released before returning
    fn room(&self, room_id: &str, now: Instant) -> CoreResult<Arc<Mutex<Room>>> {
        validate_room_id(room_id)?;
        let room = self
            .rooms
            .get(room_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| CoreError::not_found(format!("room {}", room_id)))?;

        if room.lock().is_expired(now, self.lifetime) {
            return Err(CoreError::not_found(format!("room {}", room_id)));
        }
        Ok(room)
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_room_id(room_id: &str) -> CoreResult<()> {
    if room_id.is_empty() {
        return Err(CoreError::invalid("missing room"));
    }
    if room_id.len() > MAX_ROOM_ID_LEN || !room_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CoreError::invalid("malformed room id"));
    }
    Ok(())
}

/// Random hex room id
fn generate_room_id() -> CoreResult<String> {
    let mut bytes = [0u8; ROOM_ID_BYTES];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| CoreError::unavailable(format!("random source failed: {}", e)))?;
    Ok(hex::encode(bytes))
}
