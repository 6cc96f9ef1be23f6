//! Device registry
//!
//! Owns every known device and the subscriber queues of its open event
//! streams. Structural changes take the write lock; lookups, listings and
//! frame delivery share the read lock. Delivery never waits on a queue, so a
//! read lock is never held across a slow consumer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lanshare_core::device::{sanitize_display_name, validate_device_id};
use lanshare_core::{ClientAddr, CoreError, CoreResult, Device, EventFrame};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

use crate::fanout::BroadcastScope;

/// Frames buffered per subscriber queue unless configured otherwise
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;

/// Identifies one subscriber queue within the registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

/// Receiving end of a subscriber queue, owned by one event stream
#[derive(Debug)]
pub struct Subscription {
    pub device_id: String,
    pub channel: ChannelId,
    pub receiver: mpsc::Receiver<EventFrame>,
}

/// Outcome of a registration call
#[derive(Clone, Debug)]
pub struct Registration {
    pub device: Device,
    /// The device was not known before this call
    pub created: bool,
    /// The display name changed; the caller owes a rename broadcast
    pub renamed: bool,
}

struct ChannelSlot {
    id: ChannelId,
    tx: mpsc::Sender<EventFrame>,
}

struct DeviceEntry {
    device: Device,
    remote: String,
    network_key: Option<String>,
    last_seen: Instant,
    channels: Vec<ChannelSlot>,
}

impl DeviceEntry {
    fn new(device: Device, origin: &ClientAddr, now: Instant) -> Self {
        Self {
            device,
            remote: origin.remote.clone(),
            network_key: origin.network_key(),
            last_seen: now,
            channels: Vec::new(),
        }
    }

    fn touch(&mut self, origin: &ClientAddr, now: Instant) {
        self.last_seen = now;
        self.remote = origin.remote.clone();
        self.network_key = origin.network_key();
    }

    fn is_idle(&self, now: Instant, threshold: Duration) -> bool {
        self.channels.is_empty() && now.saturating_duration_since(self.last_seen) > threshold
    }

    /// Non-blocking enqueue on every queue; returns how many accepted the frame
    fn deliver(&self, frame: &EventFrame) -> usize {
        let mut delivered = 0;
        for slot in &self.channels {
            match slot.tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!("Queue full for {} ({:?}), frame dropped", self.device.id, slot.id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Queue closed for {} ({:?})", self.device.id, slot.id);
                }
            }
        }
        delivered
    }
}

/// Registry of known devices
pub struct Registry {
    devices: RwLock<HashMap<String, DeviceEntry>>,
    next_channel: AtomicU64,
    channel_capacity: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a registry whose subscriber queues hold `channel_capacity` frames
    pub fn with_capacity(channel_capacity: usize) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            next_channel: AtomicU64::new(1),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Register a device or refresh a known one
    ///
    /// A known device only takes a new name when it is non-blank and differs
    /// from the current one. Broadcasting the result is left to the caller so
    /// that it happens after the write lock is released.
    pub fn register(
        &self,
        id: &str,
        name: Option<&str>,
        origin: &ClientAddr,
        user_agent: &str,
    ) -> CoreResult<Registration> {
        validate_device_id(id)?;
        let name = sanitize_display_name(name);
        let now = Instant::now();

        let mut devices = self.devices.write();
        if let Some(entry) = devices.get_mut(id) {
            entry.touch(origin, now);
            let renamed = match name {
                Some(name) if name != entry.device.name => {
                    entry.device.name = name;
                    info!("Device renamed: {} ({})", entry.device.name, id);
                    true
                }
                _ => false,
            };
            return Ok(Registration {
                device: entry.device.clone(),
                created: false,
                renamed,
            });
        }

        let mut device = Device::derived(id, user_agent);
        if let Some(name) = name {
            device.name = name;
        }
        info!("Device registered: {} ({}) from {}", device.name, id, origin.remote);
        devices.insert(id.to_string(), DeviceEntry::new(device.clone(), origin, now));

        Ok(Registration {
            device,
            created: true,
            renamed: false,
        })
    }

    /// Look up a device by id
    pub fn lookup(&self, id: &str) -> CoreResult<Device> {
        self.devices
            .read()
            .get(id)
            .map(|e| e.device.clone())
            .ok_or_else(|| CoreError::not_found(format!("device {}", id)))
    }

    /// All known devices other than `id`
    pub fn list_except(&self, id: &str) -> Vec<Device> {
        self.devices
            .read()
            .iter()
            .filter(|(did, _)| did.as_str() != id)
            .map(|(_, e)| e.device.clone())
            .collect()
    }

    /// Devices other than `id` that a broadcast from `id` would reach
    pub fn list_visible(&self, id: &str, scope: BroadcastScope) -> Vec<Device> {
        let devices = self.devices.read();
        let group = scope_group(&devices, id, scope);
        devices
            .iter()
            .filter(|(did, e)| did.as_str() != id && in_group(e, group))
            .map(|(_, e)| e.device.clone())
            .collect()
    }

    /// Attach a new subscriber queue to a device, registering it if unknown
    pub fn open_channel(
        &self,
        id: &str,
        origin: &ClientAddr,
        user_agent: &str,
    ) -> CoreResult<Subscription> {
        validate_device_id(id)?;
        let (tx, receiver) = mpsc::channel(self.channel_capacity);
        let channel = ChannelId(self.next_channel.fetch_add(1, Ordering::Relaxed));
        let now = Instant::now();

        let mut devices = self.devices.write();
        let entry = devices.entry(id.to_string()).or_insert_with(|| {
            let device = Device::derived(id, user_agent);
            info!("Auto-registered device on stream open: {} ({})", device.name, id);
            DeviceEntry::new(device, origin, now)
        });
        entry.last_seen = now;
        entry.channels.push(ChannelSlot { id: channel, tx });
        info!(
            "Stream connected: {} ({}) [open streams: {}]",
            entry.device.name,
            id,
            entry.channels.len()
        );

        Ok(Subscription {
            device_id: id.to_string(),
            channel,
            receiver,
        })
    }

    /// Detach a subscriber queue
    ///
    /// Returns `true` when the device is left without any open stream.
    pub fn close_channel(&self, id: &str, channel: ChannelId) -> bool {
        let mut devices = self.devices.write();
        let Some(entry) = devices.get_mut(id) else {
            return false;
        };
        let before = entry.channels.len();
        entry.channels.retain(|slot| slot.id != channel);
        if entry.channels.len() == before {
            return false;
        }
        entry.last_seen = Instant::now();
        debug!("Stream closed: {} [open streams: {}]", id, entry.channels.len());
        entry.channels.is_empty()
    }

    /// Remove devices with no open stream that have been idle past `threshold`
    pub fn evict_idle(&self, threshold: Duration) -> Vec<String> {
        self.evict_idle_at(Instant::now(), threshold)
    }

    /// [`evict_idle`](Self::evict_idle) evaluated at a given instant
    pub fn evict_idle_at(&self, now: Instant, threshold: Duration) -> Vec<String> {
        let mut devices = self.devices.write();
        let stale: Vec<String> = devices
            .iter()
            .filter(|(_, e)| e.is_idle(now, threshold))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            if let Some(entry) = devices.remove(id) {
                info!(
                    "Evicted idle device: {} ({}) last from {}",
                    entry.device.name, id, entry.remote
                );
            }
        }
        stale
    }

    /// Number of open streams for a device (0 if unknown)
    pub fn channel_count(&self, id: &str) -> usize {
        self.devices.read().get(id).map_or(0, |e| e.channels.len())
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    pub(crate) fn deliver_to(&self, id: &str, frame: &EventFrame) -> usize {
        self.devices.read().get(id).map_or(0, |e| e.deliver(frame))
    }

    pub(crate) fn deliver_except(
        &self,
        exclude: &str,
        scope: BroadcastScope,
        frame: &EventFrame,
    ) -> usize {
        let devices = self.devices.read();
        let group = scope_group(&devices, exclude, scope);
        devices
            .iter()
            .filter(|(did, e)| did.as_str() != exclude && in_group(e, group))
            .map(|(_, e)| e.deliver(frame))
            .sum()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Network group a scoped operation is restricted to, if resolvable
fn scope_group<'a>(
    devices: &'a HashMap<String, DeviceEntry>,
    sender: &str,
    scope: BroadcastScope,
) -> Option<&'a str> {
    match scope {
        BroadcastScope::Global => None,
        BroadcastScope::SameNetwork => devices
            .get(sender)
            .and_then(|e| e.network_key.as_deref()),
    }
}

fn in_group(entry: &DeviceEntry, group: Option<&str>) -> bool {
    group.map_or(true, |g| entry.network_key.as_deref() == Some(g))
}
