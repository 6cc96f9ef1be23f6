//! Event fanout
//!
//! Serializes a payload once, frames it, and pushes the frame into subscriber
//! queues without waiting. Delivery is best-effort: a full or closed queue is
//! skipped and the caller is never told.

use std::sync::Arc;

use lanshare_core::{Device, EventFrame, EventKind};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::registry::{Registration, Registry};

/// Which devices a broadcast may reach
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BroadcastScope {
    /// Every known device
    Global,
    /// Only devices sharing the sender's network group; global when the
    /// sender has no group or is unknown
    #[default]
    SameNetwork,
}

/// Payload of a `files-sent` event
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FilesSent {
    pub filenames: Vec<String>,
    pub from_name: String,
    pub from_icon: String,
}

/// Event delivery over the registry's subscriber queues
#[derive(Clone)]
pub struct Fanout {
    registry: Arc<Registry>,
    scope: BroadcastScope,
}

impl Fanout {
    /// Create a fanout whose presence announcements use `scope`
    pub fn new(registry: Arc<Registry>, scope: BroadcastScope) -> Self {
        Self { registry, scope }
    }

    /// Scope used for presence announcements
    pub fn scope(&self) -> BroadcastScope {
        self.scope
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Deliver an event to every open stream of one device
    ///
    /// Returns the number of queues that accepted the frame.
    pub fn notify_one<T: Serialize + ?Sized>(&self, id: &str, kind: EventKind, payload: &T) -> usize {
        let Some(frame) = encode(kind, payload) else {
            return 0;
        };
        let delivered = self.registry.deliver_to(id, &frame);
        debug!("Sent {} to {} ({} streams)", kind, id, delivered);
        delivered
    }

    /// Deliver an event to every device except `exclude`
    ///
    /// An empty `exclude` reaches everyone. Returns the number of queues that
    /// accepted the frame.
    pub fn broadcast<T: Serialize + ?Sized>(
        &self,
        kind: EventKind,
        payload: &T,
        exclude: &str,
        scope: BroadcastScope,
    ) -> usize {
        let Some(frame) = encode(kind, payload) else {
            return 0;
        };
        let delivered = self.registry.deliver_except(exclude, scope, &frame);
        debug!("Broadcast {} ({} streams)", kind, delivered);
        delivered
    }

    /// Tell other devices about a registration that created or renamed a device
    pub fn announce(&self, registration: &Registration) -> usize {
        if registration.created {
            self.device_joined(&registration.device)
        } else if registration.renamed {
            self.device_renamed(&registration.device)
        } else {
            0
        }
    }

    pub fn device_joined(&self, device: &Device) -> usize {
        self.broadcast(EventKind::DeviceJoined, device, &device.id, self.scope)
    }

    pub fn device_renamed(&self, device: &Device) -> usize {
        self.broadcast(EventKind::DeviceRenamed, device, &device.id, self.scope)
    }

    /// Announce that a device's last stream closed
    pub fn device_left(&self, id: &str) -> usize {
        self.broadcast(EventKind::DeviceLeft, &json!({ "id": id }), id, self.scope)
    }

    /// Announce that a device was evicted
    ///
    /// The device is already gone from the registry, so its network group can
    /// no longer be resolved and the broadcast is global.
    pub fn device_evicted(&self, id: &str) -> usize {
        self.broadcast(
            EventKind::DeviceLeft,
            &json!({ "id": id }),
            "",
            BroadcastScope::Global,
        )
    }

    /// Tell `to` that `from` dropped files into its private inbox
    pub fn files_sent(&self, to: &str, from: &Device, filenames: &[String]) -> usize {
        let payload = FilesSent {
            filenames: filenames.to_vec(),
            from_name: from.name.clone(),
            from_icon: from.icon.clone(),
        };
        self.notify_one(to, EventKind::FilesSent, &payload)
    }

    /// Tell everyone the public shared area changed
    pub fn shared_update(&self) -> usize {
        self.broadcast(EventKind::SharedUpdate, &(), "", BroadcastScope::Global)
    }
}

fn encode<T: Serialize + ?Sized>(kind: EventKind, payload: &T) -> Option<EventFrame> {
    match EventFrame::encode(kind, payload) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("Failed to encode {} event: {}", kind, e);
            None
        }
    }
}
