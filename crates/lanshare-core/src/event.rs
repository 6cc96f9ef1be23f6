//! Event frames pushed to event streams
//!
//! Frames are Server-Sent-Events text, encoded once by the sender and shared by
//! every subscriber queue they are delivered to.

use bytes::Bytes;
use serde::Serialize;

/// Event types delivered over a device's event stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Snapshot of currently known devices, sent once when a stream opens
    Peers,
    DeviceJoined,
    DeviceLeft,
    DeviceRenamed,
    /// Files were dropped into this device's private inbox
    FilesSent,
    /// The public shared area changed
    SharedUpdate,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Peers => "peers",
            EventKind::DeviceJoined => "device-joined",
            EventKind::DeviceLeft => "device-left",
            EventKind::DeviceRenamed => "device-renamed",
            EventKind::FilesSent => "files-sent",
            EventKind::SharedUpdate => "shared-update",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encoded frame ready to be written to a stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventFrame(Bytes);

impl EventFrame {
    /// Encode a typed event with a JSON payload
    pub fn encode<T: Serialize + ?Sized>(
        kind: EventKind,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        let data = serde_json::to_string(payload)?;
        Ok(Self(Bytes::from(format!("event: {}\ndata: {}\n\n", kind, data))))
    }

    /// Keep-alive comment frame; carries no event
    pub fn keepalive() -> Self {
        Self(Bytes::from_static(b": ping\n\n"))
    }

    pub fn is_keepalive(&self) -> bool {
        self.0.starts_with(b":")
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}
