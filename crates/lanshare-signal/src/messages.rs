//! Signaling wire messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of a room's log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Role of the sender
    pub from: String,

    /// Message type (offer, answer, candidate, ...)
    #[serde(rename = "type")]
    pub kind: String,

    /// Opaque payload, relayed untouched
    #[serde(default)]
    pub data: Value,
}

/// Response to room creation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room: String,
}

/// Body of a signal append
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignalRequest {
    pub room: String,
    pub from: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl SignalRequest {
    /// Split into the target room and the signal to store
    pub fn into_parts(self) -> (String, Signal) {
        (
            self.room,
            Signal {
                from: self.from,
                kind: self.kind,
                data: self.data,
            },
        )
    }
}

/// Query string of a poll
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PollQuery {
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub since: Option<String>,
}

impl PollQuery {
    /// Read offset; missing or unparsable values start from the beginning
    pub fn since_index(&self) -> usize {
        self.since
            .as_deref()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// Response to a poll
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub signals: Vec<Signal>,
    /// Log length; the next poll's `since`
    pub index: usize,
}
