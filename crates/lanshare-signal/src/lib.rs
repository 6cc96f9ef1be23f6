//! lanshare signal - ephemeral rooms for direct connection negotiation
//!
//! Two browsers that want a direct connection exchange offers, answers and
//! candidates through a short-lived room. Neither side holds a connection to
//! the server while waiting; each polls for what the other side wrote.
//!
//! # Protocol
//!
//! 1. One side creates a room and shares its id out of band
//! 2. Both sides append signals tagged with their role
//! 3. Each side polls with the index returned by its previous poll and
//!    never sees its own signals
//! 4. The room expires on its own; there is no close

pub mod messages;
pub mod room;
pub mod store;

pub use messages::{CreateRoomResponse, PollQuery, PollResponse, Signal, SignalRequest};
pub use room::Room;
pub use store::RoomStore;

/// Room lifetime (30 minutes)
pub const ROOM_LIFETIME_SECS: u64 = 1800;

/// Interval between expiry sweeps (5 minutes)
pub const SWEEP_INTERVAL_SECS: u64 = 300;

/// Random bytes in a room id (hex encoded, so twice as many characters)
pub const ROOM_ID_BYTES: usize = 8;

/// Longest room id accepted from clients
pub const MAX_ROOM_ID_LEN: usize = 64;
