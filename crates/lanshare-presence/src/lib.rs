//! lanshare presence - device registry and live event delivery
//!
//! This crate provides:
//! - The device [`Registry`] with per-connection subscriber queues
//! - [`Fanout`] for unicast and broadcast event delivery
//! - [`PresenceSweeper`], the background eviction of idle devices
//! - [`EventStream`], the serve loop behind one open event stream
//! - [`RateLimiter`], per-client sliding-window admission control
//!
//! # Delivery model
//!
//! ```text
//!  register / upload handlers           PresenceSweeper
//!              │                               │
//!              ▼                               ▼
//!        ┌───────────┐  try_send (drop on full)
//!        │  Fanout   │ ─────────────┬──────────────┐
//!        └───────────┘              ▼              ▼
//!                            ┌────────────┐ ┌────────────┐
//!                            │ queue (10) │ │ queue (10) │  one per open stream
//!                            └─────┬──────┘ └─────┬──────┘
//!                                  ▼              ▼
//!                            EventStream    EventStream    (keep-alive, cancel)
//! ```
//!
//! Senders never wait on a slow stream: a full queue loses the frame.

pub mod fanout;
pub mod lifecycle;
pub mod rate_limiter;
pub mod registry;
pub mod stream;

pub use fanout::{BroadcastScope, Fanout, FilesSent};
pub use lifecycle::PresenceSweeper;
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterStats};
pub use registry::{ChannelId, Registration, Registry, Subscription};
pub use stream::{EventStream, StreamError};
