//! HTTP request handlers

mod health;
mod presence;
mod signal;

pub use health::{health_check, HealthResponse};
pub use presence::{events, get_device, register, EventsQuery, RegisterRequest};
pub use signal::{append_signal, create_room, poll_signals};
