//! Client address derivation
//!
//! The rate limiter keys visitors by this address and the registry groups
//! devices by it, so both must go through [`ClientAddr::from_parts`].

use std::net::SocketAddr;

/// Where a request came from, as far as the server can tell
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientAddr {
    /// Client key: first forwarded hop, real-ip header, or peer address without port
    pub key: String,
    /// Raw transport peer address
    pub remote: String,
    /// True when the key came from a proxy header
    pub forwarded: bool,
}

impl ClientAddr {
    /// Derive the client address from the transport address and proxy headers
    ///
    /// Order: left-most `X-Forwarded-For` entry, then `X-Real-IP`, then the
    /// connection address with any port stripped.
    pub fn from_parts(remote: &str, forwarded_for: Option<&str>, real_ip: Option<&str>) -> Self {
        if let Some(first) = forwarded_for
            .and_then(|xff| xff.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return Self {
                key: first.to_string(),
                remote: remote.to_string(),
                forwarded: true,
            };
        }

        if let Some(real) = real_ip.map(str::trim).filter(|s| !s.is_empty()) {
            return Self {
                key: real.to_string(),
                remote: remote.to_string(),
                forwarded: true,
            };
        }

        Self {
            key: strip_port(remote),
            remote: remote.to_string(),
            forwarded: false,
        }
    }

    /// Address for a direct (unproxied) connection
    pub fn direct(remote: SocketAddr) -> Self {
        Self::from_parts(&remote.to_string(), None, None)
    }

    /// Network group key used to scope broadcasts
    ///
    /// Only proxied clients get one: on a plain LAN every device has its own
    /// private address, and grouping by it would hide peers from each other.
    pub fn network_key(&self) -> Option<String> {
        self.forwarded.then(|| self.key.clone())
    }
}

fn strip_port(remote: &str) -> String {
    if let Ok(addr) = remote.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }
    remote.to_string()
}
