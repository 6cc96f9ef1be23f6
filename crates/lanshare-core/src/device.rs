//! Device identity: validation and deterministic naming
//!
//! Device ids are chosen by clients and are untrusted. They end up in log lines
//! and as directory names for private uploads, so anything that could escape a
//! path component is rejected up front.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::{MAX_DEVICE_ID_LEN, MAX_DISPLAY_NAME_LEN};

const ADJECTIVES: [&str; 16] = [
    "Swift", "Brave", "Calm", "Bold", "Keen", "Warm", "Cool", "Wise", "Bright", "Happy", "Gentle",
    "Lucky", "Noble", "Quiet", "Vivid", "Witty",
];

const ANIMALS: [&str; 16] = [
    "Panda", "Fox", "Owl", "Wolf", "Bear", "Hawk", "Lynx", "Orca", "Tiger", "Eagle", "Koala",
    "Raven", "Otter", "Falcon", "Shark", "Bison",
];

/// Icon names understood by the web client
pub const ICONS: [&str; 16] = [
    "fox", "panda", "owl", "wolf", "bear", "hawk", "cat", "dolphin", "tiger", "lion", "koala",
    "raven", "otter", "shark", "elephant", "butterfly",
];

/// Characters that are never allowed in a device id
const FORBIDDEN_ID_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

/// Coarse device class inferred from the user agent
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Phone,
    Tablet,
    #[default]
    Desktop,
}

impl DeviceClass {
    pub fn from_user_agent(ua: &str) -> Self {
        let ua = ua.to_ascii_lowercase();
        if ua.contains("iphone") || (ua.contains("android") && ua.contains("mobile")) {
            return DeviceClass::Phone;
        }
        if ua.contains("ipad") || ua.contains("tablet") {
            return DeviceClass::Tablet;
        }
        DeviceClass::Desktop
    }
}

/// Public view of a registered device, as sent to other devices
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub icon: String,
    #[serde(rename = "type")]
    pub class: DeviceClass,
}

impl Device {
    /// Build a device with derived name and icon
    pub fn derived(id: &str, user_agent: &str) -> Self {
        Self {
            id: id.to_string(),
            name: device_name(id),
            icon: device_icon(id).to_string(),
            class: DeviceClass::from_user_agent(user_agent),
        }
    }
}

fn id_digest(id: &str) -> [u8; 16] {
    md5::compute(id.as_bytes()).0
}

/// Friendly "Adjective Animal" name, a pure function of the id
pub fn device_name(id: &str) -> String {
    let h = id_digest(id);
    let val = usize::from(h[0]) | (usize::from(h[1]) << 8);
    format!(
        "{} {}",
        ADJECTIVES[val % ADJECTIVES.len()],
        ANIMALS[(val >> 8) % ANIMALS.len()]
    )
}

/// Icon name, a pure function of the id
pub fn device_icon(id: &str) -> &'static str {
    let h = id_digest(id);
    ICONS[usize::from(h[0]) % ICONS.len()]
}

/// Validate a client-supplied device id
pub fn validate_device_id(id: &str) -> Result<(), CoreError> {
    if id.is_empty() {
        return Err(CoreError::invalid("missing device id"));
    }

    if id.len() > MAX_DEVICE_ID_LEN {
        return Err(CoreError::invalid(format!(
            "device id too long: {} bytes (max {})",
            id.len(),
            MAX_DEVICE_ID_LEN
        )));
    }

    if id == "." || id == ".." {
        return Err(CoreError::invalid("special directory names not allowed"));
    }

    if id.contains(FORBIDDEN_ID_CHARS) || id.chars().any(char::is_control) {
        return Err(CoreError::invalid("device id contains forbidden characters"));
    }

    Ok(())
}

/// Trim and bound a client-supplied display name; blank names become `None`
pub fn sanitize_display_name(name: Option<&str>) -> Option<String> {
    let trimmed = name?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        trimmed
            .chars()
            .filter(|c| !c.is_control())
            .take(MAX_DISPLAY_NAME_LEN)
            .collect(),
    )
}
