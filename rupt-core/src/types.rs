//! Core data structures shared by every crate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// Free-form key/value metadata attached to access and identity calls
pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Opaque device description, passed through to the service as-is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceDetails>,
}

/// Coarse form factor reported inside `device_info.device.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Computer,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Computer => "computer",
        }
    }
}

/// Platform tag sent as `client` on attach
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientPlatform {
    /// iPhone and iPad
    Ios,
    AppleTv,
    CarPlay,
    Mac,
    Android,
    Linux,
    Windows,
    Unspecified,
    Other(String),
}

impl ClientPlatform {
    pub fn as_tag(&self) -> &str {
        match self {
            ClientPlatform::Ios => "ios",
            ClientPlatform::AppleTv => "apple-tv",
            ClientPlatform::CarPlay => "car-play",
            ClientPlatform::Mac => "mac",
            ClientPlatform::Android => "android",
            ClientPlatform::Linux => "linux",
            ClientPlatform::Windows => "windows",
            ClientPlatform::Unspecified => "unspecified",
            ClientPlatform::Other(tag) => tag,
        }
    }
}

/// Opaque platform signal forwarded under `signals`, e.g. `iosVendorIdentifier`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorSignal {
    pub name: String,
    pub value: String,
}

impl VendorSignal {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A device attached to an account, as listed by the service.
///
/// Equality and hashing use `id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub info: DeviceInfo,
    pub user: String,
    #[serde(rename = "createdAt", with = "timestamp_format")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "timestamp_format")]
    pub updated_at: DateTime<Utc>,
}

impl PartialEq for DeviceRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DeviceRecord {}

impl Hash for DeviceRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Timestamps on device records: RFC 3339 with millisecond precision and a `Z`
/// suffix, e.g. `2022-07-11T09:30:00.000Z`.
pub mod timestamp_format {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Result of a successful attach or detach call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachOutcome {
    pub device_id: String,
    pub attached_device_count: u32,
    pub success: bool,
    pub default_device_limit: Option<u32>,
    pub block_over_usage: Option<bool>,
}

/// Cross-install identity returned by the identify call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub identity: String,
    pub confidence: f64,
}

/// Persisted identity pair. Both fields survive restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalIdentity {
    pub device_id: Option<String>,
    pub device_identity: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppearanceConfig {
    pub show_blocking_dialog: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub mobile_limit: u32,
    pub overall_limit: u32,
}

/// Session configuration supplied by the host before any network call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub client_id: String,
    pub secret: Option<String>,
    pub appearance: Option<AppearanceConfig>,
    pub limit: Option<LimitConfig>,
}

impl SessionConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            secret: None,
            appearance: None,
            limit: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_appearance(mut self, appearance: AppearanceConfig) -> Self {
        self.appearance = Some(appearance);
        self
    }

    pub fn with_limit(mut self, limit: LimitConfig) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            client_id: self.client_id.clone(),
            secret: self.secret.clone(),
        }
    }
}

/// Client credentials used on every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub secret: Option<String>,
}

impl Credentials {
    /// `Basic <clientID>:<secret>` with the pair in the clear, not base64.
    /// The service expects exactly this form.
    pub fn authorization_value(&self) -> String {
        format!(
            "Basic {}:{}",
            self.client_id,
            self.secret.as_deref().unwrap_or("")
        )
    }
}

/// Feature flags advertised on attach under `callbacks`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackFlags {
    pub limit_exceeded: bool,
    pub on_challenge: bool,
}
