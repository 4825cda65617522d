//! Request and response bodies of the `/v2` API

use rupt_core::{AttachOutcome, CallbackFlags, DeviceIdentity, DeviceInfo, Metadata};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

pub const PROTOCOL_VERSION: &str = "3.0.0";

/// Endpoint paths
pub mod paths {
    pub const ACCESS: &str = "/v2/access";
    pub const IDENTITY: &str = "/v2/identity";
    pub const DETACH: &str = "/v2/access/detach";

    pub fn attached_devices(user_id: &str) -> String {
        format!(
            "/v2/access/user/{}/attached_devices",
            urlencoding::encode(user_id)
        )
    }

    pub fn listen(device_id: &str) -> String {
        format!("/v2/access/device/{}/listen", urlencoding::encode(device_id))
    }
}

/// Absent metadata goes out as an empty array, which is what the service has
/// always received from clients with nothing to send.
fn metadata_or_empty<S: Serializer>(
    value: &Option<Metadata>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(map) => map.serialize(serializer),
        None => serializer.collect_seq(std::iter::empty::<()>()),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachRequest {
    pub user: String,
    pub device_info: DeviceInfo,
    pub signals: BTreeMap<String, String>,
    #[serde(serialize_with = "metadata_or_empty")]
    pub metadata: Option<Metadata>,
    pub callbacks: CallbackFlags,
    pub client: String,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentifyRequest {
    pub device_info: DeviceInfo,
    pub signals: BTreeMap<String, String>,
    #[serde(serialize_with = "metadata_or_empty")]
    pub metadata: Option<Metadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetachRequest {
    pub device: String,
    pub user: String,
}

/// Response of both attach and detach
#[derive(Debug, Clone, Deserialize)]
pub struct AttachResponse {
    pub device_id: String,
    pub attached_devices: u32,
    pub success: bool,
    #[serde(default)]
    pub block_over_usage: Option<bool>,
    #[serde(default)]
    pub default_device_limit: Option<u32>,
}

impl From<AttachResponse> for AttachOutcome {
    fn from(response: AttachResponse) -> Self {
        Self {
            device_id: response.device_id,
            attached_device_count: response.attached_devices,
            success: response.success,
            default_device_limit: response.default_device_limit,
            block_over_usage: response.block_over_usage,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityResponse {
    pub identity: String,
    pub confidence: f64,
}

impl From<IdentityResponse> for DeviceIdentity {
    fn from(response: IdentityResponse) -> Self {
        Self {
            identity: response.identity,
            confidence: response.confidence,
        }
    }
}
