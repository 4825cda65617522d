//! Device identity lifecycle and the remote device operations
//!
//! `attach`, `list_attached` and `detach` are best effort: every failure is
//! logged and reported as `Outcome::Skipped`, and nothing persisted changes.
//! `identify` is the one call with a real error channel.

use crate::transport::{ApiRequest, Transport};
use crate::wire::{
    paths, AttachRequest, AttachResponse, DetachRequest, IdentifyRequest, IdentityResponse,
    PROTOCOL_VERSION,
};
use rupt_core::{
    config_error, decode_error, network_error, AttachOutcome, CallbackFlags, Credentials,
    DeviceIdentity, DeviceMetadataProvider, DeviceRecord, IdentityStore, LocalIdentity, Metadata,
    Outcome, RuptResult, SkipReason,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const ACCOUNT_SUGGESTION: &str = "Set the account id before calling this operation";

/// Inputs of an attach call besides the device description
#[derive(Debug, Clone, Default)]
pub struct AttachContext {
    pub account_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub metadata: Option<Metadata>,
    pub callbacks: CallbackFlags,
}

pub struct DeviceSession {
    transport: Arc<dyn Transport>,
    identity: IdentityStore,
    device_metadata: Arc<dyn DeviceMetadataProvider>,
}

impl DeviceSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        identity: IdentityStore,
        device_metadata: Arc<dyn DeviceMetadataProvider>,
    ) -> Self {
        Self {
            transport,
            identity,
            device_metadata,
        }
    }

    /// Server-assigned device id, `None` until the first successful attach
    pub fn device_id(&self) -> Option<String> {
        self.identity.device_id()
    }

    /// Cross-install fingerprint from the last successful identify
    pub fn device_identity(&self) -> Option<String> {
        self.identity.device_identity()
    }

    pub fn local_identity(&self) -> LocalIdentity {
        self.identity.load()
    }

    fn signals(&self) -> BTreeMap<String, String> {
        let signal = self.device_metadata.vendor_signal();
        BTreeMap::from([(signal.name, signal.value)])
    }

    /// Send and return the raw body, or the reason the call did not complete
    async fn exchange(
        &self,
        credentials: Option<&Credentials>,
        request: RuptResult<ApiRequest>,
        operation: &str,
    ) -> Result<Vec<u8>, SkipReason> {
        let request = request.map_err(|e| {
            e.log();
            SkipReason::from(e)
        })?;

        match self.transport.request(credentials, request).await {
            Ok(Some(body)) => Ok(body),
            Ok(None) => {
                debug!(operation, "No response body, leaving local state unchanged");
                Err(SkipReason::Network(format!("{} did not complete", operation)))
            }
            Err(e) => {
                e.log();
                Err(SkipReason::from(e))
            }
        }
    }

    fn decode<T: DeserializeOwned>(body: &[u8], operation: &str) -> Result<T, SkipReason> {
        serde_json::from_slice(body).map_err(|e| {
            warn!(operation, error = %e, "Failed to decode response");
            SkipReason::Decode(format!("unable to decode {} response: {}", operation, e))
        })
    }

    /// Register this device as active for the account
    ///
    /// On success the returned device id replaces the persisted one.
    pub async fn attach(
        &self,
        credentials: Option<&Credentials>,
        context: AttachContext,
    ) -> Outcome<AttachOutcome> {
        let Some(account_id) = context.account_id else {
            let err = config_error!(
                "userID must not be nil",
                "device_session",
                "attach",
                suggestion = ACCOUNT_SUGGESTION
            );
            err.log();
            return Outcome::Skipped(SkipReason::from(err));
        };

        let body = AttachRequest {
            user: account_id.clone(),
            device_info: self.device_metadata.device_info(),
            signals: self.signals(),
            metadata: context.metadata,
            callbacks: context.callbacks,
            client: self.device_metadata.client_platform().as_tag().to_string(),
            version: PROTOCOL_VERSION,
            email: context.email,
            phone: context.phone,
            identity: self.identity.device_identity(),
        };

        let request = ApiRequest::post(paths::ACCESS, &body);
        let response = match self.exchange(credentials, request, "attach").await {
            Ok(raw) => Self::decode::<AttachResponse>(&raw, "attach"),
            Err(reason) => Err(reason),
        };

        match response {
            Ok(response) => {
                let outcome = AttachOutcome::from(response);
                self.identity.set_device_id(Some(&outcome.device_id));
                info!(
                    user = %account_id,
                    device_id = %outcome.device_id,
                    attached = outcome.attached_device_count,
                    "Device attached"
                );
                Outcome::Applied(outcome)
            }
            Err(reason) => Outcome::Skipped(reason),
        }
    }

    /// Resolve the cross-install identity of this device
    pub async fn identify(
        &self,
        credentials: Option<&Credentials>,
        metadata: Option<Metadata>,
    ) -> RuptResult<DeviceIdentity> {
        let body = IdentifyRequest {
            device_info: self.device_metadata.device_info(),
            signals: self.signals(),
            metadata,
            identity_id: self.identity.device_identity(),
        };
        let request = ApiRequest::post(paths::IDENTITY, &body)?;

        let Some(raw) = self.transport.request(credentials, request).await? else {
            return Err(network_error!("could not identify device", "device_session"));
        };

        let response: IdentityResponse = serde_json::from_slice(&raw)
            .map_err(|e| decode_error!("unable to decode device response", "device_session", e))?;

        self.identity.set_device_identity(Some(&response.identity));
        debug!(confidence = response.confidence, "Device identified");
        Ok(response.into())
    }

    /// Fetch every device currently attached to the account
    pub async fn list_attached(
        &self,
        credentials: Option<&Credentials>,
        account_id: Option<&str>,
    ) -> Outcome<Vec<DeviceRecord>> {
        let Some(account_id) = account_id else {
            let err = config_error!(
                "userID must not be nil",
                "device_session",
                "list_attached",
                suggestion = ACCOUNT_SUGGESTION
            );
            err.log();
            return Outcome::Skipped(SkipReason::from(err));
        };

        let request = Ok(ApiRequest::get(paths::attached_devices(account_id)));
        let devices = match self.exchange(credentials, request, "list_attached").await {
            Ok(raw) => Self::decode::<Vec<DeviceRecord>>(&raw, "list_attached"),
            Err(reason) => Err(reason),
        };

        match devices {
            Ok(devices) => {
                debug!(user = %account_id, count = devices.len(), "Fetched attached devices");
                Outcome::Applied(devices)
            }
            Err(reason) => Outcome::Skipped(reason),
        }
    }

    /// Remove `device_id` from the account's active set
    pub async fn detach(
        &self,
        credentials: Option<&Credentials>,
        account_id: Option<&str>,
        device_id: &str,
    ) -> Outcome<AttachOutcome> {
        let Some(account_id) = account_id else {
            let err = config_error!(
                "accountID must not be nil",
                "device_session",
                "detach",
                suggestion = ACCOUNT_SUGGESTION
            );
            err.log();
            return Outcome::Skipped(SkipReason::from(err));
        };

        let body = DetachRequest {
            device: device_id.to_string(),
            user: account_id.to_string(),
        };
        let request = ApiRequest::post(paths::DETACH, &body);
        let response = match self.exchange(credentials, request, "detach").await {
            Ok(raw) => Self::decode::<AttachResponse>(&raw, "detach"),
            Err(reason) => Err(reason),
        };

        match response {
            Ok(response) => {
                info!(
                    user = %account_id,
                    device_id,
                    success = response.success,
                    "Detach answered"
                );
                Outcome::Applied(response.into())
            }
            Err(reason) => Outcome::Skipped(reason),
        }
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
