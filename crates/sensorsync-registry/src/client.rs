//! Remote device registry client

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sensorsync_core::{RemoteIdentity, SyncKey};
use tracing::{debug, instrument};

use crate::error::{RegistryError, RegistryResult};
use crate::transport::{
    HttpRegistryTransport, RegistryMethod, RegistryRequest, RegistryResponse, RegistryTransport,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT,
};

/// Collection segment for device resources
const DEVICES: &str = "devices";

/// Values describing one report, as sent to the registry
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFields {
    pub user_id: String,
    pub radio_id: u8,
    pub child_id: u8,
    pub sensor_type_id: u8,
    pub sensor_value: String,
    pub timestamp: DateTime<Utc>,
}

impl DeviceFields {
    pub fn new(key: &SyncKey, sensor_value: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            user_id: key.user_id.clone(),
            radio_id: key.node_address,
            child_id: key.child_address,
            sensor_type_id: key.sensor_type,
            sensor_value: sensor_value.into(),
            timestamp,
        }
    }

    /// Form body for device creation
    fn create_form(&self) -> Vec<(String, String)> {
        vec![
            ("userId".into(), self.user_id.clone()),
            ("radioId".into(), self.radio_id.to_string()),
            ("childId".into(), self.child_id.to_string()),
            ("sensorTypeId".into(), self.sensor_type_id.to_string()),
            ("sensorValue".into(), self.sensor_value.clone()),
            ("timestamp".into(), self.timestamp.timestamp_millis().to_string()),
        ]
    }

    /// Form body for a device update
    fn update_form(&self, token: &str) -> Vec<(String, String)> {
        vec![
            ("sensorValue".into(), self.sensor_value.clone()),
            ("timestamp".into(), self.timestamp.timestamp_millis().to_string()),
            ("token".into(), token.to_string()),
        ]
    }
}

/// Identity fields of a registry response
#[derive(Debug, Deserialize)]
struct DeviceResponse {
    uuid: Option<String>,
    token: Option<String>,
}

impl DeviceResponse {
    fn parse(response: &RegistryResponse) -> RegistryResult<Self> {
        serde_json::from_str(&response.body).map_err(|e| {
            RegistryError::Parse(format!("status {}: {}", response.status, e))
        })
    }

    fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref().filter(|u| !u.is_empty())
    }
}

/// One-shot create/update calls against the remote registry
///
/// Calls are never retried here. Each is bounded by the client timeout; expiry
/// is reported as [`RegistryError::Timeout`].
#[derive(Clone)]
pub struct RegistryClient {
    transport: Arc<dyn RegistryTransport>,
    timeout: Duration,
}

impl RegistryClient {
    pub fn new(transport: Arc<dyn RegistryTransport>) -> Self {
        Self::with_timeout(transport, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(transport: Arc<dyn RegistryTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Create a client talking HTTP to the registry at `base_url`
    pub fn http(base_url: &str, timeout: Duration) -> RegistryResult<Self> {
        let transport = HttpRegistryTransport::with_config(
            base_url,
            timeout,
            DEFAULT_CONNECT_TIMEOUT.min(timeout),
        )?;
        Ok(Self::with_timeout(Arc::new(transport), timeout))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a new device for `key`
    ///
    /// Succeeds only if the response carries both a device id and a token.
    #[instrument(skip(self, key, device), fields(sync_key = %key))]
    pub async fn create(
        &self,
        key: &SyncKey,
        device: &DeviceFields,
    ) -> RegistryResult<RemoteIdentity> {
        let request = RegistryRequest::new(RegistryMethod::Post, &[DEVICES], device.create_form());

        let response = self.call(request).await?;
        let parsed = DeviceResponse::parse(&response)?;
        match (parsed.uuid(), parsed.token.as_deref()) {
            (Some(id), Some(token)) => {
                debug!(remote_id = %id, "Device created");
                Ok(RemoteIdentity {
                    id: id.to_string(),
                    token: token.to_string(),
                })
            }
            _ => Err(RegistryError::MissingIdentity {
                status: response.status,
            }),
        }
    }

    /// Push a new value to an existing device
    #[instrument(skip(self, identity, device), fields(remote_id = %identity.id))]
    pub async fn update(
        &self,
        identity: &RemoteIdentity,
        device: &DeviceFields,
    ) -> RegistryResult<()> {
        let request = RegistryRequest::new(
            RegistryMethod::Put,
            &[DEVICES, identity.id.as_str()],
            device.update_form(&identity.token),
        );

        let response = self.call(request).await?;
        let parsed = DeviceResponse::parse(&response)?;
        if parsed.uuid().is_none() {
            return Err(RegistryError::MissingIdentity {
                status: response.status,
            });
        }
        debug!("Device updated");
        Ok(())
    }

    async fn call(&self, request: RegistryRequest) -> RegistryResult<RegistryResponse> {
        tokio::time::timeout(self.timeout, self.transport.execute(request))
            .await
            .map_err(|_| RegistryError::Timeout)?
    }
}
