//! Synchronization engine
//!
//! Receives decoded messages and dispatches them by type:
//!
//! - `SetVariable` reports are synchronized with the remote registry. The
//!   first report for a [`SyncKey`] creates a device, later ones update it.
//!   Every report is stored locally, marked synced or unsynced.
//! - `Internal` requests for time, unit system and a radio address are
//!   answered on the link.
//! - Everything else is logged and dropped.
//!
//! Each message is handled independently; callers may run many
//! [`SyncEngine::handle_line`] calls concurrently. Reports for the same key
//! are serialized so a device is never created twice. A reader that needs
//! same-key reports applied in arrival order hands lines to
//! [`SyncEngine::submit_line`] instead.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sensorsync_core::{
    decode, GatewayResult, InternalCommand, LocalStore, Message, MessageType, SensorReport,
    SyncKey,
};
use sensorsync_registry::{DeviceFields, RegistryClient};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::allocator::AddressAllocator;
use crate::cache::IdentityCache;
use crate::locks::KeyedLocks;
use crate::sequencer::KeyedSequencer;
use crate::writer::OutboundWriter;

/// Resolution of the time sent in reply to a time request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFormat {
    /// Seconds since the Unix epoch
    Seconds,
    /// Milliseconds since the Unix epoch
    #[default]
    Millis,
}

impl TimeFormat {
    pub fn format(self, at: DateTime<Utc>) -> String {
        match self {
            TimeFormat::Seconds => at.timestamp().to_string(),
            TimeFormat::Millis => at.timestamp_millis().to_string(),
        }
    }
}

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Owner of every sensor stream seen by this gateway
    pub user_id: String,
    pub time_format: TimeFormat,
    /// Payload of the reply to a unit request
    pub unit_payload: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_id: "user".to_string(),
            time_format: TimeFormat::default(),
            unit_payload: "0".to_string(),
        }
    }
}

/// What the engine did with a message
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Report accepted by the registry; `created` if this report registered the device
    Synced { sync_key: SyncKey, created: bool },
    /// Report stored locally, registry left out of date
    Unsynced { sync_key: SyncKey },
    /// Report stored locally, no registry configured
    Recorded { sync_key: SyncKey },
    /// Reply written to the link
    Replied(Message),
    /// Nothing to do for this message
    Ignored,
    /// Message could not be processed
    Dropped(String),
}

pub struct SyncEngine {
    config: EngineConfig,
    store: Arc<dyn LocalStore>,
    cache: IdentityCache,
    allocator: AddressAllocator,
    registry: Option<RegistryClient>,
    writer: Arc<OutboundWriter>,
    locks: KeyedLocks<SyncKey>,
    sequencer: KeyedSequencer<SyncKey>,
}

impl SyncEngine {
    /// Create an engine; without a registry client reports are only logged
    /// and stored
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn LocalStore>,
        registry: Option<RegistryClient>,
        writer: Arc<OutboundWriter>,
    ) -> Self {
        Self {
            config,
            cache: IdentityCache::new(store.clone()),
            allocator: AddressAllocator::new(store.clone()),
            store,
            registry,
            writer,
            locks: KeyedLocks::new(),
            sequencer: KeyedSequencer::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn writer(&self) -> &Arc<OutboundWriter> {
        &self.writer
    }

    pub fn is_log_only(&self) -> bool {
        self.registry.is_none()
    }

    /// Decode and handle one inbound line
    ///
    /// Never fails: malformed lines and handling errors are logged and
    /// reported as [`Disposition::Dropped`].
    pub async fn handle_line(&self, line: &str) -> Disposition {
        let message = match decode(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                return Disposition::Dropped(e.to_string());
            }
        };

        match self.handle_message(&message).await {
            Ok(disposition) => disposition,
            Err(e) => {
                warn!(line = %line.trim_end(), error = %e, "Dropping message");
                Disposition::Dropped(e.to_string())
            }
        }
    }

    /// Handle one inbound line in the background
    ///
    /// `SetVariable` reports are queued per [`SyncKey`] and applied in the
    /// order they were submitted; everything else runs on its own task.
    /// Outcomes are only logged. Must be called from within a tokio runtime.
    pub fn submit_line(self: &Arc<Self>, line: &str) {
        let message = match decode(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                return;
            }
        };

        let key = (message.message_type == MessageType::SetVariable)
            .then(|| SyncKey::for_message(&self.config.user_id, &message));
        let engine = self.clone();
        let line = line.to_string();
        let job = async move {
            if let Err(e) = engine.handle_message(&message).await {
                warn!(line = %line.trim_end(), error = %e, "Dropping message");
            }
        };

        match key {
            Some(key) => self.sequencer.submit(key, Box::pin(job)),
            None => {
                tokio::spawn(job);
            }
        }
    }

    /// Dispatch a decoded message by type
    #[instrument(skip_all, fields(node = message.node_address, child = message.child_address))]
    pub async fn handle_message(&self, message: &Message) -> GatewayResult<Disposition> {
        match message.message_type {
            MessageType::SetVariable => self.set_variable(message).await,
            MessageType::Internal => self.internal(message).await,
            MessageType::Presentation
            | MessageType::RequestVariable
            | MessageType::AckVariable => {
                debug!(message_type = ?message.message_type, sub_type = message.sub_type, "Message type not handled");
                Ok(Disposition::Ignored)
            }
            MessageType::Unknown(code) => {
                info!(message_type = code, "Unknown message type");
                Ok(Disposition::Ignored)
            }
        }
    }

    async fn set_variable(&self, message: &Message) -> GatewayResult<Disposition> {
        let key = SyncKey::for_message(&self.config.user_id, message);
        let value = message.payload.as_str();
        let now = Utc::now();

        let Some(registry) = &self.registry else {
            info!(sync_key = %key, value, "Sensor report");
            self.store
                .insert_report(SensorReport::new(key.clone(), value, now))
                .await?;
            return Ok(Disposition::Recorded { sync_key: key });
        };

        let _guard = self.locks.lock(&key).await;
        let device = DeviceFields::new(&key, value, now);

        let created = match self.cache.lookup(&key).await? {
            None => {
                debug!(sync_key = %key, "No identity cached, creating device");
                match registry.create(&key, &device).await {
                    Ok(identity) => {
                        match self.cache.record_created(&key, &identity, value, now).await {
                            Ok(_) => Some(true),
                            Err(e) => {
                                // Without the record the next report cannot update this device
                                error!(sync_key = %key, remote_id = %identity.id, error = %e, "Failed to record identity, storing report unsynced");
                                None
                            }
                        }
                    }
                    Err(e) => {
                        warn!(sync_key = %key, error = %e, "Device creation failed, storing report unsynced");
                        None
                    }
                }
            }
            Some(record) => match registry.update(&record.identity(), &device).await {
                Ok(()) => {
                    if let Err(e) = self.cache.touch(&key, value, now).await {
                        warn!(sync_key = %key, error = %e, "Identity vanished during update");
                    }
                    Some(false)
                }
                Err(e) => {
                    warn!(sync_key = %key, remote_id = %record.remote_id, error = %e, "Device update failed, storing report unsynced");
                    None
                }
            },
        };

        let report = SensorReport::new(key.clone(), value, now).synced(created.is_some());
        self.store.insert_report(report).await?;

        Ok(match created {
            Some(created) => {
                info!(sync_key = %key, value, created, "Report synchronized");
                Disposition::Synced {
                    sync_key: key,
                    created,
                }
            }
            None => Disposition::Unsynced { sync_key: key },
        })
    }

    async fn internal(&self, message: &Message) -> GatewayResult<Disposition> {
        let Some(command) = message.internal_command() else {
            debug!(sub_type = message.sub_type, "Unknown internal command");
            return Ok(Disposition::Ignored);
        };

        let payload = match command {
            InternalCommand::Time => self.config.time_format.format(Utc::now()),
            InternalCommand::Unit => self.config.unit_payload.clone(),
            InternalCommand::RequestId => self.allocator.allocate().await?.to_string(),
            InternalCommand::LogMessage => {
                debug!(log = %message.payload, "Gateway log");
                return Ok(Disposition::Ignored);
            }
            InternalCommand::Version => {
                info!(version = %message.payload, "Gateway version");
                return Ok(Disposition::Ignored);
            }
            InternalCommand::BatteryLevel => {
                info!(level = %message.payload, "Battery level");
                return Ok(Disposition::Ignored);
            }
            other => {
                debug!(command = ?other, "Internal command not handled");
                return Ok(Disposition::Ignored);
            }
        };

        let reply = Message::internal(
            message.node_address,
            message.child_address,
            command,
            payload,
        );
        self.writer.send(&reply).await?;
        Ok(Disposition::Replied(reply))
    }
}
