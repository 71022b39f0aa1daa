//! sensorsync-core - Wire codec, data model and local store
//!
//! Shared building blocks of the sensorsync gateway: the semicolon-delimited
//! message format spoken by the radio gateway, the records the gateway keeps
//! about each sensor stream, and the store those records live in.

pub mod error;
pub mod message;
pub mod models;
pub mod store;

pub use error::{GatewayError, GatewayResult, StoreError, StoreResult};
pub use message::{decode, encode, InternalCommand, Message, MessageType};
pub use models::{IdentityRecord, RemoteIdentity, SensorReport, SyncKey};
pub use store::{JsonFileStore, LocalStore, MemoryStore};
