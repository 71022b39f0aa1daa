//! sensorsync-registry - Remote device registry client
//!
//! Creates and updates registry devices for sensor streams. The registry
//! speaks form-encoded HTTP:
//!
//! - `POST /devices` creates a device and answers `{"uuid": .., "token": ..}`
//! - `PUT /devices/{uuid}` updates it and answers with the device `uuid`
//!
//! A response without `uuid` is a failure regardless of HTTP status.

pub mod client;
pub mod error;
pub mod testing;
pub mod transport;

pub use client::{DeviceFields, RegistryClient};
pub use error::{RegistryError, RegistryResult};
pub use transport::{
    HttpRegistryTransport, RegistryMethod, RegistryRequest, RegistryResponse, RegistryTransport,
};
