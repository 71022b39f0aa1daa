//! sensorsync-engine - Message routing and device identity synchronization
//!
//! Ties the wire codec, local store and registry client together:
//!
//! ```text
//!  link line ──▶ decode ──▶ SyncEngine ──┬─▶ IdentityCache ──▶ RegistryClient
//!                                        ├─▶ AddressAllocator
//!                                        └─▶ OutboundWriter ──▶ link
//! ```

pub mod allocator;
pub mod cache;
pub mod engine;
pub mod locks;
pub mod sequencer;
pub mod writer;

pub use allocator::{AddressAllocator, MAX_RADIO_ADDRESS};
pub use cache::IdentityCache;
pub use engine::{Disposition, EngineConfig, SyncEngine, TimeFormat};
pub use locks::KeyedLocks;
pub use sequencer::KeyedSequencer;
pub use writer::{LinkSink, OutboundWriter, TransportError};
