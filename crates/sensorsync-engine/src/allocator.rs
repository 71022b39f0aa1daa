//! Radio address allocation
//!
//! Nodes without an address ask the gateway for one. The next address is
//! computed by scanning the whole ledger rather than keeping a counter, so a
//! ledger filled out of order or by another process is still honored.

use std::sync::Arc;

use sensorsync_core::{GatewayError, GatewayResult, LocalStore};
use tokio::sync::Mutex;
use tracing::info;

/// Highest assignable node address; 255 is the protocol's AUTO/broadcast id
pub const MAX_RADIO_ADDRESS: u8 = 254;

pub struct AddressAllocator {
    store: Arc<dyn LocalStore>,
    /// Held across scan and commit
    ledger_lock: Mutex<()>,
}

impl AddressAllocator {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            ledger_lock: Mutex::new(()),
        }
    }

    /// `max(ledger) + 1`, or 1 for an empty ledger
    pub async fn next_address(&self) -> GatewayResult<u8> {
        let addresses = self.store.radio_addresses().await?;
        match addresses.into_iter().max() {
            None => Ok(1),
            Some(max) if max >= MAX_RADIO_ADDRESS => Err(GatewayError::AddressSpaceExhausted),
            Some(max) => Ok(max + 1),
        }
    }

    /// Add `address` to the ledger
    pub async fn commit(&self, address: u8) -> GatewayResult<()> {
        self.store.insert_radio_address(address).await?;
        Ok(())
    }

    /// Compute and commit the next address as one atomic step
    pub async fn allocate(&self) -> GatewayResult<u8> {
        let _guard = self.ledger_lock.lock().await;
        let address = self.next_address().await?;
        self.commit(address).await?;
        info!(address, "Allocated radio address");
        Ok(address)
    }
}
