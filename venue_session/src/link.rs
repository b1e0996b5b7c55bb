//! Shared handle to the session's current gateway connection.
//!
//! The session controller installs the connection once the handshake reaches
//! Ready and releases it on logout or disconnect. The multiplexer and command
//! coordinator only ever borrow it through `current()`, so they observe the same
//! lifecycle without owning the connection.
use std::sync::{Arc, RwLock};

use log::{debug, error};
use venue_common::{Result, VenueError};

use crate::gateway::Gateway;

/// Slot holding the Ready connection, if any.
#[derive(Default)]
pub struct GatewayLink {
    slot: RwLock<Option<Arc<dyn Gateway>>>,
}

impl GatewayLink {
    /// Create an empty link.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a Ready connection.
    pub fn install(&self, gateway: Arc<dyn Gateway>) -> Result<()> {
        let mut slot = self.slot.write()?;
        *slot = Some(gateway);
        debug!("Gateway connection installed");
        Ok(())
    }

    /// The Ready connection, or `NotReady`.
    pub fn current(&self) -> Result<Arc<dyn Gateway>> {
        let slot = self.slot.read()?;
        slot.as_ref().map(Arc::clone).ok_or(VenueError::NotReady)
    }

    /// Whether a Ready connection is installed.
    pub fn is_installed(&self) -> bool {
        self.slot.read().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Take the connection out of the slot and free its resources.
    pub fn release(&self) {
        let taken = match self.slot.write() {
            Ok(mut slot) => slot.take(),
            Err(e) => {
                error!("Gateway link lock poisoned on release: {}", e);
                None
            }
        };
        if let Some(gateway) = taken {
            gateway.release();
            debug!("Gateway connection released");
        }
    }
}
