//! # Device Identity
//!
//! A UUID v4 generated on first run and persisted under its own key. It is
//! what the agent exchanges for a token in device-identity auth mode, so it
//! must never change once written.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::SecureKeyValueStore;

/// Storage key of the device identity.
pub const DEVICE_ID_KEY: &str = "device_id";

/// Persistent device identity.
#[derive(Clone)]
pub struct DeviceIdentity {
    store: Arc<dyn SecureKeyValueStore>,
}

impl DeviceIdentity {
    pub fn new(store: Arc<dyn SecureKeyValueStore>) -> Self {
        DeviceIdentity { store }
    }

    /// Returns the stored identity, generating and persisting one on first use.
    pub async fn get_or_create(&self) -> Result<String, StoreError> {
        if let Some(existing) = self.store.get(DEVICE_ID_KEY).await? {
            if Uuid::parse_str(&existing).is_err() {
                warn!("Stored device identity is not a UUID, keeping it as-is");
            }
            return Ok(existing);
        }

        let id = Uuid::new_v4().to_string();
        self.store.set(DEVICE_ID_KEY, &id).await?;
        info!(device_id = %id, "Generated new device identity");

        Ok(id)
    }
}
