use std::collections::BTreeMap;
use std::fmt::{Debug, Display};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// To-device messages keyed by user id, then device id
pub type ToDeviceMessages = BTreeMap<String, BTreeMap<String, Value>>;

/// A device known to the local device list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub user_id: String,
    pub device_id: String,
}

/// Trust verdict for a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTrust {
    /// Signed by the owner's cross-signing key, which we trust
    pub cross_signing_verified: bool,
    /// Verified directly by this device
    pub locally_verified: bool,
}

impl DeviceTrust {
    pub fn verified() -> Self {
        Self {
            cross_signing_verified: true,
            locally_verified: true,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.cross_signing_verified || self.locally_verified
    }
}

/// What secret sharing needs from the rest of the client
///
/// Covers our own identity, the to-device transport, the pairwise (Olm)
/// session layer and device trust. None of it is needed for secret storage
/// itself.
#[async_trait]
pub trait DeviceClient: Send + Sync + 'static {
    type Error: Display + Debug + Send + Sync + 'static;

    /// Our own user id
    fn user_id(&self) -> &str;

    /// Our own device id
    fn device_id(&self) -> &str;

    /// Send one to-device message per addressed device, in a single call
    async fn send_to_device(
        &self,
        event_type: &str,
        messages: ToDeviceMessages,
    ) -> Result<(), Self::Error>;

    /// Make sure a pairwise session with the device exists
    async fn ensure_session(&self, user_id: &str, device_id: &str) -> Result<(), Self::Error>;

    /// Encrypt a payload for exactly one device
    ///
    /// The returned value is the content of an `m.room.encrypted` message.
    async fn encrypt_for_device(
        &self,
        user_id: &str,
        device_id: &str,
        payload: &Value,
    ) -> Result<Value, Self::Error>;

    /// Look up the device owning an identity (curve25519) key
    async fn device_by_identity_key(&self, identity_key: &str) -> Option<DeviceInfo>;

    /// Current trust verdict for a device
    async fn device_trust(&self, user_id: &str, device_id: &str) -> DeviceTrust;
}
