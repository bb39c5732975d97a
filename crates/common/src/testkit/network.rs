use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::callbacks::CryptoCallbacks;
use crate::sharing::{
    SecretRequestContent, SecretRequestEvent, SecretSendContent, SecretSendEvent, SecretSharing,
    ENCRYPTED_EVENT, SECRET_REQUEST_EVENT,
};

use super::device::TestDevice;
use super::peer::TestPeer;

/// A to-device message captured by the network
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub sender_user: String,
    pub sender_device: String,
    pub event_type: String,
    pub recipient_user: String,
    pub recipient_device: String,
    pub content: Value,
}

#[derive(Default)]
pub(super) struct NetworkState {
    /// (user id, device id) -> identity key
    pub devices: BTreeMap<(String, String), String>,
    /// (sender identity key, recipient user, recipient device)
    pub sessions: HashSet<(String, String, String)>,
    pub verified: HashSet<(String, String)>,
    pub outbox: Vec<SentMessage>,
    pub fail_sends: bool,
    pub stall_sends: bool,
}

/// An in-process set of devices belonging to one user
///
/// Messages sent by any device land in a shared outbox until
/// [`TestNetwork::deliver_all`] routes them. Devices start out verified.
#[derive(Clone)]
pub struct TestNetwork {
    user_id: String,
    state: Arc<Mutex<NetworkState>>,
}

impl TestNetwork {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            state: Arc::new(Mutex::new(NetworkState::default())),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Register one of our own devices
    pub fn add_device(&self, device_id: &str) -> TestDevice {
        let user_id = self.user_id.clone();
        self.add_user_device(&user_id, device_id)
    }

    /// Register a device belonging to any user
    pub fn add_user_device(&self, user_id: &str, device_id: &str) -> TestDevice {
        let identity_key = format!("curve25519:{}:{}", user_id, device_id);
        let mut state = self.state.lock();
        state.devices.insert(
            (user_id.to_string(), device_id.to_string()),
            identity_key.clone(),
        );
        state
            .verified
            .insert((user_id.to_string(), device_id.to_string()));

        TestDevice::new(
            user_id.to_string(),
            device_id.to_string(),
            identity_key,
            self.state.clone(),
        )
    }

    /// Register one of our own devices running a sharing engine
    pub fn add_peer(
        &self,
        device_id: &str,
        callbacks: Option<Arc<dyn CryptoCallbacks>>,
    ) -> TestPeer {
        let device = self.add_device(device_id);
        let sharing = SecretSharing::new(device.clone(), callbacks);
        TestPeer { device, sharing }
    }

    pub fn set_verified(&self, device_id: &str, verified: bool) {
        let key = (self.user_id.clone(), device_id.to_string());
        let mut state = self.state.lock();
        if verified {
            state.verified.insert(key);
        } else {
            state.verified.remove(&key);
        }
    }

    /// Make every send fail until turned off again
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Make every send hang forever until turned off again
    ///
    /// Only sends that start after the switch is flipped back complete.
    pub fn set_stall_sends(&self, stall: bool) {
        self.state.lock().stall_sends = stall;
    }

    /// Messages sent and not yet delivered
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.lock().outbox.clone()
    }

    /// Remove and return every undelivered message
    pub fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut self.state.lock().outbox)
    }

    /// Build a well-formed, decrypted secret response as if `device_id` sent it
    pub fn secret_send_event(
        &self,
        device_id: &str,
        request_id: &str,
        secret: &str,
    ) -> SecretSendEvent {
        let state = self.state.lock();
        let sender_key = state
            .devices
            .get(&(self.user_id.clone(), device_id.to_string()))
            .cloned();

        SecretSendEvent {
            sender: self.user_id.clone(),
            sender_key,
            olm_encrypted: true,
            content: SecretSendContent {
                request_id: Some(request_id.to_string()),
                secret: Some(secret.to_string()),
            },
        }
    }

    /// Route queued messages to `peers` until no more are produced
    ///
    /// Messages for devices without a peer are dropped. Returns how many
    /// messages reached a peer.
    pub async fn deliver_all(&self, peers: &[&TestPeer]) -> usize {
        let mut delivered = 0;
        loop {
            let batch = self.take_sent();
            if batch.is_empty() {
                break;
            }

            for message in batch {
                let Some(peer) = peers.iter().find(|peer| {
                    peer.user_id() == message.recipient_user
                        && peer.device_id() == message.recipient_device
                }) else {
                    tracing::debug!(
                        "dropping {} for {} (no peer)",
                        message.event_type,
                        message.recipient_device
                    );
                    continue;
                };

                match message.event_type.as_str() {
                    SECRET_REQUEST_EVENT => {
                        let Ok(content) =
                            serde_json::from_value::<SecretRequestContent>(message.content)
                        else {
                            continue;
                        };
                        let event = SecretRequestEvent {
                            sender: message.sender_user,
                            content,
                        };
                        peer.sharing.on_request_received(&event).await;
                    }
                    ENCRYPTED_EVENT => {
                        let Some(event) = peer.device.decrypt(&message.sender_user, &message.content)
                        else {
                            continue;
                        };
                        peer.sharing.on_secret_received(&event).await;
                    }
                    other => {
                        tracing::debug!("dropping unknown message type {}", other);
                        continue;
                    }
                }
                delivered += 1;
            }
        }
        delivered
    }
}
