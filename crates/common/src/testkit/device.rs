use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::sharing::{
    DeviceClient, DeviceInfo, DeviceTrust, SecretSendContent, SecretSendEvent, ToDeviceMessages,
    SECRET_SEND_EVENT,
};

use super::network::{NetworkState, SentMessage};

/// Algorithm name stamped on the fake pairwise encrypted messages
pub const OLM_ALGORITHM: &str = "m.olm.v1.curve25519-aes-sha2";

/// A device on a [`TestNetwork`](super::TestNetwork)
///
/// Implements [`DeviceClient`] against the shared in-process network. The
/// "encryption" only wraps the payload with the sender's identity key, but it
/// still refuses to encrypt for a device without an established session.
#[derive(Clone)]
pub struct TestDevice {
    user_id: String,
    device_id: String,
    identity_key: String,
    state: Arc<Mutex<NetworkState>>,
}

impl std::fmt::Debug for TestDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDevice")
            .field("user_id", &self.user_id)
            .field("device_id", &self.device_id)
            .finish()
    }
}

impl TestDevice {
    pub(super) fn new(
        user_id: String,
        device_id: String,
        identity_key: String,
        state: Arc<Mutex<NetworkState>>,
    ) -> Self {
        Self {
            user_id,
            device_id,
            identity_key,
            state,
        }
    }

    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    /// Unwrap an `m.room.encrypted` message addressed to this device
    ///
    /// Returns `None` if the message was not encrypted for us or does not
    /// carry an `m.secret.send` payload.
    pub fn decrypt(&self, sender: &str, content: &Value) -> Option<SecretSendEvent> {
        let body = content
            .get("ciphertext")?
            .get(&self.identity_key)?
            .get("body")?;
        if body.get("type")?.as_str()? != SECRET_SEND_EVENT {
            return None;
        }
        let send_content: SecretSendContent =
            serde_json::from_value(body.get("content")?.clone()).ok()?;

        Some(SecretSendEvent {
            sender: sender.to_string(),
            sender_key: content
                .get("sender_key")
                .and_then(|k| k.as_str())
                .map(str::to_string),
            olm_encrypted: content.get("algorithm").and_then(|a| a.as_str())
                == Some(OLM_ALGORITHM),
            content: send_content,
        })
    }
}

#[async_trait]
impl DeviceClient for TestDevice {
    type Error = anyhow::Error;

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn send_to_device(&self, event_type: &str, messages: ToDeviceMessages) -> Result<()> {
        let stalled = self.state.lock().stall_sends;
        if stalled {
            std::future::pending::<()>().await;
        }
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(anyhow!("transport unavailable"));
        }
        for (recipient_user, devices) in messages {
            for (recipient_device, content) in devices {
                state.outbox.push(SentMessage {
                    sender_user: self.user_id.clone(),
                    sender_device: self.device_id.clone(),
                    event_type: event_type.to_string(),
                    recipient_user: recipient_user.clone(),
                    recipient_device,
                    content,
                });
            }
        }
        Ok(())
    }

    async fn ensure_session(&self, user_id: &str, device_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state
            .devices
            .contains_key(&(user_id.to_string(), device_id.to_string()))
        {
            return Err(anyhow!("unknown device {} {}", user_id, device_id));
        }
        state.sessions.insert((
            self.identity_key.clone(),
            user_id.to_string(),
            device_id.to_string(),
        ));
        Ok(())
    }

    async fn encrypt_for_device(
        &self,
        user_id: &str,
        device_id: &str,
        payload: &Value,
    ) -> Result<Value> {
        let state = self.state.lock();
        let session = (
            self.identity_key.clone(),
            user_id.to_string(),
            device_id.to_string(),
        );
        if !state.sessions.contains(&session) {
            return Err(anyhow!("no session with {} {}", user_id, device_id));
        }
        let recipient_key = state
            .devices
            .get(&(user_id.to_string(), device_id.to_string()))
            .ok_or_else(|| anyhow!("unknown device {} {}", user_id, device_id))?;

        let mut ciphertext = serde_json::Map::new();
        ciphertext.insert(
            recipient_key.clone(),
            json!({
                "type": 0,
                "body": payload,
            }),
        );

        Ok(json!({
            "algorithm": OLM_ALGORITHM,
            "sender_key": self.identity_key,
            "ciphertext": ciphertext,
        }))
    }

    async fn device_by_identity_key(&self, identity_key: &str) -> Option<DeviceInfo> {
        let state = self.state.lock();
        state
            .devices
            .iter()
            .find(|(_, key)| key.as_str() == identity_key)
            .map(|((user_id, device_id), _)| DeviceInfo {
                user_id: user_id.clone(),
                device_id: device_id.clone(),
            })
    }

    async fn device_trust(&self, user_id: &str, device_id: &str) -> DeviceTrust {
        let state = self.state.lock();
        if state
            .verified
            .contains(&(user_id.to_string(), device_id.to_string()))
        {
            DeviceTrust::verified()
        } else {
            DeviceTrust::default()
        }
    }
}
