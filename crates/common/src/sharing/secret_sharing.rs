use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::callbacks::CryptoCallbacks;

use super::device::{DeviceClient, ToDeviceMessages};
use super::error::SharingError;
use super::messages::{
    SecretRequestContent, SecretRequestEvent, SecretSendEvent, ACTION_REQUEST,
    ACTION_REQUEST_CANCELLATION, ENCRYPTED_EVENT, SECRET_REQUEST_EVENT, SECRET_SEND_EVENT,
};

const DEFAULT_CANCEL_REASON: &str = "Cancelled";

type Outcome = Result<String, SharingError>;

/// An outbound request waiting for a response
struct PendingRequest {
    name: String,
    devices: Vec<String>,
    sender: oneshot::Sender<Outcome>,
}

struct SharingInner<D: DeviceClient> {
    client: D,
    callbacks: Option<Arc<dyn CryptoCallbacks>>,
    // request id -> pending request. never held across an await
    requests: Mutex<HashMap<String, PendingRequest>>,
}

/// Requests secrets from, and shares secrets with, our other devices
///
/// Cheap to clone; clones share one table of pending requests. Whichever of
/// an accepted response or a cancellation takes a request out of the table
/// first decides its outcome, and the other becomes a no-op.
pub struct SecretSharing<D: DeviceClient> {
    inner: Arc<SharingInner<D>>,
}

impl<D: DeviceClient> Clone for SecretSharing<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: DeviceClient> SecretSharing<D> {
    /// Create a sharing engine for `client`
    ///
    /// Without callbacks incoming requests are ignored; outgoing requests
    /// work either way.
    pub fn new(client: D, callbacks: Option<Arc<dyn CryptoCallbacks>>) -> Self {
        Self {
            inner: Arc::new(SharingInner {
                client,
                callbacks,
                requests: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn client(&self) -> &D {
        &self.inner.client
    }

    /// Number of requests still waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.inner.requests.lock().len()
    }

    /// Whether `request_id` is still waiting for a response
    pub fn is_pending(&self, request_id: &str) -> bool {
        self.inner.requests.lock().contains_key(request_id)
    }

    /// Ask our own `devices` for the secret `name`
    ///
    /// Returns as soon as the request is registered; the request messages
    /// go out on a background task. If sending fails the request is
    /// rejected with [`SharingError::Transport`]. Must be called from within
    /// a Tokio runtime.
    pub fn request(&self, name: &str, devices: &[String]) -> SecretRequest<D> {
        let (sender, receiver) = oneshot::channel();

        let request_id = {
            let mut requests = self.inner.requests.lock();
            let mut request_id = Uuid::new_v4().to_string();
            while requests.contains_key(&request_id) {
                request_id = Uuid::new_v4().to_string();
            }
            requests.insert(
                request_id.clone(),
                PendingRequest {
                    name: name.to_string(),
                    devices: devices.to_vec(),
                    sender,
                },
            );
            request_id
        };

        let user_id = self.inner.client.user_id().to_string();
        let device_messages = devices
            .iter()
            .map(|device_id| {
                let content = SecretRequestContent {
                    name: Some(name.to_string()),
                    action: Some(ACTION_REQUEST.to_string()),
                    requesting_device_id: Some(self.inner.client.device_id().to_string()),
                    request_id: Some(request_id.clone()),
                    message_id: Some(Uuid::new_v4().to_string()),
                };
                (device_id.clone(), json!(content))
            })
            .collect();
        let messages = ToDeviceMessages::from([(user_id, device_messages)]);

        let send = {
            let sharing = self.clone();
            let request_id = request_id.clone();
            let name = name.to_string();
            let device_count = devices.len();
            tokio::spawn(async move {
                sharing
                    .send_request(&request_id, &name, device_count, messages)
                    .await
            })
        };

        SecretRequest {
            request_id,
            receiver,
            sharing: self.clone(),
            send: Some(send),
        }
    }

    async fn send_request(
        &self,
        request_id: &str,
        name: &str,
        device_count: usize,
        messages: ToDeviceMessages,
    ) {
        match self
            .inner
            .client
            .send_to_device(SECRET_REQUEST_EVENT, messages)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    "requested secret {} from {} devices (request {})",
                    name,
                    device_count,
                    request_id
                );
            }
            Err(e) => {
                tracing::error!("failed to send secret request {}: {}", request_id, e);
                self.finish(request_id, Err(SharingError::Transport(e.to_string())));
            }
        }
    }

    /// Handle an incoming `m.secret.request` message
    pub async fn on_request_received(&self, event: &SecretRequestEvent) {
        let client = &self.inner.client;
        if event.sender != client.user_id() {
            tracing::debug!("ignoring secret request from {}", event.sender);
            return;
        }

        let content = &event.content;
        let (Some(name), Some(action), Some(device_id), Some(request_id)) = (
            content.name.as_deref(),
            content.action.as_deref(),
            content.requesting_device_id.as_deref(),
            content.request_id.as_deref(),
        ) else {
            tracing::debug!("ignoring incomplete secret request from {}", event.sender);
            return;
        };

        match action {
            ACTION_REQUEST_CANCELLATION => {
                // we do not track incoming requests, so there is nothing to undo
                tracing::info!(
                    "secret request {} for {} cancelled by {}",
                    request_id,
                    name,
                    device_id
                );
            }
            ACTION_REQUEST => {
                if device_id == client.device_id() {
                    return;
                }
                let Some(callbacks) = self.inner.callbacks.clone() else {
                    tracing::debug!("no callbacks installed, ignoring secret request {}", request_id);
                    return;
                };

                tracing::info!(
                    "received secret request for {} from {} (request {})",
                    name,
                    device_id,
                    request_id
                );
                let trust = client.device_trust(&event.sender, device_id).await;
                let Some(secret) = callbacks
                    .on_secret_requested(&event.sender, device_id, request_id, name, trust)
                    .await
                else {
                    tracing::info!("not sharing secret {} with {}", name, device_id);
                    return;
                };

                if let Err(e) = self
                    .share(&event.sender, device_id, request_id, &secret)
                    .await
                {
                    tracing::error!(
                        "failed to share secret {} with {}: {}",
                        name,
                        device_id,
                        e
                    );
                }
            }
            other => {
                tracing::debug!("unknown secret request action {}", other);
            }
        }
    }

    /// Encrypt a secret for one device and send it
    async fn share(
        &self,
        user_id: &str,
        device_id: &str,
        request_id: &str,
        secret: &str,
    ) -> Result<(), D::Error> {
        let client = &self.inner.client;
        let payload = json!({
            "type": SECRET_SEND_EVENT,
            "content": {
                "request_id": request_id,
                "secret": secret,
            },
        });

        client.ensure_session(user_id, device_id).await?;
        let encrypted = client
            .encrypt_for_device(user_id, device_id, &payload)
            .await?;

        let messages = ToDeviceMessages::from([(
            user_id.to_string(),
            BTreeMap::from([(device_id.to_string(), encrypted)]),
        )]);
        client.send_to_device(ENCRYPTED_EVENT, messages).await?;

        tracing::info!("shared secret for request {} with {}", request_id, device_id);
        Ok(())
    }

    /// Handle a decrypted `m.secret.send` payload
    ///
    /// Only a response from one of the devices the request was sent to,
    /// over a pairwise encrypted session, from a verified device, resolves
    /// the request. Anything else is dropped and the request stays pending.
    pub async fn on_secret_received(&self, event: &SecretSendEvent) {
        let client = &self.inner.client;
        if event.sender != client.user_id() {
            tracing::debug!("ignoring secret from {}", event.sender);
            return;
        }
        let (Some(request_id), Some(secret)) = (
            event.content.request_id.as_deref(),
            event.content.secret.as_deref(),
        ) else {
            tracing::debug!("ignoring incomplete secret from {}", event.sender);
            return;
        };

        if !event.olm_encrypted {
            tracing::error!("secret for request {} was not olm encrypted", request_id);
            return;
        }
        let device = match event.sender_key.as_deref() {
            Some(sender_key) => client.device_by_identity_key(sender_key).await,
            None => None,
        };
        let Some(device) = device.filter(|d| d.user_id == event.sender) else {
            tracing::error!(
                "secret for request {} came from an unknown device of {}",
                request_id,
                event.sender
            );
            return;
        };

        let addressed = {
            let requests = self.inner.requests.lock();
            requests
                .get(request_id)
                .map(|pending| pending.devices.contains(&device.device_id))
        };
        match addressed {
            None => {
                tracing::debug!("no pending secret request {}", request_id);
                return;
            }
            Some(false) => {
                tracing::debug!(
                    "secret request {} was not sent to {}",
                    request_id,
                    device.device_id
                );
                return;
            }
            Some(true) => {}
        }

        let trust = client.device_trust(&device.user_id, &device.device_id).await;
        if !trust.is_verified() {
            tracing::debug!(
                "ignoring secret for request {} from unverified device {}",
                request_id,
                device.device_id
            );
            return;
        }

        if self.finish(request_id, Ok(secret.to_string())) {
            tracing::info!(
                "secret request {} resolved by {}",
                request_id,
                device.device_id
            );
        } else {
            tracing::debug!("secret request {} settled while checking trust", request_id);
        }
    }

    /// Take a request out of the table and settle it
    ///
    /// Returns false if the request was no longer pending.
    fn finish(&self, request_id: &str, outcome: Outcome) -> bool {
        let pending = self.inner.requests.lock().remove(request_id);
        match pending {
            Some(pending) => {
                // the caller may have stopped waiting
                let _ = pending.sender.send(outcome);
                true
            }
            None => false,
        }
    }

    async fn cancel(&self, request_id: &str, reason: &str) {
        let pending = self.inner.requests.lock().remove(request_id);
        let Some(pending) = pending else {
            tracing::debug!("secret request {} is no longer pending", request_id);
            return;
        };
        let _ = pending
            .sender
            .send(Err(SharingError::Cancelled(reason.to_string())));

        let client = &self.inner.client;
        let content = SecretRequestContent {
            action: Some(ACTION_REQUEST_CANCELLATION.to_string()),
            requesting_device_id: Some(client.device_id().to_string()),
            request_id: Some(request_id.to_string()),
            ..Default::default()
        };
        let device_messages = pending
            .devices
            .iter()
            .map(|device_id| (device_id.clone(), json!(content)))
            .collect();
        let messages = ToDeviceMessages::from([(client.user_id().to_string(), device_messages)]);

        tracing::info!("cancelling secret request {} for {}", request_id, pending.name);
        if let Err(e) = client.send_to_device(SECRET_REQUEST_EVENT, messages).await {
            tracing::warn!("failed to send cancellation for {}: {}", request_id, e);
        }
    }
}

/// Handle on one outbound secret request
pub struct SecretRequest<D: DeviceClient> {
    request_id: String,
    receiver: oneshot::Receiver<Outcome>,
    sharing: SecretSharing<D>,
    send: Option<JoinHandle<()>>,
}

impl<D: DeviceClient> SecretRequest<D> {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// A handle that can cancel this request while its result is awaited
    pub fn canceller(&self) -> SecretRequestCanceller<D> {
        SecretRequestCanceller {
            request_id: self.request_id.clone(),
            sharing: self.sharing.clone(),
        }
    }

    /// Cancel the request, notifying the devices it was sent to
    ///
    /// No-op if the request already resolved or was cancelled.
    pub async fn cancel(&self, reason: Option<&str>) {
        self.sharing
            .cancel(&self.request_id, reason.unwrap_or(DEFAULT_CANCEL_REASON))
            .await
    }

    /// Wait until the request messages have been handed to the transport,
    /// or failed to be
    pub async fn sent(&mut self) {
        let Some(send) = self.send.take() else {
            return;
        };
        if let Err(e) = send.await {
            tracing::warn!("send task for secret request {} failed: {}", self.request_id, e);
        }
    }

    /// The outcome, if the request has already settled
    pub fn try_result(&mut self) -> Option<Outcome> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the request to settle
    pub async fn result(self) -> Outcome {
        self.receiver.await.unwrap_or(Err(SharingError::Dropped))
    }
}

/// Cancels a [`SecretRequest`] from elsewhere
pub struct SecretRequestCanceller<D: DeviceClient> {
    request_id: String,
    sharing: SecretSharing<D>,
}

impl<D: DeviceClient> Clone for SecretRequestCanceller<D> {
    fn clone(&self) -> Self {
        Self {
            request_id: self.request_id.clone(),
            sharing: self.sharing.clone(),
        }
    }
}

impl<D: DeviceClient> SecretRequestCanceller<D> {
    pub async fn cancel(&self, reason: Option<&str>) {
        self.sharing
            .cancel(&self.request_id, reason.unwrap_or(DEFAULT_CANCEL_REASON))
            .await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testkit::TestNetwork;

    #[tokio::test]
    async fn test_request_ids_are_unique() {
        let net = TestNetwork::new("@alice:example.org");
        let peer = net.add_peer("REQUESTER", None);
        net.add_device("DEVICE1");

        let devices = vec!["DEVICE1".to_string()];
        let mut a = peer.sharing.request("m.secret", &devices);
        a.sent().await;
        let mut b = peer.sharing.request("m.secret", &devices);
        b.sent().await;
        assert_ne!(a.request_id(), b.request_id());
        assert_eq!(peer.sharing.pending_requests(), 2);
    }

    #[tokio::test]
    async fn test_request_message_shape() {
        let net = TestNetwork::new("@alice:example.org");
        let peer = net.add_peer("REQUESTER", None);
        net.add_device("DEVICE1");
        net.add_device("DEVICE2");

        let devices = vec!["DEVICE1".to_string(), "DEVICE2".to_string()];
        let mut request = peer.sharing.request("m.secret", &devices);
        request.sent().await;

        let sent = net.sent_messages();
        assert_eq!(sent.len(), 2);
        for message in sent {
            assert_eq!(message.event_type, SECRET_REQUEST_EVENT);
            assert_eq!(message.recipient_user, "@alice:example.org");
            assert_eq!(message.content["name"], "m.secret");
            assert_eq!(message.content["action"], "request");
            assert_eq!(message.content["requesting_device_id"], "REQUESTER");
            assert_eq!(message.content["request_id"], request.request_id());
            assert!(message.content["org.matrix.msgid"].is_string());
        }
    }

    #[tokio::test]
    async fn test_transport_failure_rejects() {
        let net = TestNetwork::new("@alice:example.org");
        let peer = net.add_peer("REQUESTER", None);
        net.set_fail_sends(true);

        let mut request = peer
            .sharing
            .request("m.secret", &["DEVICE1".to_string()]);
        request.sent().await;
        assert!(!peer.sharing.is_pending(request.request_id()));
        assert!(matches!(
            request.result().await,
            Err(SharingError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let net = TestNetwork::new("@alice:example.org");
        let peer = net.add_peer("REQUESTER", None);
        net.add_device("DEVICE1");

        let mut request = peer
            .sharing
            .request("m.secret", &["DEVICE1".to_string()]);
        request.sent().await;
        net.take_sent();

        request.cancel(None).await;
        request.cancel(Some("again")).await;

        let sent = net.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content["action"], "request_cancellation");
        assert_eq!(sent[0].content.get("name"), None);
        assert_eq!(
            request.result().await,
            Err(SharingError::Cancelled("Cancelled".to_string()))
        );
    }

    #[tokio::test]
    async fn test_request_returns_before_send_completes() {
        let net = TestNetwork::new("@alice:example.org");
        let peer = net.add_peer("REQUESTER", None);
        net.add_device("DEVICE1");
        net.set_stall_sends(true);

        let request = peer
            .sharing
            .request("m.secret", &["DEVICE1".to_string()]);
        assert!(peer.sharing.is_pending(request.request_id()));
        assert!(net.sent_messages().is_empty());

        // the cancellation message stalls too, but the request settles first
        let canceller = request.canceller();
        tokio::spawn(async move { canceller.cancel(Some("gave up")).await });

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), request.result())
            .await
            .unwrap();
        assert_eq!(result, Err(SharingError::Cancelled("gave up".to_string())));
        assert_eq!(peer.sharing.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_dropped_engine_rejects() {
        let net = TestNetwork::new("@alice:example.org");
        net.add_device("DEVICE1");
        let peer = net.add_peer("REQUESTER", None);

        let mut request = peer
            .sharing
            .request("m.secret", &["DEVICE1".to_string()]);
        request.sent().await;
        let sharing = request.sharing.clone();
        drop(peer);
        sharing.inner.requests.lock().clear();
        drop(sharing);

        assert_eq!(request.result().await, Err(SharingError::Dropped));
    }
}
