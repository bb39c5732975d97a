/// Lightweight test harness for multi-device secret sharing tests
///
/// Provides an in-process network of devices belonging to one user, with
/// a shared outbox, fake pairwise sessions and scriptable device trust, so
/// the request/response protocol can be driven end to end without any
/// real transport.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::TestNetwork;
///
/// #[tokio::test]
/// async fn test_share() {
///     let net = TestNetwork::new("@alice:example.org");
///
///     // Device A holds the secret and agrees to share it
///     let a = net.add_peer("A", Some(callbacks));
///     let b = net.add_peer("B", None);
///
///     let mut request = b.sharing.request("m.megolm_backup.v1", &["A".to_string()]);
///     request.sent().await;
///     net.deliver_all(&[&a, &b]).await;
///
///     assert_eq!(request.result().await.unwrap(), "backup key");
/// }
/// ```
mod device;
mod network;
mod peer;

pub use device::{TestDevice, OLM_ALGORITHM};
pub use network::{SentMessage, TestNetwork};
pub use peer::TestPeer;
