use serde::{Deserialize, Serialize};

/// To-device message type for requests and cancellations
pub const SECRET_REQUEST_EVENT: &str = "m.secret.request";
/// Payload type of a secret sent in reply to a request
pub const SECRET_SEND_EVENT: &str = "m.secret.send";
/// To-device message type wrapping pairwise encrypted payloads
pub const ENCRYPTED_EVENT: &str = "m.room.encrypted";

pub const ACTION_REQUEST: &str = "request";
pub const ACTION_REQUEST_CANCELLATION: &str = "request_cancellation";

/// Content of an `m.secret.request` message
///
/// Every field is optional on the way in; a message missing any of the
/// identifying fields is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRequestContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requesting_device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(
        rename = "org.matrix.msgid",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub message_id: Option<String>,
}

/// An `m.secret.request` message as received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRequestEvent {
    pub sender: String,
    pub content: SecretRequestContent,
}

/// Content of a decrypted `m.secret.send` payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSendContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// A decrypted `m.secret.send` payload together with what the session layer
/// knows about where it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSendEvent {
    /// User the event claims to be from
    pub sender: String,
    /// Identity key of the session the event was decrypted with
    #[serde(default)]
    pub sender_key: Option<String>,
    /// Whether the event arrived over a pairwise (Olm) session
    #[serde(default)]
    pub olm_encrypted: bool,
    pub content: SecretSendContent,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_content_wire_names() {
        let content = SecretRequestContent {
            name: Some("m.megolm_backup.v1".to_string()),
            action: Some(ACTION_REQUEST.to_string()),
            requesting_device_id: Some("DEVICE".to_string()),
            request_id: Some("req".to_string()),
            message_id: Some("msg".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&content).unwrap(),
            json!({
                "name": "m.megolm_backup.v1",
                "action": "request",
                "requesting_device_id": "DEVICE",
                "request_id": "req",
                "org.matrix.msgid": "msg",
            })
        );
    }

    #[test]
    fn test_request_content_tolerates_missing_fields() {
        let content: SecretRequestContent =
            serde_json::from_value(json!({"action": "request_cancellation"})).unwrap();
        assert_eq!(content.action.as_deref(), Some(ACTION_REQUEST_CANCELLATION));
        assert_eq!(content.name, None);
    }
}
