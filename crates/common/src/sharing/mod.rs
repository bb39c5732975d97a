//! Secret sharing between a user's own devices
//!
//! A device missing a secret sends `m.secret.request` to some of its sibling
//! devices. A sibling that agrees to share replies with an `m.secret.send`
//! payload encrypted for the requester over a pairwise session. The
//! requester only accepts a reply from a verified device it actually asked.

mod device;
mod error;
mod messages;
mod secret_sharing;

pub use device::{DeviceClient, DeviceInfo, DeviceTrust, ToDeviceMessages};
pub use error::SharingError;
pub use messages::{
    SecretRequestContent, SecretRequestEvent, SecretSendContent, SecretSendEvent,
    ACTION_REQUEST, ACTION_REQUEST_CANCELLATION, ENCRYPTED_EVENT, SECRET_REQUEST_EVENT,
    SECRET_SEND_EVENT,
};
pub use secret_sharing::{SecretRequest, SecretRequestCanceller, SecretSharing};
