use crate::sharing::{DeviceClient, SecretSharing};

use super::device::TestDevice;

/// A device on the test network with its own sharing engine
pub struct TestPeer {
    pub device: TestDevice,
    pub sharing: SecretSharing<TestDevice>,
}

impl TestPeer {
    pub fn user_id(&self) -> &str {
        self.device.user_id()
    }

    pub fn device_id(&self) -> &str {
        self.device.device_id()
    }
}
