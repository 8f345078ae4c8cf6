//! Transport configuration.
//!
//! Only host-dependent choices live here. Timeouts, frame size, pacing and
//! UUIDs are fixed by the board firmware and are constants.

use crate::ble::capability::Platform;

/// Configuration for a [`BleTransport`](crate::BleTransport).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TransportConfig {
    /// Platform the transport runs on. Drives adapter selection and permissions.
    pub platform: Platform,
    /// Always use the mock adapter, even if hardware is present.
    pub force_mock: bool,
    /// Index of the host Bluetooth adapter to open.
    pub adapter_index: usize,
}

impl TransportConfig {
    /// Configuration for the current platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the detected platform.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Force the mock adapter.
    pub fn with_force_mock(mut self, force_mock: bool) -> Self {
        self.force_mock = force_mock;
        self
    }

    /// Select which host adapter to open.
    pub fn with_adapter_index(mut self, adapter_index: usize) -> Self {
        self.adapter_index = adapter_index;
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            force_mock: false,
            adapter_index: 0,
        }
    }
}
