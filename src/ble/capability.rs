//! Platform capability gate.
//!
//! Decides once whether a real BLE stack is usable and hands back an
//! adapter either way.

use std::sync::Arc;
use tracing::{info, warn};

use crate::ble::adapter::BleAdapter;
use crate::ble::mock::MockAdapter;
use crate::ble::real::RealAdapter;
use crate::config::TransportConfig;

/// The platform the transport is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Platform {
    /// Browser-hosted context. No BLE stack.
    Web,
    /// Android, with the OS API level.
    Android {
        /// The `ro.build.version.sdk` API level.
        api_level: u32,
    },
    /// iOS.
    Ios,
    /// Desktop operating systems (Linux, macOS, Windows).
    Desktop,
}

impl Platform {
    /// Detect the platform from the compilation target.
    pub fn current() -> Self {
        if cfg!(target_arch = "wasm32") {
            Self::Web
        } else if cfg!(target_os = "android") {
            Self::Android {
                api_level: android_api_level().unwrap_or(0),
            }
        } else if cfg!(target_os = "ios") {
            Self::Ios
        } else {
            Self::Desktop
        }
    }

    /// Whether this is a phone or tablet OS.
    pub fn is_mobile(&self) -> bool {
        matches!(self, Self::Android { .. } | Self::Ios)
    }

    /// Whether a native BLE stack can exist on this platform at all.
    pub fn supports_ble(&self) -> bool {
        !matches!(self, Self::Web)
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Web => write!(f, "Web"),
            Self::Android { api_level } => write!(f, "Android (API {})", api_level),
            Self::Ios => write!(f, "iOS"),
            Self::Desktop => write!(f, "Desktop"),
        }
    }
}

/// Read the Android API level from the system properties.
fn android_api_level() -> Option<u32> {
    let output = std::process::Command::new("getprop")
        .arg("ro.build.version.sdk")
        .output()
        .ok()?;
    String::from_utf8(output.stdout).ok()?.trim().parse().ok()
}

/// Select the adapter for this process.
///
/// Falls back to [`MockAdapter`] on the web, when `force_mock` is set, or
/// when the host Bluetooth stack cannot be opened.
pub async fn init_adapter(config: &TransportConfig) -> Arc<dyn BleAdapter> {
    if config.force_mock {
        info!("Mock adapter forced by configuration");
        return Arc::new(MockAdapter::new());
    }

    if !config.platform.supports_ble() {
        info!("No BLE stack on {}, using mock adapter", config.platform);
        return Arc::new(MockAdapter::new());
    }

    match RealAdapter::new(config.adapter_index).await {
        Ok(adapter) => Arc::new(adapter),
        Err(e) => {
            warn!("Bluetooth unavailable ({}), using mock adapter", e);
            Arc::new(MockAdapter::new())
        }
    }
}
