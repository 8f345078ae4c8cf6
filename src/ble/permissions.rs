//! Runtime permission gating.
//!
//! Some mobile platforms refuse to scan until the user has granted runtime
//! permissions. The host application owns the actual OS prompt and plugs it
//! in as a [`PermissionPrompter`].

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::ble::capability::Platform;
use crate::error::{Error, Result};

/// First Android API level with the split `BLUETOOTH_SCAN` / `BLUETOOTH_CONNECT` model.
pub const ANDROID_S_API_LEVEL: u32 = 31;

/// A runtime permission relevant to BLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Permission {
    /// `android.permission.BLUETOOTH_SCAN`.
    BluetoothScan,
    /// `android.permission.BLUETOOTH_CONNECT`.
    BluetoothConnect,
    /// `android.permission.ACCESS_FINE_LOCATION`.
    FineLocation,
}

/// OS callout that asks the user for permissions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionPrompter: Send + Sync {
    /// Ask for `permissions`, returning the grant result for each one answered.
    async fn request(&self, permissions: &[Permission]) -> Vec<(Permission, bool)>;
}

/// Prompter that denies everything. Used when the host supplies none.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAllPrompter;

#[async_trait]
impl PermissionPrompter for DenyAllPrompter {
    async fn request(&self, permissions: &[Permission]) -> Vec<(Permission, bool)> {
        permissions.iter().map(|p| (*p, false)).collect()
    }
}

/// Decides which permissions a platform needs and whether they were granted.
pub struct PermissionAuthority {
    platform: Platform,
    prompter: Box<dyn PermissionPrompter>,
}

impl PermissionAuthority {
    /// Create an authority for `platform` backed by `prompter`.
    pub fn new(platform: Platform, prompter: Box<dyn PermissionPrompter>) -> Self {
        Self { platform, prompter }
    }

    /// The permissions that must all be granted before scanning on `platform`.
    pub fn required_permissions(platform: Platform) -> Vec<Permission> {
        match platform {
            Platform::Android { api_level } if api_level >= ANDROID_S_API_LEVEL => vec![
                Permission::BluetoothScan,
                Permission::BluetoothConnect,
                Permission::FineLocation,
            ],
            Platform::Android { .. } => vec![Permission::FineLocation],
            Platform::Ios | Platform::Desktop | Platform::Web => Vec::new(),
        }
    }

    /// The platform this authority was created for.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Request every required permission. Returns `true` only if all were granted.
    pub async fn request_permissions(&self) -> bool {
        match self.ensure_permissions().await {
            Ok(()) => true,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// Request every required permission, naming the refused ones on failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if any required permission was
    /// refused or left unanswered.
    pub async fn ensure_permissions(&self) -> Result<()> {
        let required = Self::required_permissions(self.platform);
        if required.is_empty() {
            return Ok(());
        }

        debug!("Requesting permissions {:?} on {}", required, self.platform);
        let answers = self.prompter.request(&required).await;

        let denied: Vec<Permission> = required
            .iter()
            .filter(|p| !answers.iter().any(|(answered, granted)| answered == *p && *granted))
            .copied()
            .collect();

        if denied.is_empty() {
            Ok(())
        } else {
            Err(Error::PermissionDenied {
                permissions: denied,
            })
        }
    }
}
