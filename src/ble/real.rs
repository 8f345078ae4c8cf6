//! Adapter backed by the host Bluetooth stack through btleplug.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::adapter::{AdvertisementStream, BleAdapter, ConnectionHandle, PeripheralIdentity};
use crate::ble::uuids::{AURORA_SERVICE_UUID, AURORA_WRITE_CHARACTERISTIC_UUID};
use crate::error::{Error, Result};
use crate::protocol::Frame;

/// Peripherals seen during scanning, by identifier string.
type PeripheralCache = Arc<RwLock<HashMap<String, Peripheral>>>;

/// Adapter that talks to real hardware.
pub struct RealAdapter {
    /// The host BLE adapter.
    adapter: Adapter,
    /// Peripherals seen so far, so `connect` can resolve an id.
    peripherals: PeripheralCache,
}

impl RealAdapter {
    /// Open the host adapter at `adapter_index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BluetoothUnavailable`] if there is no Bluetooth
    /// manager or no adapter at that index.
    pub async fn new(adapter_index: usize) -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .nth(adapter_index)
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Wrap an already opened host adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            peripherals: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolve an advertisement into an identity, if it carries `service`.
    async fn identify(
        adapter: &Adapter,
        peripherals: &PeripheralCache,
        id: PeripheralId,
        service: Uuid,
    ) -> Option<PeripheralIdentity> {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return None;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return None,
        };

        if !properties.services.contains(&service) {
            return None;
        }

        let identifier = id.to_string();
        peripherals.write().insert(identifier.clone(), peripheral);

        Some(PeripheralIdentity::new(
            identifier,
            properties.local_name,
            properties.services,
        ))
    }

    /// Find a peripheral by identifier, asking the adapter if it was not cached.
    async fn peripheral(&self, id: &str) -> Result<Peripheral> {
        if let Some(peripheral) = self.peripherals.read().get(id).cloned() {
            return Ok(peripheral);
        }

        let peripheral = self
            .adapter
            .peripherals()
            .await
            .map_err(Error::Bluetooth)?
            .into_iter()
            .find(|p| p.id().to_string() == id)
            .ok_or_else(|| Error::DeviceNotFound {
                identifier: id.to_string(),
            })?;

        self.peripherals
            .write()
            .insert(id.to_string(), peripheral.clone());
        Ok(peripheral)
    }
}

#[async_trait]
impl BleAdapter for RealAdapter {
    fn is_mock(&self) -> bool {
        false
    }

    async fn start_scan(&self, service: Uuid) -> Result<AdvertisementStream> {
        let events = self.adapter.events().await.map_err(Error::Bluetooth)?;

        self.adapter
            .start_scan(ScanFilter {
                services: vec![service],
            })
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Scanning for service {}", service);

        let adapter = self.adapter.clone();
        let peripherals = self.peripherals.clone();

        let stream = events.filter_map(move |event| {
            let adapter = adapter.clone();
            let peripherals = peripherals.clone();
            async move {
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        trace!("Advertisement from {:?}", id);
                        Self::identify(&adapter, &peripherals, id, service)
                            .await
                            .map(Ok)
                    }
                    CentralEvent::StateUpdate(CentralState::PoweredOff) => {
                        Some(Err(Error::ScanFailed {
                            reason: "Bluetooth adapter powered off".to_string(),
                        }))
                    }
                    _ => None,
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await.map_err(Error::Bluetooth)
    }

    async fn connect(&self, id: &str, timeout: Duration) -> Result<ConnectionHandle> {
        let peripheral = self.peripheral(id).await?;

        match tokio::time::timeout(timeout, peripheral.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(Error::ConnectionFailed {
                    reason: e.to_string(),
                })
            }
            Err(_elapsed) => return Err(Error::ConnectionTimeout { timeout }),
        }

        let name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|p| p.local_name);

        info!("Connected to {}", id);
        Ok(ConnectionHandle::new(id, name))
    }

    async fn discover_services(&self, handle: &mut ConnectionHandle) -> Result<()> {
        let peripheral = self.peripheral(handle.peripheral_id()).await?;

        peripheral
            .discover_services()
            .await
            .map_err(Error::Bluetooth)?;

        let services = peripheral.services();
        let service = services
            .iter()
            .find(|s| s.uuid == AURORA_SERVICE_UUID)
            .ok_or_else(|| Error::ServiceNotFound {
                uuid: AURORA_SERVICE_UUID.to_string(),
            })?;

        if !service
            .characteristics
            .iter()
            .any(|c| c.uuid == AURORA_WRITE_CHARACTERISTIC_UUID)
        {
            return Err(Error::CharacteristicNotFound {
                uuid: AURORA_WRITE_CHARACTERISTIC_UUID.to_string(),
            });
        }

        debug!(
            "Discovered {} services on {}",
            services.len(),
            handle.peripheral_id()
        );
        handle.mark_ready();
        Ok(())
    }

    async fn write_characteristic(
        &self,
        handle: &ConnectionHandle,
        service: Uuid,
        characteristic: Uuid,
        frame: &Frame,
    ) -> Result<()> {
        let peripheral = self.peripheral(handle.peripheral_id()).await?;

        let target = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic && c.service_uuid == service)
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: characteristic.to_string(),
            })?;

        peripheral
            .write(&target, frame.bytes(), WriteType::WithResponse)
            .await
            .map_err(Error::Bluetooth)
    }

    async fn disconnect(&self, id: &str) -> Result<()> {
        let peripheral = self.peripheral(id).await?;
        peripheral.disconnect().await.map_err(Error::Bluetooth)
    }

    async fn teardown(&self) -> Result<()> {
        if let Err(e) = self.adapter.stop_scan().await {
            debug!("stop_scan during teardown: {}", e);
        }

        let peripherals: Vec<Peripheral> = self.peripherals.write().drain().map(|(_, p)| p).collect();
        for peripheral in peripherals {
            if peripheral.is_connected().await.unwrap_or(false) {
                if let Err(e) = peripheral.disconnect().await {
                    warn!("Error disconnecting {:?} during teardown: {}", peripheral.id(), e);
                }
            }
        }

        Ok(())
    }
}
