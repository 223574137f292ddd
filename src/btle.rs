//! [`PeripheralTransport`] on top of btleplug.
//!
//! Peripherals are addressed by the platform identifier btleplug reports:
//! a UUID string on macOS / Windows, a MAC address on Linux. A peripheral
//! must have been seen by [`BtleTransport::scan`] before it can be connected.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::FutureExt;
use futures::StreamExt;
use log::{debug, info};
use uuid::Uuid;

use crate::error::TransportError;
use crate::transport::PeripheralTransport;
use crate::types::NotificationEvent;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const DISCOVER_TIMEOUT_SECS: u64 = 15;

// ── BtleConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BtleConfig {
    /// BLE scan duration in seconds. Default: `15`.
    pub scan_timeout_secs: u64,
    /// Only report peripherals whose advertised name starts with this string.
    /// Default: `""` (every named peripheral).
    pub name_prefix: String,
}

impl Default for BtleConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 15,
            name_prefix: String::new(),
        }
    }
}

/// A peripheral seen during [`BtleTransport::scan`].
#[derive(Debug, Clone)]
pub struct DiscoveredPeripheral {
    /// Advertised local name.
    pub name: String,
    /// Identifier accepted by every [`PeripheralTransport`] method.
    pub id: String,
    pub rssi: Option<i16>,
}

// ── BtleTransport ────────────────────────────────────────────────────────────

pub struct BtleTransport {
    adapter: Adapter,
    config: BtleConfig,
}

impl BtleTransport {
    /// Open the first Bluetooth adapter of the host.
    ///
    /// On macOS, CoreBluetooth starts in an unknown state and silently
    /// ignores scans until it reports `PoweredOn`; wait up to 3 s for it.
    pub async fn new(config: BtleConfig) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;

        #[cfg(target_os = "macos")]
        {
            use btleplug::api::CentralState;

            let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
            loop {
                match adapter.adapter_state().await {
                    Ok(CentralState::PoweredOn) => break,
                    Ok(state) if tokio::time::Instant::now() >= deadline => {
                        log::warn!("macOS: adapter still {state:?} after 3 s, proceeding");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("macOS: adapter_state() error: {e}");
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        Ok(Self { adapter, config })
    }

    pub fn config(&self) -> &BtleConfig {
        &self.config
    }

    /// Scan for `scan_timeout_secs` and return every peripheral whose name
    /// matches the configured prefix, strongest signal first.
    pub async fn scan(&self) -> Result<Vec<DiscoveredPeripheral>> {
        info!("scan: scanning for {} s …", self.config.scan_timeout_secs);
        self.adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(Duration::from_secs(self.config.scan_timeout_secs)).await;
        self.adapter.stop_scan().await.ok();

        let mut found = vec![];
        for p in self.adapter.peripherals().await? {
            let Ok(Some(props)) = p.properties().await else {
                continue;
            };
            let Some(name) = props.local_name else {
                continue;
            };
            if name.starts_with(&self.config.name_prefix) {
                let id = p.id().to_string();
                info!("scan: found {name}  id={id}  rssi={:?}", props.rssi);
                found.push(DiscoveredPeripheral {
                    name,
                    id,
                    rssi: props.rssi,
                });
            }
        }
        found.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        info!("scan: {} peripheral(s) found", found.len());
        Ok(found)
    }

    async fn peripheral(&self, peripheral_id: &str) -> Result<Peripheral, TransportError> {
        self.adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.id().to_string() == peripheral_id)
            .ok_or_else(|| TransportError::UnknownPeripheral(peripheral_id.to_owned()))
    }

    async fn connected(&self, peripheral_id: &str) -> Result<Peripheral, TransportError> {
        let peripheral = self.peripheral(peripheral_id).await?;
        if !peripheral.is_connected().await? {
            return Err(TransportError::NotConnected(peripheral_id.to_owned()));
        }
        Ok(peripheral)
    }

    async fn characteristic(
        &self,
        peripheral_id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<(Peripheral, Characteristic), TransportError> {
        let peripheral = self.connected(peripheral_id).await?;
        let found = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic && c.service_uuid == service)
            .ok_or(TransportError::CharacteristicNotFound {
                service,
                characteristic,
            })?;
        Ok((peripheral, found))
    }

    /// Resolves when the adapter reports the link to `peripheral` dropped.
    async fn disconnected(
        &self,
        peripheral: &Peripheral,
    ) -> Result<BoxFuture<'static, ()>, TransportError> {
        let peripheral_id = peripheral.id();
        let mut events = self.adapter.events().await?;
        Ok(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    if id == peripheral_id {
                        info!("Disconnect watcher: device {id:?} disconnected.");
                        return;
                    }
                }
            }
        }
        .boxed())
    }
}

#[async_trait]
impl PeripheralTransport for BtleTransport {
    async fn connect(&self, peripheral_id: &str) -> Result<(), TransportError> {
        let peripheral = self.peripheral(peripheral_id).await?;
        if peripheral.is_connected().await? {
            debug!("{peripheral_id} already connected");
            return Ok(());
        }

        // BlueZ can block forever on Connect when the device is out of range.
        tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            peripheral.connect(),
        )
        .await
        .map_err(|_| TransportError::Timeout(CONNECT_TIMEOUT_SECS))??;

        // BlueZ reports the link before its GATT cache is populated; an
        // immediate discovery can come back empty.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        tokio::time::timeout(
            Duration::from_secs(DISCOVER_TIMEOUT_SECS),
            peripheral.discover_services(),
        )
        .await
        .map_err(|_| TransportError::Timeout(DISCOVER_TIMEOUT_SECS))??;
        info!(
            "Connected and services discovered: {peripheral_id} ({} characteristics)",
            peripheral.characteristics().len()
        );
        Ok(())
    }

    async fn disconnect(&self, peripheral_id: &str) -> Result<(), TransportError> {
        let peripheral = self.peripheral(peripheral_id).await?;
        peripheral.disconnect().await?;
        info!("Disconnected {peripheral_id}");
        Ok(())
    }

    async fn subscribe(
        &self,
        peripheral_id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), TransportError> {
        let (peripheral, c) = self
            .characteristic(peripheral_id, service, characteristic)
            .await?;
        peripheral.subscribe(&c).await?;
        debug!("subscribed {characteristic} on {peripheral_id}");
        Ok(())
    }

    async fn unsubscribe(
        &self,
        peripheral_id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), TransportError> {
        let (peripheral, c) = self
            .characteristic(peripheral_id, service, characteristic)
            .await?;
        peripheral.unsubscribe(&c).await?;
        debug!("unsubscribed {characteristic} on {peripheral_id}");
        Ok(())
    }

    async fn write(
        &self,
        peripheral_id: &str,
        service: Uuid,
        characteristic: Uuid,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        let (peripheral, c) = self
            .characteristic(peripheral_id, service, characteristic)
            .await?;
        let write_type = if c.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        peripheral.write(&c, bytes, write_type).await?;
        Ok(())
    }

    async fn read(
        &self,
        peripheral_id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, TransportError> {
        let (peripheral, c) = self
            .characteristic(peripheral_id, service, characteristic)
            .await?;
        Ok(peripheral.read(&c).await?)
    }

    async fn notifications(
        &self,
        peripheral_id: &str,
    ) -> Result<BoxStream<'static, NotificationEvent>, TransportError> {
        let peripheral = self.connected(peripheral_id).await?;
        let services: HashMap<Uuid, Uuid> = peripheral
            .characteristics()
            .into_iter()
            .map(|c| (c.uuid, c.service_uuid))
            .collect();
        let id = peripheral_id.to_owned();
        let disconnected = self.disconnected(&peripheral).await?;
        let stream = peripheral.notifications().await?;

        Ok(stream
            .take_until(disconnected)
            .filter_map(move |n| {
                let event = match services.get(&n.uuid) {
                    Some(service) => {
                        Some(NotificationEvent::new(id.clone(), *service, n.uuid, n.value))
                    }
                    None => {
                        debug!("notification from undiscovered characteristic {}", n.uuid);
                        None
                    }
                };
                futures::future::ready(event)
            })
            .boxed())
    }
}
