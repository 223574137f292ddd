//! The seam between the session engine and a BLE stack.
//!
//! The controller never talks to an adapter directly. Everything it needs
//! (subscribe, unsubscribe, characteristic writes and the notification event
//! stream) goes through [`PeripheralTransport`], which is implemented by
//! [`crate::btle::BtleTransport`] for real hardware and by in-memory doubles
//! in tests.

use async_trait::async_trait;
use futures::stream::BoxStream;
use log::warn;
use uuid::Uuid;

use crate::error::TransportError;
use crate::types::{GattWrite, NotificationEvent};

/// GATT operations on peripherals identified by an opaque string id.
///
/// The notification stream yields events in delivery order for each
/// characteristic; no ordering is promised across characteristics.
#[async_trait]
pub trait PeripheralTransport: Send + Sync + 'static {
    async fn connect(&self, peripheral_id: &str) -> Result<(), TransportError>;

    async fn disconnect(&self, peripheral_id: &str) -> Result<(), TransportError>;

    async fn subscribe(
        &self,
        peripheral_id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), TransportError>;

    async fn unsubscribe(
        &self,
        peripheral_id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), TransportError>;

    async fn write(
        &self,
        peripheral_id: &str,
        service: Uuid,
        characteristic: Uuid,
        bytes: &[u8],
    ) -> Result<(), TransportError>;

    async fn read(
        &self,
        peripheral_id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, TransportError>;

    /// Value-changed notifications from one peripheral. The stream ends when
    /// the link drops.
    async fn notifications(
        &self,
        peripheral_id: &str,
    ) -> Result<BoxStream<'static, NotificationEvent>, TransportError>;
}

/// Issue every write in `writes`, logging failures instead of returning them.
pub async fn write_all_best_effort<T: PeripheralTransport + ?Sized>(
    transport: &T,
    peripheral_id: &str,
    writes: &[GattWrite],
) {
    for w in writes {
        if let Err(e) = transport
            .write(peripheral_id, w.service, w.characteristic, &w.bytes)
            .await
        {
            warn!(
                "write {:02x?} to {} on {peripheral_id} failed: {e}",
                w.bytes, w.characteristic
            );
        }
    }
}
