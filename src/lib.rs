//! # blestream
//!
//! Async Rust engine that turns BLE GATT notifications from medical and
//! sensor peripherals into bounded, timestamped sample channels, and exports
//! recorded sessions as comma-delimited text.
//!
//! ## Supported profiles
//!
//! | Profile | Service | Data | Notes |
//! |---|---|---|---|
//! | ECG Patch | `f000bb00` | 216 B frames | ECG, pace tag, respiration with optional baseline |
//! | ECG Holter | `f000bb00` | 217 B frames | 4 ECG leads, pace, respiration, rhythm indicator |
//! | ADC | `f000dd00` | 16-bit samples | raw 32-bit hex log and loss estimate |
//! | Range test | `f400` | counters / RSSI | site-survey trigger |
//! | Health Thermometer | `1809` | IEEE-11073 FLOAT | device time and body location |
//! | SensorTag | six TI services | 1–18 B | optical, humidity, pressure, IR, movement, keys |
//! | Battery | `180f` | 1 B | level in percent, read at start then notified |
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use blestream::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = Arc::new(BtleTransport::new(BtleConfig::default()).await?);
//!     let device = transport.scan().await?.into_iter().next().expect("no device");
//!     transport.connect(&device.id).await?;
//!
//!     let controller = SessionController::new(transport);
//!     controller
//!         .start_session(Profile::Thermometer, &device.id, SessionConfig::default())
//!         .await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!     controller.stop_session().await;
//!     println!("{}", controller.export_session()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`controller`] | Session lifecycle state machine and single-session registry |
//! | [`session`] | One recording: decoder, clock and counters |
//! | [`profiles`] | Per-device decoders behind the [`profiles::ProfileDecoder`] trait |
//! | [`transport`] | [`transport::PeripheralTransport`], the seam to a BLE stack |
//! | [`btle`] | btleplug implementation of the transport |
//! | [`codec`] | Fixed-width field extraction and the inverted 24-bit scaling |
//! | [`buffer`] | Bounded sample channels |
//! | [`filter`] | Median-of-window reducer |
//! | [`export`] | Side-by-side table formatting for exports |
//! | [`protocol`] | GATT UUIDs, frame geometry, scale factors and command bytes |
//! | [`config`] | Session settings with JSON persistence |
//! | [`timestamp`] | Session clock and `hh:mm:ss:cc` labels |
//! | [`types`] | Samples, notification events and lifecycle states |
//! | [`error`] | Error types for every layer |

pub mod btle;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod filter;
pub mod profiles;
pub mod protocol;
pub mod session;
pub mod timestamp;
pub mod transport;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Engine ────────────────────────────────────────────────────────────────
    pub use crate::controller::{SessionController, SessionRegistry};
    pub use crate::session::{Session, SessionSummary};
    pub use crate::transport::PeripheralTransport;

    // ── Backend ───────────────────────────────────────────────────────────────
    pub use crate::btle::{BtleConfig, BtleTransport, DiscoveredPeripheral};

    // ── Profiles and data types ───────────────────────────────────────────────
    pub use crate::buffer::Channel;
    pub use crate::config::SessionConfig;
    pub use crate::error::{DecodeError, SessionError, TransportError};
    pub use crate::profiles::{Profile, ProfileDecoder};
    pub use crate::types::{NotificationEvent, Sample, SessionState, TemperatureUnit};
}
