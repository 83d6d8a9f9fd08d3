//! # emtrack - driver for serial electromagnetic 6DOF tracking sensors
//!
//! Talks the combined ASCII/binary protocol over a serial link. Provides:
//! - Device bring-up: hardware reset, line-rate switch, INIT
//! - Port-handle lifecycle up to enabled, with tool identity queries
//! - Binary transform streaming with CRC-checked frames
//! - A threaded tracking session that queues samples and logs positions
//!
//! ## Quick Start
//! ```no_run
//! use emtrack::{Device, TrackingSession};
//! use std::time::Duration;
//!
//! let mut device = Device::connect("/dev/ttyUSB0", 115_200).unwrap();
//! let sensors = device.activate_ports().unwrap();
//! println!("tracking {} sensor(s)", sensors);
//!
//! let session = TrackingSession::start(device, "positions.log").unwrap();
//! for _ in 0..100 {
//!     let sample = session.recv_timeout(Duration::from_secs(1)).unwrap();
//!     println!("pos: {:?}", sample.positions[0]);
//! }
//! let device = session.stop().unwrap();
//! drop(device);
//! ```

pub mod error;
pub mod types;
pub mod crc;
pub mod protocol;
pub mod bx;
pub mod transport;
pub mod device;
pub mod tracking;

#[cfg(test)]
pub(crate) mod testutil;

pub use device::Device;
pub use error::TrackerError;
pub use tracking::{CancelToken, TrackingSession};
pub use transport::{SerialTransport, Transport};
pub use types::*;

/// Result type alias for emtrack operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
