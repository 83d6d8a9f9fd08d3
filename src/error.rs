/// Errors that can occur when talking to the tracker.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The named serial device does not exist or is no longer attached.
    #[error("transport unavailable: no device on the serial link")]
    TransportUnavailable,

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for the device")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("CRC mismatch: reply carries {expected:04X}, computed {computed:04X}")]
    Integrity { expected: u16, computed: u16 },

    #[error("device error: {0}")]
    Device(String),

    #[error("handle lifecycle failure: {0}")]
    Lifecycle(String),

    #[error("tracking stream stopped")]
    StreamStopped,
}
