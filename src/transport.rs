//! Serial transport behind the [`Transport`] trait so the device logic
//! can run against scripted byte streams in tests.

use crate::TrackerError;
use serialport::{ClearBuffer, DataBits, ErrorKind, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Line rate the device falls back to after a hardware reset.
pub const DEFAULT_BAUD: u32 = 9_600;

/// How long the break condition is held on the line.
const BREAK_HOLD: Duration = Duration::from_millis(250);

/// Byte-level link to the device.
pub trait Transport: Send {
    /// Read a single byte, waiting at most `timeout`.
    fn read_byte(&mut self, timeout: Duration) -> crate::Result<u8>;

    /// Write a full buffer, waiting at most `timeout`.
    fn write(&mut self, data: &[u8], timeout: Duration) -> crate::Result<()>;

    /// Assert a serial break long enough for the device to hard reset.
    fn send_break(&mut self) -> crate::Result<()>;

    /// Change the host-side line rate.
    fn set_baud(&mut self, baud: u32) -> crate::Result<()>;

    /// Toggle host-side hardware flow control.
    fn set_flow_control(&mut self, enabled: bool) -> crate::Result<()>;
}

/// [`Transport`] over a local serial port.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open a serial port at the reset-default line settings, 9600 8N1
    /// with no flow control.
    pub fn open(path: &str) -> crate::Result<Self> {
        let port = serialport::new(path, DEFAULT_BAUD)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(map_serial_error)?;
        port.clear(ClearBuffer::All).map_err(map_serial_error)?;
        log::info!("opened serial port {}", path);
        Ok(SerialTransport { port })
    }
}

fn map_serial_error(err: serialport::Error) -> TrackerError {
    match err.kind() {
        ErrorKind::NoDevice => TrackerError::TransportUnavailable,
        _ => TrackerError::Serial(err),
    }
}

fn map_io_error(err: io::Error) -> TrackerError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TrackerError::Timeout,
        _ => TrackerError::Io(err),
    }
}

impl Transport for SerialTransport {
    fn read_byte(&mut self, timeout: Duration) -> crate::Result<u8> {
        self.port.set_timeout(timeout).map_err(map_serial_error)?;
        let mut byte = [0u8; 1];
        self.port.read_exact(&mut byte).map_err(map_io_error)?;
        Ok(byte[0])
    }

    fn write(&mut self, data: &[u8], timeout: Duration) -> crate::Result<()> {
        self.port.set_timeout(timeout).map_err(map_serial_error)?;
        self.port.write_all(data).map_err(map_io_error)?;
        self.port.flush().map_err(map_io_error)?;
        Ok(())
    }

    fn send_break(&mut self) -> crate::Result<()> {
        self.port.set_break().map_err(map_serial_error)?;
        std::thread::sleep(BREAK_HOLD);
        self.port.clear_break().map_err(map_serial_error)?;
        Ok(())
    }

    fn set_baud(&mut self, baud: u32) -> crate::Result<()> {
        self.port.set_baud_rate(baud).map_err(map_serial_error)?;
        Ok(())
    }

    fn set_flow_control(&mut self, enabled: bool) -> crate::Result<()> {
        let mode = if enabled {
            FlowControl::Hardware
        } else {
            FlowControl::None
        };
        self.port.set_flow_control(mode).map_err(map_serial_error)?;
        Ok(())
    }
}

/// Names of the serial ports present on this host.
pub fn list_ports() -> crate::Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(map_serial_error)?;
    Ok(ports.into_iter().map(|info| info.port_name).collect())
}
