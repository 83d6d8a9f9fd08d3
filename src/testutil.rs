//! Shared test fixtures: a scripted byte-stream transport plus builders
//! for device replies.

use crate::crc::{self, crc16};
use crate::protocol::BX_PREAMBLE;
use crate::transport::Transport;
use crate::TrackerError;
use std::collections::VecDeque;
use std::time::Duration;

/// Transport that replays a canned read stream and records everything
/// the driver does to the link.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    pub reads: VecDeque<u8>,
    pub written: Vec<u8>,
    pub breaks: usize,
    pub bauds: Vec<u32>,
    pub flow: Vec<bool>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an ASCII reply with its CRC trailer and terminator.
    pub fn push_reply(&mut self, text: &str) {
        let mut line = text.to_string();
        crc::append_ascii(&mut line);
        line.push('\r');
        self.reads.extend(line.bytes());
    }

    /// Queue a raw ASCII line with just the terminator.
    pub fn push_line(&mut self, text: &str) {
        self.reads.extend(text.bytes());
        self.reads.push_back(b'\r');
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.reads.extend(bytes.iter().copied());
    }

    /// Commands written so far, split on the terminator.
    pub fn commands(&self) -> Vec<String> {
        self.written
            .split(|&byte| byte == b'\r')
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn read_byte(&mut self, _timeout: Duration) -> crate::Result<u8> {
        self.reads.pop_front().ok_or(TrackerError::Timeout)
    }

    fn write(&mut self, data: &[u8], _timeout: Duration) -> crate::Result<()> {
        self.written.extend_from_slice(data);
        Ok(())
    }

    fn send_break(&mut self) -> crate::Result<()> {
        self.breaks += 1;
        Ok(())
    }

    fn set_baud(&mut self, baud: u32) -> crate::Result<()> {
        self.bauds.push(baud);
        Ok(())
    }

    fn set_flow_control(&mut self, enabled: bool) -> crate::Result<()> {
        self.flow.push(enabled);
        Ok(())
    }
}

/// Handle block as reported for a tracked sensor.
pub(crate) fn bx_valid_block(
    handle: u8,
    rotation: [f32; 4],
    translation: [f32; 3],
    error: f32,
    status: u32,
    frame: u32,
) -> Vec<u8> {
    let mut block = vec![handle, 0x01];
    for value in rotation {
        block.extend_from_slice(&value.to_bits().to_be_bytes());
    }
    for value in translation {
        block.extend_from_slice(&value.to_bits().to_be_bytes());
    }
    block.extend_from_slice(&error.to_bits().to_be_bytes());
    block.extend_from_slice(&status.to_be_bytes());
    block.extend_from_slice(&frame.to_be_bytes());
    block
}

/// Handle block for a sensor the device cannot see this frame.
pub(crate) fn bx_missing_block(handle: u8, status: u32, frame: u32) -> Vec<u8> {
    let mut block = vec![handle, 0x02];
    block.extend_from_slice(&status.to_be_bytes());
    block.extend_from_slice(&frame.to_be_bytes());
    block
}

/// Handle block for a disabled handle, which carries no payload.
pub(crate) fn bx_disabled_block(handle: u8) -> Vec<u8> {
    vec![handle, 0x04]
}

/// Assemble a full BX reply around the given handle blocks. The body
/// CRC spans the payload bytes only, as the device frames it.
pub(crate) fn bx_frame(blocks: &[Vec<u8>], system_status: u16) -> Vec<u8> {
    let mut payload = vec![blocks.len() as u8];
    for block in blocks {
        payload.extend_from_slice(block);
    }
    payload.extend_from_slice(&system_status.to_be_bytes());

    let mut frame = Vec::from(BX_PREAMBLE);
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    let header_crc = crc16(&frame);
    frame.extend_from_slice(&header_crc.to_be_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&crc16(&payload).to_be_bytes());
    frame
}

/// PHINF reply body for a wired tool, 67 characters.
pub(crate) fn phinf_text(status_hex: &str, port: &str, channel: &str) -> String {
    format!(
        "{:<8}{:<12}{:<3}{:<8}{}{:<20}{:<10}{}{}",
        "01802000", "NDI", "001", "12345678", status_hex, "8700339", "0", port, channel
    )
}
