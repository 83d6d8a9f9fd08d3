//! Decoder for binary BX tracking replies.
//!
//! A BX frame is the preamble [`BX_PREAMBLE`], a payload length, a CRC
//! over those four header bytes, then the payload (handle count,
//! per-handle transform blocks, system status) and a CRC over the
//! payload bytes alone. All multi-byte fields are big-endian.

use crate::crc::crc16;
use crate::protocol::BX_PREAMBLE;
use crate::types::{HandleStatus, SystemStatus, Transform, Validity, NO_HANDLES};
use crate::TrackerError;

/// Preamble, payload length, and header CRC.
pub const HEADER_LEN: usize = 6;

const STATUS_VALID: u8 = 0x01;
const STATUS_MISSING: u8 = 0x02;
const STATUS_DISABLED: u8 = 0x04;

/// One handle's slice of a BX reply.
#[derive(Debug, Clone, PartialEq)]
pub struct BxHandle {
    pub handle: u8,
    pub transform: Transform,
    pub status: HandleStatus,
}

/// A decoded BX reply.
#[derive(Debug, Clone, PartialEq)]
pub struct BxFrame {
    pub handles: Vec<BxHandle>,
    pub system_status: SystemStatus,
    /// Device frame number, the newest reported across all handles.
    pub frame: u32,
}

/// Bounds-checked reader over the raw reply bytes. Every read either
/// yields a value or a protocol error; it never indexes past the slice.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize) -> crate::Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                TrackerError::Protocol("binary reply ends mid-field".into())
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> crate::Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> crate::Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> crate::Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_f32(&mut self) -> crate::Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }
}

/// Decode one BX reply.
///
/// Leading line noise before the preamble is skipped. The header CRC is
/// verified before any handle data is trusted; the body CRC covers the
/// payload only, the header bytes excluded.
pub fn decode(reply: &[u8]) -> crate::Result<BxFrame> {
    let start = reply
        .iter()
        .position(|&byte| byte == BX_PREAMBLE[0])
        .ok_or_else(|| {
            TrackerError::Protocol("no frame preamble in binary reply".into())
        })?;
    let frame_bytes = &reply[start..];
    let mut cursor = Cursor::new(frame_bytes);

    let preamble = cursor.take(2)?;
    if preamble != BX_PREAMBLE {
        return Err(TrackerError::Protocol(format!(
            "bad frame preamble {:02X} {:02X}",
            preamble[0], preamble[1]
        )));
    }
    let payload_len = cursor.read_u16()? as usize;
    let header_crc = cursor.read_u16()?;
    let computed = crc16(&frame_bytes[..4]);
    if header_crc != computed {
        return Err(TrackerError::Integrity {
            expected: header_crc,
            computed,
        });
    }

    let handle_count = cursor.read_u8()?;
    let mut handles = Vec::with_capacity(handle_count as usize);
    let mut frame = 0u32;
    for _ in 0..handle_count {
        let decoded = decode_handle(&mut cursor)?;
        frame = frame.max(decoded.transform.frame);
        handles.push(decoded);
    }
    let system_status = SystemStatus::from_bits_truncate(cursor.read_u16()?);

    let body_crc_offset = cursor.position();
    if body_crc_offset != HEADER_LEN + payload_len {
        return Err(TrackerError::Protocol(format!(
            "frame declares {} payload bytes but carries {}",
            payload_len,
            body_crc_offset - HEADER_LEN
        )));
    }
    let body_crc = cursor.read_u16()?;
    let computed = crc16(&frame_bytes[HEADER_LEN..body_crc_offset]);
    if body_crc != computed {
        return Err(TrackerError::Integrity {
            expected: body_crc,
            computed,
        });
    }

    Ok(BxFrame {
        handles,
        system_status,
        frame,
    })
}

fn decode_handle(cursor: &mut Cursor<'_>) -> crate::Result<BxHandle> {
    let handle = cursor.read_u8()?;
    if handle as usize >= NO_HANDLES {
        return Err(TrackerError::Protocol(format!(
            "frame reports reserved handle id {:02X}",
            handle
        )));
    }
    let status_code = cursor.read_u8()?;
    match status_code {
        STATUS_VALID => {
            let rotation = [
                cursor.read_f32()?,
                cursor.read_f32()?,
                cursor.read_f32()?,
                cursor.read_f32()?,
            ];
            let translation = [cursor.read_f32()?, cursor.read_f32()?, cursor.read_f32()?];
            let error = cursor.read_f32()?;
            let status = HandleStatus::from_bits_truncate(cursor.read_u32()?);
            let frame = cursor.read_u32()?;
            Ok(BxHandle {
                handle,
                transform: Transform {
                    rotation,
                    translation,
                    error,
                    frame,
                    validity: Validity::Valid,
                },
                status,
            })
        }
        STATUS_MISSING => {
            let status = HandleStatus::from_bits_truncate(cursor.read_u32()?);
            let frame = cursor.read_u32()?;
            Ok(BxHandle {
                handle,
                transform: Transform::invalid(Validity::Missing, frame),
                status,
            })
        }
        STATUS_DISABLED => Ok(BxHandle {
            handle,
            transform: Transform::invalid(Validity::Disabled, 0),
            status: HandleStatus::empty(),
        }),
        other => Err(TrackerError::Protocol(format!(
            "unknown handle status code {:02X} for handle {:02X}",
            other, handle
        ))),
    }
}
