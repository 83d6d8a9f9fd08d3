//! Wire-level pieces of the combined ASCII command protocol: framing,
//! reply classification, and the text-reply parsers. Everything here is
//! pure; [`crate::device`] owns the transport exchanges.

use crate::crc;
use crate::types::{HandleStatus, ToolInfo};
use crate::TrackerError;
use std::time::Duration;

/// Terminates every command and ASCII reply.
pub const CARRIAGE_RETURN: u8 = b'\r';

/// Longest command the device accepts, CRC and terminator included.
pub const MAX_COMMAND_LEN: usize = 256;

/// Longest reply the driver will buffer.
pub const MAX_REPLY_LEN: usize = 4096;

/// Marker byte pair opening every binary BX reply.
pub const BX_PREAMBLE: [u8; 2] = [0xC4, 0xA5];

/// BX reply mode: transforms inside the characterized volume only.
pub const BX_MODE_DEFAULT: u16 = 0x0001;

/// BX reply mode: report out-of-volume transforms too.
pub const BX_MODE_OUT_OF_VOLUME: u16 = 0x0801;

/// PHINF request mask: tool information, part number, and the physical
/// port location block.
pub const PHINF_BASIC_INFO: u16 = 0x0025;

/// Reply deadline for commands without a longer entry in [`timeout_for`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Device settle time after a hardware break before the reset banner.
pub const RESET_SETTLE: Duration = Duration::from_millis(500);

/// Device settle time after a COMM parameter change.
pub const COMM_SETTLE: Duration = Duration::from_millis(100);

/// Passes the init loop may take before giving up on a handle that never
/// leaves the pending-init stage.
pub const MAX_INIT_PASSES: usize = 32;

/// Reply deadline for a command. INIT and the port commands run
/// device-side self tests; RESET rides out a firmware restart.
pub fn timeout_for(command: &str) -> Duration {
    let verb = command.split([' ', ':']).next().unwrap_or("");
    match verb {
        "INIT" | "PINIT" | "PENA" => Duration::from_secs(5),
        "RESET" => Duration::from_secs(10),
        _ => DEFAULT_TIMEOUT,
    }
}

/// COMM baud code for a supported line rate.
pub fn baud_code(baud: u32) -> crate::Result<u8> {
    match baud {
        9_600 => Ok(0),
        14_400 => Ok(1),
        19_200 => Ok(2),
        38_400 => Ok(3),
        57_600 => Ok(4),
        115_200 => Ok(5),
        other => Err(TrackerError::Protocol(format!(
            "unsupported baud rate {}",
            other
        ))),
    }
}

/// Frame a command for the wire.
///
/// With `add_crc`, the first space becomes ':' and the CRC of the whole
/// resulting string is appended as four uppercase hex digits. Every
/// command gains the carriage-return terminator. Fails rather than
/// truncates when the framed command would exceed [`MAX_COMMAND_LEN`].
pub fn build_command(command: &str, add_crc: bool) -> crate::Result<String> {
    let mut framed = String::with_capacity(command.len() + 5);
    if add_crc {
        match command.find(' ') {
            Some(space) => {
                framed.push_str(&command[..space]);
                framed.push(':');
                framed.push_str(&command[space + 1..]);
            }
            None => framed.push_str(command),
        }
        crc::append_ascii(&mut framed);
    } else {
        framed.push_str(command);
    }
    framed.push(CARRIAGE_RETURN as char);
    if framed.len() > MAX_COMMAND_LEN {
        return Err(TrackerError::Protocol(format!(
            "command would be {} bytes, over the {} byte limit",
            framed.len(),
            MAX_COMMAND_LEN
        )));
    }
    Ok(framed)
}

/// Classification of one ASCII reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Reset,
    Okay,
    Error,
    Warning,
    /// Recognized as none of the keywords; data replies land here.
    Other,
    /// Keyword matched but the trailing CRC did not.
    BadCrc,
    /// Not a printable ASCII line at all.
    Invalid,
}

/// Classify an ASCII reply by its leading keyword, case-insensitively.
///
/// OKAY replies always have their trailing CRC verified; unrecognized
/// replies only when `check_crc` is set. A mismatch overrides the kind
/// to [`ReplyKind::BadCrc`]. An empty reply is [`ReplyKind::Other`] and
/// callers decide whether that is fatal.
pub fn classify(reply: &str, check_crc: bool) -> ReplyKind {
    if reply.is_empty() {
        return ReplyKind::Other;
    }
    if !reply
        .bytes()
        .all(|byte| byte.is_ascii_graphic() || byte == b' ')
    {
        return ReplyKind::Invalid;
    }
    let kind = if has_keyword(reply, "RESET") {
        ReplyKind::Reset
    } else if has_keyword(reply, "OKAY") {
        ReplyKind::Okay
    } else if has_keyword(reply, "ERROR") {
        ReplyKind::Error
    } else if has_keyword(reply, "WARNING") {
        ReplyKind::Warning
    } else {
        ReplyKind::Other
    };
    let needs_crc = kind == ReplyKind::Okay || (kind == ReplyKind::Other && check_crc);
    if needs_crc && !crc::verify_ascii(reply) {
        return ReplyKind::BadCrc;
    }
    kind
}

fn has_keyword(reply: &str, keyword: &str) -> bool {
    reply
        .get(..keyword.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(keyword))
}

/// The 2-hex error code carried by an ERROR reply, when present.
pub fn error_code(reply: &str) -> Option<u8> {
    u8::from_str_radix(reply.get(5..7)?, 16).ok()
}

/// Human-readable form of an ERROR reply.
pub fn describe_error(reply: &str) -> String {
    match error_code(reply) {
        Some(code) => format!("code {:02X}", code),
        None => format!("malformed error reply {:?}", reply),
    }
}

/// Lifecycle stage addressed by a PHSR status request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhsrStage {
    /// Handles the device wants freed.
    Free = 0x01,
    /// Occupied ports whose handles still need PINIT.
    Init = 0x02,
    /// Initialized handles that still need PENA.
    Enable = 0x03,
}

impl PhsrStage {
    /// Stage code as it appears in the PHSR command.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Character stride between handle entries in the reply. The free
    /// stage lists bare ids; the init and enable stages append three
    /// status characters per entry.
    fn entry_stride(self) -> usize {
        match self {
            PhsrStage::Free => 2,
            PhsrStage::Init | PhsrStage::Enable => 5,
        }
    }
}

/// Parse a PHSR reply into the handle ids it lists.
///
/// The reply opens with a 2-hex-digit count; entries follow at the
/// stage's stride, each beginning with a 2-hex-digit handle id.
pub fn parse_phsr_reply(reply: &str, stage: PhsrStage) -> crate::Result<Vec<u8>> {
    let count = parse_hex_field(reply, 0, "PHSR count")?;
    let stride = stage.entry_stride();
    let mut handles = Vec::with_capacity(count as usize);
    for entry in 0..count as usize {
        handles.push(parse_hex_field(reply, 2 + entry * stride, "PHSR handle")?);
    }
    Ok(handles)
}

fn parse_hex_field(reply: &str, offset: usize, what: &str) -> crate::Result<u8> {
    let field = reply
        .get(offset..offset + 2)
        .ok_or_else(|| TrackerError::Protocol(format!("reply too short for {}", what)))?;
    u8::from_str_radix(field, 16)
        .map_err(|_| TrackerError::Protocol(format!("{} is not hex: {:?}", what, field)))
}

/// Fields parsed from a PHINF tool-information reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInfoReply {
    pub info: ToolInfo,
    /// Lifecycle bits carried in the per-port status field.
    pub status: HandleStatus,
    /// Two-character physical port number, e.g. "01".
    pub port: String,
    /// Set for the second sensor of a dual-sensor port.
    pub second_channel: bool,
}

// Fixed character offsets inside a PHINF 0025 reply.
const PHINF_TOOL_TYPE: std::ops::Range<usize> = 0..8;
const PHINF_MANUFACTURER: std::ops::Range<usize> = 8..20;
const PHINF_REVISION: std::ops::Range<usize> = 20..23;
const PHINF_SERIAL: std::ops::Range<usize> = 23..31;
const PHINF_PORT_STATUS: std::ops::Range<usize> = 31..33;
const PHINF_PART_NUMBER: std::ops::Range<usize> = 33..53;
const PHINF_PORT: std::ops::Range<usize> = 63..65;
const PHINF_CHANNEL: std::ops::Range<usize> = 65..67;
const PHINF_LEN: usize = 67;

/// Parse a PHINF reply requested with [`PHINF_BASIC_INFO`].
///
/// Identity fields are fixed-width space-padded ASCII and are kept as
/// reported. A reply shorter than the layout, or one carrying non-ASCII
/// identity bytes, is rejected outright.
pub fn parse_phinf_reply(reply: &str) -> crate::Result<ToolInfoReply> {
    let body = reply.get(..PHINF_LEN).ok_or_else(|| {
        TrackerError::Protocol(format!(
            "PHINF reply is {} characters, expected at least {}",
            reply.len(),
            PHINF_LEN
        ))
    })?;
    if !body
        .bytes()
        .all(|byte| byte.is_ascii_graphic() || byte == b' ')
    {
        return Err(TrackerError::Protocol(
            "PHINF reply carries non-ASCII identity fields".into(),
        ));
    }

    let status = parse_hex_field(body, PHINF_PORT_STATUS.start, "PHINF port status")?;

    Ok(ToolInfoReply {
        info: ToolInfo {
            tool_type: body[PHINF_TOOL_TYPE].to_string(),
            manufacturer: body[PHINF_MANUFACTURER].to_string(),
            revision: body[PHINF_REVISION].to_string(),
            serial_number: body[PHINF_SERIAL].to_string(),
            part_number: body[PHINF_PART_NUMBER].to_string(),
        },
        status: HandleStatus::from_bits_truncate(status as u32) & HandleStatus::PORT_FIELD,
        port: body[PHINF_PORT].to_string(),
        second_channel: &body[PHINF_CHANNEL] == "01",
    })
}
