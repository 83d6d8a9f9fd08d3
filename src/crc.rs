//! CRC-16 integrity checks.
//!
//! One routine serves every call site: command trailers, ASCII reply
//! trailers, and the header and body checksums of binary BX frames. The
//! device uses the reflected 0xA001 polynomial with a zero initial value,
//! computed over raw byte values.

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut index = 0;
    while index < 256 {
        let mut crc = index as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xA001
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[index] = crc;
        index += 1;
    }
    table
}

static CRC_TABLE: [u16; 256] = build_table();

/// Compute the CRC-16 of a byte span.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| {
        (crc >> 8) ^ CRC_TABLE[((crc ^ byte as u16) & 0xFF) as usize]
    })
}

/// Append the CRC of `text` to it as four uppercase hex digits.
pub fn append_ascii(text: &mut String) {
    let crc = crc16(text.as_bytes());
    text.push_str(&format!("{:04X}", crc));
}

/// Split an ASCII reply into the span its trailing CRC covers and the
/// embedded CRC value. `None` when the reply is too short to carry a
/// trailer or the trailer is not four hex digits.
pub fn split_ascii(reply: &str) -> Option<(&str, u16)> {
    if reply.len() < 5 || !reply.is_ascii() {
        return None;
    }
    let (text, trailer) = reply.split_at(reply.len() - 4);
    let embedded = u16::from_str_radix(trailer, 16).ok()?;
    Some((text, embedded))
}

/// True when an ASCII reply's trailing CRC matches the span it covers.
pub fn verify_ascii(reply: &str) -> bool {
    match split_ascii(reply) {
        Some((text, embedded)) => crc16(text.as_bytes()) == embedded,
        None => false,
    }
}
