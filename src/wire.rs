//! Encode/decode of option records.
//!
//! Every option this core understands has the shape
//! `code:u8 | length:u8 (== 6) | value:u32 (big-endian)`. Decoding never
//! panics: a record that's too short to hold a 4-byte payload is reported as
//! malformed rather than read out of bounds.

/// Fixed wire length of a 32-bit-payload option record.
pub const RECORD_LEN: u8 = 6;

/// A decoded option record: code plus the raw bytes that follow length.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Record<'a> {
    pub code: u8,
    pub data: &'a [u8],
}

/// The record's `length` byte didn't match what the payload requires.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[error("option record length mismatch: code={code:#x} len={len}")]
pub struct MalformedRecord {
    pub code: u8,
    pub len: u8,
}

/// Encode a `code | 6 | htonl(payload)` record into `out`, returning the
/// number of bytes written (always 6).
pub fn encode_u32(out: &mut [u8], code: u8, payload: u32) -> usize {
    assert!(out.len() >= 6, "encode_u32: buffer too small");
    out[0] = code;
    out[1] = RECORD_LEN;
    out[2..6].copy_from_slice(&payload.to_be_bytes());
    6
}

/// Decode a 4-byte big-endian payload out of an option record's data slice.
///
/// `data` is the record body *after* the code/length header (i.e. what a
/// [`Record::data`] holds). Returns [`MalformedRecord`] if `data` isn't
/// exactly 4 bytes (equivalently: the record's `length` byte wasn't 6).
pub fn decode_u32(code: u8, data: &[u8]) -> Result<u32, MalformedRecord> {
    let len: u8 = data
        .len()
        .checked_add(2)
        .and_then(|n| u8::try_from(n).ok())
        .unwrap_or(0xff);
    let bytes: [u8; 4] = data.try_into().map_err(|_| MalformedRecord { code, len })?;
    Ok(u32::from_be_bytes(bytes))
}

/// Split a Configure-* options payload into individual TLV records.
///
/// Stops and reports [`MalformedRecord`] at the first record whose `length`
/// byte doesn't leave enough bytes in `pkt`, or is less than 2 (the minimum
/// header size). Never reads past `pkt`'s bounds.
pub fn for_each_record<'a>(
    mut pkt: &'a [u8],
    mut f: impl FnMut(Record<'a>),
) -> Result<(), MalformedRecord> {
    while !pkt.is_empty() {
        if pkt.len() < 2 {
            return Err(MalformedRecord {
                code: pkt[0],
                len: 0,
            });
        }
        let code = pkt[0];
        let len = pkt[1];
        if (len as usize) < 2 || pkt.len() < len as usize {
            return Err(MalformedRecord { code, len });
        }
        let data = &pkt[2..len as usize];
        f(Record { code, data });
        pkt = &pkt[len as usize..];
    }
    Ok(())
}
