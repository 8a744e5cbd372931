//! ASCII GridConnect framing (`:X<id-hex>N<data-hex>;`) for a single CAN
//! frame, for USB/serial adapters that don't carry raw CAN frames.
//! Not part of the core dispatch path; a transport bridge sits on
//! either side of [`crate::phy`] and calls these functions directly.

use core::fmt::Write as _;

use heapless::String;

use super::can::{Frame, Identifier};
use super::{Error, Result};

/// Longest line this module emits: `:X` + 8 id digits + `N` + 16 data
/// digits + `;`.
pub const MAX_LINE_LEN: usize = 2 + 8 + 1 + 16 + 1;

fn hex_digit(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(Error),
    }
}

/// Encode one CAN frame as a GridConnect line, e.g.
/// `:X19490247N0102030405060708;`.
pub fn encode(frame: &Frame<&[u8]>) -> Result<String<MAX_LINE_LEN>> {
    let mut line = String::new();
    let id = frame.identifier().encode();
    write!(line, ":X{:08X}N", id).map_err(|_| Error)?;
    for byte in frame.payload() {
        write!(line, "{:02X}", byte).map_err(|_| Error)?;
    }
    line.push(';').map_err(|_| Error)?;
    Ok(line)
}

/// Decode one GridConnect line into a CAN identifier and payload.
/// Rejects anything that isn't the extended-frame (`X`), data (`N`,
/// never remote-frame `R`) form this stack ever produces or consumes.
pub fn decode(line: &str) -> Result<(Identifier, heapless::Vec<u8, 8>)> {
    let bytes = line.as_bytes();
    if bytes.len() < 2 + 8 + 1 + 1 || bytes[0] != b':' || bytes[1] != b'X' {
        return Err(Error);
    }
    if *bytes.last().ok_or(Error)? != b';' {
        return Err(Error);
    }

    let mut id: u32 = 0;
    for &b in &bytes[2..10] {
        id = (id << 4) | hex_digit(b)? as u32;
    }

    if bytes[10] != b'N' {
        return Err(Error);
    }

    let data_hex = &bytes[11..bytes.len() - 1];
    if data_hex.len() % 2 != 0 || data_hex.len() / 2 > 8 {
        return Err(Error);
    }
    let mut payload = heapless::Vec::<u8, 8>::new();
    for chunk in data_hex.chunks(2) {
        let hi = hex_digit(chunk[0])?;
        let lo = hex_digit(chunk[1])?;
        payload.push((hi << 4) | lo).map_err(|_| Error)?;
    }

    Ok((Identifier::decode(id), payload))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::can::FrameType;
    use openlcb_core::alias::Alias;

    #[test]
    fn test_encode_roundtrips_through_decode() {
        let id = Identifier::Data {
            frame_type: FrameType::OpenLcbMessage,
            variable: 0x0490,
            src_alias: Alias::new(0x247),
        };
        let mut buf = [0u8; 4 + 8];
        let mut frame = Frame::new_unchecked(&mut buf[..]);
        frame.set_identifier(id);
        frame.payload_mut().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        let view = Frame::new_unchecked(&buf[..]);
        let line = encode(&view).unwrap();
        assert!(line.starts_with(":X"));
        assert!(line.ends_with(';'));

        let (decoded_id, payload) = decode(&line).unwrap();
        assert_eq!(decoded_id, id);
        assert_eq!(payload.as_slice(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_decode_rejects_missing_terminator() {
        assert!(decode(":X19490247N0102").is_err());
    }

    #[test]
    fn test_decode_rejects_odd_length_data() {
        assert!(decode(":X19490247N010;").is_err());
    }

    #[test]
    fn test_decode_empty_payload() {
        let (_, payload) = decode(":X19490247N;").unwrap();
        assert!(payload.is_empty());
    }
}
