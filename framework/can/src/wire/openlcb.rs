//! Helpers for the payload shape of addressed OpenLCB messages.
//!
//! Addressed messages reserve their first two payload bytes for the
//! destination alias, big-endian; when the remaining payload exceeds six
//! bytes the message must be segmented across multiple CAN frames, and
//! the high two bits of the first payload byte of *those* continuation
//! frames carry the [`super::can::MultiFrameFlag`].

use super::{Error, Result};
use byteorder::{ByteOrder, NetworkEndian};
use openlcb_core::alias::Alias;

/// Split an addressed-message payload into its destination alias and the
/// remaining application bytes.
pub fn split_addressed(payload: &[u8]) -> Result<(Alias, &[u8])> {
    if payload.len() < 2 {
        return Err(Error);
    }
    let alias = Alias::new(NetworkEndian::read_u16(&payload[0..2]));
    Ok((alias, &payload[2..]))
}

/// Write the destination alias into the first two bytes of an addressed
/// payload buffer (caller-provided, at least 2 bytes long).
pub fn write_addressed_prefix(buf: &mut [u8], dest: Alias) -> Result<()> {
    if buf.len() < 2 {
        return Err(Error);
    }
    NetworkEndian::write_u16(&mut buf[0..2], dest.value());
    Ok(())
}

/// Number of payload octets consumed by the destination-alias prefix of
/// an addressed message.
pub const ADDRESSED_PREFIX_LEN: usize = 2;

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::can::MultiFrameFlag;

    #[test]
    fn test_split_addressed() {
        let payload = [0x04, 0x2A, 0xAA, 0xBB];
        let (alias, rest) = split_addressed(&payload).unwrap();
        assert_eq!(alias, Alias::new(0x042A));
        assert_eq!(rest, &[0xAA, 0xBB]);
    }

    #[test]
    fn test_write_addressed_prefix_survives_multiframe_flag() {
        // The alias only occupies the low 12 bits of the 2-byte prefix, so
        // setting the multi-frame flag in the first byte's top 2 bits
        // doesn't corrupt it.
        let mut buf = [0u8; 8];
        write_addressed_prefix(&mut buf, Alias::new(0x123)).unwrap();
        buf[0] = MultiFrameFlag::First.encode_into(buf[0]);
        let (alias, _) = split_addressed(&buf).unwrap();
        assert_eq!(alias, Alias::new(0x123));
    }
}
