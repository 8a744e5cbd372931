use byteorder::{ByteOrder, NetworkEndian};
use core::{borrow::BorrowMut, fmt};
use num_enum::{FromPrimitive, IntoPrimitive};
use openlcb_core::alias::Alias;

use super::{Error, Result};

/// The 29-bit extended CAN identifier, decomposed MSB to LSB as:
///
/// - 1 reserved bit, always set.
/// - 1 bit marking a Check-ID (CID) frame, distinct from the 3-bit
///   category below so that both the category list and the CID
///   sequence number (7/6/5/4) have room in 29 bits total. This single
///   extra bit is an implementation choice, not a literal protocol field.
/// - 3-bit category: when the CID-marker bit is clear, one of
///   [`FrameType`]'s seven variants; when set, the CID sequence number
///   (7, 6, 5 or 4), selecting which 12-bit slice of the Node ID this
///   frame carries.
/// - 12-bit variable field: an MTI's low 12 bits, a CAN-control
///   sub-opcode (`0x700`..=`0x703`), or 12 bits of a Node ID during CID.
/// - 12-bit source alias.
pub const RESERVED_SHIFT: u32 = 28;
pub const CID_MARKER_SHIFT: u32 = 27;
pub const CATEGORY_SHIFT: u32 = 24;
pub const CATEGORY_MASK: u32 = 0x7;
pub const VARIABLE_SHIFT: u32 = 12;
pub const VARIABLE_MASK: u32 = 0xFFF;
pub const ALIAS_MASK: u32 = 0xFFF;

/// Non-CID frame-type category (the CID-marker bit is clear).
#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameType {
    OpenLcbMessage = 0,
    DatagramOnly = 1,
    DatagramFirst = 2,
    DatagramMiddle = 3,
    DatagramLast = 4,
    Stream = 5,
    CanControl = 6,
    #[default]
    Reserved = 7,
}

/// Control sub-opcodes carried in the variable field when
/// `FrameType::CanControl` is set.
#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlOpcode {
    ReserveId = 0x700,
    AliasMapDefinition = 0x701,
    AliasMapEnquiry = 0x702,
    AliasMapReset = 0x703,
    ErrorInfoReport0 = 0x704,
    ErrorInfoReport1 = 0x705,
    ErrorInfoReport2 = 0x706,
    ErrorInfoReport3 = 0x707,
    #[default]
    Unknown = 0xFFF,
}

/// Which 12-bit slice of the Node ID a CID frame carries (the "sequence").
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CidSequence {
    /// bits 47..36
    Cid7,
    /// bits 35..24
    Cid6,
    /// bits 23..12
    Cid5,
    /// bits 11..0
    Cid4,
}

impl CidSequence {
    pub const fn raw(self) -> u8 {
        match self {
            CidSequence::Cid7 => 7,
            CidSequence::Cid6 => 6,
            CidSequence::Cid5 => 5,
            CidSequence::Cid4 => 4,
        }
    }

    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            7 => Some(CidSequence::Cid7),
            6 => Some(CidSequence::Cid6),
            5 => Some(CidSequence::Cid5),
            4 => Some(CidSequence::Cid4),
            _ => None,
        }
    }
}

/// Decoded view of a 29-bit CAN identifier.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Identifier {
    Data {
        frame_type: FrameType,
        variable: u16,
        src_alias: Alias,
    },
    Cid {
        sequence: CidSequence,
        node_id_chunk: u16,
        src_alias: Alias,
    },
}

impl Identifier {
    pub fn encode(self) -> u32 {
        let alias = match self {
            Identifier::Data { src_alias, .. } => src_alias.value(),
            Identifier::Cid { src_alias, .. } => src_alias.value(),
        };
        let mut id = 1u32 << RESERVED_SHIFT;
        id |= (alias as u32) & ALIAS_MASK;
        match self {
            Identifier::Data {
                frame_type,
                variable,
                ..
            } => {
                id |= (u8::from(frame_type) as u32 & CATEGORY_MASK) << CATEGORY_SHIFT;
                id |= (variable as u32 & VARIABLE_MASK) << VARIABLE_SHIFT;
            }
            Identifier::Cid {
                sequence,
                node_id_chunk,
                ..
            } => {
                id |= 1u32 << CID_MARKER_SHIFT;
                id |= (sequence.raw() as u32 & CATEGORY_MASK) << CATEGORY_SHIFT;
                id |= (node_id_chunk as u32 & VARIABLE_MASK) << VARIABLE_SHIFT;
            }
        }
        id
    }

    pub fn decode(id: u32) -> Self {
        let src_alias = Alias::new((id & ALIAS_MASK) as u16);
        let variable = ((id >> VARIABLE_SHIFT) & VARIABLE_MASK) as u16;
        let category = ((id >> CATEGORY_SHIFT) & CATEGORY_MASK) as u8;
        let is_cid = (id >> CID_MARKER_SHIFT) & 1 != 0;

        if is_cid {
            let sequence = CidSequence::from_raw(category).unwrap_or(CidSequence::Cid4);
            Identifier::Cid {
                sequence,
                node_id_chunk: variable,
                src_alias,
            }
        } else {
            Identifier::Data {
                frame_type: FrameType::from_primitive(category),
                variable,
                src_alias,
            }
        }
    }
}

/// A read/write wrapper around a raw CAN frame buffer: 4 octets of
/// extended identifier (stored big-endian, top 3 bits always zero)
/// followed by 0-8 octets of payload.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    use crate::wire::field::*;

    pub const ID: Field = 0..4;
    pub const PAYLOAD: Rest = 4..;
}

/// The CAN frame header length.
pub const HEADER_LEN: usize = field::PAYLOAD.start;

impl<T: AsRef<[u8]>> Frame<T> {
    pub const fn new_unchecked(buffer: T) -> Frame<T> {
        Frame { buffer }
    }

    pub fn new_checked(buffer: T) -> Result<Frame<T>> {
        let frame = Self::new_unchecked(buffer);
        frame.check_len()?;
        Ok(frame)
    }

    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN || len - HEADER_LEN > 8 {
            Err(Error)
        } else {
            Ok(())
        }
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    pub const fn header_len() -> usize {
        HEADER_LEN
    }

    pub const fn buffer_len(payload_len: usize) -> usize {
        HEADER_LEN + payload_len
    }

    pub fn identifier(&self) -> Identifier {
        Identifier::decode(NetworkEndian::read_u32(&self.buffer.as_ref()[field::ID]))
    }

    pub fn src_alias(&self) -> Alias {
        match self.identifier() {
            Identifier::Data { src_alias, .. } => src_alias,
            Identifier::Cid { src_alias, .. } => src_alias,
        }
    }

    pub fn payload_len(&self) -> usize {
        self.buffer.as_ref().len() - HEADER_LEN
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Frame<&'a T> {
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let data = self.buffer.as_ref();
        &data[field::PAYLOAD]
    }
}

impl<T: AsRef<[u8]> + BorrowMut<[u8]>> Frame<T> {
    #[inline]
    pub fn set_identifier(&mut self, identifier: Identifier) {
        let data = self.buffer.borrow_mut();
        NetworkEndian::write_u32(&mut data[field::ID], identifier.encode());
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let data = self.buffer.borrow_mut();
        &mut data[field::PAYLOAD]
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Frame<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

impl<T: AsRef<[u8]>> fmt::Display for Frame<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CAN2.0B src_alias={}", self.src_alias())
    }
}

/// Multi-frame flag carried in the high two bits of the first payload
/// byte of an addressed OpenLCB message longer than 6 bytes.
///
/// `00` is the single-frame ("only") state; `01`/`10`/`11` mark
/// first/last/middle fragments of a segmented message.
#[derive(Debug, Eq, PartialEq, Copy, Clone, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MultiFrameFlag {
    #[default]
    Only = 0b00,
    First = 0b01,
    Last = 0b10,
    Middle = 0b11,
}

impl MultiFrameFlag {
    pub const MASK: u8 = 0b1100_0000;
    pub const SHIFT: u8 = 6;

    pub fn decode(first_byte: u8) -> Self {
        Self::from_primitive((first_byte & Self::MASK) >> Self::SHIFT)
    }

    pub fn encode_into(self, first_byte: u8) -> u8 {
        (first_byte & !Self::MASK) | ((self as u8) << Self::SHIFT)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_identifier_roundtrip_data() {
        let id = Identifier::Data {
            frame_type: FrameType::OpenLcbMessage,
            variable: 0x123,
            src_alias: Alias::new(0x456),
        };
        let encoded = id.encode();
        assert_eq!(Identifier::decode(encoded), id);
    }

    #[test]
    fn test_identifier_roundtrip_cid() {
        let id = Identifier::Cid {
            sequence: CidSequence::Cid7,
            node_id_chunk: 0x0201,
            src_alias: Alias::new(0x042),
        };
        assert_eq!(Identifier::decode(id.encode()), id);
    }

    #[test]
    fn test_control_opcodes() {
        assert_eq!(ControlOpcode::from_primitive(0x700), ControlOpcode::ReserveId);
        assert_eq!(
            ControlOpcode::from_primitive(0x701),
            ControlOpcode::AliasMapDefinition
        );
        assert_eq!(ControlOpcode::from_primitive(0x702), ControlOpcode::AliasMapEnquiry);
        assert_eq!(ControlOpcode::from_primitive(0x703), ControlOpcode::AliasMapReset);
    }

    #[test]
    fn test_multiframe_flag() {
        assert_eq!(MultiFrameFlag::decode(0b0000_0000), MultiFrameFlag::Only);
        assert_eq!(MultiFrameFlag::decode(0b0100_0000), MultiFrameFlag::First);
        assert_eq!(MultiFrameFlag::decode(0b1000_0000), MultiFrameFlag::Last);
        assert_eq!(MultiFrameFlag::decode(0b1100_0000), MultiFrameFlag::Middle);

        let b = MultiFrameFlag::First.encode_into(0x05);
        assert_eq!(b, 0b0100_0101);
        assert_eq!(MultiFrameFlag::decode(b), MultiFrameFlag::First);
    }

    #[test]
    fn test_frame_payload() {
        let mut buf = [0u8; HEADER_LEN + 4];
        let mut frame = Frame::new_unchecked(&mut buf[..]);
        frame.set_identifier(Identifier::Data {
            frame_type: FrameType::OpenLcbMessage,
            variable: 0x100,
            src_alias: Alias::new(0x042),
        });
        frame.payload_mut().copy_from_slice(&[1, 2, 3, 4]);

        let frame = Frame::new_checked(&buf[..]).unwrap();
        assert_eq!(frame.payload(), &[1, 2, 3, 4]);
        assert_eq!(frame.src_alias(), Alias::new(0x042));
    }
}
