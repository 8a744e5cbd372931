use crate::node_id::NodeId;
use byteorder::{ByteOrder, NetworkEndian};

/// Size of an OpenLCB Event ID in octets.
pub const EVENT_ID_SIZE: usize = 8;

/// A 64-bit OpenLCB event identifier.
///
/// Often carries structured sub-fields, e.g. a broadcast-time event packs
/// a `clock_id` into the high bits and a date/time payload into the low
/// bits; this type only guarantees the 8-byte big-endian wire shape.
#[derive(Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventId {
    data: [u8; EVENT_ID_SIZE],
}

impl EventId {
    /// Construct an Event ID from its 64-bit value.
    pub fn new(value: u64) -> Self {
        let mut data = [0u8; EVENT_ID_SIZE];
        NetworkEndian::write_u64(&mut data, value);
        Self { data }
    }

    /// Construct an Event ID from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not eight octets long.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut bytes = [0u8; EVENT_ID_SIZE];
        bytes.copy_from_slice(data);
        Self { data: bytes }
    }

    /// Construct an Event ID from a node's ID and a 16-bit per-node event
    /// number, the common "node-scoped" event layout.
    pub fn from_node_and_id(node_id: &NodeId, evt_id: u16) -> Self {
        let mut bytes = [0u8; EVENT_ID_SIZE];
        bytes[0..6].copy_from_slice(node_id.as_bytes());
        NetworkEndian::write_u16(&mut bytes[6..], evt_id);
        Self { data: bytes }
    }

    /// Return the Event ID as a sequence of octets, in big-endian.
    pub const fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Return the Event ID as a raw `u64`.
    pub fn as_u64(&self) -> u64 {
        NetworkEndian::read_u64(&self.data)
    }

    /// The Node ID occupying the top 6 bytes, for node-scoped events.
    pub fn owning_node_id(&self) -> NodeId {
        NodeId::from_bytes(&self.data[0..6])
    }

    /// The per-node event number occupying the low 2 bytes.
    pub fn event_num(&self) -> u16 {
        NetworkEndian::read_u16(&self.data[6..])
    }
}
