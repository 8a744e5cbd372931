use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

/// Size of an OpenLCB Node ID in octets.
pub const NODE_ID_SIZE: usize = 6;

/// A 48-bit permanent node identifier, big-endian on the wire.
///
/// Node ID zero is reserved and never identifies a real node.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeId(pub [u8; NODE_ID_SIZE]);

impl NodeId {
    /// Construct a Node ID from its 48-bit value.
    pub fn new(value: u64) -> Self {
        let mut bytes = [0u8; NODE_ID_SIZE];
        // value must fit in 48 bits; the top two octets of a u64 are unused.
        let full = value.to_be_bytes();
        bytes.copy_from_slice(&full[2..]);
        Self(bytes)
    }

    /// Construct a Node ID from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not six octets long.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut bytes = [0u8; NODE_ID_SIZE];
        bytes.copy_from_slice(data);
        Self(bytes)
    }

    /// Return the Node ID as a sequence of octets, in big-endian.
    pub const fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Return the Node ID as a 48-bit value in the low bits of a `u64`.
    pub fn as_u64(&self) -> u64 {
        let mut full = [0u8; 8];
        full[2..].copy_from_slice(&self.0);
        NetworkEndian::read_u64(&full)
    }

    /// Whether this is the reserved all-zero Node ID.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; NODE_ID_SIZE]
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:02X}.{:02X}.{:02X}.{:02X}.{:02X}.{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl From<NodeId> for u64 {
    fn from(value: NodeId) -> Self {
        value.as_u64()
    }
}
