use core::fmt;
use openlcb_core::alias::Alias;

pub(crate) mod field {
    pub type Field = core::ops::Range<usize>;
    pub type Rest = core::ops::RangeFrom<usize>;
    pub type Until = core::ops::RangeInclusive<usize>;
    pub type Single = usize;
}

pub mod can;
pub mod openlcb;

#[cfg(feature = "gridconnect")]
pub mod gridconnect;

pub use self::can::{Frame as CanFrame, HEADER_LEN as CAN_HEADER_LEN};

/// Parsing of a frame or packet failed: malformed wire bytes at the byte
/// level (short buffer, bad length field), never a protocol-semantic
/// rejection (those are reported as Optional Interaction Rejected instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Error;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wire::Error")
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// The only medium this stack speaks. Kept as an enum (rather than
/// collapsed away) so [`crate::phy::DeviceCapabilities`] reads the same
/// way it would with more than one medium implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Medium {
    Can,
}

impl Default for Medium {
    fn default() -> Self {
        Medium::Can
    }
}

/// A hardware-level address: the alias currently held on the bus.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HardwareAddress(pub Alias);

impl HardwareAddress {
    pub const fn alias(&self) -> Alias {
        self.0
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Alias> for HardwareAddress {
    fn from(addr: Alias) -> Self {
        HardwareAddress(addr)
    }
}
