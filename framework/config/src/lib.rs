#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod params;

pub use memory::{ConfigMemory, InMemoryConfig, PersistentConfigMemory};
pub use params::{NodeParamBytes, Param};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Offset or length falls outside the addressed space.
    OutOfRange,
    /// The space is read-only (CDI, ACDI-Mfg, Train FDI) or write-only
    /// (Firmware) and the requested operation doesn't apply.
    NotPermitted,
    /// The underlying storage driver reported a failure.
    Storage,
}
