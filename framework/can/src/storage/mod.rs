//! Bounded memory model shared by the Rx/Tx/login state machines: the
//! tiered message-record pool, the inbound/outbound FIFOs, the
//! in-flight multi-frame assembly list and the alias mapping table.

use core::fmt;

mod alias_table;
mod fifo;
mod partial;
mod store;

pub use alias_table::{AliasMappingEntry, AliasMappingTable};
pub use fifo::BufferFifo;
pub use partial::{PartialListEntry, PartialMessageList};
pub use store::{
    BufferStore, MessageRecord, RecordHandle, Tier, BASIC_PAYLOAD_CAP, DATAGRAM_PAYLOAD_CAP,
    DEFAULT_DEPTH, SNIP_PAYLOAD_CAP,
};

/// Exhaustion of a fixed-capacity pool. Never fatal: §7 requires the
/// caller to drop the frame/FIFO-entry/datagram that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Exhausted;

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "storage exhausted")
    }
}

pub type Result<T> = core::result::Result<T, Exhausted>;

/// Buffer store sized with [`DEFAULT_DEPTH`] slots in every tier. The
/// dispatch layer and default node aggregator are built against these
/// aliases; callers with tighter RAM budgets can instantiate the
/// generic types directly with smaller const generics instead.
pub type DefaultBufferStore = BufferStore;
pub type DefaultFifo = BufferFifo<{ DEFAULT_DEPTH + 1 }>;
pub type DefaultPartialList = PartialMessageList<DEFAULT_DEPTH>;
pub type DefaultAliasTable = AliasMappingTable<DEFAULT_DEPTH>;
