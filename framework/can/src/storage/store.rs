use openlcb_core::alias::Alias;
use openlcb_core::node_id::NodeId;

use super::{Exhausted, Result};

pub const BASIC_PAYLOAD_CAP: usize = 8;
pub const DATAGRAM_PAYLOAD_CAP: usize = 72;
pub const SNIP_PAYLOAD_CAP: usize = 253;

/// Default slot depth of each size tier. Mirrors the teacher's single
/// `USER_DEFINED_CAN_MSG_BUFFER_DEPTH`-style constant: one depth shared
/// across buffer store tiers, the FIFO and the partial-message list.
pub const DEFAULT_DEPTH: usize = 16;

/// Which size-tiered pool backs a record's payload array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tier {
    Basic,
    Datagram,
    Snip,
}

impl Tier {
    /// Smallest tier whose capacity covers `len` bytes, or `None` if no
    /// tier is large enough.
    pub const fn for_len(len: usize) -> Option<Tier> {
        if len <= BASIC_PAYLOAD_CAP {
            Some(Tier::Basic)
        } else if len <= DATAGRAM_PAYLOAD_CAP {
            Some(Tier::Datagram)
        } else if len <= SNIP_PAYLOAD_CAP {
            Some(Tier::Snip)
        } else {
            None
        }
    }

    pub const fn capacity(self) -> usize {
        match self {
            Tier::Basic => BASIC_PAYLOAD_CAP,
            Tier::Datagram => DATAGRAM_PAYLOAD_CAP,
            Tier::Snip => SNIP_PAYLOAD_CAP,
        }
    }
}

/// A handle into the buffer store: which tier, and which slot within it.
/// Stable for the lifetime of an allocation; the same bit pattern may be
/// reused after the record is freed, so holding on to a handle past
/// `free` is a caller bug, not a checked error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecordHandle {
    pub tier: Tier,
    pub index: usize,
}

/// A message record: the unit of allocation in the buffer store.
///
/// `payload` is sized to the tier's capacity; `payload_len` is the
/// number of bytes actually in use, always `<= CAP`.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MessageRecord<const CAP: usize> {
    pub in_process: bool,
    pub src_alias: Alias,
    pub src_node_id: NodeId,
    pub dst_alias: Alias,
    pub dst_node_id: NodeId,
    pub mti: u16,
    pub timer_ticks: u16,
    payload: [u8; CAP],
    payload_len: usize,
}

impl<const CAP: usize> MessageRecord<CAP> {
    const fn empty() -> Self {
        MessageRecord {
            in_process: false,
            src_alias: Alias::EMPTY,
            src_node_id: NodeId([0; 6]),
            dst_alias: Alias::EMPTY,
            dst_node_id: NodeId([0; 6]),
            mti: 0,
            timer_ticks: 0,
            payload: [0; CAP],
            payload_len: 0,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len]
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    pub const fn payload_capacity(&self) -> usize {
        CAP
    }

    /// Overwrite the payload. `bytes.len()` must not exceed `CAP`;
    /// truncated silently if it does (the caller has already chosen a
    /// tier based on the intended length via [`Tier::for_len`]).
    pub fn set_payload(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(CAP);
        self.payload[..len].copy_from_slice(&bytes[..len]);
        self.payload_len = len;
    }

    pub fn append_payload(&mut self, bytes: &[u8]) {
        let space = CAP - self.payload_len;
        let len = bytes.len().min(space);
        let start = self.payload_len;
        self.payload[start..start + len].copy_from_slice(&bytes[..len]);
        self.payload_len += len;
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot<const CAP: usize> {
    record: MessageRecord<CAP>,
    ref_count: u8,
}

impl<const CAP: usize> Slot<CAP> {
    const fn empty() -> Self {
        Slot {
            record: MessageRecord::empty(),
            ref_count: 0,
        }
    }

    const fn allocated(&self) -> bool {
        self.ref_count > 0
    }
}

/// Pool of fixed-size message records, tiered by payload length.
///
/// Tier depths default to [`DEFAULT_DEPTH`] each but are independently
/// configurable via the const generics, so a platform with little RAM
/// can shrink the Snip tier (SNIP replies are rare) without shrinking
/// Basic (every login and event frame uses it).
pub struct BufferStore<
    const BASIC_N: usize = DEFAULT_DEPTH,
    const DATAGRAM_N: usize = DEFAULT_DEPTH,
    const SNIP_N: usize = DEFAULT_DEPTH,
> {
    basic: [Slot<BASIC_PAYLOAD_CAP>; BASIC_N],
    datagram: [Slot<DATAGRAM_PAYLOAD_CAP>; DATAGRAM_N],
    snip: [Slot<SNIP_PAYLOAD_CAP>; SNIP_N],
    high_water: [usize; 3],
}

impl<const BASIC_N: usize, const DATAGRAM_N: usize, const SNIP_N: usize>
    BufferStore<BASIC_N, DATAGRAM_N, SNIP_N>
{
    pub const fn new() -> Self {
        BufferStore {
            basic: [Slot::empty(); BASIC_N],
            datagram: [Slot::empty(); DATAGRAM_N],
            snip: [Slot::empty(); SNIP_N],
            high_water: [0; 3],
        }
    }

    /// Allocate a record sized for `payload_len` bytes, promoted to the
    /// smallest tier that fits. Returns [`Exhausted`] if that tier (and
    /// only that tier; the store never silently promotes further) is
    /// full, or if `payload_len` exceeds the largest tier.
    pub fn allocate(&mut self, payload_len: usize) -> Result<RecordHandle> {
        match Tier::for_len(payload_len) {
            Some(Tier::Basic) => self.allocate_in(Tier::Basic),
            Some(Tier::Datagram) => self.allocate_in(Tier::Datagram),
            Some(Tier::Snip) => self.allocate_in(Tier::Snip),
            None => Err(Exhausted),
        }
    }

    fn allocate_in(&mut self, tier: Tier) -> Result<RecordHandle> {
        let (slot_idx, tier_idx) = match tier {
            Tier::Basic => (
                self.basic.iter().position(|s| !s.allocated()),
                0,
            ),
            Tier::Datagram => (
                self.datagram.iter().position(|s| !s.allocated()),
                1,
            ),
            Tier::Snip => (
                self.snip.iter().position(|s| !s.allocated()),
                2,
            ),
        };
        let index = slot_idx.ok_or(Exhausted)?;
        match tier {
            Tier::Basic => {
                self.basic[index] = Slot::empty();
                self.basic[index].ref_count = 1;
            }
            Tier::Datagram => {
                self.datagram[index] = Slot::empty();
                self.datagram[index].ref_count = 1;
            }
            Tier::Snip => {
                self.snip[index] = Slot::empty();
                self.snip[index].ref_count = 1;
            }
        }
        let in_use = self.count_allocated(tier);
        if in_use > self.high_water[tier_idx] {
            self.high_water[tier_idx] = in_use;
        }
        Ok(RecordHandle { tier, index })
    }

    /// Increment a record's reference count (a message handed to more
    /// than one handler, or held in the partial list while in the FIFO).
    pub fn retain(&mut self, handle: RecordHandle) {
        if let Some(rc) = self.ref_count_mut(handle) {
            *rc = rc.saturating_add(1);
        }
    }

    /// Decrement a record's reference count; clears the slot once it
    /// reaches zero.
    pub fn free(&mut self, handle: RecordHandle) {
        if let Some(rc) = self.ref_count_mut(handle) {
            *rc = rc.saturating_sub(1);
        }
    }

    fn ref_count_mut(&mut self, handle: RecordHandle) -> Option<&mut u8> {
        match handle.tier {
            Tier::Basic => self.basic.get_mut(handle.index).map(|s| &mut s.ref_count),
            Tier::Datagram => self
                .datagram
                .get_mut(handle.index)
                .map(|s| &mut s.ref_count),
            Tier::Snip => self.snip.get_mut(handle.index).map(|s| &mut s.ref_count),
        }
    }

    /// Fetch a Basic-tier record. Callers reach the other tiers through
    /// `get_datagram`/`get_snip` since the payload array size is part
    /// of the type.
    pub fn get_basic(&self, handle: RecordHandle) -> Option<&MessageRecord<BASIC_PAYLOAD_CAP>> {
        match handle.tier {
            Tier::Basic => self
                .basic
                .get(handle.index)
                .filter(|s| s.allocated())
                .map(|s| &s.record),
            _ => None,
        }
    }

    pub fn get_basic_mut(
        &mut self,
        handle: RecordHandle,
    ) -> Option<&mut MessageRecord<BASIC_PAYLOAD_CAP>> {
        match handle.tier {
            Tier::Basic => self
                .basic
                .get_mut(handle.index)
                .filter(|s| s.allocated())
                .map(|s| &mut s.record),
            _ => None,
        }
    }

    pub fn get_datagram(
        &self,
        handle: RecordHandle,
    ) -> Option<&MessageRecord<DATAGRAM_PAYLOAD_CAP>> {
        match handle.tier {
            Tier::Datagram => self
                .datagram
                .get(handle.index)
                .filter(|s| s.allocated())
                .map(|s| &s.record),
            _ => None,
        }
    }

    pub fn get_datagram_mut(
        &mut self,
        handle: RecordHandle,
    ) -> Option<&mut MessageRecord<DATAGRAM_PAYLOAD_CAP>> {
        match handle.tier {
            Tier::Datagram => self
                .datagram
                .get_mut(handle.index)
                .filter(|s| s.allocated())
                .map(|s| &mut s.record),
            _ => None,
        }
    }

    pub fn get_snip(&self, handle: RecordHandle) -> Option<&MessageRecord<SNIP_PAYLOAD_CAP>> {
        match handle.tier {
            Tier::Snip => self
                .snip
                .get(handle.index)
                .filter(|s| s.allocated())
                .map(|s| &s.record),
            _ => None,
        }
    }

    pub fn get_snip_mut(
        &mut self,
        handle: RecordHandle,
    ) -> Option<&mut MessageRecord<SNIP_PAYLOAD_CAP>> {
        match handle.tier {
            Tier::Snip => self
                .snip
                .get_mut(handle.index)
                .filter(|s| s.allocated())
                .map(|s| &mut s.record),
            _ => None,
        }
    }

    /// Tier-dispatched view of a record's addressing fields and payload,
    /// shared by the outgoing fragmenter and the OpenLCB main dispatcher
    /// so neither re-implements the `match handle.tier` three times.
    pub fn record_summary(&self, handle: RecordHandle) -> Option<(Alias, Alias, NodeId, u16, &[u8])> {
        match handle.tier {
            Tier::Basic => self
                .get_basic(handle)
                .map(|r| (r.src_alias, r.dst_alias, r.dst_node_id, r.mti, r.payload())),
            Tier::Datagram => self
                .get_datagram(handle)
                .map(|r| (r.src_alias, r.dst_alias, r.dst_node_id, r.mti, r.payload())),
            Tier::Snip => self
                .get_snip(handle)
                .map(|r| (r.src_alias, r.dst_alias, r.dst_node_id, r.mti, r.payload())),
        }
    }

    pub fn count_allocated(&self, tier: Tier) -> usize {
        match tier {
            Tier::Basic => self.basic.iter().filter(|s| s.allocated()).count(),
            Tier::Datagram => self.datagram.iter().filter(|s| s.allocated()).count(),
            Tier::Snip => self.snip.iter().filter(|s| s.allocated()).count(),
        }
    }

    pub fn high_water_mark(&self, tier: Tier) -> usize {
        match tier {
            Tier::Basic => self.high_water[0],
            Tier::Datagram => self.high_water[1],
            Tier::Snip => self.high_water[2],
        }
    }
}

impl<const BASIC_N: usize, const DATAGRAM_N: usize, const SNIP_N: usize> Default
    for BufferStore<BASIC_N, DATAGRAM_N, SNIP_N>
{
    fn default() -> Self {
        Self::new()
    }
}
