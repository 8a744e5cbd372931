use openlcb_core::alias::Alias;

use super::{Exhausted, RecordHandle, Result};

/// A record pointer together with the `{source alias, destination
/// alias, MTI}` triple that uniquely identifies an in-flight
/// multi-frame message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PartialListEntry {
    pub handle: RecordHandle,
    pub src_alias: Alias,
    pub dst_alias: Alias,
    pub mti: u16,
}

/// Unordered small set of in-flight multi-frame assemblies.
///
/// Used only while a message is being reassembled: when the last frame
/// of a sequence arrives the matching entry is [`remove`](Self::remove)d
/// and the underlying record is pushed onto the inbound FIFO as a
/// complete message.
pub struct PartialMessageList<const DEPTH: usize> {
    entries: [Option<PartialListEntry>; DEPTH],
}

impl<const DEPTH: usize> PartialMessageList<DEPTH> {
    pub const fn new() -> Self {
        PartialMessageList {
            entries: [None; DEPTH],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }

    pub fn add(&mut self, entry: PartialListEntry) -> Result<()> {
        let slot = self.entries.iter_mut().find(|e| e.is_none()).ok_or(Exhausted)?;
        *slot = Some(entry);
        Ok(())
    }

    /// Remove the entry that owns `handle`, if any.
    pub fn remove(&mut self, handle: RecordHandle) -> Option<PartialListEntry> {
        let slot = self
            .entries
            .iter_mut()
            .find(|e| matches!(e, Some(entry) if entry.handle == handle))?;
        slot.take()
    }

    pub fn find_first(
        &self,
        src_alias: Alias,
        dst_alias: Alias,
        mti: u16,
    ) -> Option<PartialListEntry> {
        self.entries.iter().flatten().copied().find(|entry| {
            entry.src_alias == src_alias && entry.dst_alias == dst_alias && entry.mti == mti
        })
    }

    /// Find the in-flight assembly from a given sender for a given MTI,
    /// ignoring destination alias. Continuation (MIDDLE/LAST) frames
    /// don't repeat the destination alias on the wire, so this is how
    /// they're matched back to their FIRST frame's entry; per §5's
    /// ordering guarantee a sender never interleaves two messages, so
    /// `{src_alias, mti}` is unambiguous in practice.
    pub fn find_first_by_sender(&self, src_alias: Alias, mti: u16) -> Option<PartialListEntry> {
        self.entries
            .iter()
            .flatten()
            .copied()
            .find(|entry| entry.src_alias == src_alias && entry.mti == mti)
    }

    pub fn get(&self, index: usize) -> Option<PartialListEntry> {
        self.entries.get(index).copied().flatten()
    }

    pub const fn capacity(&self) -> usize {
        DEPTH
    }
}

impl<const DEPTH: usize> Default for PartialMessageList<DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::Tier;

    fn entry(index: usize, src: u16, dst: u16, mti: u16) -> PartialListEntry {
        PartialListEntry {
            handle: RecordHandle {
                tier: Tier::Basic,
                index,
            },
            src_alias: Alias::new(src),
            dst_alias: Alias::new(dst),
            mti,
        }
    }

    #[test]
    fn test_add_find_remove() {
        let mut list: PartialMessageList<4> = PartialMessageList::new();
        assert!(list.is_empty());

        let e1 = entry(0, 0x100, 0x200, 0x0A28);
        list.add(e1).unwrap();
        assert!(!list.is_empty());

        let found = list.find_first(Alias::new(0x100), Alias::new(0x200), 0x0A28);
        assert_eq!(found, Some(e1));

        let removed = list.remove(e1.handle);
        assert_eq!(removed, Some(e1));
        assert!(list.is_empty());
    }

    #[test]
    fn test_exhaustion() {
        let mut list: PartialMessageList<2> = PartialMessageList::new();
        list.add(entry(0, 1, 2, 3)).unwrap();
        list.add(entry(1, 1, 2, 3)).unwrap();
        assert!(list.add(entry(2, 1, 2, 3)).is_err());
    }

    #[test]
    fn test_find_first_no_match() {
        let mut list: PartialMessageList<2> = PartialMessageList::new();
        list.add(entry(0, 1, 2, 3)).unwrap();
        assert_eq!(list.find_first(Alias::new(9), Alias::new(9), 9), None);
    }
}
