use openlcb_core::alias::Alias;
use openlcb_core::node_id::NodeId;

use super::{Exhausted, Result};

/// `{alias, Node ID, is_duplicate, is_permitted}`. Empty slots have
/// `alias == 0 AND node_id == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AliasMappingEntry {
    pub alias: Alias,
    pub node_id: NodeId,
    pub is_duplicate: bool,
    pub is_permitted: bool,
}

impl AliasMappingEntry {
    const fn empty() -> Self {
        AliasMappingEntry {
            alias: Alias::EMPTY,
            node_id: NodeId([0; 6]),
            is_duplicate: false,
            is_permitted: false,
        }
    }

    const fn is_empty(&self) -> bool {
        self.alias.value() == 0 && self.node_id.as_u64() == 0
    }
}

/// Fixed-capacity bidirectional alias <-> Node ID table with a
/// duplicate-alias flag per entry.
pub struct AliasMappingTable<const DEPTH: usize> {
    entries: [AliasMappingEntry; DEPTH],
}

impl<const DEPTH: usize> AliasMappingTable<DEPTH> {
    pub const fn new() -> Self {
        AliasMappingTable {
            entries: [AliasMappingEntry::empty(); DEPTH],
        }
    }

    /// First-fit insertion of a new `{alias, NodeID}` pair, or update of
    /// an existing Node ID's alias. Rejects out-of-range aliases
    /// (outside `[0x001, 0xFFF]`) and out-of-range Node IDs (zero).
    pub fn register(&mut self, alias: Alias, node_id: NodeId) -> Result<()> {
        if !alias.is_valid() || node_id.is_zero() {
            return Err(Exhausted);
        }
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| !e.is_empty() && e.node_id == node_id)
        {
            existing.alias = alias;
            existing.is_duplicate = false;
            return Ok(());
        }
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.is_empty())
            .ok_or(Exhausted)?;
        *slot = AliasMappingEntry {
            alias,
            node_id,
            is_duplicate: false,
            is_permitted: false,
        };
        Ok(())
    }

    pub fn unregister(&mut self, alias: Alias) {
        if let Some(slot) = self.entries.iter_mut().find(|e| e.alias == alias && !e.is_empty()) {
            *slot = AliasMappingEntry::empty();
        }
    }

    pub fn find_by_alias(&self, alias: Alias) -> Option<&AliasMappingEntry> {
        self.entries.iter().find(|e| !e.is_empty() && e.alias == alias)
    }

    pub fn find_by_node_id(&self, node_id: NodeId) -> Option<&AliasMappingEntry> {
        self.entries
            .iter()
            .find(|e| !e.is_empty() && e.node_id == node_id)
    }

    pub fn set_permitted(&mut self, alias: Alias) {
        if let Some(slot) = self.entries.iter_mut().find(|e| e.alias == alias && !e.is_empty()) {
            slot.is_permitted = true;
        }
    }

    pub fn set_duplicate(&mut self, alias: Alias) {
        if let Some(slot) = self.entries.iter_mut().find(|e| e.alias == alias && !e.is_empty()) {
            slot.is_duplicate = true;
        }
    }

    pub fn clear_duplicate(&mut self, alias: Alias) {
        if let Some(slot) = self.entries.iter_mut().find(|e| e.alias == alias && !e.is_empty()) {
            slot.is_duplicate = false;
        }
    }

    pub fn flush_all(&mut self) {
        self.entries = [AliasMappingEntry::empty(); DEPTH];
    }

    /// Iterate entries currently flagged duplicate, serviced by the
    /// main dispatcher's highest-priority path.
    pub fn duplicates(&self) -> impl Iterator<Item = &AliasMappingEntry> {
        self.entries.iter().filter(|e| !e.is_empty() && e.is_duplicate)
    }
}

impl<const DEPTH: usize> Default for AliasMappingTable<DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}
