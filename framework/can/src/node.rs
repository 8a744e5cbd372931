//! The virtual node record and the fixed node table that holds them.

use openlcb_core::alias::Alias;
use openlcb_core::event::EventId;
use openlcb_core::node_flags::NodeFlags;
use openlcb_core::node_id::NodeId;

use crate::storage::{Exhausted, Result};

/// Ordered login progression. `GenerateSeed` is entered only on a
/// conflict retry; the first pass goes straight from `Init` to
/// `GenerateAlias`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunState {
    Init,
    GenerateSeed,
    GenerateAlias,
    LoadCid07,
    LoadCid06,
    LoadCid05,
    LoadCid04,
    Wait200ms,
    LoadReserveId,
    LoadAliasMapDefinition,
    LoadInitializationComplete,
    LoadProducerEvents,
    LoadConsumerEvents,
    LoginComplete,
    Run,
}

/// Status of a single producer/consumer event, mirroring the MTI
/// variants used to report it (`*IdentifiedUnknown/Set/Clear/Reserved`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventStatus {
    #[default]
    Unknown,
    Set,
    Clear,
    Reserved,
}

/// Runtime-active copy of the protocol-support bit-set and
/// producer/consumer autocreate counts. The persisted byte-array form
/// of this data (the CDI/Config-memory layout) lives in
/// `openlcb-config`; this is the working copy the dispatcher consults
/// on every tick.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeParams {
    pub protocol_support: u32,
    pub producer_autocreate_count: u8,
    pub consumer_autocreate_count: u8,
    /// Advertise the Simple (not Full) Initialization Complete variant.
    pub simple_protocol: bool,
}

#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct EventSlot {
    id: EventId,
    status: EventStatus,
}

/// A handle into the node table: the slot index. Stable for the
/// lifetime of the allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeHandle(pub usize);

/// One virtual node: a permanent Node ID and everything the login and
/// dispatch machinery needs to track its progress through the bus.
pub struct VirtualNode<const MAX_PRODUCERS: usize, const MAX_CONSUMERS: usize> {
    pub node_id: NodeId,
    pub alias: Alias,
    pub lfsr_seed: u64,
    pub flags: NodeFlags,
    pub run_state: RunState,
    pub params: NodeParams,
    producers: [EventSlot; MAX_PRODUCERS],
    consumers: [EventSlot; MAX_CONSUMERS],
    producer_count: usize,
    consumer_count: usize,
    producer_cursor: usize,
    consumer_cursor: usize,
    pub timer_ticks: u16,
    /// Index of the owning node in a train-consist hierarchy, looked up
    /// by Node ID rather than a back-pointer (see `DESIGN.md`).
    pub owner: Option<NodeId>,
    pub index: usize,
}

impl<const MAX_PRODUCERS: usize, const MAX_CONSUMERS: usize>
    VirtualNode<MAX_PRODUCERS, MAX_CONSUMERS>
{
    fn new(node_id: NodeId, params: NodeParams, index: usize) -> Self {
        VirtualNode {
            node_id,
            alias: Alias::EMPTY,
            lfsr_seed: node_id.as_u64(),
            flags: NodeFlags::Allocated,
            run_state: RunState::Init,
            params,
            producers: [EventSlot::default(); MAX_PRODUCERS],
            consumers: [EventSlot::default(); MAX_CONSUMERS],
            producer_count: 0,
            consumer_count: 0,
            producer_cursor: 0,
            consumer_cursor: 0,
            timer_ticks: 0,
            owner: None,
            index,
        }
    }

    pub fn add_producer(&mut self, id: EventId, status: EventStatus) -> Result<()> {
        if self.producer_count >= MAX_PRODUCERS {
            return Err(Exhausted);
        }
        self.producers[self.producer_count] = EventSlot { id, status };
        self.producer_count += 1;
        Ok(())
    }

    pub fn add_consumer(&mut self, id: EventId, status: EventStatus) -> Result<()> {
        if self.consumer_count >= MAX_CONSUMERS {
            return Err(Exhausted);
        }
        self.consumers[self.consumer_count] = EventSlot { id, status };
        self.consumer_count += 1;
        Ok(())
    }

    pub fn producer_count(&self) -> usize {
        self.producer_count
    }

    pub fn consumer_count(&self) -> usize {
        self.consumer_count
    }

    pub fn reset_producer_cursor(&mut self) {
        self.producer_cursor = 0;
    }

    pub fn reset_consumer_cursor(&mut self) {
        self.consumer_cursor = 0;
    }

    /// Advance the producer cursor and return the event it pointed at,
    /// or `None` once exhausted.
    pub fn next_producer(&mut self) -> Option<(EventId, EventStatus)> {
        if self.producer_cursor >= self.producer_count {
            return None;
        }
        let slot = self.producers[self.producer_cursor];
        self.producer_cursor += 1;
        Some((slot.id, slot.status))
    }

    pub fn next_consumer(&mut self) -> Option<(EventId, EventStatus)> {
        if self.consumer_cursor >= self.consumer_count {
            return None;
        }
        let slot = self.consumers[self.consumer_cursor];
        self.consumer_cursor += 1;
        Some((slot.id, slot.status))
    }

    pub fn producer_cursor_exhausted(&self) -> bool {
        self.producer_cursor >= self.producer_count
    }

    pub fn consumer_cursor_exhausted(&self) -> bool {
        self.consumer_cursor >= self.consumer_count
    }

    /// Open-question resolution (see `DESIGN.md`): once permitted, an
    /// alias match alone is sufficient; before that (during login, when
    /// a peer cannot yet know our alias) only a Node ID match counts.
    pub fn is_addressed_to(&self, dest_alias: Option<Alias>, dest_node_id: Option<NodeId>) -> bool {
        if self.flags.contains(NodeFlags::Permitted) {
            if let Some(alias) = dest_alias {
                if alias == self.alias {
                    return true;
                }
            }
        }
        if let Some(node_id) = dest_node_id {
            if node_id == self.node_id {
                return true;
            }
        }
        false
    }
}

/// Fixed array of node records. The CAN Main Dispatcher and the
/// OpenLCB Main Dispatcher each enumerate it with their own cursor
/// state (`CanMain::service_login`'s stateless "first node still mid-
/// login" scan, `OpenLcbMain`'s `CurrentMessage::node_cursor`), so the
/// table itself doesn't need to track per-caller enumeration state.
pub struct NodeTable<const CAP: usize, const MAX_PRODUCERS: usize, const MAX_CONSUMERS: usize> {
    nodes: [Option<VirtualNode<MAX_PRODUCERS, MAX_CONSUMERS>>; CAP],
}

impl<const CAP: usize, const MAX_PRODUCERS: usize, const MAX_CONSUMERS: usize>
    NodeTable<CAP, MAX_PRODUCERS, MAX_CONSUMERS>
{
    pub fn new() -> Self {
        NodeTable {
            nodes: core::array::from_fn(|_| None),
        }
    }

    pub fn allocate(&mut self, node_id: NodeId, params: NodeParams) -> Result<NodeHandle> {
        let index = self.nodes.iter().position(Option::is_none).ok_or(Exhausted)?;
        self.nodes[index] = Some(VirtualNode::new(node_id, params, index));
        Ok(NodeHandle(index))
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&VirtualNode<MAX_PRODUCERS, MAX_CONSUMERS>> {
        self.nodes.get(handle.0).and_then(Option::as_ref)
    }

    pub fn get_mut(
        &mut self,
        handle: NodeHandle,
    ) -> Option<&mut VirtualNode<MAX_PRODUCERS, MAX_CONSUMERS>> {
        self.nodes.get_mut(handle.0).and_then(Option::as_mut)
    }

    pub fn find_by_alias(
        &self,
        alias: Alias,
    ) -> Option<&VirtualNode<MAX_PRODUCERS, MAX_CONSUMERS>> {
        self.nodes
            .iter()
            .flatten()
            .find(|n| n.alias == alias && !alias.is_empty())
    }

    pub fn find_by_node_id(
        &self,
        node_id: NodeId,
    ) -> Option<&VirtualNode<MAX_PRODUCERS, MAX_CONSUMERS>> {
        self.nodes.iter().flatten().find(|n| n.node_id == node_id)
    }

    pub fn find_by_alias_mut(
        &mut self,
        alias: Alias,
    ) -> Option<&mut VirtualNode<MAX_PRODUCERS, MAX_CONSUMERS>> {
        self.nodes
            .iter_mut()
            .flatten()
            .find(|n| n.alias == alias && !alias.is_empty())
    }

    /// Every allocated node, in slot order, mutable. Used by the
    /// dispatchers to find "the first node that still needs a step" in
    /// one pass rather than threading cursor state through every caller.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut VirtualNode<MAX_PRODUCERS, MAX_CONSUMERS>> {
        self.nodes.iter_mut().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VirtualNode<MAX_PRODUCERS, MAX_CONSUMERS>> {
        self.nodes.iter().flatten()
    }

    /// Increment every allocated node's timer counter, called from the
    /// 100 ms tick entry point.
    pub fn tick_100ms(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.timer_ticks = node.timer_ticks.saturating_add(1);
        }
    }

    /// Force every allocated node back to `Init`. Used on bus-off
    /// recovery.
    pub fn reset_state(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.run_state = RunState::Init;
            node.alias = Alias::EMPTY;
            node.flags.remove(NodeFlags::Permitted | NodeFlags::Initialized);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<const CAP: usize, const MAX_PRODUCERS: usize, const MAX_CONSUMERS: usize> Default
    for NodeTable<CAP, MAX_PRODUCERS, MAX_CONSUMERS>
{
    fn default() -> Self {
        Self::new()
    }
}

pub const DEFAULT_MAX_PRODUCERS: usize = 8;
pub const DEFAULT_MAX_CONSUMERS: usize = 8;
pub const DEFAULT_NODE_CAP: usize = 4;

pub type DefaultNodeTable = NodeTable<DEFAULT_NODE_CAP, DEFAULT_MAX_PRODUCERS, DEFAULT_MAX_CONSUMERS>;
pub type DefaultVirtualNode = VirtualNode<DEFAULT_MAX_PRODUCERS, DEFAULT_MAX_CONSUMERS>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_allocate_and_find() {
        let mut table: NodeTable<4, 4, 4> = NodeTable::new();
        let handle = table
            .allocate(NodeId::new(0x02_01_57_00_00_01), NodeParams::default())
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(handle).unwrap().run_state, RunState::Init);
    }

    #[test]
    fn test_iter_mut_visits_every_allocated_node_in_slot_order() {
        let mut table: NodeTable<4, 4, 4> = NodeTable::new();
        table.allocate(NodeId::new(1), NodeParams::default()).unwrap();
        table.allocate(NodeId::new(2), NodeParams::default()).unwrap();
        let ids: heapless::Vec<u64, 4> = table.iter_mut().map(|n| n.node_id.as_u64()).collect();
        assert_eq!(ids.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_reset_state() {
        let mut table: NodeTable<2, 4, 4> = NodeTable::new();
        let handle = table.allocate(NodeId::new(1), NodeParams::default()).unwrap();
        table.get_mut(handle).unwrap().run_state = RunState::Run;
        table.get_mut(handle).unwrap().alias = Alias::new(0x123);
        table.reset_state();
        assert_eq!(table.get(handle).unwrap().run_state, RunState::Init);
        assert!(table.get(handle).unwrap().alias.is_empty());
    }

    #[test]
    fn test_addressed_to_before_and_after_permitted() {
        let mut node: VirtualNode<4, 4> = VirtualNode::new(
            NodeId::new(0x02_01_57_00_00_01),
            NodeParams::default(),
            0,
        );
        node.alias = Alias::new(0x123);

        // not yet permitted: alias match alone isn't enough.
        assert!(!node.is_addressed_to(Some(Alias::new(0x123)), None));
        assert!(node.is_addressed_to(None, Some(NodeId::new(0x02_01_57_00_00_01))));

        node.flags.insert(NodeFlags::Permitted);
        assert!(node.is_addressed_to(Some(Alias::new(0x123)), None));
    }

    #[test]
    fn test_producer_cursor_enumeration() {
        let mut node: VirtualNode<4, 4> = VirtualNode::new(NodeId::new(1), NodeParams::default(), 0);
        node.add_producer(EventId::new(1), EventStatus::Set).unwrap();
        node.add_producer(EventId::new(2), EventStatus::Unknown).unwrap();
        assert!(!node.producer_cursor_exhausted());
        assert_eq!(node.next_producer().unwrap().1, EventStatus::Set);
        assert_eq!(node.next_producer().unwrap().1, EventStatus::Unknown);
        assert!(node.producer_cursor_exhausted());
        assert!(node.next_producer().is_none());
    }
}
