//! The CAN Main Dispatcher: the single non-blocking scheduler that
//! decides, on every poll, what the one frame worth of hardware Tx
//! bandwidth available this tick should carry.
//!
//! Priority order, highest first:
//! 1. Service a duplicate-alias flag against one of this stack's own
//!    nodes (someone else is using an alias we claimed; we lose and
//!    restart login).
//! 2. Continue an in-flight application-level (datagram/event/SNIP) Tx.
//! 3. Advance the first node still mid-login and send whatever that
//!    produces.
//!
//! Nothing here blocks: every branch either returns a frame to send
//! this tick or falls through to the next priority, and the caller is
//! expected to call `poll_tx` again next tick regardless of whether a
//! frame came back.
//!
//! Built against the [`crate::storage`]/[`crate::node`] `Default*`
//! aliases rather than threading their const generics through again;
//! a deployment needing different tier depths instantiates those
//! generic types directly and re-implements this scheduling by hand.

use heapless::Vec as HVec;
use openlcb_core::alias::Alias;

use crate::dispatch::{can_login, can_tx};
use crate::node::{DefaultNodeTable, NodeHandle, NodeParams, RunState};
use crate::storage::{DefaultAliasTable, DefaultBufferStore, DefaultFifo, DefaultPartialList, RecordHandle, Result as StorageResult};
use crate::wire::can::Identifier;

/// Everything one CAN interface's dispatch loop owns: the node table,
/// the shared alias/partial/store/FIFO state and the one outgoing
/// multi-frame cursor a CAN bus (being single-access) can ever have in
/// flight at a time.
pub struct CanMain {
    pub nodes: DefaultNodeTable,
    pub aliases: DefaultAliasTable,
    pub partial: DefaultPartialList,
    pub store: DefaultBufferStore,
    pub inbound: DefaultFifo,
    outbound: Option<can_tx::TxCursor>,
    cid_wait_ticks: u16,
}

impl CanMain {
    pub fn new(cid_wait_ticks: u16) -> Self {
        CanMain {
            nodes: DefaultNodeTable::new(),
            aliases: DefaultAliasTable::new(),
            partial: DefaultPartialList::new(),
            store: DefaultBufferStore::new(),
            inbound: DefaultFifo::new(),
            outbound: None,
            cid_wait_ticks,
        }
    }

    pub fn allocate_node(&mut self, node_id: openlcb_core::node_id::NodeId, params: NodeParams) -> StorageResult<NodeHandle> {
        self.nodes.allocate(node_id, params)
    }

    /// Queue an already-allocated record for transmission. Rejected if
    /// a message is already in flight; the CAN bus has exactly one Tx
    /// cursor at a time.
    pub fn queue_tx(&mut self, handle: RecordHandle) -> Result<(), RecordHandle> {
        if self.outbound.is_some() {
            return Err(handle);
        }
        self.outbound = Some(can_tx::TxCursor::new(handle));
        Ok(())
    }

    pub fn tx_in_flight(&self) -> bool {
        self.outbound.is_some()
    }

    /// Classify one received frame against the shared tables.
    pub fn on_rx(&mut self, frame: &crate::wire::can::Frame<&[u8]>) -> super::can_rx::RxOutcome {
        super::can_rx::classify(
            frame,
            &self.nodes,
            &mut self.aliases,
            &mut self.partial,
            &mut self.store,
            &mut self.inbound,
        )
    }

    /// One non-blocking poll: returns the next frame to place on the
    /// wire, if this tick has one.
    pub fn poll_tx(&mut self) -> Option<(Identifier, HVec<u8, 8>)> {
        if let Some(frame) = self.service_duplicate_alias() {
            return Some(frame);
        }
        if let Some(frame) = self.service_outbound() {
            return Some(frame);
        }
        self.service_login()
    }

    /// Priority 1: a CID/RID/AMD collision flagged one of our own
    /// tentative or permitted aliases. We always lose (the peer has
    /// already claimed the alias on the bus by the time we observe
    /// this), so the affected node drops its alias and restarts login
    /// from a freshly advanced seed.
    fn service_duplicate_alias(&mut self) -> Option<(Identifier, HVec<u8, 8>)> {
        let dup = self.aliases.duplicates().next().map(|e| e.alias)?;
        if let Some(node) = self.nodes.find_by_alias_mut(dup) {
            node.flags.insert(openlcb_core::node_flags::NodeFlags::DuplicateIdDetected);
            crate::log::net_debug!("alias {} collided, restarting login", dup.value());
            node.alias = Alias::EMPTY;
            node.run_state = RunState::GenerateSeed;
            node.flags
                .remove(openlcb_core::node_flags::NodeFlags::Permitted | openlcb_core::node_flags::NodeFlags::Initialized);
        }
        self.aliases.unregister(dup);
        None
    }

    fn service_outbound(&mut self) -> Option<(Identifier, HVec<u8, 8>)> {
        let cursor = self.outbound.as_mut()?;
        match can_tx::next_frame(&self.store, cursor) {
            Some(frame) => Some(frame),
            None => {
                let handle = cursor.handle();
                self.store.free(handle);
                self.outbound = None;
                None
            }
        }
    }

    /// Priority 3: advance the first node that hasn't finished the CAN
    /// login sequence yet. Nodes past `LoadAliasMapDefinition` are the
    /// OpenLCB Login Sequencer's concern, not this dispatcher's.
    fn service_login(&mut self) -> Option<(Identifier, HVec<u8, 8>)> {
        let cid_wait_ticks = self.cid_wait_ticks;
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.run_state < RunState::LoadInitializationComplete)?;
        let frame = can_login::step(node, &mut self.aliases, cid_wait_ticks)?;
        let mut payload = HVec::<u8, 8>::new();
        if let Some(bytes) = frame.payload {
            payload.extend_from_slice(&bytes).ok()?;
        }
        Some((frame.identifier, payload))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use openlcb_core::node_id::NodeId;

    #[test]
    fn test_single_node_logs_in_through_amd() {
        let mut main = CanMain::new(1);
        main.allocate_node(NodeId::new(0x02_01_57_00_00_01), NodeParams::default())
            .unwrap();

        let mut saw_reserve_id = false;
        let mut saw_amd = false;
        for _ in 0..64 {
            // let the 200ms wait state's tick threshold pass
            for node in main.nodes.iter_mut() {
                node.timer_ticks = node.timer_ticks.saturating_add(1);
            }
            if let Some((identifier, _payload)) = main.poll_tx() {
                if let Identifier::Data { frame_type, variable, .. } = identifier {
                    if frame_type == crate::wire::can::FrameType::CanControl {
                        if variable == u16::from(crate::wire::can::ControlOpcode::ReserveId) {
                            saw_reserve_id = true;
                        }
                        if variable == u16::from(crate::wire::can::ControlOpcode::AliasMapDefinition) {
                            saw_amd = true;
                        }
                    }
                }
            }
            if saw_amd {
                break;
            }
        }
        assert!(saw_reserve_id);
        assert!(saw_amd);
        let node = main.nodes.iter().next().unwrap();
        assert!(node.flags.contains(openlcb_core::node_flags::NodeFlags::Permitted));
    }

    #[test]
    fn test_duplicate_alias_restarts_affected_node() {
        let mut main = CanMain::new(1);
        let handle = main
            .allocate_node(NodeId::new(0x02_01_57_00_00_01), NodeParams::default())
            .unwrap();
        main.nodes.get_mut(handle).unwrap().alias = Alias::new(0x123);
        main.aliases.register(Alias::new(0x123), NodeId::new(0x02_01_57_00_00_01)).unwrap();
        main.aliases.set_duplicate(Alias::new(0x123));

        main.poll_tx();

        let node = main.nodes.get(handle).unwrap();
        assert_eq!(node.run_state, RunState::GenerateSeed);
        assert!(node.alias.is_empty());
        assert!(main.aliases.find_by_alias(Alias::new(0x123)).is_none());
    }

    #[test]
    fn test_outbound_message_takes_priority_over_login() {
        let mut main = CanMain::new(1);
        main.allocate_node(NodeId::new(0x02_01_57_00_00_01), NodeParams::default())
            .unwrap();
        let handle = main.store.allocate(2).unwrap();
        {
            let record = main.store.get_basic_mut(handle).unwrap();
            record.src_alias = Alias::new(0x100);
            record.dst_alias = Alias::new(0x200);
            record.mti = u16::from(openlcb_defs::Mti::VerifiedNodeId);
            record.set_payload(&[0xAA, 0xBB]);
        }
        main.queue_tx(handle).unwrap();

        let (identifier, _payload) = main.poll_tx().unwrap();
        match identifier {
            Identifier::Data { frame_type, .. } => {
                assert_eq!(frame_type, crate::wire::can::FrameType::OpenLcbMessage);
            }
            _ => panic!("expected the queued application message, not a login frame"),
        }
    }
}
