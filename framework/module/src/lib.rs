#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

//! Ties the CAN dispatch layer ([`openlcb_can`]), a config-memory
//! backend ([`openlcb_config`]) and a registered service set
//! ([`openlcb_svc_all`]) into one aggregate a caller drives from its
//! own main loop: feed it received frames, poll it for frames to send,
//! and tick it every 100 ms.
//!
//! Every `poll_*` method does at most one unit of work and returns
//! immediately, the same non-blocking convention [`openlcb_can`]'s own
//! dispatchers use; nothing here blocks or loops internally.

pub mod service_set;

use openlcb_can::dispatch::can_main::CanMain;
use openlcb_can::dispatch::can_rx::RxOutcome;
use openlcb_can::dispatch::openlcb_login;
use openlcb_can::dispatch::openlcb_main::OpenLcbMain;
use openlcb_can::node::{NodeHandle, NodeParams, RunState};
use openlcb_can::storage::Exhausted;
use openlcb_can::wire::can::{Frame, Identifier};
use openlcb_config::params::NODE_PARAMS_LEN;
use openlcb_config::{ConfigMemory, NodeParamBytes};
use openlcb_core::node_id::NodeId;
use openlcb_defs::ConfigSpace;

pub use service_set::ServiceSet;

/// Everything that can go wrong allocating a node: the node table is
/// full, or the config-memory backend refused the read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeError {
    Storage(Exhausted),
    Config(openlcb_config::Error),
}

fn params_from_persisted(bytes: NodeParamBytes) -> NodeParams {
    NodeParams {
        protocol_support: bytes.protocol_support(),
        producer_autocreate_count: bytes.producer_autocreate_count(),
        consumer_autocreate_count: bytes.consumer_autocreate_count(),
        simple_protocol: bytes.simple_protocol(),
    }
}

/// One CAN interface's worth of virtual nodes, the dispatch state that
/// logs them onto the bus and answers protocol-level requests for
/// them, and the config-memory backend their persisted parameters live
/// in.
///
/// Producer/consumer event tables aren't restored here: `ConfigMemory`
/// only exposes byte-range access to the spaces named in §6, not the
/// per-slot event iteration a concrete backend like
/// `openlcb_config::PersistentConfigMemory` provides. A caller that
/// wants persisted events on startup reads them through its concrete
/// backend and calls `VirtualNode::add_producer`/`add_consumer`
/// directly via `node_mut`.
pub struct Node<'a, C> {
    can: CanMain,
    openlcb_main: OpenLcbMain<ServiceSet<'a>>,
    config: C,
}

impl<'a, C: ConfigMemory> Node<'a, C> {
    pub fn new(services: ServiceSet<'a>, config: C) -> Self {
        Node {
            can: CanMain::new(openlcb_can::config::CID_WAIT_TICKS as u16),
            openlcb_main: OpenLcbMain::new(services),
            config,
        }
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut C {
        &mut self.config
    }

    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut openlcb_can::node::DefaultVirtualNode> {
        self.can.nodes.get_mut(handle)
    }

    /// Allocate a virtual node, with its protocol-support bits and
    /// autocreate counts restored from the `Config` space.
    pub fn add_node(&mut self, node_id: NodeId) -> Result<NodeHandle, NodeError> {
        let mut bytes = [0u8; NODE_PARAMS_LEN];
        self.config
            .read(ConfigSpace::Config, 0, &mut bytes)
            .map_err(NodeError::Config)?;
        let params = params_from_persisted(NodeParamBytes::from_bytes(bytes));
        self.can.allocate_node(node_id, params).map_err(NodeError::Storage)
    }

    /// Classify one received frame: login/duplicate-alias bookkeeping,
    /// or reassembly into the inbound message FIFO.
    pub fn on_rx(&mut self, frame: &Frame<&[u8]>) -> RxOutcome {
        self.can.on_rx(frame)
    }

    /// The next frame to place on the wire this tick, if any.
    pub fn poll_tx(&mut self) -> Option<(Identifier, heapless::Vec<u8, 8>)> {
        self.can.poll_tx()
    }

    /// Advance the post-CAN-login sequence (Initialization Complete,
    /// Producer/Consumer Identified, then `Run`) for the first node
    /// that still needs it.
    pub fn poll_login(&mut self) {
        let Some(node) = self
            .can
            .nodes
            .iter_mut()
            .find(|n| n.run_state >= RunState::LoadInitializationComplete && n.run_state < RunState::Run)
        else {
            return;
        };
        if let Some(handle) = openlcb_login::step(node, &mut self.can.store, None) {
            if self.can.queue_tx(handle).is_err() {
                self.can.store.free(handle);
            }
        }
    }

    /// Advance the OpenLCB Main Dispatcher by one step, routing
    /// whatever it delivers to the registered service set and queueing
    /// any reply the service produced.
    pub fn poll_app(&mut self) {
        if let Some(handle) = self.openlcb_main.poll(&mut self.can.nodes, &mut self.can.inbound, &mut self.can.store) {
            if self.can.queue_tx(handle).is_err() {
                self.can.store.free(handle);
            }
        }
    }

    /// Drive every node's timer-tick counters. Called once per 100 ms
    /// from the external tick source named in §6.
    pub fn tick_100ms(&mut self) {
        self.can.nodes.tick_100ms();
    }
}
