//! Post-CAN-login sequencing: Initialization Complete, then one
//! Producer/Consumer Identified message per known event, then the
//! `LoginComplete` → `Run` transition.
//!
//! One call advances the node by one step, producing at most one
//! queueable record. `LoadProducerEvents`/`LoadConsumerEvents` re-enter
//! themselves (the run_state doesn't change) until their cursor is
//! exhausted, the same re-enumerate trick the CAN login sequence uses
//! for CID0..3.

use openlcb_core::alias::Alias;
use openlcb_defs::Mti;

use crate::node::{EventStatus, RunState, VirtualNode};
use crate::storage::{DefaultBufferStore, RecordHandle};

fn producer_mti(status: EventStatus) -> Mti {
    match status {
        EventStatus::Unknown => Mti::ProducerIdentifiedUnknown,
        EventStatus::Set => Mti::ProducerIdentifiedSet,
        EventStatus::Clear => Mti::ProducerIdentifiedClear,
        EventStatus::Reserved => Mti::ProducerIdentifiedReserved,
    }
}

fn consumer_mti(status: EventStatus) -> Mti {
    match status {
        EventStatus::Unknown => Mti::ConsumerIdentifiedUnknown,
        EventStatus::Set => Mti::ConsumerIdentifiedSet,
        EventStatus::Clear => Mti::ConsumerIdentifiedClear,
        EventStatus::Reserved => Mti::ConsumerIdentifiedReserved,
    }
}

/// Global (no destination) messages never exceed 8 bytes in this
/// sequence (a Node ID or an Event ID), so they always land in the
/// Basic tier.
fn allocate_global(store: &mut DefaultBufferStore, src_alias: Alias, mti: Mti, payload: &[u8]) -> Option<RecordHandle> {
    let handle = store.allocate(payload.len()).ok()?;
    let record = store.get_basic_mut(handle)?;
    record.src_alias = src_alias;
    record.dst_alias = Alias::EMPTY;
    record.mti = u16::from(mti);
    record.set_payload(payload);
    Some(handle)
}

/// Advance `node` by one step of the post-login sequence. `on_ready`
/// gates the final `LoginComplete` → `Run` transition, mirroring an
/// optional callback that may hold the node back (e.g. waiting on a
/// slow config-memory read); pass `None` to complete unconditionally.
pub fn step<const MAX_PRODUCERS: usize, const MAX_CONSUMERS: usize>(
    node: &mut VirtualNode<MAX_PRODUCERS, MAX_CONSUMERS>,
    store: &mut DefaultBufferStore,
    on_ready: Option<fn(&VirtualNode<MAX_PRODUCERS, MAX_CONSUMERS>) -> bool>,
) -> Option<RecordHandle> {
    match node.run_state {
        RunState::LoadInitializationComplete => {
            let mti = if node.params.simple_protocol {
                Mti::InitializationCompleteSimple
            } else {
                Mti::InitializationComplete
            };
            let handle = allocate_global(store, node.alias, mti, node.node_id.as_bytes());
            node.reset_producer_cursor();
            node.run_state = RunState::LoadProducerEvents;
            handle
        }
        RunState::LoadProducerEvents => match node.next_producer() {
            Some((id, status)) => allocate_global(store, node.alias, producer_mti(status), id.as_bytes()),
            None => {
                node.reset_consumer_cursor();
                node.run_state = RunState::LoadConsumerEvents;
                None
            }
        },
        RunState::LoadConsumerEvents => match node.next_consumer() {
            Some((id, status)) => allocate_global(store, node.alias, consumer_mti(status), id.as_bytes()),
            None => {
                node.run_state = RunState::LoginComplete;
                None
            }
        },
        RunState::LoginComplete => {
            let ready = on_ready.map_or(true, |f| f(node));
            if ready {
                node.run_state = RunState::Run;
                node.flags.insert(openlcb_core::node_flags::NodeFlags::Initialized);
                crate::log::net_debug!("node {} fully initialized, entering Run", node.alias.value());
            }
            None
        }
        _ => None,
    }
}
