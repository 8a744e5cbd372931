//! The OpenLCB Main Dispatcher: pops one assembled message at a time
//! off the inbound FIFO and fans it out to whichever nodes it targets.
//!
//! Message-level mirror of [`super::can_main`]'s frame-level scheduler:
//! non-blocking, one unit of work per call, its own node-enumeration
//! cursor so it advances independently of the CAN dispatcher's login
//! enumeration (§4.9's note that the two cursors are distinct).
//! Handler semantics are supplied externally — this module's job is
//! the fan-out, matching the per-message addressing rule of §4.11, not
//! what any given MTI means.

use openlcb_core::alias::Alias;
use openlcb_core::node_id::{NodeId, NODE_ID_SIZE};
use openlcb_defs::{Mti, RejectReason};

use crate::node::{DefaultNodeTable, VirtualNode};
use crate::storage::{DefaultBufferStore, DefaultFifo, RecordHandle};

/// Maximum well-formed SNIP reply length (`spec.md` §8 scenario 5).
const SNIP_MAX_LEN: usize = 253;
/// A well-formed SNIP reply has exactly six null terminators, one after
/// each of the six string fields (mfg-name, model, hw-version,
/// sw-version, user-name, user-description).
const SNIP_EXPECTED_NULL_COUNT: usize = 6;

/// Wire-format validation for one already-assembled message, per
/// `spec.md` §7: unknown MTI, an out-of-range destination alias, an
/// embedded Node ID of zero, or (§8 scenario 5) a SNIP reply with the
/// wrong null-terminator count.
fn validate_message(mti: Mti, dst_alias: Option<Alias>, payload: &[u8]) -> Result<(), RejectReason> {
    if mti == Mti::Unknown {
        return Err(RejectReason::UnimplementedMti);
    }
    if let Some(alias) = dst_alias {
        if !alias.is_valid() {
            return Err(RejectReason::PermanentError);
        }
    }
    match mti {
        Mti::VerifyNodeIdAddressed | Mti::VerifyNodeIdGlobal | Mti::VerifiedNodeId | Mti::VerifiedNodeIdSimple
            if payload.len() >= NODE_ID_SIZE =>
        {
            if NodeId::from_bytes(&payload[..NODE_ID_SIZE]).is_zero() {
                return Err(RejectReason::PermanentError);
            }
        }
        Mti::SimpleNodeIdentInfoReply => {
            if payload.len() > SNIP_MAX_LEN || payload.iter().filter(|&&b| b == 0).count() != SNIP_EXPECTED_NULL_COUNT {
                return Err(RejectReason::PermanentError);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Build an Optional Interaction Rejected reply from `node`, addressed
/// back to `dest`, naming `offending_mti_raw` (the wire MTI value as the
/// peer sent it, which for an unrecognized MTI is not recoverable from
/// [`Mti::Unknown`] alone) and `reason`.
fn reject_reply<const MAX_PRODUCERS: usize, const MAX_CONSUMERS: usize>(
    node: &VirtualNode<MAX_PRODUCERS, MAX_CONSUMERS>,
    dest: Alias,
    offending_mti_raw: u16,
    reason: RejectReason,
    store: &mut DefaultBufferStore,
) -> Option<RecordHandle> {
    let handle = store.allocate(4).ok()?;
    let record = store.get_basic_mut(handle)?;
    record.src_alias = node.alias;
    record.dst_alias = dest;
    record.mti = u16::from(Mti::OptionalInteractionRejected);
    let reason_bytes = u16::from(reason).to_be_bytes();
    let mti_bytes = offending_mti_raw.to_be_bytes();
    record.set_payload(&[reason_bytes[0], reason_bytes[1], mti_bytes[0], mti_bytes[1]]);
    Some(handle)
}

/// Coarse message category named the way §4.11 names its handler list.
/// A handler is free to match further on `InboundMessage::mti` for the
/// sub-cases a category bundles together (e.g. which Identified
/// variant within `EventTransport`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageCategory {
    VerifyNodeId,
    ProtocolSupport,
    InitializationComplete,
    VerifiedNodeId,
    SimpleNodeIdent,
    EventTransport,
    Datagram,
    Stream,
    TrainControl,
    Error,
    /// An MTI with no dedicated category in this dispatcher. Still
    /// delivered; the handler may ignore it or act on the raw MTI.
    Other,
}

impl MessageCategory {
    fn of(mti: Mti) -> Self {
        match mti {
            Mti::VerifyNodeIdAddressed | Mti::VerifyNodeIdGlobal => MessageCategory::VerifyNodeId,
            Mti::ProtocolSupportInquiry | Mti::ProtocolSupportReply => MessageCategory::ProtocolSupport,
            Mti::InitializationComplete | Mti::InitializationCompleteSimple => MessageCategory::InitializationComplete,
            Mti::VerifiedNodeId | Mti::VerifiedNodeIdSimple => MessageCategory::VerifiedNodeId,
            Mti::SimpleNodeIdentInfoRequest | Mti::SimpleNodeIdentInfoReply => MessageCategory::SimpleNodeIdent,
            Mti::IdentifyConsumer
            | Mti::ConsumerRangeIdentified
            | Mti::ConsumerIdentifiedUnknown
            | Mti::ConsumerIdentifiedSet
            | Mti::ConsumerIdentifiedClear
            | Mti::ConsumerIdentifiedReserved
            | Mti::IdentifyProducer
            | Mti::ProducerRangeIdentified
            | Mti::ProducerIdentifiedUnknown
            | Mti::ProducerIdentifiedSet
            | Mti::ProducerIdentifiedClear
            | Mti::ProducerIdentifiedReserved
            | Mti::IdentifyEventsAddressed
            | Mti::IdentifyEventsGlobal
            | Mti::LearnEvent
            | Mti::PcEventReport
            | Mti::PcEventReportWithPayload => MessageCategory::EventTransport,
            Mti::Datagram | Mti::DatagramReceivedOk | Mti::DatagramRejected => MessageCategory::Datagram,
            Mti::StreamInitRequest | Mti::StreamInitReply | Mti::StreamSendDataProceed | Mti::StreamComplete => {
                MessageCategory::Stream
            }
            Mti::TrainControlCommand | Mti::TrainControlReply => MessageCategory::TrainControl,
            Mti::TerminateDueToError | Mti::OptionalInteractionRejected => MessageCategory::Error,
            Mti::Unknown => MessageCategory::Other,
        }
    }
}

/// One message handed to a handler, already addressed to (or global
/// for) the node it's being delivered to.
#[derive(Debug, Clone, Copy)]
pub struct InboundMessage {
    pub src_alias: Alias,
    pub dst_alias: Option<Alias>,
    pub mti: Mti,
    pub handle: RecordHandle,
}

impl InboundMessage {
    /// The message's payload, read through whichever tier `handle`
    /// names.
    pub fn payload<'a>(&self, store: &'a DefaultBufferStore) -> &'a [u8] {
        store
            .record_summary(self.handle)
            .map(|(.., payload)| payload)
            .unwrap_or(&[])
    }
}

/// What a handler did with one `(node, message)` pairing.
pub enum HandlerOutcome {
    /// Finished with this message for this node; optionally emit one
    /// reply record, already allocated into the shared store.
    Done(Option<RecordHandle>),
    /// Emit this reply (if any), but call the handler again for the
    /// same node and message before moving on — for handlers that need
    /// several ticks to emit several replies (e.g. Identify Events
    /// producing one Identified message per known event).
    Continue(Option<RecordHandle>),
}

/// Supplied externally; see module docs. One method, since the
/// category/MTI distinction the handler needs is already on
/// `InboundMessage`.
pub trait OpenLcbHandler<const MAX_PRODUCERS: usize, const MAX_CONSUMERS: usize> {
    fn handle(
        &mut self,
        node: &mut VirtualNode<MAX_PRODUCERS, MAX_CONSUMERS>,
        category: MessageCategory,
        msg: &InboundMessage,
        store: &mut DefaultBufferStore,
    ) -> HandlerOutcome;
}

struct CurrentMessage {
    handle: RecordHandle,
    src_alias: Alias,
    dst_alias: Option<Alias>,
    dst_node_id: Option<NodeId>,
    mti: Mti,
    node_cursor: usize,
}

/// Owns the node-enumeration cursor and in-flight message state for
/// one handler.
pub struct OpenLcbMain<H> {
    handler: H,
    current: Option<CurrentMessage>,
}

impl<H> OpenLcbMain<H> {
    pub fn new(handler: H) -> Self {
        OpenLcbMain { handler, current: None }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}

impl<H, const MAX_PRODUCERS: usize, const MAX_CONSUMERS: usize> OpenLcbMain<H>
where
    H: OpenLcbHandler<MAX_PRODUCERS, MAX_CONSUMERS>,
{
    /// One non-blocking step: pop a message if idle, otherwise advance
    /// the node cursor by one and dispatch if this node is targeted.
    /// Returns a reply record for the caller to hand to
    /// [`super::can_main::CanMain::queue_tx`], if this tick produced one.
    pub fn poll(
        &mut self,
        nodes: &mut DefaultNodeTable,
        inbound: &mut DefaultFifo,
        store: &mut DefaultBufferStore,
    ) -> Option<RecordHandle> {
        if self.current.is_none() {
            let handle = inbound.pop()?;
            let (src_alias, dst_alias, dst_node_id, mti_raw, payload) = store.record_summary(handle)?;
            let mti = Mti::from_primitive(mti_raw);
            let dst_alias = if dst_alias.is_empty() { None } else { Some(dst_alias) };
            let dst_node_id = if dst_node_id.is_zero() { None } else { Some(dst_node_id) };

            if let Err(reason) = validate_message(mti, dst_alias, payload) {
                // Wire-format rejection (`spec.md` §7): addressed messages
                // we actually host get Optional Interaction Rejected back;
                // everything else (global, or addressed to a node we
                // don't have) is silently dropped, since there's no local
                // alias to answer from.
                let mut reply = None;
                if let Some(dest) = dst_alias {
                    if let Some(node) = nodes.iter_mut().find(|n| n.is_addressed_to(Some(dest), dst_node_id)) {
                        reply = reject_reply(node, src_alias, mti_raw, reason, store);
                    }
                }
                store.free(handle);
                return reply;
            }

            self.current = Some(CurrentMessage {
                handle,
                src_alias,
                dst_alias,
                dst_node_id,
                mti,
                node_cursor: 0,
            });
        }

        let cur = self.current.as_mut()?;
        let Some(node) = nodes.iter_mut().nth(cur.node_cursor) else {
            store.free(cur.handle);
            self.current = None;
            return None;
        };
        cur.node_cursor += 1;

        let targeted = cur.mti.is_global() || node.is_addressed_to(cur.dst_alias, cur.dst_node_id);
        if !targeted {
            return None;
        }

        let msg = InboundMessage {
            src_alias: cur.src_alias,
            dst_alias: cur.dst_alias,
            mti: cur.mti,
            handle: cur.handle,
        };
        let category = MessageCategory::of(cur.mti);
        match self.handler.handle(node, category, &msg, store) {
            HandlerOutcome::Done(reply) => reply,
            HandlerOutcome::Continue(reply) => {
                cur.node_cursor -= 1;
                reply
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::{NodeParams, NodeTable};
    use openlcb_core::node_flags::NodeFlags;

    struct RecordingHandler {
        seen: heapless::Vec<MessageCategory, 8>,
    }

    impl OpenLcbHandler<4, 4> for RecordingHandler {
        fn handle(
            &mut self,
            _node: &mut VirtualNode<4, 4>,
            category: MessageCategory,
            _msg: &InboundMessage,
            _store: &mut DefaultBufferStore,
        ) -> HandlerOutcome {
            self.seen.push(category).ok();
            HandlerOutcome::Done(None)
        }
    }

    fn node_table_with_one_permitted(alias: Alias) -> (NodeTable<2, 4, 4>, crate::node::NodeHandle) {
        let mut table: NodeTable<2, 4, 4> = NodeTable::new();
        let handle = table.allocate(NodeId::new(0x02_01_57_00_00_01), NodeParams::default()).unwrap();
        let node = table.get_mut(handle).unwrap();
        node.alias = alias;
        node.flags.insert(NodeFlags::Permitted);
        (table, handle)
    }

    #[test]
    fn test_global_message_reaches_every_node_once() {
        let (mut nodes, _h) = node_table_with_one_permitted(Alias::new(0x222));
        let mut store = DefaultBufferStore::default();
        let mut inbound = DefaultFifo::default();

        let record = store.allocate(6).unwrap();
        {
            let r = store.get_basic_mut(record).unwrap();
            r.src_alias = Alias::new(0x111);
            r.mti = u16::from(Mti::VerifyNodeIdGlobal);
            r.set_payload(&[0u8; 6]);
        }
        inbound.push(record).unwrap();

        let mut main = OpenLcbMain::new(RecordingHandler { seen: heapless::Vec::new() });
        assert!(main.poll(&mut nodes, &mut inbound, &mut store).is_none());
        assert_eq!(main.handler().seen.as_slice(), &[MessageCategory::VerifyNodeId]);
        // record freed and cursor reset once every node has been tried
        assert!(main.poll(&mut nodes, &mut inbound, &mut store).is_none());
    }

    #[test]
    fn test_addressed_message_skips_unmatched_node() {
        let (mut nodes, _h) = node_table_with_one_permitted(Alias::new(0x222));
        let mut store = DefaultBufferStore::default();
        let mut inbound = DefaultFifo::default();

        let record = store.allocate(2).unwrap();
        {
            let r = store.get_basic_mut(record).unwrap();
            r.src_alias = Alias::new(0x111);
            r.dst_alias = Alias::new(0x999); // nobody here
            r.mti = u16::from(Mti::VerifiedNodeId);
            r.set_payload(&[0xAA, 0xBB]);
        }
        inbound.push(record).unwrap();

        let mut main = OpenLcbMain::new(RecordingHandler { seen: heapless::Vec::new() });
        main.poll(&mut nodes, &mut inbound, &mut store);
        assert!(main.handler().seen.is_empty());
    }

    #[test]
    fn test_unknown_mti_addressed_to_local_node_is_rejected() {
        let (mut nodes, _h) = node_table_with_one_permitted(Alias::new(0x222));
        let mut store = DefaultBufferStore::default();
        let mut inbound = DefaultFifo::default();

        let record = store.allocate(2).unwrap();
        {
            let r = store.get_basic_mut(record).unwrap();
            r.src_alias = Alias::new(0x111);
            r.dst_alias = Alias::new(0x222);
            r.mti = 0x0CAF; // not a defined MTI
            r.set_payload(&[0xAA, 0xBB]);
        }
        inbound.push(record).unwrap();

        let mut main = OpenLcbMain::new(RecordingHandler { seen: heapless::Vec::new() });
        let reply = main.poll(&mut nodes, &mut inbound, &mut store).expect("expected an OIR reply");
        let (src, dst, _node_id, mti, payload) = store.record_summary(reply).unwrap();
        assert_eq!(src, Alias::new(0x222));
        assert_eq!(dst, Alias::new(0x111));
        assert_eq!(mti, u16::from(Mti::OptionalInteractionRejected));
        assert_eq!(&payload[..2], &u16::from(RejectReason::UnimplementedMti).to_be_bytes());
        assert_eq!(&payload[2..], &[0x0C, 0xAF]);
        assert!(main.handler().seen.is_empty());
    }

    #[test]
    fn test_snip_reply_with_wrong_null_count_is_rejected() {
        let (mut nodes, _h) = node_table_with_one_permitted(Alias::new(0x222));
        let mut store = DefaultBufferStore::default();
        let mut inbound = DefaultFifo::default();

        // Five nulls instead of the required six.
        let payload = [0u8, 0, 0, 0, 0, b'x'];
        let record = store.allocate(payload.len()).unwrap();
        {
            let r = store.get_basic_mut(record).unwrap();
            r.src_alias = Alias::new(0x111);
            r.dst_alias = Alias::new(0x222);
            r.mti = u16::from(Mti::SimpleNodeIdentInfoReply);
            r.set_payload(&payload);
        }
        inbound.push(record).unwrap();

        let mut main = OpenLcbMain::new(RecordingHandler { seen: heapless::Vec::new() });
        let reply = main.poll(&mut nodes, &mut inbound, &mut store).expect("expected an OIR reply");
        let (.., mti, payload) = store.record_summary(reply).unwrap();
        assert_eq!(mti, u16::from(Mti::OptionalInteractionRejected));
        assert_eq!(&payload[..2], &u16::from(RejectReason::PermanentError).to_be_bytes());
        assert!(main.handler().seen.is_empty());
    }

    #[test]
    fn test_zero_node_id_payload_is_rejected() {
        let (mut nodes, _h) = node_table_with_one_permitted(Alias::new(0x222));
        let mut store = DefaultBufferStore::default();
        let mut inbound = DefaultFifo::default();

        let record = store.allocate(6).unwrap();
        {
            let r = store.get_basic_mut(record).unwrap();
            r.src_alias = Alias::new(0x111);
            r.dst_alias = Alias::new(0x222);
            r.mti = u16::from(Mti::VerifiedNodeId);
            r.set_payload(&[0u8; 6]);
        }
        inbound.push(record).unwrap();

        let mut main = OpenLcbMain::new(RecordingHandler { seen: heapless::Vec::new() });
        let reply = main.poll(&mut nodes, &mut inbound, &mut store).expect("expected an OIR reply");
        let (.., mti, _payload) = store.record_summary(reply).unwrap();
        assert_eq!(mti, u16::from(Mti::OptionalInteractionRejected));
        assert!(main.handler().seen.is_empty());
    }

    #[test]
    fn test_malformed_message_to_unhosted_node_is_silently_dropped() {
        let (mut nodes, _h) = node_table_with_one_permitted(Alias::new(0x222));
        let mut store = DefaultBufferStore::default();
        let mut inbound = DefaultFifo::default();

        let record = store.allocate(2).unwrap();
        {
            let r = store.get_basic_mut(record).unwrap();
            r.src_alias = Alias::new(0x111);
            r.dst_alias = Alias::new(0x999); // nobody here
            r.mti = 0x0CAF;
            r.set_payload(&[0xAA, 0xBB]);
        }
        inbound.push(record).unwrap();

        let mut main = OpenLcbMain::new(RecordingHandler { seen: heapless::Vec::new() });
        assert!(main.poll(&mut nodes, &mut inbound, &mut store).is_none());
        assert!(main.handler().seen.is_empty());
    }

    #[test]
    fn test_continue_outcome_re_invokes_same_node() {
        struct CountingHandler {
            calls: u8,
        }
        impl OpenLcbHandler<4, 4> for CountingHandler {
            fn handle(
                &mut self,
                _node: &mut VirtualNode<4, 4>,
                _category: MessageCategory,
                _msg: &InboundMessage,
                _store: &mut DefaultBufferStore,
            ) -> HandlerOutcome {
                self.calls += 1;
                if self.calls < 3 {
                    HandlerOutcome::Continue(None)
                } else {
                    HandlerOutcome::Done(None)
                }
            }
        }

        let (mut nodes, _h) = node_table_with_one_permitted(Alias::new(0x222));
        let mut store = DefaultBufferStore::default();
        let mut inbound = DefaultFifo::default();
        let record = store.allocate(6).unwrap();
        store.get_basic_mut(record).unwrap().mti = u16::from(Mti::InitializationCompleteSimple);
        inbound.push(record).unwrap();

        let mut main = OpenLcbMain::new(CountingHandler { calls: 0 });
        main.poll(&mut nodes, &mut inbound, &mut store);
        main.poll(&mut nodes, &mut inbound, &mut store);
        main.poll(&mut nodes, &mut inbound, &mut store);
        assert_eq!(main.handler().calls, 3);
    }
}
