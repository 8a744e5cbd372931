#![cfg_attr(not(test), no_std)]

//! The Minimum Node Service: every OpenLCB node answers Verify Node ID,
//! Protocol Support Inquiry and Simple Node Ident Info requests the
//! same way regardless of what else it does, so this is the one
//! service every node aggregate registers unconditionally.

use heapless::String;
use openlcb_can::dispatch::openlcb_main::{HandlerOutcome, InboundMessage, MessageCategory, OpenLcbHandler};
use openlcb_can::node::VirtualNode;
use openlcb_can::storage::{DefaultBufferStore, RecordHandle};
use openlcb_core::alias::Alias;
use openlcb_core::service::OpenLcbService;
use openlcb_defs::{Mti, ServiceType};

const IDENT_FIELD_LEN: usize = 40;

/// The Simple Node Ident Info fields a node reports about itself.
/// `user_name`/`user_description` are the two fields a configuration
/// tool may rewrite at runtime (ACDI-User config memory); the other
/// four are fixed at build time.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SnipIdentity {
    pub manufacturer: String<IDENT_FIELD_LEN>,
    pub model: String<IDENT_FIELD_LEN>,
    pub hardware_version: String<IDENT_FIELD_LEN>,
    pub software_version: String<IDENT_FIELD_LEN>,
    pub user_name: String<IDENT_FIELD_LEN>,
    pub user_description: String<IDENT_FIELD_LEN>,
}

impl SnipIdentity {
    pub fn new(manufacturer: &str, model: &str, hardware_version: &str, software_version: &str) -> Self {
        SnipIdentity {
            manufacturer: String::try_from(manufacturer).unwrap_or_default(),
            model: String::try_from(model).unwrap_or_default(),
            hardware_version: String::try_from(hardware_version).unwrap_or_default(),
            software_version: String::try_from(software_version).unwrap_or_default(),
            user_name: String::new(),
            user_description: String::new(),
        }
    }

    /// Encode the four-section, null-delimited SNIP payload (§ the
    /// Simple Node Information Protocol: a version byte, three
    /// manufacturer strings, a version byte, two user strings).
    fn encode(&self) -> heapless::Vec<u8, 253> {
        let mut out = heapless::Vec::new();
        out.push(4).ok(); // mfg block version
        push_str(&mut out, &self.manufacturer);
        push_str(&mut out, &self.model);
        push_str(&mut out, &self.hardware_version);
        push_str(&mut out, &self.software_version);
        out.push(2).ok(); // user block version
        push_str(&mut out, &self.user_name);
        push_str(&mut out, &self.user_description);
        out
    }
}

fn push_str(out: &mut heapless::Vec<u8, 253>, s: &str) {
    for b in s.as_bytes() {
        out.push(*b).ok();
    }
    out.push(0).ok();
}

/// Stateless handler for the three Minimum Node Service request/reply
/// pairs. Holds nothing but the identity it reports; no per-node state
/// survives across calls (unlike the datagram/event services, a Simple
/// Node Ident request never spans more than one reply).
pub struct MinimumNodeService {
    identity: SnipIdentity,
}

impl MinimumNodeService {
    pub fn new(identity: SnipIdentity) -> Self {
        MinimumNodeService { identity }
    }

    fn reply_verified_node_id<const MP: usize, const MC: usize>(
        &self,
        node: &VirtualNode<MP, MC>,
        msg: &InboundMessage,
        store: &mut DefaultBufferStore,
    ) -> Option<RecordHandle> {
        let mti = if node.params.simple_protocol {
            Mti::VerifiedNodeIdSimple
        } else {
            Mti::VerifiedNodeId
        };
        let handle = store.allocate(6).ok()?;
        let record = store.get_basic_mut(handle)?;
        record.src_alias = node.alias;
        record.dst_alias = msg.src_alias;
        record.mti = u16::from(mti);
        record.set_payload(node.node_id.as_bytes());
        Some(handle)
    }

    fn reply_protocol_support<const MP: usize, const MC: usize>(
        &self,
        node: &VirtualNode<MP, MC>,
        msg: &InboundMessage,
        store: &mut DefaultBufferStore,
    ) -> Option<RecordHandle> {
        let handle = store.allocate(4).ok()?;
        let record = store.get_basic_mut(handle)?;
        record.src_alias = node.alias;
        record.dst_alias = msg.src_alias;
        record.mti = u16::from(Mti::ProtocolSupportReply);
        record.set_payload(&node.params.protocol_support.to_be_bytes());
        Some(handle)
    }

    fn reply_snip<const MP: usize, const MC: usize>(
        &self,
        node: &VirtualNode<MP, MC>,
        msg: &InboundMessage,
        store: &mut DefaultBufferStore,
    ) -> Option<RecordHandle> {
        let payload = self.identity.encode();
        let handle = store.allocate(payload.len()).ok()?;
        let record = store.get_snip_mut(handle)?;
        record.src_alias = node.alias;
        record.dst_alias = msg.src_alias;
        record.mti = u16::from(Mti::SimpleNodeIdentInfoReply);
        record.set_payload(&payload);
        Some(handle)
    }
}

impl OpenLcbService for MinimumNodeService {
    fn service_id() -> ServiceType {
        ServiceType::MinimumNodeService
    }

    fn service_version() -> u8 {
        1
    }
}

impl<const MP: usize, const MC: usize> OpenLcbHandler<MP, MC> for MinimumNodeService {
    fn handle(
        &mut self,
        node: &mut VirtualNode<MP, MC>,
        category: MessageCategory,
        msg: &InboundMessage,
        store: &mut DefaultBufferStore,
    ) -> HandlerOutcome {
        let reply = match category {
            MessageCategory::VerifyNodeId => self.reply_verified_node_id(node, msg, store),
            MessageCategory::ProtocolSupport if msg.mti == Mti::ProtocolSupportInquiry => {
                self.reply_protocol_support(node, msg, store)
            }
            MessageCategory::SimpleNodeIdent if msg.mti == Mti::SimpleNodeIdentInfoRequest => {
                self.reply_snip(node, msg, store)
            }
            _ => None,
        };
        HandlerOutcome::Done(reply)
    }
}
