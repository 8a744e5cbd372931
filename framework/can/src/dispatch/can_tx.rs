//! Outgoing fragmenter: turns one stored message record into the
//! sequence of CAN frames the CAN Main Dispatcher hands to the driver,
//! one frame per call so a momentarily full hardware Tx buffer never
//! blocks the caller.
//!
//! Datagram frames carry no multi-frame flag byte: their position in
//! the sequence is already unambiguous from the frame-type category
//! (`DatagramOnly`/`First`/`Middle`/`Last` are four distinct codes).
//! Addressed OpenLCB messages have only one category (`OpenLcbMessage`)
//! for every position, so they need the flag byte §4.6 describes.

use heapless::Vec as HVec;
use openlcb_core::alias::Alias;
use openlcb_defs::Mti;

use crate::storage::{DefaultBufferStore, RecordHandle};
use crate::wire::can::{FrameType, Identifier, MultiFrameFlag};
use crate::wire::openlcb::write_addressed_prefix;

/// Data bytes an addressed-message "only"/FIRST frame carries: 2 (dest
/// alias) + 1 (flag byte, whose low 6 bits are also data) + 5 more.
const ADDRESSED_FIRST_CHUNK: usize = 6;
/// Data bytes an addressed-message MIDDLE/LAST frame carries: 1 (flag
/// byte) + 7 more.
const ADDRESSED_CONT_CHUNK: usize = 8;
/// Data bytes a datagram "only"/FIRST frame carries: 2 (dest alias) + 6,
/// with no flag byte to make room for.
const DATAGRAM_FIRST_CHUNK: usize = 6;
/// Data bytes a datagram MIDDLE/LAST frame carries: the full 8, no
/// prefix and no flag byte.
const DATAGRAM_CONT_CHUNK: usize = 8;

/// Cursor over an in-flight outgoing multi-frame message. One
/// [`next_frame`] call advances it by exactly one CAN frame.
pub struct TxCursor {
    handle: RecordHandle,
    offset: usize,
    started: bool,
}

impl TxCursor {
    pub fn new(handle: RecordHandle) -> Self {
        TxCursor {
            handle,
            offset: 0,
            started: false,
        }
    }

    pub fn handle(&self) -> RecordHandle {
        self.handle
    }
}

fn record_view(store: &DefaultBufferStore, handle: RecordHandle) -> Option<(Alias, Alias, u16, &[u8])> {
    let (src_alias, dst_alias, _dst_node_id, mti, data) = store.record_summary(handle)?;
    Some((src_alias, dst_alias, mti, data))
}

/// Produce the next frame of `cursor`'s message, or `None` once it's
/// been fully sent (the caller then frees the record).
pub fn next_frame(store: &DefaultBufferStore, cursor: &mut TxCursor) -> Option<(Identifier, HVec<u8, 8>)> {
    let (src_alias, dst_alias, mti, data) = record_view(store, cursor.handle)?;
    let is_datagram = mti == u16::from(Mti::Datagram);

    if !cursor.started {
        cursor.started = true;
        let chunk_cap = if is_datagram {
            DATAGRAM_FIRST_CHUNK
        } else {
            ADDRESSED_FIRST_CHUNK
        };
        let chunk = data.len().min(chunk_cap);
        let only = data.len() <= chunk_cap;
        cursor.offset = chunk;

        let mut payload = HVec::<u8, 8>::new();
        let mut prefix = [0u8; 2];
        write_addressed_prefix(&mut prefix, dst_alias).ok()?;
        payload.extend_from_slice(&prefix).ok()?;

        if is_datagram {
            payload.extend_from_slice(&data[..chunk]).ok()?;
            let frame_type = if only { FrameType::DatagramOnly } else { FrameType::DatagramFirst };
            return Some((
                Identifier::Data { frame_type, variable: 0, src_alias },
                payload,
            ));
        }

        let flag = if only { MultiFrameFlag::Only } else { MultiFrameFlag::First };
        if chunk > 0 {
            payload.push(flag.encode_into(data[0])).ok()?;
            payload.extend_from_slice(&data[1..chunk]).ok()?;
        } else {
            payload.push(flag.encode_into(0)).ok()?;
        }
        return Some((
            Identifier::Data {
                frame_type: FrameType::OpenLcbMessage,
                variable: mti,
                src_alias,
            },
            payload,
        ));
    }

    if cursor.offset >= data.len() {
        return None;
    }

    let chunk_cap = if is_datagram { DATAGRAM_CONT_CHUNK } else { ADDRESSED_CONT_CHUNK };
    let remaining = data.len() - cursor.offset;
    let chunk = remaining.min(chunk_cap);
    let last = remaining <= chunk_cap;
    let start = cursor.offset;
    cursor.offset += chunk;

    let mut payload = HVec::<u8, 8>::new();
    if is_datagram {
        payload.extend_from_slice(&data[start..start + chunk]).ok()?;
        let frame_type = if last { FrameType::DatagramLast } else { FrameType::DatagramMiddle };
        return Some((
            Identifier::Data { frame_type, variable: 0, src_alias },
            payload,
        ));
    }

    let flag = if last { MultiFrameFlag::Last } else { MultiFrameFlag::Middle };
    payload.push(flag.encode_into(data[start])).ok()?;
    payload.extend_from_slice(&data[start + 1..start + chunk]).ok()?;
    Some((
        Identifier::Data {
            frame_type: FrameType::OpenLcbMessage,
            variable: mti,
            src_alias,
        },
        payload,
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::Tier;

    fn store_with_record(payload: &[u8], mti: u16) -> (DefaultBufferStore, RecordHandle) {
        let mut store = DefaultBufferStore::default();
        let handle = store.allocate(payload.len()).unwrap();
        match handle.tier {
            Tier::Basic => {
                let r = store.get_basic_mut(handle).unwrap();
                r.src_alias = Alias::new(0x111);
                r.dst_alias = Alias::new(0x222);
                r.mti = mti;
                r.set_payload(payload);
            }
            Tier::Datagram => {
                let r = store.get_datagram_mut(handle).unwrap();
                r.src_alias = Alias::new(0x111);
                r.dst_alias = Alias::new(0x222);
                r.mti = mti;
                r.set_payload(payload);
            }
            Tier::Snip => unreachable!(),
        }
        (store, handle)
    }

    #[test]
    fn test_short_addressed_message_is_one_only_frame() {
        let (store, handle) = store_with_record(&[0xAA, 0xBB], u16::from(Mti::VerifiedNodeId));
        let mut cursor = TxCursor::new(handle);
        let (id, payload) = next_frame(&store, &mut cursor).unwrap();
        match id {
            Identifier::Data { frame_type, variable, .. } => {
                assert_eq!(frame_type, FrameType::OpenLcbMessage);
                assert_eq!(variable, u16::from(Mti::VerifiedNodeId));
            }
            _ => panic!("expected data identifier"),
        }
        // dest alias 0x222, then the Only-flagged first data byte, then
        // the rest verbatim.
        assert_eq!(&payload[..2], &[0x02, 0x22]);
        assert_eq!(MultiFrameFlag::decode(payload[2]), MultiFrameFlag::Only);
        assert_eq!(payload[2] & !MultiFrameFlag::MASK, 0xAA & !MultiFrameFlag::MASK);
        assert_eq!(payload[3], 0xBB);
        assert!(next_frame(&store, &mut cursor).is_none());
    }

    #[test]
    fn test_long_addressed_message_fragments_and_reassembles() {
        let data: heapless::Vec<u8, 32> = (0u8..20).collect();
        let (store, handle) = store_with_record(&data, u16::from(Mti::SimpleNodeIdentInfoReply));
        let mut cursor = TxCursor::new(handle);

        let mut reassembled: heapless::Vec<u8, 32> = heapless::Vec::new();
        let mut frame_count = 0;
        while let Some((id, payload)) = next_frame(&store, &mut cursor) {
            frame_count += 1;
            match id {
                Identifier::Data { frame_type, .. } => {
                    let (first_byte_index, has_prefix) = match frame_type {
                        FrameType::OpenLcbMessage => {
                            if frame_count == 1 {
                                (2, true)
                            } else {
                                (0, false)
                            }
                        }
                        _ => panic!("datagram frame type on an openlcb message"),
                    };
                    let _ = has_prefix;
                    let flagged = payload[first_byte_index];
                    reassembled.push(flagged & !MultiFrameFlag::MASK).unwrap();
                    reassembled.extend_from_slice(&payload[first_byte_index + 1..]).unwrap();
                }
            }
        }
        assert!(frame_count >= 3);
        assert_eq!(reassembled.as_slice(), data.as_slice());
    }

    #[test]
    fn test_datagram_fragmentation_has_no_flag_byte() {
        let data: heapless::Vec<u8, 96> = (0u8..70).collect();
        let (store, handle) = store_with_record(&data, u16::from(Mti::Datagram));
        let mut cursor = TxCursor::new(handle);

        let mut reassembled: heapless::Vec<u8, 96> = heapless::Vec::new();
        let mut saw_first = false;
        let mut saw_last = false;
        while let Some((id, payload)) = next_frame(&store, &mut cursor) {
            match id {
                Identifier::Data { frame_type, .. } => match frame_type {
                    FrameType::DatagramFirst => {
                        saw_first = true;
                        reassembled.extend_from_slice(&payload[2..]).unwrap();
                    }
                    FrameType::DatagramMiddle => {
                        reassembled.extend_from_slice(&payload).unwrap();
                    }
                    FrameType::DatagramLast => {
                        saw_last = true;
                        reassembled.extend_from_slice(&payload).unwrap();
                    }
                    other => panic!("unexpected frame type {other:?}"),
                },
            }
        }
        assert!(saw_first && saw_last);
        assert_eq!(reassembled.as_slice(), data.as_slice());
    }
}
