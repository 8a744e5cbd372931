use core::cell::RefCell;

use embedded_can::{ExtendedId, Id};
use heapless::Vec;
use rclite::Rc;

use crate::log::net_debug;
use crate::phy;
use crate::wire::can::{Frame as WireFrame, HEADER_LEN};

use super::{Device, DeviceCapabilities, Medium};

const MTU: usize = 8;
const FRAME_LEN: usize = HEADER_LEN + MTU;

/// An `embedded-can` device driver wrapper.
///
/// OpenLCB rides on the 29-bit extended CAN identifier exclusively;
/// standard (11-bit) frames observed on the bus are not part of this
/// protocol and are silently ignored.
#[derive(Debug)]
pub struct EmbeddedCan<D: embedded_can::nb::Can> {
    lower: Rc<RefCell<D>>,
}

impl<D: embedded_can::nb::Can> EmbeddedCan<D> {
    /// Creates an embedded-can device, bound to the given device driver.
    pub fn new(device: D) -> Self {
        EmbeddedCan {
            lower: Rc::new(RefCell::new(device)),
        }
    }
}

impl<D: embedded_can::nb::Can> Device for EmbeddedCan<D> {
    type RxToken<'a>
        = RxToken
    where
        Self: 'a;
    type TxToken<'a>
        = TxToken<D>
    where
        Self: 'a;

    fn receive(&mut self) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        let mut lower = self.lower.borrow_mut();
        match lower.receive() {
            Ok(frame) => {
                let buffer = from_can_frame::<D::Frame>(frame)?;
                let rx = RxToken { buffer };
                let tx = TxToken {
                    lower: self.lower.clone(),
                };
                Some((rx, tx))
            }
            Err(nb::Error::WouldBlock) => None,
            Err(nb::Error::Other(err)) => {
                net_debug!("phy: rx error {:?}", err.kind());
                None
            }
        }
    }

    fn transmit(&mut self) -> Option<Self::TxToken<'_>> {
        Some(TxToken {
            lower: self.lower.clone(),
        })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            medium: Medium::Can,
            ..DeviceCapabilities::default()
        }
    }
}

#[doc(hidden)]
pub struct RxToken {
    buffer: Vec<u8, FRAME_LEN>,
}

impl phy::RxToken for RxToken {
    fn consume<R, F>(mut self, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        f(&mut self.buffer[..])
    }
}

#[doc(hidden)]
pub struct TxToken<D: embedded_can::nb::Can> {
    lower: Rc<RefCell<D>>,
}

impl<D: embedded_can::nb::Can> Clone for TxToken<D> {
    fn clone(&self) -> Self {
        Self {
            lower: Rc::clone(&self.lower),
        }
    }
}

impl<D: embedded_can::nb::Can> phy::TxToken for TxToken<D> {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut lower = self.lower.borrow_mut();
        let mut buffer: Vec<u8, FRAME_LEN> = Vec::new();
        buffer.resize_default(len).unwrap();
        let result = f(&mut buffer[..len]);
        match lower.transmit(&into_can_frame::<D::Frame>(&buffer[..len])) {
            Ok(_) => {}
            Err(nb::Error::WouldBlock) => {
                net_debug!("phy: tx failed due to WouldBlock");
            }
            Err(nb::Error::Other(err)) => {
                net_debug!("phy: tx error {:?}", err.kind());
            }
        }
        result
    }
}

fn into_can_frame<T: embedded_can::Frame>(buffer: &[u8]) -> T {
    let frame = WireFrame::new_unchecked(buffer);
    let raw_id = frame.identifier().encode();
    let id = Id::Extended(ExtendedId::new(raw_id).unwrap());
    T::new(id, frame.payload()).unwrap()
}

fn from_can_frame<T: embedded_can::Frame>(value: T) -> Option<Vec<u8, FRAME_LEN>> {
    match value.id() {
        Id::Extended(id) => {
            let mut data = Vec::<u8, FRAME_LEN>::new();
            data.resize_default(HEADER_LEN).unwrap();
            {
                let mut frame = WireFrame::new_unchecked(&mut data[..HEADER_LEN]);
                frame.set_identifier(crate::wire::can::Identifier::decode(id.as_raw()));
            }
            if value.is_data_frame() {
                data.extend_from_slice(value.data()).unwrap();
            }
            Some(data)
        }
        // Standard (11-bit) identifiers never carry OpenLCB traffic.
        Id::Standard(_) => None,
    }
}

#[cfg(test)]
mod test {
    use embedded_can::{Frame, StandardId};

    use super::*;
    use crate::wire::can::{CidSequence, FrameType, Identifier};
    use openlcb_core::alias::Alias;

    struct TestFrame {
        id: Id,
        remote: bool,
        data: Vec<u8, 8>,
    }

    impl Frame for TestFrame {
        fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
            Some(TestFrame {
                id: id.into(),
                remote: false,
                data: Vec::from_slice(data).unwrap(),
            })
        }

        fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
            None
        }

        fn is_extended(&self) -> bool {
            matches!(self.id, Id::Extended(_))
        }

        fn is_remote_frame(&self) -> bool {
            self.remote
        }

        fn is_data_frame(&self) -> bool {
            !self.remote
        }

        fn id(&self) -> Id {
            self.id
        }

        fn dlc(&self) -> usize {
            self.data.len()
        }

        fn data(&self) -> &[u8] {
            &self.data
        }
    }

    #[test]
    fn test_into_can_frame() {
        let mut buf = [0u8; HEADER_LEN + 4];
        let mut wire = WireFrame::new_unchecked(&mut buf[..]);
        wire.set_identifier(Identifier::Data {
            frame_type: FrameType::OpenLcbMessage,
            variable: 0x100,
            src_alias: Alias::new(0x042),
        });
        wire.payload_mut().copy_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);

        let frame = into_can_frame::<TestFrame>(&buf);
        assert!(frame.is_extended());
        assert_eq!(frame.data(), &[0xAA, 0xBB, 0xCC, 0xDD]);
        match Identifier::decode(match frame.id() {
            Id::Extended(id) => id.as_raw(),
            Id::Standard(_) => panic!("expected extended id"),
        }) {
            Identifier::Data {
                frame_type,
                variable,
                src_alias,
            } => {
                assert_eq!(frame_type, FrameType::OpenLcbMessage);
                assert_eq!(variable, 0x100);
                assert_eq!(src_alias, Alias::new(0x042));
            }
            Identifier::Cid { .. } => panic!("expected data identifier"),
        }
    }

    #[test]
    fn test_from_can_frame_data() {
        let id = Identifier::Cid {
            sequence: CidSequence::Cid7,
            node_id_chunk: 0x0201,
            src_alias: Alias::new(0x042),
        };
        let frame = TestFrame {
            id: Id::Extended(ExtendedId::new(id.encode()).unwrap()),
            remote: false,
            data: Vec::new(),
        };

        let raw = from_can_frame::<TestFrame>(frame).unwrap();
        let wire = WireFrame::new_checked(&raw[..]).unwrap();
        assert_eq!(wire.identifier(), id);
        assert_eq!(wire.payload_len(), 0);
    }

    #[test]
    fn test_from_can_frame_ignores_standard_id() {
        let frame = TestFrame {
            id: Id::Standard(StandardId::new(0x123).unwrap()),
            remote: false,
            data: Vec::new(),
        };

        assert_eq!(from_can_frame::<TestFrame>(frame), None);
    }
}
