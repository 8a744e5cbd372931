#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

//! Wire-level enum definitions for the OpenLCB / LCC CAN adaptation:
//! the Message Type Indicator table, service identifiers and the
//! configuration-memory address spaces.

use num_enum::{FromPrimitive, IntoPrimitive};

/// 16-bit Message Type Indicator.
///
/// Values are the ones defined by the OpenLCB Message Network
/// specification. Unknown values decode to [`Mti::Unknown`] rather than
/// failing, since peers may legally send MTIs this node doesn't handle.
#[derive(FromPrimitive, IntoPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Mti {
    InitializationComplete = 0x0100,
    InitializationCompleteSimple = 0x0101,
    VerifyNodeIdAddressed = 0x0488,
    VerifyNodeIdGlobal = 0x0490,
    VerifiedNodeId = 0x0170,
    VerifiedNodeIdSimple = 0x0171,
    OptionalInteractionRejected = 0x0068,
    TerminateDueToError = 0x00A8,
    ProtocolSupportInquiry = 0x0828,
    ProtocolSupportReply = 0x0668,
    IdentifyConsumer = 0x08F4,
    ConsumerRangeIdentified = 0x04A4,
    ConsumerIdentifiedUnknown = 0x04C7,
    ConsumerIdentifiedSet = 0x04C4,
    ConsumerIdentifiedClear = 0x04C5,
    ConsumerIdentifiedReserved = 0x04C6,
    IdentifyProducer = 0x0914,
    ProducerRangeIdentified = 0x0524,
    ProducerIdentifiedUnknown = 0x0547,
    ProducerIdentifiedSet = 0x0544,
    ProducerIdentifiedClear = 0x0545,
    ProducerIdentifiedReserved = 0x0546,
    IdentifyEventsAddressed = 0x0968,
    IdentifyEventsGlobal = 0x0970,
    LearnEvent = 0x0594,
    PcEventReport = 0x05B4,
    PcEventReportWithPayload = 0x0F15,
    SimpleNodeIdentInfoRequest = 0x0DE8,
    SimpleNodeIdentInfoReply = 0x0A08,
    Datagram = 0x1C48,
    DatagramReceivedOk = 0x0A28,
    DatagramRejected = 0x0A48,
    StreamInitRequest = 0x0CC8,
    StreamInitReply = 0x0868,
    StreamSendDataProceed = 0x0888,
    StreamComplete = 0x0CA8,
    TrainControlCommand = 0x0DA8,
    TrainControlReply = 0x0958,
    #[num_enum(default)]
    Unknown = 0xFFFF,
}

impl Mti {
    /// Bit 0x0008: a destination alias/Node ID is present in the payload.
    pub const DEST_ADDRESS_PRESENT_BIT: u16 = 0x0008;
    /// Bit 0x0004: the message concerns an event (used by the generic
    /// event-transport fan-out).
    pub const EVENT_MESSAGE_BIT: u16 = 0x0004;

    /// Whether this MTI carries a destination alias / Node ID.
    pub const fn has_destination(self) -> bool {
        (self as u16) & Self::DEST_ADDRESS_PRESENT_BIT != 0
    }

    /// Whether this MTI is a global (all-nodes) message.
    pub const fn is_global(self) -> bool {
        !self.has_destination()
    }
}

/// Identifiers for pluggable protocol-handler services (`VlcbService::service_id`).
#[derive(FromPrimitive, IntoPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ServiceType {
    #[num_enum(default)]
    None = 0,
    MinimumNodeService = 1,
    EventTransport = 2,
    Datagram = 3,
    MemoryConfig = 4,
    TrainControl = 5,
    BroadcastTime = 6,
}

/// One-byte configuration-memory address space selector.
#[derive(FromPrimitive, IntoPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConfigSpace {
    Firmware = 0xEF,
    TrainFunctionConfig = 0xF9,
    TrainFdi = 0xFA,
    AcdiUser = 0xFB,
    AcdiMfg = 0xFC,
    Config = 0xFD,
    All = 0xFE,
    Cdi = 0xFF,
    #[num_enum(default)]
    Unknown = 0x00,
}

impl ConfigSpace {
    /// Whether writes to this space are permitted.
    pub const fn is_writable(self) -> bool {
        matches!(
            self,
            ConfigSpace::Config
                | ConfigSpace::AcdiUser
                | ConfigSpace::TrainFunctionConfig
                | ConfigSpace::Firmware
                | ConfigSpace::All
        )
    }
}

/// 16-bit categorized error codes used by Datagram Rejected and Optional
/// Interaction Rejected.
#[derive(FromPrimitive, IntoPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum RejectReason {
    BufferFull = 0x2020,
    PermanentError = 0x1000,
    TemporaryError = 0x2000,
    UnimplementedMti = 0x1042,
    #[num_enum(default)]
    Unspecified = 0x0000,
}
