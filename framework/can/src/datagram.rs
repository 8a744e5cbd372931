//! Per-node datagram transport: reassembly-side acknowledgement and
//! send-side retry with exponential back-off.
//!
//! Two independent halves, since a node can simultaneously be
//! receiving one datagram and waiting on the ack for one it sent:
//! [`DatagramTransport`] tracks the inbound IDLE → RECEIVING →
//! ACKED/REJECTED progression; [`DatagramSend`] tracks an outgoing
//! datagram until it's acknowledged, rejected, or times out. Each
//! virtual node holds one of each — §4.12's "exactly one datagram
//! exchange at a time per source-destination node pair" is enforced by
//! simply refusing to `begin` a new exchange while the current one
//! hasn't reached a terminal state.

use openlcb_core::alias::Alias;

use crate::storage::RecordHandle;

pub mod config {
    //! Retry/back-off tuning, in the same flat `pub const` style as the
    //! CAN-layer timing constants.
    pub const DATAGRAM_MAX_RETRIES: u8 = 3;
    pub const DATAGRAM_REPLY_PENDING_DEFAULT_MS: u16 = 3000;
    /// First retry back-off, in 100 ms ticks; doubles on every
    /// subsequent retry.
    pub const DATAGRAM_RETRY_BASE_TICKS: u16 = 10;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportState {
    Idle,
    Receiving,
    Acked,
    Rejected,
}

/// The handler's verdict on a fully reassembled incoming datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveOutcome {
    /// Accept outright; Datagram Received OK carries no reply-pending
    /// duration.
    Accepted,
    /// Accept, but the real reply will follow later (e.g. a Memory
    /// Config read taking longer than one tick); Datagram Received OK
    /// carries this many milliseconds as the reply-pending window.
    AcceptedPending(u16),
    /// Reject with this 16-bit OpenLCB error code.
    Rejected(u16),
}

/// What to transmit in response to a completed receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReplyFrame {
    ReceivedOk { reply_pending_ms: Option<u16> },
    Rejected(u16),
}

/// Inbound half: tracks one node's in-progress datagram receive.
pub struct DatagramTransport {
    state: TransportState,
    peer_alias: Alias,
}

impl DatagramTransport {
    pub const fn new() -> Self {
        DatagramTransport {
            state: TransportState::Idle,
            peer_alias: Alias::EMPTY,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn peer_alias(&self) -> Alias {
        self.peer_alias
    }

    /// First fragment of an incoming datagram arrived. Refused (no
    /// state change) if a different peer's exchange is already in
    /// progress.
    pub fn begin_receive(&mut self, peer_alias: Alias) -> bool {
        if self.state != TransportState::Idle && self.peer_alias != peer_alias {
            return false;
        }
        self.state = TransportState::Receiving;
        self.peer_alias = peer_alias;
        true
    }

    /// The final fragment has been reassembled; `outcome` is the
    /// application handler's verdict. Returns the frame to transmit.
    pub fn complete_receive(&mut self, outcome: ReceiveOutcome) -> ReplyFrame {
        match outcome {
            ReceiveOutcome::Accepted => {
                self.state = TransportState::Idle;
                ReplyFrame::ReceivedOk { reply_pending_ms: None }
            }
            ReceiveOutcome::AcceptedPending(ms) => {
                self.state = TransportState::Acked;
                ReplyFrame::ReceivedOk { reply_pending_ms: Some(ms) }
            }
            ReceiveOutcome::Rejected(code) => {
                self.state = TransportState::Rejected;
                ReplyFrame::Rejected(code)
            }
        }
    }

    /// The deferred reply promised by an `AcceptedPending` verdict has
    /// now actually been queued; release the peer lock.
    pub fn finish_pending(&mut self) {
        if self.state == TransportState::Acked {
            self.state = TransportState::Idle;
        }
    }
}

impl Default for DatagramTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum SendState {
    Idle,
    AwaitingAck,
    RepliedPending,
    Done,
    Failed(u16),
}

/// What a [`DatagramSend::tick`] call wants done this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendTick {
    /// Retransmit the original record: either the first send, or a
    /// back-off retry.
    Retransmit(RecordHandle),
    /// Retries exhausted, or the reply-pending window elapsed with no
    /// further reply: the exchange has failed.
    TimedOut,
}

/// Outbound half: tracks one node's in-flight sent datagram through
/// ack/reject/timeout.
pub struct DatagramSend {
    state: SendState,
    peer_alias: Alias,
    record: Option<RecordHandle>,
    retry_count: u8,
    timer_ticks: u16,
    timeout_ticks: u16,
}

impl DatagramSend {
    pub const fn new() -> Self {
        DatagramSend {
            state: SendState::Idle,
            peer_alias: Alias::EMPTY,
            record: None,
            retry_count: 0,
            timer_ticks: 0,
            timeout_ticks: config::DATAGRAM_RETRY_BASE_TICKS,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, SendState::Idle | SendState::Done | SendState::Failed(_))
    }

    /// Start tracking a freshly queued outgoing datagram. Refused if
    /// an exchange with a different peer is still in flight.
    pub fn begin(&mut self, peer_alias: Alias, record: RecordHandle) -> bool {
        if !self.is_idle() && self.peer_alias != peer_alias {
            return false;
        }
        self.state = SendState::AwaitingAck;
        self.peer_alias = peer_alias;
        self.record = Some(record);
        self.retry_count = 0;
        self.timer_ticks = 0;
        self.timeout_ticks = config::DATAGRAM_RETRY_BASE_TICKS;
        true
    }

    /// The peer's Datagram Received OK arrived.
    pub fn on_received_ok(&mut self, reply_pending_ms: Option<u16>) {
        match reply_pending_ms {
            Some(ms) => {
                self.state = SendState::RepliedPending;
                self.timer_ticks = 0;
                self.timeout_ticks = (ms / 100).max(1);
            }
            None => self.state = SendState::Done,
        }
    }

    /// The peer's Datagram Rejected arrived, carrying its error code.
    pub fn on_rejected(&mut self, code: u16) {
        self.state = SendState::Failed(code);
    }

    /// Advance by one 100 ms tick.
    pub fn tick(&mut self) -> Option<SendTick> {
        match self.state {
            SendState::AwaitingAck => {
                self.timer_ticks = self.timer_ticks.saturating_add(1);
                if self.timer_ticks < self.timeout_ticks {
                    return None;
                }
                if self.retry_count >= config::DATAGRAM_MAX_RETRIES {
                    self.state = SendState::Failed(0);
                    return Some(SendTick::TimedOut);
                }
                self.retry_count += 1;
                self.timer_ticks = 0;
                self.timeout_ticks = self.timeout_ticks.saturating_mul(2);
                self.record.map(SendTick::Retransmit)
            }
            SendState::RepliedPending => {
                self.timer_ticks = self.timer_ticks.saturating_add(1);
                if self.timer_ticks < self.timeout_ticks {
                    return None;
                }
                self.state = SendState::Failed(0);
                Some(SendTick::TimedOut)
            }
            _ => None,
        }
    }
}

impl Default for DatagramSend {
    fn default() -> Self {
        Self::new()
    }
}
