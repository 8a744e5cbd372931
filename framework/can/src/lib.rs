#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;

pub mod config {
    pub const CAN_RESERVE_DELAY_MS: u64 = 100;
    pub const CID_WAIT_TICKS: u8 = 2;
    pub const LONG_MESSAGE_DEFAULT_DELAY: u16 = 20;
    pub const LONG_MESSAGE_RECEIVE_TIMEOUT: u16 = 5000;
}

pub mod phy;
pub mod wire;

pub mod storage;
pub mod node;
pub mod dispatch;
pub mod datagram;

pub(crate) mod log;
