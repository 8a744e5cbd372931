#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate alloc;

pub mod service;
pub mod node_id;
pub mod alias;
pub mod event;
pub mod lfsr;
pub mod float16;
pub mod fast_clock;
pub mod node_flags;