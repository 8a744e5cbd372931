//! The dispatch layer: the state machines that turn raw CAN frames
//! into OpenLCB messages and back, and the priority schedulers that
//! drive them one non-blocking step at a time.

pub mod can_login;
pub mod can_main;
pub mod can_rx;
pub mod can_tx;
pub mod openlcb_login;
pub mod openlcb_main;

pub use openlcb_defs::RejectReason;
