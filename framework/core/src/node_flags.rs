use bitflags::bitflags;

bitflags! {
    /// Virtual-node record state flags (the `state.*` bits of
    /// the data model's virtual-node record). Datagram ack/retry state
    /// and "has this tick's message been handled" live in
    /// `openlcb-can`'s `datagram`/`dispatch` state machines instead of
    /// as flags here; there's no firmware-upgrade operation in scope
    /// to back a flag for it.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NodeFlags: u16 {
        const Allocated = 0b0000_0001;
        const DuplicateIdDetected = 0b0000_0010;
        const Initialized = 0b0000_0100;
        const Permitted = 0b0000_1000;
    }
}
