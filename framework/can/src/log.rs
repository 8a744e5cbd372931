//! `defmt`-gated tracing, mirroring the optional logging call sites a
//! bare-metal network stack carries without pulling in `std`/`log`.

#[cfg(feature = "defmt")]
macro_rules! net_trace {
    ($($arg:tt)*) => { defmt::trace!($($arg)*) };
}
#[cfg(not(feature = "defmt"))]
macro_rules! net_trace {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "defmt")]
macro_rules! net_debug {
    ($($arg:tt)*) => { defmt::debug!($($arg)*) };
}
#[cfg(not(feature = "defmt"))]
macro_rules! net_debug {
    ($($arg:tt)*) => {};
}

pub(crate) use net_debug;
pub(crate) use net_trace;
