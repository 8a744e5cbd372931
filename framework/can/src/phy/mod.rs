use crate::wire::Medium;

pub mod can;

/// A description of device capabilities.
///
/// Higher-level protocols may use this information to determine how to
/// behave.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct DeviceCapabilities {
    /// Medium of the device.
    pub medium: Medium,
}

/// Interface for sending and receiving raw CAN frames.
///
/// This interface revolves around _tokens_, specialized types facilitating
/// the reception and transmission of individual frames. The `receive` and
/// `transmit` functions focus on token construction, while the actual
/// sending and receiving operations occur when the tokens are consumed.
pub trait Device {
    type RxToken<'a>: RxToken
    where
        Self: 'a;
    type TxToken<'a>: TxToken
    where
        Self: 'a;

    /// Create a pair of tokens, comprising one receive token and one
    /// transmit token.
    fn receive(&mut self) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)>;

    /// Create a transmit token.
    fn transmit(&mut self) -> Option<Self::TxToken<'_>>;

    /// Get a description of device capabilities.
    fn capabilities(&self) -> DeviceCapabilities;
}

/// A token to receive a single CAN frame.
pub trait RxToken {
    /// Utilize the token for receiving a singular frame.
    ///
    /// This method acquires a frame and subsequently invokes the provided
    /// closure `f` with the raw frame bytes as its argument.
    fn consume<R, F>(self, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R;
}

/// A token to transmit a single CAN frame.
pub trait TxToken: Clone {
    /// Utilize the token to dispatch a solitary frame.
    ///
    /// This method creates a transmit buffer of size `len` and invokes the
    /// supplied closure `f` with a mutable reference to that buffer. The
    /// closure's responsibility is to construct a valid CAN frame within
    /// the buffer. Upon the closure's completion, the transmit buffer is
    /// dispatched.
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R;
}
