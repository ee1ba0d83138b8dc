use std::fmt;
use std::num::NonZeroU32;

/// A message serial assigned by a [`Connection`].
///
/// Serials are never zero; the wire encoding reserves zero for "unassigned".
///
/// [`Connection`]: crate::Connection
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Serial(NonZeroU32);

impl Serial {
    pub(crate) fn new(serial: NonZeroU32) -> Self {
        Self(serial)
    }

    /// Construct a serial from a raw value, unless it is zero.
    pub fn from_u32(serial: u32) -> Option<Self> {
        NonZeroU32::new(serial).map(Self)
    }

    /// The raw value of the serial.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for Serial {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Serial {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}
