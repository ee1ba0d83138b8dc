use std::fmt;
use std::str::from_utf8_unchecked;

use crate::proto::Type;

use super::{validate, Iter, SignatureBuf, SignatureError};

/// A validated D-Bus signature.
///
/// This is the borrowed form; the owned form is [`SignatureBuf`].
///
/// # Examples
///
/// ```
/// use dbus_sync::Signature;
///
/// const SIG: &Signature = Signature::new_const(b"aaaai");
///
/// assert!(Signature::new("aai").is_ok());
/// assert!(Signature::new("a").is_err());
/// ```
#[derive(Hash, PartialEq, Eq)]
#[repr(transparent)]
pub struct Signature([u8]);

impl Signature {
    /// The empty signature.
    pub const EMPTY: &'static Signature = Signature::new_const(b"");

    /// A single byte, `y`.
    pub const BYTE: &'static Signature = Signature::new_const(b"y");

    /// A boolean, `b`.
    pub const BOOLEAN: &'static Signature = Signature::new_const(b"b");

    /// Signed 16-bit integer, `n`.
    pub const INT16: &'static Signature = Signature::new_const(b"n");

    /// Unsigned 16-bit integer, `q`.
    pub const UINT16: &'static Signature = Signature::new_const(b"q");

    /// Signed 32-bit integer, `i`.
    pub const INT32: &'static Signature = Signature::new_const(b"i");

    /// Unsigned 32-bit integer, `u`.
    pub const UINT32: &'static Signature = Signature::new_const(b"u");

    /// Signed 64-bit integer, `x`.
    pub const INT64: &'static Signature = Signature::new_const(b"x");

    /// Unsigned 64-bit integer, `t`.
    pub const UINT64: &'static Signature = Signature::new_const(b"t");

    /// IEEE 754 double-precision floating point, `d`.
    pub const DOUBLE: &'static Signature = Signature::new_const(b"d");

    /// A nul-terminated UTF-8 string, `s`.
    pub const STRING: &'static Signature = Signature::new_const(b"s");

    /// An object path, `o`.
    pub const OBJECT_PATH: &'static Signature = Signature::new_const(b"o");

    /// A signature, `g`.
    pub const SIGNATURE: &'static Signature = Signature::new_const(b"g");

    /// An index into the file descriptor table of a message, `h`.
    pub const UNIX_FD: &'static Signature = Signature::new_const(b"h");

    /// A self-describing value, `v`.
    pub const VARIANT: &'static Signature = Signature::new_const(b"v");

    /// Construct a new signature with validation inside of a constant
    /// context.
    ///
    /// Panics in case the signature is invalid.
    ///
    /// ```compile_fail
    /// use dbus_sync::Signature;
    ///
    /// const BAD: &Signature = Signature::new_const(b"(a)");
    /// ```
    #[inline]
    #[track_caller]
    pub const fn new_const(signature: &[u8]) -> &Signature {
        if validate(signature).is_err() {
            panic!("Invalid D-Bus signature")
        };

        // SAFETY: The byte slice is repr transparent over this type.
        unsafe { Self::new_unchecked(signature) }
    }

    /// Try to construct a new signature with validation.
    #[inline]
    pub fn new<S>(signature: &S) -> Result<&Signature, SignatureError>
    where
        S: ?Sized + AsRef<[u8]>,
    {
        let signature = signature.as_ref();
        validate(signature)?;
        // SAFETY: The byte slice is repr transparent over this type.
        unsafe { Ok(Self::new_unchecked(signature)) }
    }

    /// Construct a new signature without validation.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the bytes are a valid signature.
    #[inline]
    pub(crate) const unsafe fn new_unchecked(signature: &[u8]) -> &Self {
        &*(signature as *const _ as *const Signature)
    }

    /// The empty signature.
    pub const fn empty() -> &'static Self {
        // SAFETY: The empty signature is trivially valid.
        unsafe { Self::new_unchecked(&[]) }
    }

    /// Test if the signature is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the length of the signature in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the top-level complete types of the signature.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_sync::Signature;
    ///
    /// let sig = Signature::new("ia{sv}(xt)")?;
    /// let types = sig.iter().map(|s| s.as_str()).collect::<Vec<_>>();
    /// assert_eq!(types, ["i", "a{sv}", "(xt)"]);
    /// # Ok::<_, dbus_sync::SignatureError>(())
    /// ```
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self)
    }

    /// The type code of the first complete type, if any.
    pub fn first_type(&self) -> Option<Type> {
        self.0.first().map(|&code| Type::new(code))
    }

    /// Get the signature as a string.
    pub fn as_str(&self) -> &str {
        // SAFETY: Validation ensures that the signature is ASCII.
        unsafe { from_utf8_unchecked(&self.0) }
    }

    /// Get the signature as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl fmt::Display for Signature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<Signature> for Signature {
    #[inline]
    fn as_ref(&self) -> &Signature {
        self
    }
}

impl ToOwned for Signature {
    type Owned = SignatureBuf;

    #[inline]
    fn to_owned(&self) -> Self::Owned {
        SignatureBuf::from_signature(self)
    }
}

impl PartialEq<SignatureBuf> for Signature {
    #[inline]
    fn eq(&self, other: &SignatureBuf) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl PartialEq<SignatureBuf> for &Signature {
    #[inline]
    fn eq(&self, other: &SignatureBuf) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl PartialEq<str> for Signature {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl PartialEq<&str> for Signature {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl PartialEq<str> for &Signature {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl PartialEq<[u8]> for Signature {
    #[inline]
    fn eq(&self, other: &[u8]) -> bool {
        self.0 == *other
    }
}

impl<const N: usize> PartialEq<[u8; N]> for Signature {
    #[inline]
    fn eq(&self, other: &[u8; N]) -> bool {
        self.0 == other[..]
    }
}

impl<const N: usize> PartialEq<[u8; N]> for &Signature {
    #[inline]
    fn eq(&self, other: &[u8; N]) -> bool {
        self.0 == other[..]
    }
}

impl From<&Signature> for Box<Signature> {
    #[inline]
    fn from(signature: &Signature) -> Self {
        // SAFETY: Signature is repr(transparent) over [u8].
        unsafe { Box::from_raw(Box::into_raw(Box::<[u8]>::from(&signature.0)) as *mut Signature) }
    }
}
