use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use crate::proto::MAX_SIGNATURE_LENGTH;

use super::{validate, Signature, SignatureError, SignatureErrorKind};

/// An owned D-Bus signature.
///
/// Dereferences to [`Signature`].
///
/// # Examples
///
/// ```
/// use dbus_sync::{Signature, SignatureBuf};
///
/// let mut sig = SignatureBuf::empty();
/// sig.push(Signature::UINT32)?;
/// sig.push(Signature::new("as")?)?;
///
/// assert_eq!(sig.as_str(), "uas");
/// # Ok::<_, dbus_sync::SignatureError>(())
/// ```
#[derive(Clone)]
pub struct SignatureBuf {
    bytes: Vec<u8>,
}

impl SignatureBuf {
    /// Construct a new empty signature.
    pub const fn empty() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Try to construct an owned signature with validation.
    pub fn new<S>(signature: &S) -> Result<Self, SignatureError>
    where
        S: ?Sized + AsRef<[u8]>,
    {
        let signature = signature.as_ref();
        validate(signature)?;

        Ok(Self {
            bytes: signature.to_vec(),
        })
    }

    /// Construct an owned signature from a borrowed one.
    pub fn from_signature(signature: &Signature) -> Self {
        Self {
            bytes: signature.as_bytes().to_vec(),
        }
    }

    /// Construct an owned signature without validation.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the bytes are a valid signature, or a
    /// dict-entry fragment that is only ever recombined under an array.
    pub(crate) unsafe fn from_vec_unchecked(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Append another signature to this one.
    ///
    /// Errors if the combined signature would exceed the maximum signature
    /// length of 255 bytes.
    pub fn push(&mut self, other: &Signature) -> Result<(), SignatureError> {
        if self.bytes.len() + other.len() > MAX_SIGNATURE_LENGTH {
            return Err(SignatureError::new(SignatureErrorKind::SignatureTooLong));
        }

        self.bytes.extend_from_slice(other.as_bytes());
        Ok(())
    }

    /// Clear the signature.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Borrow as a [`Signature`].
    pub fn as_signature(&self) -> &Signature {
        // SAFETY: The bytes were validated at construction.
        unsafe { Signature::new_unchecked(&self.bytes) }
    }
}

impl Default for SignatureBuf {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for SignatureBuf {
    type Target = Signature;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_signature()
    }
}

impl Borrow<Signature> for SignatureBuf {
    #[inline]
    fn borrow(&self) -> &Signature {
        self.as_signature()
    }
}

impl AsRef<Signature> for SignatureBuf {
    #[inline]
    fn as_ref(&self) -> &Signature {
        self.as_signature()
    }
}

impl From<&Signature> for SignatureBuf {
    #[inline]
    fn from(signature: &Signature) -> Self {
        Self::from_signature(signature)
    }
}

impl fmt::Debug for SignatureBuf {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_signature().fmt(f)
    }
}

impl fmt::Display for SignatureBuf {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for SignatureBuf {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for SignatureBuf {}

impl Hash for SignatureBuf {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_signature().hash(state);
    }
}

impl PartialEq<Signature> for SignatureBuf {
    #[inline]
    fn eq(&self, other: &Signature) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl PartialEq<&Signature> for SignatureBuf {
    #[inline]
    fn eq(&self, other: &&Signature) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl PartialEq<str> for SignatureBuf {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl PartialEq<&str> for SignatureBuf {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.bytes == other.as_bytes()
    }
}
