//! The append side of the message body codec.

use std::fmt;
use std::os::fd::OwnedFd;

use crate::body::Body;
use crate::error::{Error, ErrorKind, Result};
use crate::object_path::ObjectPath;
use crate::proto::{padding_to, Endianness, MAX_ARRAY_LENGTH, MAX_CONTAINER_DEPTH};
use crate::signature::{Signature, SignatureBuf, SignatureError, SignatureErrorKind};
use crate::value::Value;

/// A buffer a message body is marshalled into.
///
/// Values are appended with [`store`] for statically typed values and
/// [`store_value`] for runtime-typed [`Value`]s. The buffer tracks the body
/// signature, the cursor alignment, and the file descriptor table of the
/// message under construction.
///
/// [`store`]: Self::store
/// [`store_value`]: Self::store_value
///
/// # Examples
///
/// ```
/// use dbus_sync::BodyBuf;
///
/// let mut body = BodyBuf::new();
/// body.store(10u16)?;
/// body.store("Hello World")?;
///
/// assert_eq!(body.signature(), "qs");
/// # Ok::<_, dbus_sync::Error>(())
/// ```
pub struct BodyBuf {
    endianness: Endianness,
    buf: Vec<u8>,
    signature: SignatureBuf,
    fds: Vec<Option<OwnedFd>>,
}

impl BodyBuf {
    /// Construct a new empty body using the native endianness.
    pub fn new() -> Self {
        Self::with_endianness(Endianness::NATIVE)
    }

    /// Construct a new empty body using the given endianness.
    pub fn with_endianness(endianness: Endianness) -> Self {
        Self {
            endianness,
            buf: Vec::new(),
            signature: SignatureBuf::empty(),
            fds: Vec::new(),
        }
    }

    pub(crate) fn from_raw_parts(
        endianness: Endianness,
        buf: Vec<u8>,
        signature: SignatureBuf,
    ) -> Self {
        Self {
            endianness,
            buf,
            signature,
            fds: Vec::new(),
        }
    }

    /// The endianness the body is encoded with.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// The signature of the body.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The marshalled bytes of the body.
    pub fn get(&self) -> &[u8] {
        &self.buf
    }

    /// The length of the marshalled body in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Test if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Clear the body, its signature and its file descriptor table.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.signature.clear();
        self.fds.clear();
    }

    /// Get a read iterator positioned at the start of the body.
    pub fn as_body(&self) -> Body<'_> {
        Body::new(&self.buf, self.endianness, &self.signature, self.fds.len())
    }

    /// Store a statically typed value.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_sync::{BodyBuf, Signature};
    ///
    /// let mut body = BodyBuf::new();
    /// body.store("foo")?;
    ///
    /// assert_eq!(body.signature(), Signature::STRING);
    /// assert_eq!(body.get(), &[3, 0, 0, 0, 102, 111, 111, 0]);
    /// # Ok::<_, dbus_sync::Error>(())
    /// ```
    pub fn store<T>(&mut self, value: T) -> Result<()>
    where
        T: Store,
    {
        self.signature.push(T::SIGNATURE)?;
        value.store_to(self);
        Ok(())
    }

    /// Store a runtime-typed [`Value`].
    ///
    /// The signature of the value is appended to the body signature. A bare
    /// dict entry is rejected; entries only exist inside arrays.
    pub fn store_value(&mut self, value: &Value) -> Result<()> {
        if let Value::DictEntry(..) = value {
            return Err(Error::new(ErrorKind::Signature(SignatureError::new(
                SignatureErrorKind::DictEntryNotInsideArray,
            ))));
        }

        let signature = value.signature()?;
        self.signature.push(&signature)?;
        self.write_value(value, 0)
    }

    /// Append a file descriptor to the fd table and store its index.
    ///
    /// The descriptor is owned by the body and travels out-of-band when the
    /// message is sent.
    pub fn store_fd(&mut self, fd: OwnedFd) -> Result<()> {
        self.signature.push(Signature::UNIX_FD)?;
        let index = self.push_fd(fd);
        self.write_u32(index);
        Ok(())
    }

    /// Append a file descriptor to the fd table without storing anything in
    /// the body, returning its index.
    ///
    /// Useful when building a [`Value::UnixFd`] by hand.
    pub fn attach_fd(&mut self, fd: OwnedFd) -> u32 {
        self.push_fd(fd)
    }

    fn push_fd(&mut self, fd: OwnedFd) -> u32 {
        let index = self.fds.len() as u32;
        self.fds.push(Some(fd));
        index
    }

    /// The number of file descriptors attached to the body.
    pub fn fd_count(&self) -> usize {
        self.fds.len()
    }

    /// Detach the file descriptor at `index`, leaving its slot empty.
    pub fn take_fd(&mut self, index: u32) -> Result<OwnedFd> {
        self.fds
            .get_mut(index as usize)
            .and_then(Option::take)
            .ok_or_else(|| Error::new(ErrorKind::UnknownFd(index)))
    }

    pub(crate) fn attach_fds(&mut self, fds: Vec<OwnedFd>) {
        self.fds = fds.into_iter().map(Some).collect();
    }

    /// Raw descriptors of the fd table, in order, for sending.
    pub(crate) fn raw_fds(&self) -> Result<Vec<std::os::fd::RawFd>> {
        use std::os::fd::AsRawFd;

        self.fds
            .iter()
            .enumerate()
            .map(|(index, fd)| match fd {
                Some(fd) => Ok(fd.as_raw_fd()),
                None => Err(Error::new(ErrorKind::UnknownFd(index as u32))),
            })
            .collect()
    }

    /// Pad the buffer with zero bytes up to `alignment`.
    pub(crate) fn align(&mut self, alignment: usize) {
        let padding = padding_to(alignment, self.buf.len());

        for _ in 0..padding {
            self.buf.push(0);
        }
    }

    pub(crate) fn write_byte(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub(crate) fn write_u16(&mut self, value: u16) {
        self.align(2);
        self.endianness.put_u16(&mut self.buf, value);
    }

    pub(crate) fn write_u32(&mut self, value: u32) {
        self.align(4);
        self.endianness.put_u32(&mut self.buf, value);
    }

    pub(crate) fn write_u64(&mut self, value: u64) {
        self.align(8);
        self.endianness.put_u64(&mut self.buf, value);
    }

    pub(crate) fn write_f64(&mut self, value: f64) {
        self.align(8);
        self.endianness.put_f64(&mut self.buf, value);
    }

    pub(crate) fn write_str(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
    }

    pub(crate) fn write_signature(&mut self, value: &Signature) {
        self.buf.push(value.len() as u8);
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
    }

    /// Marshal a value without touching the body signature.
    fn write_value(&mut self, value: &Value, depth: usize) -> Result<()> {
        if depth > MAX_CONTAINER_DEPTH {
            return Err(Error::new(ErrorKind::DepthExceeded));
        }

        match value {
            Value::Byte(value) => self.write_byte(*value),
            Value::Boolean(value) => self.write_u32(u32::from(*value)),
            Value::Int16(value) => self.write_u16(*value as u16),
            Value::Uint16(value) => self.write_u16(*value),
            Value::Int32(value) => self.write_u32(*value as u32),
            Value::Uint32(value) => self.write_u32(*value),
            Value::Int64(value) => self.write_u64(*value as u64),
            Value::Uint64(value) => self.write_u64(*value),
            Value::Double(value) => self.write_f64(*value),
            Value::String(value) => self.write_str(value),
            Value::ObjectPath(value) => self.write_str(value.as_str()),
            Value::Signature(value) => self.write_signature(value),
            Value::UnixFd(index) => self.write_u32(*index),
            Value::Array(array) => {
                self.align(4);
                let length_at = self.buf.len();
                self.endianness.put_u32(&mut self.buf, 0);

                let alignment = match array.element().first_type() {
                    Some(ty) => ty.alignment(),
                    None => 1,
                };

                self.align(alignment);
                let start = self.buf.len();

                for value in array {
                    self.write_value(value, depth + 1)?;
                }

                let length = (self.buf.len() - start) as u32;

                if length > MAX_ARRAY_LENGTH {
                    return Err(Error::new(ErrorKind::ArrayTooLong(length)));
                }

                self.endianness.put_u32_at(&mut self.buf, length_at, length);
            }
            Value::Struct(fields) => {
                self.align(8);

                for field in fields {
                    self.write_value(field, depth + 1)?;
                }
            }
            Value::DictEntry(entry) => {
                self.align(8);
                self.write_value(entry.key(), depth + 1)?;
                self.write_value(entry.value(), depth + 1)?;
            }
            Value::Variant(inner) => {
                let signature = inner.signature()?;
                self.write_signature(&signature);
                self.write_value(inner, depth + 1)?;
            }
        }

        Ok(())
    }
}

impl Default for BodyBuf {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BodyBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyBuf")
            .field("signature", &self.signature)
            .field("len", &self.buf.len())
            .field("fds", &self.fds.len())
            .finish()
    }
}

impl Clone for BodyBuf {
    /// Clone the marshalled bytes and signature.
    ///
    /// File descriptors are not cloneable; the clone has an empty fd table.
    fn clone(&self) -> Self {
        Self {
            endianness: self.endianness,
            buf: self.buf.clone(),
            signature: self.signature.clone(),
            fds: Vec::new(),
        }
    }
}

impl PartialEq for BodyBuf {
    fn eq(&self, other: &Self) -> bool {
        self.endianness == other.endianness
            && self.buf == other.buf
            && self.signature == other.signature
    }
}

impl Eq for BodyBuf {}

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// Trait for statically typed values which can be stored with a
/// [`BodyBuf::store`] call.
pub trait Store: sealed::Sealed {
    /// The signature of the type.
    #[doc(hidden)]
    const SIGNATURE: &'static Signature;

    /// Marshal `self` into the buffer.
    #[doc(hidden)]
    fn store_to(self, buf: &mut BodyBuf);
}

macro_rules! impl_store {
    ($(($ty:ty, $signature:ident, $write:ident $(, $cast:ty)?)),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Store for $ty {
                const SIGNATURE: &'static Signature = Signature::$signature;

                #[inline]
                fn store_to(self, buf: &mut BodyBuf) {
                    buf.$write(self $(as $cast)?);
                }
            }
        )*
    }
}

impl_store! {
    (u8, BYTE, write_byte),
    (i16, INT16, write_u16, u16),
    (u16, UINT16, write_u16),
    (i32, INT32, write_u32, u32),
    (u32, UINT32, write_u32),
    (i64, INT64, write_u64, u64),
    (u64, UINT64, write_u64),
    (f64, DOUBLE, write_f64),
}

impl sealed::Sealed for bool {}

impl Store for bool {
    const SIGNATURE: &'static Signature = Signature::BOOLEAN;

    #[inline]
    fn store_to(self, buf: &mut BodyBuf) {
        buf.write_u32(u32::from(self));
    }
}

impl sealed::Sealed for &str {}

impl Store for &str {
    const SIGNATURE: &'static Signature = Signature::STRING;

    #[inline]
    fn store_to(self, buf: &mut BodyBuf) {
        buf.write_str(self);
    }
}

impl sealed::Sealed for &String {}

impl Store for &String {
    const SIGNATURE: &'static Signature = Signature::STRING;

    #[inline]
    fn store_to(self, buf: &mut BodyBuf) {
        buf.write_str(self);
    }
}

impl sealed::Sealed for &ObjectPath {}

impl Store for &ObjectPath {
    const SIGNATURE: &'static Signature = Signature::OBJECT_PATH;

    #[inline]
    fn store_to(self, buf: &mut BodyBuf) {
        buf.write_str(self.as_str());
    }
}

impl sealed::Sealed for &Signature {}

impl Store for &Signature {
    const SIGNATURE: &'static Signature = Signature::SIGNATURE;

    #[inline]
    fn store_to(self, buf: &mut BodyBuf) {
        buf.write_signature(self);
    }
}
