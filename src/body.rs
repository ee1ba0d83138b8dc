//! The read side of the message body codec.

use std::fmt;
use std::str::from_utf8;

use crate::error::{Error, ErrorKind, Result};
use crate::object_path::ObjectPath;
use crate::proto::{padding_to, Endianness, Type, MAX_ARRAY_LENGTH, MAX_CONTAINER_DEPTH};
use crate::object_path::ObjectPathBuf;
use crate::signature::{complete_type_len, Signature};
use crate::value::{Array, DictEntry, Value};

/// A read iterator over a marshalled message body.
///
/// Typed reads are performed with [`load`]; runtime-typed reads driven by
/// the body signature with [`load_value`]. The iterator verifies every
/// wire-format rule as it goes: padding bytes must be zero, strings must be
/// UTF-8 and nul-terminated, booleans must be 0 or 1, and length and depth
/// limits are enforced.
///
/// [`load`]: Self::load
/// [`load_value`]: Self::load_value
///
/// # Examples
///
/// ```
/// use dbus_sync::BodyBuf;
///
/// let mut body = BodyBuf::new();
/// body.store(42u32)?;
/// body.store("Hello World!")?;
///
/// let mut read = body.as_body();
/// assert_eq!(read.load::<u32>()?, 42);
/// assert_eq!(read.load::<&str>()?, "Hello World!");
/// assert!(read.is_empty());
/// # Ok::<_, dbus_sync::Error>(())
/// ```
pub struct Body<'de> {
    data: &'de [u8],
    pos: usize,
    end: usize,
    endianness: Endianness,
    signature: &'de Signature,
    sig_pos: usize,
    fds: usize,
}

impl<'de> Body<'de> {
    /// Construct a new read iterator over `data`.
    ///
    /// Positions are interpreted relative to the start of the slice, which
    /// must coincide with an 8-byte alignment boundary of the containing
    /// message. Message bodies and header-field arrays both do.
    pub(crate) fn new(
        data: &'de [u8],
        endianness: Endianness,
        signature: &'de Signature,
        fds: usize,
    ) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len(),
            endianness,
            signature,
            sig_pos: 0,
            fds,
        }
    }

    /// Construct a bounded reader over a sub-range of `data`, keeping
    /// absolute positions for alignment.
    pub(crate) fn with_bounds(
        data: &'de [u8],
        pos: usize,
        end: usize,
        endianness: Endianness,
    ) -> Self {
        Self {
            data,
            pos,
            end,
            endianness,
            signature: Signature::empty(),
            sig_pos: 0,
            fds: 0,
        }
    }

    /// The signature the body was declared with.
    pub fn signature(&self) -> &'de Signature {
        self.signature
    }

    /// The endianness the body is encoded with.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// The number of bytes left to read.
    pub fn len(&self) -> usize {
        self.end - self.pos
    }

    /// Test if the body has been fully read.
    pub fn is_empty(&self) -> bool {
        self.pos == self.end
    }

    /// Advance to `alignment`, verifying that the padding is zeroed.
    pub(crate) fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = padding_to(alignment, self.pos);

        if self.pos + padding > self.end {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        for _ in 0..padding {
            if self.data[self.pos] != 0 {
                return Err(Error::new(ErrorKind::NonZeroPadding));
            }

            self.pos += 1;
        }

        Ok(())
    }

    pub(crate) fn load_slice(&mut self, len: usize) -> Result<&'de [u8]> {
        if self.pos + len > self.end {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Load a slice followed by a nul byte, excluding the nul byte.
    pub(crate) fn load_slice_nul(&mut self, len: usize) -> Result<&'de [u8]> {
        if self.pos + len + 1 > self.end {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        if self.data[self.pos + len] != 0 {
            return Err(Error::new(ErrorKind::NotNullTerminated));
        }

        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len + 1;
        Ok(slice)
    }

    pub(crate) fn load_byte(&mut self) -> Result<u8> {
        if self.pos == self.end {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn load_u16(&mut self) -> Result<u16> {
        self.align(2)?;
        let slice = self.load_slice(2)?;
        Ok(self.endianness.get_u16(slice))
    }

    pub(crate) fn load_u32(&mut self) -> Result<u32> {
        self.align(4)?;
        let slice = self.load_slice(4)?;
        Ok(self.endianness.get_u32(slice))
    }

    pub(crate) fn load_u64(&mut self) -> Result<u64> {
        self.align(8)?;
        let slice = self.load_slice(8)?;
        Ok(self.endianness.get_u64(slice))
    }

    pub(crate) fn load_f64(&mut self) -> Result<f64> {
        self.align(8)?;
        let slice = self.load_slice(8)?;
        Ok(self.endianness.get_f64(slice))
    }

    pub(crate) fn load_str(&mut self) -> Result<&'de str> {
        let len = self.load_u32()? as usize;
        let bytes = self.load_slice_nul(len)?;
        Ok(from_utf8(bytes)?)
    }

    pub(crate) fn load_signature(&mut self) -> Result<&'de Signature> {
        let len = self.load_byte()? as usize;
        let bytes = self.load_slice_nul(len)?;
        Ok(Signature::new(bytes)?)
    }

    /// Load a statically typed value.
    pub fn load<T>(&mut self) -> Result<T>
    where
        T: Load<'de>,
    {
        T::load_from(self)
    }

    /// Load the next value described by the body signature.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_sync::{BodyBuf, Value};
    ///
    /// let mut body = BodyBuf::new();
    /// body.store_value(&Value::from(7i64))?;
    ///
    /// let mut read = body.as_body();
    /// assert_eq!(read.load_value()?, Value::Int64(7));
    /// # Ok::<_, dbus_sync::Error>(())
    /// ```
    pub fn load_value(&mut self) -> Result<Value> {
        let rest = &self.signature.as_bytes()[self.sig_pos..];

        if rest.is_empty() {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        let n = complete_type_len(rest);
        self.sig_pos += n;
        self.read_value_of(&rest[..n], 0)
    }

    /// Load every value remaining in the body signature, verifying that the
    /// body is fully consumed.
    pub fn load_all(&mut self) -> Result<Vec<Value>> {
        let mut values = Vec::new();

        while self.sig_pos < self.signature.len() {
            values.push(self.load_value()?);
        }

        if !self.is_empty() {
            return Err(Error::new(ErrorKind::TrailingBytes));
        }

        Ok(values)
    }

    fn read_value_of(&mut self, sig: &[u8], depth: usize) -> Result<Value> {
        if depth > MAX_CONTAINER_DEPTH {
            return Err(Error::new(ErrorKind::DepthExceeded));
        }

        let value = match sig[0] {
            b'y' => Value::Byte(self.load_byte()?),
            b'b' => match self.load_u32()? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                value => return Err(Error::new(ErrorKind::InvalidBoolean(value))),
            },
            b'n' => Value::Int16(self.load_u16()? as i16),
            b'q' => Value::Uint16(self.load_u16()?),
            b'i' => Value::Int32(self.load_u32()? as i32),
            b'u' => Value::Uint32(self.load_u32()?),
            b'x' => Value::Int64(self.load_u64()? as i64),
            b't' => Value::Uint64(self.load_u64()?),
            b'd' => Value::Double(self.load_f64()?),
            b's' => Value::String(self.load_str()?.to_owned()),
            b'o' => {
                let path = self.load_str()?;
                Value::ObjectPath(ObjectPathBuf::new(path)?)
            }
            b'g' => Value::Signature(self.load_signature()?.to_owned()),
            b'h' => {
                let index = self.load_u32()?;

                if index as usize >= self.fds {
                    return Err(Error::new(ErrorKind::UnknownFd(index)));
                }

                Value::UnixFd(index)
            }
            b'a' => {
                let length = self.load_u32()?;

                if length > MAX_ARRAY_LENGTH {
                    return Err(Error::new(ErrorKind::ArrayTooLong(length)));
                }

                let element = &sig[1..];
                self.align(Type::new(element[0]).alignment())?;

                let start = self.pos;
                let array_end = start + length as usize;

                if array_end > self.end {
                    return Err(Error::new(ErrorKind::BufferUnderflow));
                }

                let mut values = Vec::new();
                let outer_end = self.end;
                self.end = array_end;

                while self.pos < array_end {
                    values.push(self.read_value_of(element, depth + 1)?);
                }

                self.end = outer_end;

                // SAFETY: An array element sliced out of a valid signature
                // is itself a valid signature.
                let element = unsafe { Signature::new_unchecked(element) };
                Value::Array(Array::from_parts(element.to_owned(), values))
            }
            b'(' => {
                self.align(8)?;

                let mut fields = Vec::new();
                let mut inner = &sig[1..sig.len() - 1];

                while !inner.is_empty() {
                    let n = complete_type_len(inner);
                    fields.push(self.read_value_of(&inner[..n], depth + 1)?);
                    inner = &inner[n..];
                }

                Value::Struct(fields)
            }
            b'{' => {
                self.align(8)?;

                let inner = &sig[1..sig.len() - 1];
                let n = complete_type_len(inner);
                let key = self.read_value_of(&inner[..n], depth + 1)?;
                let value = self.read_value_of(&inner[n..], depth + 1)?;

                Value::DictEntry(Box::new(DictEntry::new(key, value)?))
            }
            b'v' => {
                let signature = self.load_signature()?;

                if signature.iter().count() != 1 {
                    return Err(Error::new(ErrorKind::UnsupportedVariant(
                        signature.to_owned(),
                    )));
                }

                let inner = self.read_value_of(signature.as_bytes(), depth + 1)?;
                Value::Variant(Box::new(inner))
            }
            code => {
                return Err(Error::new(ErrorKind::Signature(
                    crate::signature::SignatureError::new(
                        crate::signature::SignatureErrorKind::UnknownTypeCode(code),
                    ),
                )))
            }
        };

        Ok(value)
    }

    /// Skip over a single complete value of the given signature.
    pub(crate) fn skip(&mut self, signature: &Signature) -> Result<()> {
        self.read_value_of(signature.as_bytes(), 0)?;
        Ok(())
    }
}

impl fmt::Debug for Body<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("signature", &self.signature)
            .field("len", &self.len())
            .finish()
    }
}

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// Trait for statically typed values which can be read with a
/// [`Body::load`] call.
pub trait Load<'de>: Sized + sealed::Sealed {
    /// Read the value out of the buffer.
    #[doc(hidden)]
    fn load_from(body: &mut Body<'de>) -> Result<Self>;
}

macro_rules! impl_load {
    ($(($ty:ty, $load:ident $(, $cast:ty)?)),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl<'de> Load<'de> for $ty {
                #[inline]
                fn load_from(body: &mut Body<'de>) -> Result<Self> {
                    Ok(body.$load()? $(as $cast)?)
                }
            }
        )*
    }
}

impl_load! {
    (u8, load_byte),
    (i16, load_u16, i16),
    (u16, load_u16),
    (i32, load_u32, i32),
    (u32, load_u32),
    (i64, load_u64, i64),
    (u64, load_u64),
    (f64, load_f64),
}

impl sealed::Sealed for bool {}

impl<'de> Load<'de> for bool {
    #[inline]
    fn load_from(body: &mut Body<'de>) -> Result<Self> {
        match body.load_u32()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(Error::new(ErrorKind::InvalidBoolean(value))),
        }
    }
}

impl sealed::Sealed for &str {}

impl<'de> Load<'de> for &'de str {
    #[inline]
    fn load_from(body: &mut Body<'de>) -> Result<Self> {
        body.load_str()
    }
}

impl sealed::Sealed for &Signature {}

impl<'de> Load<'de> for &'de Signature {
    #[inline]
    fn load_from(body: &mut Body<'de>) -> Result<Self> {
        body.load_signature()
    }
}

impl sealed::Sealed for &ObjectPath {}

impl<'de> Load<'de> for &'de ObjectPath {
    #[inline]
    fn load_from(body: &mut Body<'de>) -> Result<Self> {
        let path = body.load_str()?;
        Ok(ObjectPath::new(path)?)
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::quickcheck;

    use crate::body_buf::BodyBuf;
    use crate::object_path::ObjectPathBuf;
    use crate::signature::{Signature, SignatureBuf};
    use crate::value::{Array, DictEntry, Value};
    use crate::Endianness;

    fn round_trip(value: &Value) {
        for endianness in [Endianness::Little, Endianness::Big] {
            let mut body = BodyBuf::with_endianness(endianness);
            body.store_value(value).unwrap();

            let mut read = body.as_body();
            let loaded = read.load_value().unwrap();

            assert_eq!(&loaded, value, "{endianness:?}");
            assert!(read.is_empty(), "{endianness:?}");
        }
    }

    #[test]
    fn scalar_round_trips() {
        round_trip(&Value::Byte(0xfe));
        round_trip(&Value::Boolean(true));
        round_trip(&Value::Int16(-2));
        round_trip(&Value::Uint16(0xbeef));
        round_trip(&Value::Int32(-70_000));
        round_trip(&Value::Uint32(0xdead_beef));
        round_trip(&Value::Int64(i64::MIN));
        round_trip(&Value::Uint64(u64::MAX));
        round_trip(&Value::Double(3.5));
        round_trip(&Value::String("Hello World".into()));
        round_trip(&Value::ObjectPath(ObjectPathBuf::new("/a/b").unwrap()));
        round_trip(&Value::Signature(SignatureBuf::new("a{sv}").unwrap()));
    }

    #[test]
    fn container_round_trips() {
        let mut array = Array::new(Signature::new("(is)").unwrap()).unwrap();

        for (n, s) in [(1, "one"), (2, "two")] {
            array
                .push(Value::Struct(vec![Value::Int32(n), Value::from(s)]))
                .unwrap();
        }

        round_trip(&Value::Array(array));

        let mut dict = Array::dict(Signature::STRING, Signature::VARIANT).unwrap();
        dict.push(Value::from(
            DictEntry::new(Value::from("answer"), Value::Uint32(42).into_variant()).unwrap(),
        ))
        .unwrap();

        round_trip(&Value::Array(dict));

        round_trip(&Value::Struct(vec![
            Value::Byte(1),
            Value::Struct(vec![Value::Uint64(2), Value::Double(0.5)]),
            Value::from("tail"),
        ]));

        // A dict entry outside an array is not a storable value.
        let entry = Value::from(DictEntry::new(Value::from("k"), Value::Int32(1)).unwrap());
        let mut body = BodyBuf::new();
        assert!(body.store_value(&entry).is_err());
    }

    #[test]
    fn empty_array_keeps_element_type() {
        let array = Array::new(Signature::new("a{sv}").unwrap()).unwrap();
        round_trip(&Value::Array(array));
    }

    #[test]
    fn alignment_padding_is_zeroed() {
        let mut body = BodyBuf::new();
        body.store(1u8).unwrap();
        body.store(2u32).unwrap();

        // One byte, three bytes of padding, then the u32.
        assert_eq!(body.get()[1..4], [0, 0, 0]);

        let mut corrupted = body.get().to_vec();
        corrupted[2] = 0xff;

        let mut read = crate::body::Body::new(
            &corrupted,
            Endianness::NATIVE,
            Signature::new("yu").unwrap(),
            0,
        );

        assert_eq!(read.load_value().unwrap(), Value::Byte(1));
        assert!(read.load_value().is_err());
    }

    #[test]
    fn rejects_invalid_boolean() {
        let mut body = BodyBuf::new();
        body.store(7u32).unwrap();

        let mut read = crate::body::Body::new(
            body.get(),
            Endianness::NATIVE,
            Signature::BOOLEAN,
            0,
        );

        assert!(read.load_value().is_err());
    }

    #[test]
    fn rejects_oversized_array() {
        let mut body = BodyBuf::with_endianness(Endianness::Little);
        body.store((1u32 << 26) + 1).unwrap();

        let mut read = crate::body::Body::new(
            body.get(),
            Endianness::Little,
            Signature::new("ay").unwrap(),
            0,
        );

        assert!(read.load_value().is_err());
    }

    #[test]
    fn rejects_array_longer_than_buffer() {
        let mut body = BodyBuf::with_endianness(Endianness::Little);
        body.store(1024u32).unwrap();

        let mut read = crate::body::Body::new(
            body.get(),
            Endianness::Little,
            Signature::new("ay").unwrap(),
            0,
        );

        assert!(read.load_value().is_err());
    }

    #[test]
    fn variant_depth_limits() {
        let mut value = Value::Uint32(1);

        for _ in 0..64 {
            value = value.into_variant();
        }

        let mut body = BodyBuf::new();
        body.store_value(&value).unwrap();

        let loaded = body.as_body().load_value().unwrap();
        assert_eq!(loaded, value);

        let value = value.into_variant();
        let mut body = BodyBuf::new();
        assert!(body.store_value(&value).is_err());
    }

    #[test]
    fn rejects_non_utf8_string() {
        let mut body = BodyBuf::with_endianness(Endianness::Little);
        body.store(2u32).unwrap();

        let mut bytes = body.get().to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, 0x00]);

        let mut read =
            crate::body::Body::new(&bytes, Endianness::Little, Signature::STRING, 0);

        assert!(read.load_value().is_err());
    }

    #[test]
    fn empty_string_round_trips() {
        round_trip(&Value::String(String::new()));
    }

    #[test]
    fn fd_index_validated_against_table() {
        let mut body = BodyBuf::new();
        body.store_value(&Value::UnixFd(0)).unwrap();

        // No descriptor was attached, so index zero does not resolve.
        assert!(body.as_body().load_value().is_err());
    }

    #[test]
    fn load_all_rejects_trailing_bytes() {
        let mut body = BodyBuf::new();
        body.store(1u32).unwrap();

        let mut bytes = body.get().to_vec();
        bytes.push(0xab);

        let mut read =
            crate::body::Body::new(&bytes, Endianness::NATIVE, Signature::UINT32, 0);

        assert!(read.load_all().is_err());
    }

    #[test]
    fn typed_and_value_reads_agree() {
        let mut body = BodyBuf::new();
        body.store(10u16).unwrap();
        body.store("ten").unwrap();

        let mut read = body.as_body();
        assert_eq!(read.load::<u16>().unwrap(), 10);
        assert_eq!(read.load::<&str>().unwrap(), "ten");

        let mut read = body.as_body();
        assert_eq!(read.load_value().unwrap(), Value::Uint16(10));
        assert_eq!(read.load_value().unwrap(), Value::String("ten".into()));
    }

    quickcheck! {
        fn basic_values_round_trip(a: u8, b: u64, c: i32, d: bool, s: String) -> bool {
            let mut body = BodyBuf::new();
            body.store(a).unwrap();
            body.store(b).unwrap();
            body.store(c).unwrap();
            body.store(d).unwrap();
            body.store(s.as_str()).unwrap();

            let mut read = body.as_body();

            read.load::<u8>().unwrap() == a
                && read.load::<u64>().unwrap() == b
                && read.load::<i32>().unwrap() == c
                && read.load::<bool>().unwrap() == d
                && read.load::<&str>().unwrap() == s
        }
    }
}
