//! The runtime-typed D-Bus value model.

use crate::error::{Error, ErrorKind, Result};
use crate::object_path::ObjectPathBuf;
use crate::proto::Type;
use crate::signature::{validate, Signature, SignatureBuf, SignatureError, SignatureErrorKind};

/// A single D-Bus value of any type.
///
/// A value always knows its own signature, so the codec can marshal it
/// without an externally supplied type.
///
/// # Examples
///
/// ```
/// use dbus_sync::{Signature, Value};
///
/// let value = Value::from(10u32);
/// assert_eq!(value.signature()?, Signature::UINT32);
/// assert_eq!(value.as_u32()?, 10);
/// assert!(value.as_str().is_err());
/// # Ok::<_, anyhow::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A single byte, `y`.
    Byte(u8),
    /// A boolean, `b`.
    Boolean(bool),
    /// Signed 16-bit integer, `n`.
    Int16(i16),
    /// Unsigned 16-bit integer, `q`.
    Uint16(u16),
    /// Signed 32-bit integer, `i`.
    Int32(i32),
    /// Unsigned 32-bit integer, `u`.
    Uint32(u32),
    /// Signed 64-bit integer, `x`.
    Int64(i64),
    /// Unsigned 64-bit integer, `t`.
    Uint64(u64),
    /// Double-precision floating point, `d`.
    Double(f64),
    /// A string, `s`.
    String(String),
    /// An object path, `o`.
    ObjectPath(ObjectPathBuf),
    /// A signature, `g`.
    Signature(SignatureBuf),
    /// An index into the file descriptor table of the containing message,
    /// `h`.
    UnixFd(u32),
    /// An array of values sharing one element type, `a`.
    Array(Array),
    /// An ordered sequence of values, `(`..`)`.
    Struct(Vec<Value>),
    /// A key-value pair, only valid as an array element, `{`..`}`.
    DictEntry(Box<DictEntry>),
    /// A value carrying its own signature, `v`.
    Variant(Box<Value>),
}

impl Value {
    /// The type code of the value.
    pub fn ty(&self) -> Type {
        match self {
            Value::Byte(..) => Type::BYTE,
            Value::Boolean(..) => Type::BOOLEAN,
            Value::Int16(..) => Type::INT16,
            Value::Uint16(..) => Type::UINT16,
            Value::Int32(..) => Type::INT32,
            Value::Uint32(..) => Type::UINT32,
            Value::Int64(..) => Type::INT64,
            Value::Uint64(..) => Type::UINT64,
            Value::Double(..) => Type::DOUBLE,
            Value::String(..) => Type::STRING,
            Value::ObjectPath(..) => Type::OBJECT_PATH,
            Value::Signature(..) => Type::SIGNATURE,
            Value::UnixFd(..) => Type::UNIX_FD,
            Value::Array(..) => Type::ARRAY,
            Value::Struct(..) => Type::STRUCT,
            Value::DictEntry(..) => Type::DICT_ENTRY,
            Value::Variant(..) => Type::VARIANT,
        }
    }

    /// The signature of the value.
    ///
    /// Errors if the value cannot be expressed as a signature, such as an
    /// empty struct or a combined signature exceeding 255 bytes.
    pub fn signature(&self) -> Result<SignatureBuf, SignatureError> {
        let mut bytes = Vec::new();
        self.append_signature(&mut bytes)?;

        // A dict entry is only a valid signature inside an array, so it is
        // validated in that context and returned as the bare entry.
        if let Value::DictEntry(..) = self {
            let mut wrapped = Vec::with_capacity(bytes.len() + 1);
            wrapped.push(b'a');
            wrapped.extend_from_slice(&bytes);
            validate(&wrapped)?;

            // SAFETY: The array form was just validated.
            return Ok(unsafe { SignatureBuf::from_vec_unchecked(bytes) });
        }

        SignatureBuf::new(&bytes)
    }

    fn append_signature(&self, out: &mut Vec<u8>) -> Result<(), SignatureError> {
        match self {
            Value::Array(array) => {
                out.push(b'a');
                out.extend_from_slice(array.element().as_bytes());
            }
            Value::Struct(fields) => {
                if fields.is_empty() {
                    return Err(SignatureError::new(SignatureErrorKind::StructHasNoFields));
                }

                out.push(b'(');

                for field in fields {
                    field.append_signature(out)?;
                }

                out.push(b')');
            }
            Value::DictEntry(entry) => {
                out.push(b'{');
                entry.key().append_signature(out)?;
                entry.value().append_signature(out)?;
                out.push(b'}');
            }
            value => out.push(value.ty().code()),
        }

        Ok(())
    }

    fn mismatch(&self, expected: Type) -> Error {
        Error::new(ErrorKind::TypeMismatch {
            expected,
            found: self.ty(),
        })
    }

    /// Extract a byte.
    pub fn as_byte(&self) -> Result<u8> {
        match *self {
            Value::Byte(value) => Ok(value),
            ref value => Err(value.mismatch(Type::BYTE)),
        }
    }

    /// Extract a boolean.
    pub fn as_bool(&self) -> Result<bool> {
        match *self {
            Value::Boolean(value) => Ok(value),
            ref value => Err(value.mismatch(Type::BOOLEAN)),
        }
    }

    /// Extract a signed 16-bit integer.
    pub fn as_i16(&self) -> Result<i16> {
        match *self {
            Value::Int16(value) => Ok(value),
            ref value => Err(value.mismatch(Type::INT16)),
        }
    }

    /// Extract an unsigned 16-bit integer.
    pub fn as_u16(&self) -> Result<u16> {
        match *self {
            Value::Uint16(value) => Ok(value),
            ref value => Err(value.mismatch(Type::UINT16)),
        }
    }

    /// Extract a signed 32-bit integer.
    pub fn as_i32(&self) -> Result<i32> {
        match *self {
            Value::Int32(value) => Ok(value),
            ref value => Err(value.mismatch(Type::INT32)),
        }
    }

    /// Extract an unsigned 32-bit integer.
    pub fn as_u32(&self) -> Result<u32> {
        match *self {
            Value::Uint32(value) => Ok(value),
            ref value => Err(value.mismatch(Type::UINT32)),
        }
    }

    /// Extract a signed 64-bit integer.
    pub fn as_i64(&self) -> Result<i64> {
        match *self {
            Value::Int64(value) => Ok(value),
            ref value => Err(value.mismatch(Type::INT64)),
        }
    }

    /// Extract an unsigned 64-bit integer.
    pub fn as_u64(&self) -> Result<u64> {
        match *self {
            Value::Uint64(value) => Ok(value),
            ref value => Err(value.mismatch(Type::UINT64)),
        }
    }

    /// Extract a double.
    pub fn as_f64(&self) -> Result<f64> {
        match *self {
            Value::Double(value) => Ok(value),
            ref value => Err(value.mismatch(Type::DOUBLE)),
        }
    }

    /// Extract a string.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::String(value) => Ok(value),
            value => Err(value.mismatch(Type::STRING)),
        }
    }

    /// Extract an object path.
    pub fn as_object_path(&self) -> Result<&ObjectPathBuf> {
        match self {
            Value::ObjectPath(value) => Ok(value),
            value => Err(value.mismatch(Type::OBJECT_PATH)),
        }
    }

    /// Extract a signature.
    pub fn as_signature(&self) -> Result<&SignatureBuf> {
        match self {
            Value::Signature(value) => Ok(value),
            value => Err(value.mismatch(Type::SIGNATURE)),
        }
    }

    /// Extract a file descriptor index.
    pub fn as_fd_index(&self) -> Result<u32> {
        match *self {
            Value::UnixFd(value) => Ok(value),
            ref value => Err(value.mismatch(Type::UNIX_FD)),
        }
    }

    /// Extract an array.
    pub fn as_array(&self) -> Result<&Array> {
        match self {
            Value::Array(value) => Ok(value),
            value => Err(value.mismatch(Type::ARRAY)),
        }
    }

    /// Extract the fields of a struct.
    pub fn as_struct(&self) -> Result<&[Value]> {
        match self {
            Value::Struct(fields) => Ok(fields),
            value => Err(value.mismatch(Type::STRUCT)),
        }
    }

    /// Extract a dict entry.
    pub fn as_dict_entry(&self) -> Result<&DictEntry> {
        match self {
            Value::DictEntry(entry) => Ok(entry),
            value => Err(value.mismatch(Type::DICT_ENTRY)),
        }
    }

    /// Extract the value inside a variant.
    pub fn as_variant(&self) -> Result<&Value> {
        match self {
            Value::Variant(value) => Ok(value),
            value => Err(value.mismatch(Type::VARIANT)),
        }
    }

    /// Wrap the value in a variant.
    pub fn into_variant(self) -> Value {
        Value::Variant(Box::new(self))
    }
}

/// An array of values sharing one element type.
///
/// The element signature is part of the array, so an empty array still
/// marshals with the correct type.
///
/// # Examples
///
/// ```
/// use dbus_sync::{Array, Signature, Value};
///
/// let mut array = Array::new(Signature::INT32)?;
/// array.push(Value::Int32(1))?;
/// array.push(Value::Int32(2))?;
/// assert!(array.push(Value::String("no".into())).is_err());
/// assert_eq!(array.len(), 2);
/// # Ok::<_, anyhow::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    element: SignatureBuf,
    values: Vec<Value>,
}

impl Array {
    /// Construct a new empty array with the given element signature.
    ///
    /// The signature must contain exactly one complete type.
    pub fn new(element: &Signature) -> Result<Self> {
        if element.iter().count() != 1 {
            return Err(Error::new(ErrorKind::Signature(SignatureError::new(
                SignatureErrorKind::MissingArrayElementType,
            ))));
        }

        Ok(Self {
            element: element.to_owned(),
            values: Vec::new(),
        })
    }

    /// Construct a new empty array of dict entries with the given key and
    /// value signatures.
    ///
    /// A dict-entry signature cannot be spelled on its own, so this is the
    /// construction path for dictionaries.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_sync::{Array, DictEntry, Signature, Value};
    ///
    /// let mut dict = Array::dict(Signature::STRING, Signature::VARIANT)?;
    /// dict.push(Value::from(DictEntry::new(
    ///     Value::from("answer"),
    ///     Value::Uint32(42).into_variant(),
    /// )?))?;
    ///
    /// assert_eq!(Value::from(dict).signature()?, "a{sv}");
    /// # Ok::<_, anyhow::Error>(())
    /// ```
    pub fn dict(key: &Signature, value: &Signature) -> Result<Self> {
        let mut bytes = Vec::with_capacity(key.len() + value.len() + 2);
        bytes.push(b'{');
        bytes.extend_from_slice(key.as_bytes());
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(b'}');

        let mut wrapped = Vec::with_capacity(bytes.len() + 1);
        wrapped.push(b'a');
        wrapped.extend_from_slice(&bytes);
        validate(&wrapped).map_err(Error::from)?;

        Ok(Self {
            // SAFETY: The array form was just validated.
            element: unsafe { SignatureBuf::from_vec_unchecked(bytes) },
            values: Vec::new(),
        })
    }

    pub(crate) fn from_parts(element: SignatureBuf, values: Vec<Value>) -> Self {
        Self { element, values }
    }

    /// The element signature of the array.
    pub fn element(&self) -> &Signature {
        &self.element
    }

    /// Append a value, which must match the element signature.
    pub fn push(&mut self, value: Value) -> Result<()> {
        let signature = value.signature()?;

        if signature != self.element {
            return Err(Error::new(ErrorKind::BodySignatureMismatch {
                expected: self.element.clone(),
                found: signature,
            }));
        }

        self.values.push(value);
        Ok(())
    }

    /// The values of the array.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The number of elements in the array.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Test if the array is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over the values of the array.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }
}

impl<'a> IntoIterator for &'a Array {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// A key-value pair, only valid as the element of an array.
#[derive(Debug, Clone, PartialEq)]
pub struct DictEntry {
    key: Value,
    value: Value,
}

impl DictEntry {
    /// Construct a new dict entry.
    ///
    /// The key must be a basic type.
    pub fn new(key: Value, value: Value) -> Result<Self> {
        if !key.ty().is_basic() {
            return Err(Error::new(ErrorKind::Signature(SignatureError::new(
                SignatureErrorKind::DictKeyMustBeBasicType,
            ))));
        }

        Ok(Self { key, value })
    }

    /// The key of the entry.
    pub fn key(&self) -> &Value {
        &self.key
    }

    /// The value of the entry.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

macro_rules! impl_from {
    ($($from:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$from> for Value {
                #[inline]
                fn from(value: $from) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    }
}

impl_from! {
    u8 => Byte,
    bool => Boolean,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f64 => Double,
    String => String,
    ObjectPathBuf => ObjectPath,
    SignatureBuf => Signature,
    Array => Array,
}

impl From<&str> for Value {
    #[inline]
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<DictEntry> for Value {
    #[inline]
    fn from(entry: DictEntry) -> Self {
        Value::DictEntry(Box::new(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures() {
        assert_eq!(Value::from(1u8).signature().unwrap(), "y");
        assert_eq!(
            Value::Struct(vec![Value::Int32(1), Value::from("s")])
                .signature()
                .unwrap(),
            "(is)"
        );
        assert_eq!(
            Value::from(1u32).into_variant().signature().unwrap(),
            "v"
        );

        let array = Array::new(Signature::new("a{sv}").unwrap()).unwrap();
        assert_eq!(Value::from(array).signature().unwrap(), "aa{sv}");

        assert!(Value::Struct(Vec::new()).signature().is_err());
    }

    #[test]
    fn extraction() {
        let value = Value::from(42u32);
        assert_eq!(value.as_u32().unwrap(), 42);
        assert!(value.as_i32().is_err());
        assert!(value.as_str().is_err());

        let value = Value::from("hello");
        assert_eq!(value.as_str().unwrap(), "hello");
    }

    #[test]
    fn array_element_enforced() {
        let mut array = Array::new(Signature::STRING).unwrap();
        array.push(Value::from("a")).unwrap();
        assert!(array.push(Value::Int32(1)).is_err());
        assert!(Array::new(Signature::new("ii").unwrap()).is_err());
        assert!(Array::new(Signature::EMPTY).is_err());
    }

    #[test]
    fn dict_key_must_be_basic() {
        assert!(DictEntry::new(Value::from("k"), Value::Int32(1)).is_ok());
        assert!(DictEntry::new(Value::Struct(vec![Value::Int32(1)]), Value::Int32(1)).is_err());
    }

    #[test]
    fn deep_equality() {
        let a = Value::Struct(vec![
            Value::from(1u32),
            Value::from("x").into_variant(),
        ]);
        let b = Value::Struct(vec![
            Value::from(1u32),
            Value::from("x").into_variant(),
        ]);
        assert_eq!(a, b);

        let c = Value::Struct(vec![
            Value::from(2u32),
            Value::from("x").into_variant(),
        ]);
        assert_ne!(a, c);
    }
}
