use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use super::{validate, ObjectPath, ObjectPathError};

/// An owned D-Bus object path.
///
/// Dereferences to [`ObjectPath`].
#[derive(Clone)]
pub struct ObjectPathBuf {
    bytes: Vec<u8>,
}

impl ObjectPathBuf {
    /// Try to construct an owned object path with validation.
    pub fn new<P>(path: &P) -> Result<Self, ObjectPathError>
    where
        P: ?Sized + AsRef<[u8]>,
    {
        let path = path.as_ref();
        validate(path)?;

        Ok(Self {
            bytes: path.to_vec(),
        })
    }

    /// Construct an owned object path from a borrowed one.
    pub fn from_object_path(path: &ObjectPath) -> Self {
        Self {
            bytes: path.as_bytes().to_vec(),
        }
    }

    /// Borrow as an [`ObjectPath`].
    pub fn as_object_path(&self) -> &ObjectPath {
        // SAFETY: The bytes were validated at construction.
        unsafe { ObjectPath::new_unchecked(&self.bytes) }
    }
}

impl Deref for ObjectPathBuf {
    type Target = ObjectPath;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_object_path()
    }
}

impl Borrow<ObjectPath> for ObjectPathBuf {
    #[inline]
    fn borrow(&self) -> &ObjectPath {
        self.as_object_path()
    }
}

impl AsRef<ObjectPath> for ObjectPathBuf {
    #[inline]
    fn as_ref(&self) -> &ObjectPath {
        self.as_object_path()
    }
}

impl From<&ObjectPath> for ObjectPathBuf {
    #[inline]
    fn from(path: &ObjectPath) -> Self {
        Self::from_object_path(path)
    }
}

impl fmt::Debug for ObjectPathBuf {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_object_path().fmt(f)
    }
}

impl fmt::Display for ObjectPathBuf {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for ObjectPathBuf {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for ObjectPathBuf {}

impl Hash for ObjectPathBuf {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_object_path().hash(state);
    }
}

impl PartialEq<ObjectPath> for ObjectPathBuf {
    #[inline]
    fn eq(&self, other: &ObjectPath) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl PartialEq<&ObjectPath> for ObjectPathBuf {
    #[inline]
    fn eq(&self, other: &&ObjectPath) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl PartialEq<str> for ObjectPathBuf {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.bytes == other.as_bytes()
    }
}

impl PartialEq<&str> for ObjectPathBuf {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.bytes == other.as_bytes()
    }
}
