//! Types for D-Bus type signatures.

#[cfg(test)]
mod tests;

pub use self::signature::Signature;
mod signature;

pub use self::signature_buf::SignatureBuf;
mod signature_buf;

pub use self::signature_error::SignatureError;
pub(crate) use self::signature_error::SignatureErrorKind;
mod signature_error;

pub(crate) use self::validation::validate;
mod validation;

pub use self::iter::Iter;
pub(crate) use self::iter::complete_type_len;
mod iter;
