use crate::proto::MAX_SIGNATURE_LENGTH;

use super::{SignatureError, SignatureErrorKind};

/// The maximum container nesting validation will accept.
pub(crate) const MAX_NESTING: usize = 64;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Array,
    Struct,
    Dict,
}

/// Validate a D-Bus signature.
///
/// This is a `const fn` so that signatures can be checked in constant
/// contexts, see [`Signature::new_const`].
///
/// [`Signature::new_const`]: super::Signature::new_const
#[allow(clippy::manual_range_contains)]
pub(crate) const fn validate(bytes: &[u8]) -> Result<(), SignatureError> {
    use SignatureErrorKind::*;

    if bytes.len() > MAX_SIGNATURE_LENGTH {
        return Err(SignatureError::new(SignatureTooLong));
    }

    // Stack of open containers and the number of complete types seen so far
    // inside each.
    let mut stack = [(Kind::Struct, 0u8); MAX_NESTING];
    let mut depth = 0usize;
    let mut n = 0usize;

    while n < bytes.len() {
        let b = bytes[n];
        n += 1;

        let mut is_basic = match b {
            b'y' | b'b' | b'n' | b'q' | b'i' | b'u' | b'x' | b't' | b'd' | b's' | b'o' | b'g'
            | b'h' => true,
            b'v' => false,
            b'a' => {
                if depth == MAX_NESTING {
                    return Err(SignatureError::new(ExceededMaximumNesting));
                }

                stack[depth] = (Kind::Array, 0);
                depth += 1;
                continue;
            }
            b'(' => {
                if depth == MAX_NESTING {
                    return Err(SignatureError::new(ExceededMaximumNesting));
                }

                stack[depth] = (Kind::Struct, 0);
                depth += 1;
                continue;
            }
            b')' => {
                if depth == 0 {
                    return Err(SignatureError::new(StructEndedButNotStarted));
                }

                depth -= 1;

                let fields = match stack[depth] {
                    (Kind::Struct, fields) => fields,
                    (Kind::Array, _) => {
                        return Err(SignatureError::new(MissingArrayElementType));
                    }
                    _ => {
                        return Err(SignatureError::new(StructEndedButNotStarted));
                    }
                };

                if fields == 0 {
                    return Err(SignatureError::new(StructHasNoFields));
                }

                false
            }
            b'{' => {
                if depth == MAX_NESTING {
                    return Err(SignatureError::new(ExceededMaximumNesting));
                }

                stack[depth] = (Kind::Dict, 0);
                depth += 1;
                continue;
            }
            b'}' => {
                if depth == 0 {
                    return Err(SignatureError::new(DictEndedButNotStarted));
                }

                depth -= 1;

                let fields = match stack[depth] {
                    (Kind::Dict, fields) => fields,
                    (Kind::Array, _) => {
                        return Err(SignatureError::new(MissingArrayElementType));
                    }
                    _ => {
                        return Err(SignatureError::new(DictEndedButNotStarted));
                    }
                };

                match fields {
                    0 => return Err(SignatureError::new(DictEntryHasNoFields)),
                    1 => return Err(SignatureError::new(DictEntryHasOnlyOneField)),
                    2 => {}
                    _ => return Err(SignatureError::new(DictEntryHasTooManyFields)),
                }

                if depth == 0 || !matches!(stack[depth - 1], (Kind::Array, _)) {
                    return Err(SignatureError::new(DictEntryNotInsideArray));
                }

                false
            }
            b => return Err(SignatureError::new(UnknownTypeCode(b))),
        };

        // A complete type closes every array it is the element of.
        while depth > 0 && matches!(stack[depth - 1], (Kind::Array, _)) {
            depth -= 1;
            is_basic = false;
        }

        if depth > 0 {
            let (kind, fields) = stack[depth - 1];

            if matches!(kind, Kind::Dict) && fields == 0 && !is_basic {
                return Err(SignatureError::new(DictKeyMustBeBasicType));
            }

            stack[depth - 1] = (kind, fields + 1);
        }
    }

    if depth > 0 {
        return match stack[depth - 1] {
            (Kind::Array, _) => Err(SignatureError::new(MissingArrayElementType)),
            (Kind::Struct, _) => Err(SignatureError::new(StructStartedButNotEnded)),
            (Kind::Dict, _) => Err(SignatureError::new(DictStartedButNotEnded)),
        };
    }

    Ok(())
}
