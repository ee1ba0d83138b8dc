use super::{ObjectPathError, ObjectPathErrorKind};

/// Validate a D-Bus object path.
///
/// A valid path is `/` alone, or `/`-separated segments of
/// `[A-Za-z0-9_]+` with no trailing separator.
pub(crate) const fn validate(bytes: &[u8]) -> Result<(), ObjectPathError> {
    use ObjectPathErrorKind::*;

    if bytes.is_empty() {
        return Err(ObjectPathError::new(Empty));
    }

    if bytes[0] != b'/' {
        return Err(ObjectPathError::new(MissingLeadingSlash));
    }

    if bytes.len() == 1 {
        return Ok(());
    }

    let mut segment = 0usize;
    let mut n = 1usize;

    while n < bytes.len() {
        let b = bytes[n];
        n += 1;

        match b {
            b'/' => {
                if segment == 0 {
                    return Err(ObjectPathError::new(EmptySegment));
                }

                segment = 0;
            }
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' => {
                segment += 1;
            }
            b => return Err(ObjectPathError::new(InvalidCharacter(b))),
        }
    }

    if segment == 0 {
        return Err(ObjectPathError::new(TrailingSlash));
    }

    Ok(())
}
