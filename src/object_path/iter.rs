use std::str::from_utf8_unchecked;

use super::ObjectPath;

/// An iterator over the segments of an [`ObjectPath`].
///
/// Constructed through [`ObjectPath::iter`].
pub struct Iter<'a> {
    rest: &'a [u8],
}

impl<'a> Iter<'a> {
    pub(super) fn new(path: &'a ObjectPath) -> Self {
        // Skip the leading slash; the root path has no segments.
        Self {
            rest: &path.as_bytes()[1..],
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        let segment = match self.rest.iter().position(|&b| b == b'/') {
            Some(n) => {
                let (head, rest) = self.rest.split_at(n);
                self.rest = &rest[1..];
                head
            }
            None => {
                let head = self.rest;
                self.rest = &[];
                head
            }
        };

        // SAFETY: Validation ensures that segments are ASCII.
        Some(unsafe { from_utf8_unchecked(segment) })
    }
}
