//! Content addresses referenced by tree nodes.
//!
//! An address is a fixed-width hash naming either a child node's message or
//! an out-of-line value chunk in the content-addressed store. The codec never
//! interprets the bytes; it only needs their width to slice them out of a
//! node.

/// Default address width in bytes.
pub const DEFAULT_ADDRESS_WIDTH: u8 = 20;

/// A borrowed content address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address<'a>(&'a [u8]);

impl<'a> Address<'a> {
    /// Wrap raw address bytes.
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self(bytes)
    }

    /// The raw address bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.0
    }

    /// Width of the address in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the address has zero width.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy the address into an owned buffer.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl AsRef<[u8]> for Address<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0
    }
}

impl std::fmt::Display for Address<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
