//! Zero-copy view over a region of items and its boundary offsets.

use crate::offsets::{offset_vector_len, read_offset};

/// How item boundaries inside a [`SlicedBuffer`] are located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offsets<'a> {
    /// Encoded `u16` offset vector, first (zero) offset omitted.
    Encoded(&'a [u8]),
    /// Every item is exactly `stride` bytes long (address arrays).
    Stride(usize),
}

/// A byte region plus the offsets needed for O(1) indexed item access.
///
/// Item `i` occupies `buf[offset(i)..offset(i + 1)]`, where `offset(0)` is
/// zero and `offset(len)` is `buf.len()`.
///
/// # Invariants
/// - For encoded offsets: `offset_vector_len == len() - 1` when non-empty
/// - Offsets are non-decreasing and never exceed `buf.len()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlicedBuffer<'a> {
    buf: &'a [u8],
    offsets: Offsets<'a>,
    count: usize,
}

impl<'a> SlicedBuffer<'a> {
    /// View over variable-length items with an encoded offset vector.
    ///
    /// An empty region with an empty vector is read as zero items. Use
    /// [`SlicedBuffer::with_count`] when a lone zero-length item is possible.
    #[must_use]
    pub const fn new(buf: &'a [u8], offsets: &'a [u8]) -> Self {
        let count = if buf.is_empty() && offsets.is_empty() {
            0
        } else {
            offset_vector_len(offsets) + 1
        };
        Self::with_count(buf, offsets, count)
    }

    /// View over variable-length items whose count is known from elsewhere
    /// in the node.
    #[must_use]
    pub const fn with_count(buf: &'a [u8], offsets: &'a [u8], count: usize) -> Self {
        Self {
            buf,
            offsets: Offsets::Encoded(offsets),
            count,
        }
    }

    /// View over fixed-width items.
    ///
    /// # Panics
    /// Panics if `stride` is zero.
    #[must_use]
    pub fn with_stride(buf: &'a [u8], stride: usize) -> Self {
        assert!(stride > 0, "stride must be positive");
        Self {
            buf,
            offsets: Offsets::Stride(stride),
            count: buf.len() / stride,
        }
    }

    /// An empty view.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            buf: &[],
            offsets: Offsets::Encoded(&[]),
            count: 0,
        }
    }

    /// The concatenated item bytes.
    #[must_use]
    pub const fn buf(&self) -> &'a [u8] {
        self.buf
    }

    /// The boundary representation.
    #[must_use]
    pub const fn offsets(&self) -> Offsets<'a> {
        self.offsets
    }

    /// Number of items.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Whether the view holds no items.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start offset of item `index`; `offset(len())` is `buf.len()`.
    ///
    /// # Panics
    /// Panics if `index > len()`.
    #[must_use]
    pub fn offset(&self, index: usize) -> usize {
        let len = self.len();
        assert!(index <= len, "offset index {index} out of bounds ({len})");
        if index == 0 {
            return 0;
        }
        if index == len {
            return self.buf.len();
        }
        match self.offsets {
            Offsets::Encoded(vector) => read_offset(vector, index - 1),
            Offsets::Stride(stride) => index * stride,
        }
    }

    /// Item `index`, or `None` if out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        if index >= self.len() {
            return None;
        }
        let start = self.offset(index);
        let stop = self.offset(index + 1);
        Some(&self.buf[start..stop])
    }

    /// Iterate over items in order.
    #[must_use]
    pub const fn iter(&self) -> Items<'a> {
        Items {
            view: *self,
            next: 0,
        }
    }

    /// Copy every item into an owned vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Vec<u8>> {
        self.iter().map(<[u8]>::to_vec).collect()
    }
}

impl<'a> IntoIterator for SlicedBuffer<'a> {
    type Item = &'a [u8];
    type IntoIter = Items<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the items of a [`SlicedBuffer`].
#[derive(Debug, Clone)]
pub struct Items<'a> {
    view: SlicedBuffer<'a>,
    next: usize,
}

impl<'a> Iterator for Items<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.view.get(self.next)?;
        self.next += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.view.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Items<'_> {}
