//! Offset-vector codec shared by the key and value item regions.
//!
//! Items are stored back to back. Their boundaries are stored separately as a
//! vector of little-endian `u16` start offsets, one per item except the first
//! (whose start is always zero). The end of the last item is the end of the
//! item region.
//!
//! ```text
//! items:   [ "ab" | "c" | "def" ]      -> b"abcdef"
//! offsets: [ 2, 3 ]                    -> 02 00 03 00
//! ```
//!
//! # Invariants
//!
//! - `offset_vector_len == item_count - 1` for a non-empty item list
//! - Offsets are non-decreasing and never exceed the item region length
//! - An item region never exceeds `MAX_REGION_SIZE` bytes

// Region sizes are checked against u16::MAX before narrowing.
#![allow(clippy::cast_possible_truncation)]

/// Width of one stored offset in bytes.
pub const OFFSET_SIZE: usize = 2;

/// Largest item region addressable by a `u16` offset.
pub const MAX_REGION_SIZE: usize = u16::MAX as usize;

/// Total byte length of a collection of items.
#[must_use]
pub fn estimate_items_size<T: AsRef<[u8]>>(items: &[T]) -> usize {
    items.iter().map(|item| item.as_ref().len()).sum()
}

/// Byte length of the offset vector for `item_count` items.
#[must_use]
pub const fn offset_vector_size(item_count: usize) -> usize {
    item_count.saturating_sub(1) * OFFSET_SIZE
}

/// Append item bytes back to back.
///
/// # Post-conditions
/// - `out` grew by exactly `estimate_items_size(items)` bytes
pub fn write_items<T: AsRef<[u8]>>(out: &mut Vec<u8>, items: &[T]) {
    for item in items {
        out.extend_from_slice(item.as_ref());
    }
}

/// Append the offset vector for `items`.
///
/// # Panics
/// Panics if the items do not fit in a region addressable by `u16` offsets.
pub fn write_offsets<T: AsRef<[u8]>>(out: &mut Vec<u8>, items: &[T]) {
    let mut offset = 0usize;
    for item in items.iter().take(items.len().saturating_sub(1)) {
        offset += item.as_ref().len();
        assert!(
            offset <= MAX_REGION_SIZE,
            "item region overflows u16 offsets: {offset} bytes"
        );
        out.extend_from_slice(&(offset as u16).to_le_bytes());
    }
}

/// Number of entries in an encoded offset vector.
#[must_use]
pub const fn offset_vector_len(vector: &[u8]) -> usize {
    vector.len() / OFFSET_SIZE
}

/// Read entry `index` of an encoded offset vector.
#[must_use]
pub fn read_offset(vector: &[u8], index: usize) -> usize {
    let at = index * OFFSET_SIZE;
    u16::from_le_bytes([vector[at], vector[at + 1]]) as usize
}

/// Check that an encoded offset vector is well formed for a region of
/// `region_len` bytes.
///
/// Returns the index of the first bad entry on failure.
pub fn validate_offsets(vector: &[u8], region_len: usize) -> Result<(), usize> {
    if vector.len() % OFFSET_SIZE != 0 {
        return Err(offset_vector_len(vector));
    }
    let mut previous = 0;
    for index in 0..offset_vector_len(vector) {
        let offset = read_offset(vector, index);
        if offset < previous || offset > region_len {
            return Err(index);
        }
        previous = offset;
    }
    Ok(())
}
