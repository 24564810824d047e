//! Node encoder.
//!
//! Turns the item collections produced by the tree builder into a finalized
//! [`Message`]. Encoding runs in two passes: a pure size estimate over item
//! lengths, then a single write into a pooled scratch buffer sized from that
//! estimate. The finished bytes are copied out into an immutable, shared
//! buffer and the scratch buffer goes back to the pool on every exit path.
//!
//! # Caller contract
//!
//! - Keys are in strictly ascending byte order (not checked)
//! - Leaf nodes: one value per key; `subtrees` is ignored
//! - Internal nodes: one address per key, each exactly `address_width`
//!   bytes, and one subtree count per key
//! - A non-empty key collection has at least one non-empty key
//!
//! Violations panic. Only pool exhaustion is reported as an error.

// Region sizes are bounded by u16 offsets and the pool's max buffer size.
#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;

use crate::address::DEFAULT_ADDRESS_WIDTH;
use crate::buffer_pool::BufferPool;
use crate::config::CodecConfig;
use crate::message::{
    FILE_ID, FORMAT_VERSION, HEADER_SIZE, ItemType, Message, REGION_COUNT, Region,
    SUBTREE_COUNT_SIZE, compute_checksum, fields, write_region,
};
use crate::offsets::{
    MAX_REGION_SIZE, OFFSET_SIZE, estimate_items_size, offset_vector_size, write_items,
    write_offsets,
};

/// Location of a content address embedded in a leaf value.
///
/// Marks value `item` as (partly) stored out of line: the bytes
/// `values[item][offset..offset + address_width]` name the chunk holding the
/// rest of the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueAddressRef {
    /// Index of the value item.
    pub item: usize,
    /// Byte offset of the address inside the value item.
    pub offset: usize,
}

impl ValueAddressRef {
    /// Reference an address at `offset` inside value `item`.
    #[must_use]
    pub const fn new(item: usize, offset: usize) -> Self {
        Self { item, offset }
    }
}

/// Byte sizes of every region, computed before any bytes are written.
#[derive(Debug, Clone, Copy, Default)]
struct SizeEstimate {
    key_items: usize,
    key_offsets: usize,
    value_items: usize,
    value_offsets: usize,
    address_array: usize,
    subtree_counts: usize,
    value_address_offsets: usize,
}

impl SizeEstimate {
    const fn total(&self) -> usize {
        HEADER_SIZE
            + self.key_items
            + self.key_offsets
            + self.value_items
            + self.value_offsets
            + self.address_array
            + self.subtree_counts
            + self.value_address_offsets
    }
}

/// Serializes tree nodes into messages using a shared buffer pool.
///
/// Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct NodeEncoder {
    pool: Arc<BufferPool>,
    address_width: u8,
}

impl NodeEncoder {
    /// Create an encoder using the default address width.
    #[must_use]
    pub const fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            pool,
            address_width: DEFAULT_ADDRESS_WIDTH,
        }
    }

    /// Create an encoder from a codec configuration.
    #[must_use]
    pub const fn with_config(pool: Arc<BufferPool>, config: &CodecConfig) -> Self {
        Self {
            pool,
            address_width: config.address_width,
        }
    }

    /// Use a different address width.
    ///
    /// # Panics
    /// Panics if `address_width` is 0.
    #[must_use]
    pub fn with_address_width(mut self, address_width: u8) -> Self {
        assert!(address_width > 0, "address width must be positive");
        self.address_width = address_width;
        self
    }

    /// Width of the addresses this encoder writes.
    #[must_use]
    pub const fn address_width(&self) -> u8 {
        self.address_width
    }

    /// The pool scratch buffers are leased from.
    #[must_use]
    pub const fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Serialize one node.
    ///
    /// For `level == 0`, `values` are the value items. For `level > 0`,
    /// `values` are child addresses and `subtrees` their subtree counts.
    ///
    /// # Errors
    /// Returns an error if no scratch buffer can be leased.
    ///
    /// # Panics
    /// Panics if the caller contract is violated:
    /// - `keys` and `values` differ in length, or there are more than
    ///   `u16::MAX` keys
    /// - `keys` is non-empty but every key is empty; a lone `b""` key is
    ///   rejected because an empty key region decodes as zero items
    /// - internal nodes: an address is not `address_width` bytes, `subtrees`
    ///   differs in length from `keys`, or the subtree counts overflow `u64`
    /// - an item region overflows the `u16` offset range
    pub fn encode<K, V>(
        &self,
        keys: &[K],
        values: &[V],
        level: u8,
        subtrees: &[u64],
    ) -> Result<Message, EncodeError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        self.serialize(keys, values, level, subtrees, &[])
    }

    /// Serialize a leaf node whose values embed content addresses.
    ///
    /// # Errors
    /// Returns an error if no scratch buffer can be leased.
    ///
    /// # Panics
    /// Panics on the same caller contract violations as
    /// [`NodeEncoder::encode`], including a lone empty key, or if a reference
    /// points outside its value item or past the `u16` offset range.
    pub fn encode_leaf_with_value_addresses<K, V>(
        &self,
        keys: &[K],
        values: &[V],
        value_addresses: &[ValueAddressRef],
    ) -> Result<Message, EncodeError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        self.serialize(keys, values, 0, &[], value_addresses)
    }

    fn serialize<K, V>(
        &self,
        keys: &[K],
        values: &[V],
        level: u8,
        subtrees: &[u64],
        value_addresses: &[ValueAddressRef],
    ) -> Result<Message, EncodeError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let tree_count = self.check_contract(keys, values, level, subtrees);

        let sizes = self.estimate_buffer_size(keys, values, level, value_addresses.len());
        let size = sizes.total();
        let Some(mut buf) = self.pool.lease_scratch(size) else {
            return Err(self.lease_error(size));
        };

        let out: &mut Vec<u8> = &mut buf;
        // Header placeholder, filled in once region positions are known.
        out.resize(HEADER_SIZE, 0);
        let mut regions = [(0usize, 0usize); REGION_COUNT];

        // serialize keys and offsets
        append_region(out, &mut regions, Region::KeyItems, |b| write_items(b, keys));
        append_region(out, &mut regions, Region::KeyOffsets, |b| write_offsets(b, keys));

        if level == 0 {
            // serialize value items for leaf nodes
            append_region(out, &mut regions, Region::ValueItems, |b| write_items(b, values));
            append_region(out, &mut regions, Region::ValueOffsets, |b| {
                write_offsets(b, values);
            });
            append_region(out, &mut regions, Region::ValueAddressOffsets, |b| {
                self.write_value_address_offsets(b, values, value_addresses);
            });
        } else {
            // serialize child addresses and subtree counts for internal nodes
            append_region(out, &mut regions, Region::AddressArray, |b| write_items(b, values));
            append_region(out, &mut regions, Region::SubtreeCounts, |b| {
                write_count_array(b, subtrees);
            });
        }
        debug_assert_eq!(out.len(), size, "size estimate disagrees with encoding");

        for (region, (start, len)) in Region::ALL.into_iter().zip(regions) {
            write_region(out, region, start, len);
        }
        out[fields::FILE_ID..fields::FILE_ID + 4].copy_from_slice(&FILE_ID);
        out[fields::FORMAT_VERSION] = FORMAT_VERSION;
        out[fields::KEY_TYPE] = ItemType::TupleFormatAlpha as u8;
        out[fields::VALUE_TYPE] = ItemType::TupleFormatAlpha as u8;
        out[fields::TREE_LEVEL] = level;
        out[fields::ADDRESS_WIDTH] = self.address_width;
        out[fields::TREE_COUNT..fields::TREE_COUNT + 8].copy_from_slice(&tree_count.to_le_bytes());
        let checksum = compute_checksum(out);
        out[fields::CHECKSUM..fields::CHECKSUM + 4].copy_from_slice(&checksum.to_le_bytes());

        tracing::trace!(
            level,
            items = keys.len(),
            tree_count,
            size,
            "encoded node"
        );

        Ok(Message::from_encoded(Arc::from(out.as_slice())))
    }

    /// Check the caller contract before anything is leased and return the
    /// node's tree count.
    fn check_contract<K, V>(
        &self,
        keys: &[K],
        values: &[V],
        level: u8,
        subtrees: &[u64],
    ) -> u64
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        assert!(
            keys.len() <= usize::from(u16::MAX),
            "too many keys for one node: {}",
            keys.len()
        );
        assert!(
            keys.is_empty() || keys.iter().any(|k| !k.as_ref().is_empty()),
            "a non-empty node needs at least one non-empty key"
        );
        assert_eq!(
            keys.len(),
            values.len(),
            "key and value counts differ: {} keys, {} values",
            keys.len(),
            values.len()
        );
        if level > 0 {
            assert_eq!(
                keys.len(),
                subtrees.len(),
                "key and subtree counts differ: {} keys, {} subtrees",
                keys.len(),
                subtrees.len()
            );
            let width = usize::from(self.address_width);
            for (i, address) in values.iter().enumerate() {
                assert_eq!(
                    address.as_ref().len(),
                    width,
                    "child address {i} is not {width} bytes"
                );
            }
            let Some(tree_count) = sum_subtrees(subtrees) else {
                panic!("subtree counts overflow u64");
            };
            tree_count
        } else {
            keys.len() as u64
        }
    }

    /// Size of every region, from item lengths alone.
    fn estimate_buffer_size<K, V>(
        &self,
        keys: &[K],
        values: &[V],
        level: u8,
        value_address_count: usize,
    ) -> SizeEstimate
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut sizes = SizeEstimate {
            key_items: estimate_items_size(keys),
            key_offsets: offset_vector_size(keys.len()),
            ..SizeEstimate::default()
        };
        if level == 0 {
            sizes.value_items = estimate_items_size(values);
            sizes.value_offsets = offset_vector_size(values.len());
            sizes.value_address_offsets = value_address_count * OFFSET_SIZE;
        } else {
            sizes.address_array = values.len() * usize::from(self.address_width);
            sizes.subtree_counts = values.len() * SUBTREE_COUNT_SIZE;
        }
        sizes
    }

    /// Absolute offsets of embedded value addresses within the value region.
    fn write_value_address_offsets<V: AsRef<[u8]>>(
        &self,
        out: &mut Vec<u8>,
        values: &[V],
        refs: &[ValueAddressRef],
    ) {
        if refs.is_empty() {
            return;
        }
        let width = usize::from(self.address_width);
        let mut starts = Vec::with_capacity(values.len());
        let mut start = 0usize;
        for value in values {
            starts.push(start);
            start += value.as_ref().len();
        }
        for r in refs {
            assert!(r.item < values.len(), "value address ref to missing item {}", r.item);
            let item_len = values[r.item].as_ref().len();
            assert!(
                r.offset + width <= item_len,
                "value address ref at {} overruns item {} ({item_len} bytes)",
                r.offset,
                r.item
            );
            let absolute = starts[r.item] + r.offset;
            assert!(
                absolute <= MAX_REGION_SIZE,
                "value address offset overflows u16: {absolute}"
            );
            out.extend_from_slice(&(absolute as u16).to_le_bytes());
        }
    }

    fn lease_error(&self, size: usize) -> EncodeError {
        let max = self.pool.max_buffer_size();
        if size > max {
            tracing::warn!(size, max, "node exceeds scratch buffer limit");
            EncodeError::NodeTooLarge { size, max }
        } else {
            tracing::warn!(
                capacity = self.pool.capacity(),
                "encoder buffer pool exhausted"
            );
            EncodeError::PoolExhausted
        }
    }
}

/// Run `write` and record the bytes it appended as `region`.
fn append_region(
    out: &mut Vec<u8>,
    regions: &mut [(usize, usize); REGION_COUNT],
    region: Region,
    write: impl FnOnce(&mut Vec<u8>),
) {
    let start = out.len();
    write(out);
    regions[region as usize] = (start, out.len() - start);
}

/// Append subtree counts as little-endian `u64`s.
fn write_count_array(out: &mut Vec<u8>, subtrees: &[u64]) {
    for count in subtrees {
        out.extend_from_slice(&count.to_le_bytes());
    }
}

fn sum_subtrees(subtrees: &[u64]) -> Option<u64> {
    subtrees.iter().try_fold(0u64, |sum, &count| sum.checked_add(count))
}

/// Errors that can occur when encoding a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Every scratch buffer in the pool is leased.
    PoolExhausted,
    /// The encoded node would exceed the pool's scratch buffer limit.
    NodeTooLarge { size: usize, max: usize },
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PoolExhausted => write!(f, "encoder buffer pool exhausted"),
            Self::NodeTooLarge { size, max } => {
                write!(f, "node too large: {size} bytes (max {max})")
            }
        }
    }
}

impl std::error::Error for EncodeError {}
