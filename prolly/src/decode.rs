//! Node accessors.
//!
//! Every accessor is a pure read over an immutable [`Message`]: no locking,
//! no allocation, no copying of item bytes. The message is assumed to come
//! from the encoder (or from [`Message::from_bytes`]); accessors only do the
//! bounds arithmetic the layout implies.

use crate::address::Address;
use crate::message::{ItemType, Message, Region, SUBTREE_COUNT_SIZE, fields};
use crate::offsets::{offset_vector_len, read_offset};
use crate::sliced_buffer::SlicedBuffer;

impl Message {
    /// Tree level: 0 for leaves, > 0 for internal nodes.
    #[must_use]
    pub fn level(&self) -> u8 {
        self.read_u8(fields::TREE_LEVEL)
    }

    /// Whether this is a leaf node.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.level() == 0
    }

    /// Number of leaf entries reachable under this node.
    #[must_use]
    pub fn tree_count(&self) -> u64 {
        self.read_u64(fields::TREE_COUNT)
    }

    /// Number of keys in this node.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // encoder caps nodes at u16::MAX keys
    pub fn item_count(&self) -> u16 {
        if self.region(Region::KeyItems).is_empty() {
            return 0;
        }
        // zeroth offset omitted from the vector
        (offset_vector_len(self.region(Region::KeyOffsets)) + 1) as u16
    }

    /// Width in bytes of the content addresses in this node.
    #[must_use]
    pub fn address_width(&self) -> usize {
        usize::from(self.read_u8(fields::ADDRESS_WIDTH))
    }

    /// Declared format of the key items.
    #[must_use]
    pub fn key_type(&self) -> ItemType {
        ItemType::try_from(self.read_u8(fields::KEY_TYPE)).unwrap_or(ItemType::Unknown)
    }

    /// Declared format of the value items.
    #[must_use]
    pub fn value_type(&self) -> ItemType {
        ItemType::try_from(self.read_u8(fields::VALUE_TYPE)).unwrap_or(ItemType::Unknown)
    }

    /// Keys of this node, in order.
    #[must_use]
    pub fn keys(&self) -> SlicedBuffer<'_> {
        SlicedBuffer::with_count(
            self.region(Region::KeyItems),
            self.region(Region::KeyOffsets),
            usize::from(self.item_count()),
        )
    }

    /// Per-key payload bytes.
    ///
    /// Value items for leaves; for internal nodes, the address array viewed
    /// as one fixed-width item per child. Lets tree-walking code ignore the
    /// leaf/internal distinction.
    #[must_use]
    pub fn values(&self) -> SlicedBuffer<'_> {
        match self.payload() {
            NodePayload::Leaf(leaf) => leaf.items,
            NodePayload::Internal(children) => children.addresses,
        }
    }

    /// Subtree counts, one per key. Empty for leaves.
    #[must_use]
    pub fn subtrees(&self) -> SubtreeCounts<'_> {
        SubtreeCounts {
            bytes: self.region(Region::SubtreeCounts),
        }
    }

    /// The level-dependent half of the node.
    #[must_use]
    pub fn payload(&self) -> NodePayload<'_> {
        if self.is_leaf() {
            NodePayload::Leaf(LeafValues {
                items: SlicedBuffer::with_count(
                    self.region(Region::ValueItems),
                    self.region(Region::ValueOffsets),
                    usize::from(self.item_count()),
                ),
                address_offsets: self.region(Region::ValueAddressOffsets),
                address_width: self.address_width(),
            })
        } else {
            let addresses = self.region(Region::AddressArray);
            NodePayload::Internal(ChildRefs {
                addresses: if addresses.is_empty() {
                    SlicedBuffer::empty()
                } else {
                    SlicedBuffer::with_stride(addresses, self.address_width())
                },
                subtree_counts: self.subtrees(),
            })
        }
    }
}

/// Either the value items of a leaf or the child references of an internal
/// node. A node is exactly one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePayload<'a> {
    Leaf(LeafValues<'a>),
    Internal(ChildRefs<'a>),
}

/// Value items of a leaf node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafValues<'a> {
    /// One value per key.
    pub items: SlicedBuffer<'a>,
    address_offsets: &'a [u8],
    address_width: usize,
}

impl<'a> LeafValues<'a> {
    /// Number of content addresses embedded in the values.
    #[must_use]
    pub const fn address_count(&self) -> usize {
        offset_vector_len(self.address_offsets)
    }

    /// Content addresses of values stored out of line, in encode order.
    #[must_use]
    pub fn addresses(&self) -> impl ExactSizeIterator<Item = Address<'a>> + use<'a> {
        let buf = self.items.buf();
        let offsets = self.address_offsets;
        let width = self.address_width;
        (0..self.address_count()).map(move |i| {
            let start = read_offset(offsets, i);
            Address::new(&buf[start..start + width])
        })
    }
}

/// Child references of an internal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildRefs<'a> {
    /// One child address per key.
    pub addresses: SlicedBuffer<'a>,
    /// One subtree count per key.
    pub subtree_counts: SubtreeCounts<'a>,
}

impl<'a> ChildRefs<'a> {
    /// Number of children.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Whether the node has no children.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Address and subtree count of child `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<(Address<'a>, u64)> {
        let address = self.addresses.get(index)?;
        let count = self.subtree_counts.get(index)?;
        Some((Address::new(address), count))
    }

    /// Child addresses, in key order.
    pub fn iter_addresses(&self) -> impl ExactSizeIterator<Item = Address<'a>> + use<'a> {
        self.addresses.iter().map(Address::new)
    }
}

/// Zero-copy view over a subtree count array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtreeCounts<'a> {
    bytes: &'a [u8],
}

impl<'a> SubtreeCounts<'a> {
    /// Number of counts.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len() / SUBTREE_COUNT_SIZE
    }

    /// Whether there are no counts.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count `index`, or `None` if out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<u64> {
        let start = index.checked_mul(SUBTREE_COUNT_SIZE)?;
        let raw = self.bytes.get(start..start + SUBTREE_COUNT_SIZE)?;
        let mut buf = [0u8; SUBTREE_COUNT_SIZE];
        buf.copy_from_slice(raw);
        Some(u64::from_le_bytes(buf))
    }

    /// Iterate over the counts in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = u64> + use<'a> {
        self.bytes.chunks_exact(SUBTREE_COUNT_SIZE).map(|chunk| {
            let mut buf = [0u8; SUBTREE_COUNT_SIZE];
            buf.copy_from_slice(chunk);
            u64::from_le_bytes(buf)
        })
    }

    /// Sum of all counts.
    #[must_use]
    pub fn sum(&self) -> u64 {
        self.iter().sum()
    }

    /// Copy the counts into a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u64> {
        self.iter().collect()
    }
}
