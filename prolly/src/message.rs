//! Finalized node buffers and their wire layout.
//!
//! A [`Message`] is the serialized, immutable form of exactly one tree node.
//! It is produced once by the encoder and read any number of times, from any
//! number of threads, through the accessors in `decode`.
//!
//! # Layout (format version 1, little-endian)
//!
//! ```text
//! +--------+---------+----------+------------+-------+---------------+
//! | FileID | Version | KeyType  | ValueType  | Level | AddressWidth  |
//! | 4      | 1       | 1        | 1          | 1     | 1             |
//! +--------+---------+----------+------------+-------+---------------+
//! | Reserved (3) | Checksum (4) | TreeCount (8)                      |
//! +--------------+--------------+------------------------------------+
//! | Region table: 7 x (start: u32, len: u32)                         |
//! +------------------------------------------------------------------+
//! | Regions, back to back in table order                             |
//! +------------------------------------------------------------------+
//! ```
//!
//! Regions: key items, key offsets, value items, value offsets, address
//! array, subtree counts, value address offsets. Leaf nodes populate the
//! value regions; internal nodes populate the address array and subtree
//! counts. A node never populates both.
//!
//! The checksum is a CRC32 of the whole buffer with the checksum field
//! zeroed.

// Region lengths are bounded by the message length, which fits in u32.
#![allow(clippy::cast_possible_truncation)]

use std::sync::Arc;

use crate::offsets::{OFFSET_SIZE, offset_vector_len, read_offset, validate_offsets};

/// File identifier at the start of every node message: "PTND".
pub const FILE_ID: [u8; 4] = *b"PTND";

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

/// Size of a stored subtree count in bytes.
pub const SUBTREE_COUNT_SIZE: usize = 8;

/// Number of entries in the region table.
pub(crate) const REGION_COUNT: usize = 7;

/// Size of one region table entry (start + len).
const REGION_ENTRY_SIZE: usize = 8;

/// Size of the fixed header, including the region table.
pub const HEADER_SIZE: usize = fields::REGIONS + REGION_COUNT * REGION_ENTRY_SIZE;

/// Header field offsets.
pub(crate) mod fields {
    pub const FILE_ID: usize = 0;
    pub const FORMAT_VERSION: usize = 4;
    pub const KEY_TYPE: usize = 5;
    pub const VALUE_TYPE: usize = 6;
    pub const TREE_LEVEL: usize = 7;
    pub const ADDRESS_WIDTH: usize = 8;
    // 9-11: reserved
    pub const CHECKSUM: usize = 12;
    pub const TREE_COUNT: usize = 16;
    pub const REGIONS: usize = 24;
}

/// Encoding format of the items in a key or value region.
///
/// Stored so that readers can interpret items without guessing, and so new
/// tuple formats can be introduced without a new message version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ItemType {
    /// Items carry no declared format.
    Unknown = 0,
    /// Tuple format used by the table engine.
    TupleFormatAlpha = 1,
}

impl TryFrom<u8> for ItemType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::TupleFormatAlpha),
            _ => Err(value),
        }
    }
}

/// A region of the message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Region {
    KeyItems = 0,
    KeyOffsets = 1,
    ValueItems = 2,
    ValueOffsets = 3,
    AddressArray = 4,
    SubtreeCounts = 5,
    ValueAddressOffsets = 6,
}

impl Region {
    /// All regions in table order.
    pub const ALL: [Self; REGION_COUNT] = [
        Self::KeyItems,
        Self::KeyOffsets,
        Self::ValueItems,
        Self::ValueOffsets,
        Self::AddressArray,
        Self::SubtreeCounts,
        Self::ValueAddressOffsets,
    ];

    /// Byte offset of this region's table entry.
    pub(crate) const fn table_offset(self) -> usize {
        fields::REGIONS + self as usize * REGION_ENTRY_SIZE
    }

    /// Human-readable region name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::KeyItems => "key items",
            Self::KeyOffsets => "key offsets",
            Self::ValueItems => "value items",
            Self::ValueOffsets => "value offsets",
            Self::AddressArray => "address array",
            Self::SubtreeCounts => "subtree counts",
            Self::ValueAddressOffsets => "value address offsets",
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Check whether a buffer carries the node file identifier.
///
/// This is the only field that may be trusted before a buffer's type is
/// known.
#[must_use]
pub fn is_prolly_node(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER_SIZE && bytes[fields::FILE_ID..fields::FILE_ID + 4] == FILE_ID
}

/// Compute the CRC32 of a message buffer, treating the checksum field as zero.
#[must_use]
pub fn compute_checksum(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&bytes[..fields::CHECKSUM]);
    hasher.update(&[0u8; 4]); // zero out checksum field
    hasher.update(&bytes[fields::CHECKSUM + 4..]);
    hasher.finalize()
}

/// A finalized, immutable node buffer.
///
/// Cloning is cheap (reference counted) and a message can be shared across
/// threads freely.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    bytes: Arc<[u8]>,
}

impl Message {
    /// Wrap a buffer produced by the encoder.
    pub(crate) const fn from_encoded(bytes: Arc<[u8]>) -> Self {
        Self { bytes }
    }

    /// Wrap a buffer known to come from this codec, checking only its
    /// identifier.
    ///
    /// Accessors on a malformed buffer that passes this check panic on the
    /// first out-of-bounds read; they never read outside the buffer.
    ///
    /// # Errors
    /// Returns an error if the buffer is shorter than the header or does not
    /// carry the node file identifier.
    pub fn from_trusted(bytes: impl Into<Arc<[u8]>>) -> Result<Self, DecodeError> {
        let bytes = bytes.into();
        check_identifier(&bytes)?;
        Ok(Self { bytes })
    }

    /// Validate an untrusted buffer and wrap it.
    ///
    /// # Errors
    /// Returns the first structural problem found; see [`DecodeError`].
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self, DecodeError> {
        let bytes = bytes.into();
        if let Err(e) = validate(&bytes) {
            tracing::warn!(len = bytes.len(), "rejected node message: {e}");
            return Err(e);
        }
        Ok(Self { bytes })
    }

    /// The raw message bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the message and return its shared buffer.
    #[must_use]
    pub fn into_bytes(self) -> Arc<[u8]> {
        self.bytes
    }

    /// Size of the message in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// The checksum stored in the header.
    #[must_use]
    pub fn stored_checksum(&self) -> u32 {
        self.read_u32(fields::CHECKSUM)
    }

    /// Recompute the checksum and compare it to the stored one.
    ///
    /// # Errors
    /// Returns [`DecodeError::ChecksumMismatch`] if the buffer was modified
    /// after encoding.
    pub fn verify_checksum(&self) -> Result<(), DecodeError> {
        let expected = self.stored_checksum();
        let actual = compute_checksum(&self.bytes);
        if expected == actual {
            Ok(())
        } else {
            Err(DecodeError::ChecksumMismatch { expected, actual })
        }
    }

    pub(crate) fn read_u8(&self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    pub(crate) fn read_u32(&self, offset: usize) -> u32 {
        read_u32(&self.bytes, offset)
    }

    pub(crate) fn read_u64(&self, offset: usize) -> u64 {
        read_u64(&self.bytes, offset)
    }

    /// Bytes of one body region.
    pub(crate) fn region(&self, region: Region) -> &[u8] {
        let (start, len) = region_bounds(&self.bytes, region);
        &self.bytes[start..start + len]
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("size", &self.bytes.len())
            .field("level", &self.read_u8(fields::TREE_LEVEL))
            .field("tree_count", &self.read_u64(fields::TREE_COUNT))
            .finish_non_exhaustive()
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

/// Write a region table entry.
pub(crate) fn write_region(bytes: &mut [u8], region: Region, start: usize, len: usize) {
    let at = region.table_offset();
    bytes[at..at + 4].copy_from_slice(&(start as u32).to_le_bytes());
    bytes[at + 4..at + 8].copy_from_slice(&(len as u32).to_le_bytes());
}

fn region_bounds(bytes: &[u8], region: Region) -> (usize, usize) {
    let at = region.table_offset();
    (read_u32(bytes, at) as usize, read_u32(bytes, at + 4) as usize)
}

fn check_identifier(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DecodeError::TooShort { len: bytes.len() });
    }
    if !is_prolly_node(bytes) {
        let mut found = [0u8; 4];
        found.copy_from_slice(&bytes[fields::FILE_ID..fields::FILE_ID + 4]);
        return Err(DecodeError::UnknownIdentifier(found));
    }
    Ok(())
}

/// Check every structural invariant of a message buffer.
///
/// # Post-conditions
/// - If Ok, every accessor on the buffer succeeds without panicking
#[allow(clippy::too_many_lines)]
fn validate(bytes: &[u8]) -> Result<(), DecodeError> {
    check_identifier(bytes)?;

    let version = bytes[fields::FORMAT_VERSION];
    if version != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    for field in [fields::KEY_TYPE, fields::VALUE_TYPE] {
        ItemType::try_from(bytes[field]).map_err(DecodeError::UnknownItemType)?;
    }

    let mut regions = [&bytes[..0]; REGION_COUNT];
    for region in Region::ALL {
        let (start, len) = region_bounds(bytes, region);
        let in_bounds = start
            .checked_add(len)
            .is_some_and(|end| end <= bytes.len() && (len == 0 || start >= HEADER_SIZE));
        if !in_bounds {
            return Err(DecodeError::RegionOutOfBounds(region));
        }
        regions[region as usize] = &bytes[start..start + len];
    }
    let region = |r: Region| regions[r as usize];

    // Keys
    let key_items = region(Region::KeyItems);
    let key_offsets = region(Region::KeyOffsets);
    validate_offsets(key_offsets, key_items.len()).map_err(|index| {
        DecodeError::MalformedOffsets {
            region: Region::KeyOffsets,
            index,
        }
    })?;
    if key_items.is_empty() && !key_offsets.is_empty() {
        return Err(DecodeError::CountMismatch {
            region: Region::KeyOffsets,
            expected: 0,
            actual: offset_vector_len(key_offsets),
        });
    }
    let item_count = if key_items.is_empty() {
        0
    } else {
        offset_vector_len(key_offsets) + 1
    };
    if item_count > usize::from(u16::MAX) {
        return Err(DecodeError::CountMismatch {
            region: Region::KeyOffsets,
            expected: usize::from(u16::MAX),
            actual: item_count,
        });
    }

    let level = bytes[fields::TREE_LEVEL];
    let address_width = usize::from(bytes[fields::ADDRESS_WIDTH]);
    let tree_count = read_u64(bytes, fields::TREE_COUNT);

    let leaf_populated = !region(Region::ValueItems).is_empty()
        || !region(Region::ValueOffsets).is_empty()
        || !region(Region::ValueAddressOffsets).is_empty();
    let internal_populated =
        !region(Region::AddressArray).is_empty() || !region(Region::SubtreeCounts).is_empty();

    if level == 0 {
        if internal_populated {
            return Err(DecodeError::MixedPayload);
        }
        let value_items = region(Region::ValueItems);
        let value_offsets = region(Region::ValueOffsets);
        validate_offsets(value_offsets, value_items.len()).map_err(|index| {
            DecodeError::MalformedOffsets {
                region: Region::ValueOffsets,
                index,
            }
        })?;
        let expected = item_count.saturating_sub(1);
        if offset_vector_len(value_offsets) != expected
            || (item_count == 0 && !value_items.is_empty())
        {
            return Err(DecodeError::CountMismatch {
                region: Region::ValueOffsets,
                expected,
                actual: offset_vector_len(value_offsets),
            });
        }

        let address_offsets = region(Region::ValueAddressOffsets);
        if !address_offsets.is_empty() {
            if address_width == 0 {
                return Err(DecodeError::InvalidAddressWidth(0));
            }
            if address_offsets.len() % OFFSET_SIZE != 0 {
                return Err(DecodeError::MalformedOffsets {
                    region: Region::ValueAddressOffsets,
                    index: offset_vector_len(address_offsets),
                });
            }
            for index in 0..offset_vector_len(address_offsets) {
                let start = read_offset(address_offsets, index);
                if start + address_width > value_items.len() {
                    return Err(DecodeError::MalformedOffsets {
                        region: Region::ValueAddressOffsets,
                        index,
                    });
                }
            }
        }

        let actual = item_count as u64;
        if tree_count != actual {
            return Err(DecodeError::TreeCountMismatch {
                stored: tree_count,
                computed: actual,
            });
        }
    } else {
        if leaf_populated {
            return Err(DecodeError::MixedPayload);
        }
        if address_width == 0 {
            return Err(DecodeError::InvalidAddressWidth(0));
        }
        let addresses = region(Region::AddressArray);
        if addresses.len() != item_count * address_width {
            return Err(DecodeError::CountMismatch {
                region: Region::AddressArray,
                expected: item_count,
                actual: addresses.len() / address_width,
            });
        }
        let counts = region(Region::SubtreeCounts);
        if counts.len() != item_count * SUBTREE_COUNT_SIZE {
            return Err(DecodeError::CountMismatch {
                region: Region::SubtreeCounts,
                expected: item_count,
                actual: counts.len() / SUBTREE_COUNT_SIZE,
            });
        }
        let sum = counts
            .chunks_exact(SUBTREE_COUNT_SIZE)
            .try_fold(0u64, |sum, chunk| sum.checked_add(read_u64(chunk, 0)));
        match sum {
            Some(sum) if sum == tree_count => {}
            Some(sum) => {
                return Err(DecodeError::TreeCountMismatch {
                    stored: tree_count,
                    computed: sum,
                });
            }
            None => {
                return Err(DecodeError::TreeCountMismatch {
                    stored: tree_count,
                    computed: u64::MAX,
                });
            }
        }
    }

    let expected = read_u32(bytes, fields::CHECKSUM);
    let actual = compute_checksum(bytes);
    if expected != actual {
        return Err(DecodeError::ChecksumMismatch { expected, actual });
    }

    Ok(())
}

/// Errors reported when decoding an untrusted buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer is shorter than the fixed header.
    TooShort { len: usize },
    /// Buffer does not start with the node file identifier.
    UnknownIdentifier([u8; 4]),
    /// Format version is not understood by this codec.
    UnsupportedVersion(u8),
    /// Key or value item type tag is not known.
    UnknownItemType(u8),
    /// A region table entry points outside the buffer body.
    RegionOutOfBounds(Region),
    /// An offset vector is decreasing, too long, or points past its region.
    MalformedOffsets { region: Region, index: usize },
    /// A region holds a different number of entries than the node has keys.
    CountMismatch {
        region: Region,
        expected: usize,
        actual: usize,
    },
    /// Both leaf value regions and internal address regions are populated.
    MixedPayload,
    /// Address width is zero where addresses are present.
    InvalidAddressWidth(u8),
    /// Stored tree count disagrees with the node contents.
    TreeCountMismatch { stored: u64, computed: u64 },
    /// Checksum mismatch.
    ChecksumMismatch { expected: u32, actual: u32 },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { len } => {
                write!(f, "buffer too short: {len} bytes (header is {HEADER_SIZE})")
            }
            Self::UnknownIdentifier(id) => {
                write!(f, "unknown file identifier: {}", id.escape_ascii())
            }
            Self::UnsupportedVersion(v) => write!(f, "unsupported format version: {v}"),
            Self::UnknownItemType(t) => write!(f, "unknown item type: 0x{t:02x}"),
            Self::RegionOutOfBounds(region) => write!(f, "{region} region out of bounds"),
            Self::MalformedOffsets { region, index } => {
                write!(f, "malformed {region} at entry {index}")
            }
            Self::CountMismatch {
                region,
                expected,
                actual,
            } => write!(f, "{region}: expected {expected} entries, got {actual}"),
            Self::MixedPayload => write!(f, "node has both value items and child addresses"),
            Self::InvalidAddressWidth(w) => write!(f, "invalid address width: {w}"),
            Self::TreeCountMismatch { stored, computed } => {
                write!(f, "tree count mismatch: stored {stored}, computed {computed}")
            }
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: expected {expected}, got {actual}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}
