// Life of a node:
// 1. Keys, values and subtree counts come in from the tree builder
// 2. Sizes are estimated and a scratch buffer is leased from the pool
// 3. Regions are serialized, the header and checksum are stamped
// 4. The bytes are copied out into an immutable `Message`
// 5. Readers decode lazily: every accessor is a zero-copy view
//
// Garbage collection and replication walk the addresses a node names
// without decoding anything else.

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)
)]

pub mod address;
pub mod buffer_pool;
pub mod config;
pub mod decode;
pub mod encode;
pub mod inspect;
pub mod message;
pub mod offsets;
pub mod sliced_buffer;
pub mod walk;

#[cfg(test)]
mod testing;

pub use address::{Address, DEFAULT_ADDRESS_WIDTH};
pub use buffer_pool::{BufferPool, ScratchBuffer};
pub use config::{CodecConfig, ConfigError};
pub use decode::{ChildRefs, LeafValues, NodePayload, SubtreeCounts};
pub use encode::{EncodeError, NodeEncoder, ValueAddressRef};
pub use inspect::{InspectError, NodeSummary};
pub use message::{DecodeError, ItemType, Message, Region};
pub use sliced_buffer::SlicedBuffer;
pub use walk::{collect_addresses, walk_addresses};
