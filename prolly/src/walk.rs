//! Address enumeration for garbage collection and replication.
//!
//! A node depends on every buffer it names: its children (internal nodes) or
//! the out-of-line chunks of large values (leaves). Callers walk those
//! addresses to build reachability sets; deduplication is left to them.

use crate::address::Address;
use crate::decode::NodePayload;
use crate::message::{Message, Region};
use crate::sliced_buffer::SlicedBuffer;

/// Visit every content address referenced by `msg`.
///
/// Every entry of the address array is visited first, in key order,
/// whatever the node's level. Then come the addresses embedded in leaf
/// values, in encode order. Each occurrence is visited once;
/// duplicates are not removed.
///
/// # Errors
/// Returns the first error produced by `visit`. No address after the failing
/// one is visited.
///
/// # Panics
/// Panics if the node populates both child addresses and leaf value
/// addresses, or has an address array but a zero address width. Nodes from
/// the encoder or from `Message::from_bytes` never do.
pub fn walk_addresses<E, F>(msg: &Message, mut visit: F) -> Result<(), E>
where
    F: FnMut(Address<'_>) -> Result<(), E>,
{
    assert!(
        msg.region(Region::AddressArray).is_empty()
            || msg.region(Region::ValueAddressOffsets).is_empty(),
        "node has both child addresses and value addresses"
    );
    let children = msg.region(Region::AddressArray);
    if !children.is_empty() {
        for address in SlicedBuffer::with_stride(children, msg.address_width()) {
            visit(Address::new(address))?;
        }
    }
    if let NodePayload::Leaf(values) = msg.payload() {
        for address in values.addresses() {
            visit(address)?;
        }
    }
    Ok(())
}

/// Collect every referenced address into owned buffers, in walk order.
#[must_use]
pub fn collect_addresses(msg: &Message) -> Vec<Vec<u8>> {
    let mut addresses = Vec::new();
    let _ = walk_addresses::<std::convert::Infallible, _>(msg, |address| {
        addresses.push(address.to_vec());
        Ok(())
    });
    addresses
}
