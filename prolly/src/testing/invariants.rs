//! Invariant checking for randomized codec testing.
//!
//! Compares an encoded [`Message`] against the node contents it was built
//! from and against the structural rules every node obeys.

use super::node_gen::GeneratedNode;
use crate::decode::NodePayload;
use crate::message::{Message, Region};
use crate::offsets::offset_vector_len;
use crate::walk::collect_addresses;

/// A detected invariant violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Description of the violation.
    pub description: String,
    /// Index of the node it was detected on.
    pub node_index: usize,
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node {}: {}", self.node_index, self.description)
    }
}

/// Checker for node invariants.
#[derive(Debug, Default)]
pub struct InvariantChecker {
    violations: Vec<InvariantViolation>,
}

impl InvariantChecker {
    /// Create a new invariant checker.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    /// Get all violations.
    #[must_use]
    pub fn violations(&self) -> &[InvariantViolation] {
        &self.violations
    }

    /// Check if any violations were detected.
    #[must_use]
    pub const fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    fn check(&mut self, holds: bool, node_index: usize, description: impl FnOnce() -> String) {
        if !holds {
            self.violations.push(InvariantViolation {
                description: description(),
                node_index,
            });
        }
    }

    /// Run every check on one encoded node.
    pub fn check_node(&mut self, node: &GeneratedNode, msg: &Message, node_index: usize) {
        self.check_round_trip(node, msg, node_index);
        self.check_offset_vectors(msg, node_index);
        self.check_exclusivity(msg, node_index);
        self.check_addresses(node, msg, node_index);
        self.check_validates(msg, node_index);
    }

    /// Decoded contents equal the encoder inputs.
    pub fn check_round_trip(&mut self, node: &GeneratedNode, msg: &Message, node_index: usize) {
        self.check(msg.level() == node.level, node_index, || {
            format!("level {} != {}", msg.level(), node.level)
        });
        self.check(
            usize::from(msg.item_count()) == node.keys.len(),
            node_index,
            || format!("item count {} != {}", msg.item_count(), node.keys.len()),
        );
        self.check(msg.keys().to_vec() == node.keys, node_index, || {
            "keys differ".to_string()
        });
        self.check(msg.values().to_vec() == node.values, node_index, || {
            "values differ".to_string()
        });
        self.check(msg.subtrees().to_vec() == node.subtrees, node_index, || {
            "subtree counts differ".to_string()
        });
        self.check(
            msg.tree_count() == node.expected_tree_count(),
            node_index,
            || {
                format!(
                    "tree count {} != {}",
                    msg.tree_count(),
                    node.expected_tree_count()
                )
            },
        );
    }

    /// Encoded offset vectors omit the zeroth offset.
    pub fn check_offset_vectors(&mut self, msg: &Message, node_index: usize) {
        let item_count = usize::from(msg.item_count());
        let mut regions = vec![Region::KeyOffsets];
        if msg.is_leaf() {
            regions.push(Region::ValueOffsets);
        }
        for region in regions {
            let len = offset_vector_len(msg.region(region));
            self.check(len == item_count.saturating_sub(1), node_index, || {
                format!("{region} holds {len} entries for {item_count} items")
            });
        }
    }

    /// At most one of the two address regions is populated.
    pub fn check_exclusivity(&mut self, msg: &Message, node_index: usize) {
        let children = !msg.region(Region::AddressArray).is_empty();
        let value_refs = !msg.region(Region::ValueAddressOffsets).is_empty();
        self.check(!(children && value_refs), node_index, || {
            "both address regions populated".to_string()
        });
        let payload_matches = matches!(
            (msg.payload(), msg.is_leaf()),
            (NodePayload::Leaf(_), true) | (NodePayload::Internal(_), false)
        );
        self.check(payload_matches, node_index, || {
            "payload disagrees with level".to_string()
        });
    }

    /// The walk visits exactly the addresses the node was built with.
    pub fn check_addresses(&mut self, node: &GeneratedNode, msg: &Message, node_index: usize) {
        let visited = collect_addresses(msg);
        let expected = node.expected_addresses(msg.address_width());
        self.check(visited == expected, node_index, || {
            format!("walk visited {} of {} addresses", visited.len(), expected.len())
        });
    }

    /// The encoder's output passes untrusted validation.
    pub fn check_validates(&mut self, msg: &Message, node_index: usize) {
        let result = Message::from_bytes(msg.as_bytes().to_vec());
        self.check(result.is_ok(), node_index, || {
            format!("encoded node rejected: {result:?}")
        });
    }
}
