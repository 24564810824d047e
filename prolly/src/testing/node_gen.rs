//! Node generator for randomized codec testing.
//!
//! Produces random but reproducible node contents: sorted unique keys,
//! leaf values (some carrying out-of-line value addresses), and child
//! address lists with subtree counts.

// Generated test data is cloned freely
#![allow(clippy::disallowed_methods)]

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::encode::{EncodeError, NodeEncoder, ValueAddressRef};
use crate::message::Message;

/// Tag byte placed before an embedded value address.
pub const VALUE_ADDRESS_TAG: u8 = 0xff;

/// Configuration for node generation.
#[derive(Debug, Clone)]
pub struct NodeGenConfig {
    /// Maximum number of keys per node.
    pub max_items: usize,
    /// Maximum key length in bytes (keys are at least one byte).
    pub max_key_length: usize,
    /// Maximum inline value length in bytes.
    pub max_value_length: usize,
    /// Width of generated content addresses.
    pub address_width: u8,
    /// Upper bound on each child's subtree count.
    pub max_subtree_count: u64,
    /// Probability that a leaf value is an out-of-line reference.
    pub value_address_rate: f64,
}

impl Default for NodeGenConfig {
    fn default() -> Self {
        Self {
            max_items: 64,
            max_key_length: 24,
            max_value_length: 96,
            address_width: 20,
            max_subtree_count: 10_000,
            value_address_rate: 0.0,
        }
    }
}

/// Contents of one node, before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedNode {
    pub level: u8,
    pub keys: Vec<Vec<u8>>,
    /// Leaf values, or child addresses for internal nodes.
    pub values: Vec<Vec<u8>>,
    /// Empty for leaves.
    pub subtrees: Vec<u64>,
    /// Empty for internal nodes.
    pub value_addresses: Vec<ValueAddressRef>,
}

impl GeneratedNode {
    /// Encode the node with `encoder`.
    pub fn encode(&self, encoder: &NodeEncoder) -> Result<Message, EncodeError> {
        if self.value_addresses.is_empty() {
            encoder.encode(&self.keys, &self.values, self.level, &self.subtrees)
        } else {
            encoder.encode_leaf_with_value_addresses(
                &self.keys,
                &self.values,
                &self.value_addresses,
            )
        }
    }

    /// Every address a walk over the encoded node should visit, in order.
    #[must_use]
    pub fn expected_addresses(&self, address_width: usize) -> Vec<Vec<u8>> {
        if self.level > 0 {
            return self.values.clone();
        }
        self.value_addresses
            .iter()
            .map(|r| self.values[r.item][r.offset..r.offset + address_width].to_vec())
            .collect()
    }

    /// Expected tree count of the encoded node.
    #[must_use]
    pub fn expected_tree_count(&self) -> u64 {
        if self.level == 0 {
            self.keys.len() as u64
        } else {
            self.subtrees.iter().sum()
        }
    }
}

/// Generator for random node contents.
///
/// Given the same seed, the generator produces the same sequence of nodes.
pub struct NodeGenerator {
    rng: StdRng,
    config: NodeGenConfig,
}

impl NodeGenerator {
    /// Create a new generator with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, NodeGenConfig::default())
    }

    /// Create a new generator with custom configuration.
    #[must_use]
    pub fn with_config(seed: u64, config: NodeGenConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    /// Generate a leaf or internal node with equal probability.
    pub fn next_node(&mut self) -> GeneratedNode {
        if self.rng.random::<bool>() {
            self.next_leaf()
        } else {
            self.next_internal()
        }
    }

    /// Generate a leaf node.
    pub fn next_leaf(&mut self) -> GeneratedNode {
        let keys = self.generate_keys();
        let mut values = Vec::with_capacity(keys.len());
        let mut value_addresses = Vec::new();
        for item in 0..keys.len() {
            if self.rng.random::<f64>() < self.config.value_address_rate {
                let mut value = vec![VALUE_ADDRESS_TAG];
                value.extend(self.generate_address());
                value_addresses.push(ValueAddressRef::new(item, 1));
                values.push(value);
            } else {
                let len = self.rng.random_range(0..=self.config.max_value_length);
                values.push(self.generate_bytes(len));
            }
        }
        GeneratedNode {
            level: 0,
            keys,
            values,
            subtrees: Vec::new(),
            value_addresses,
        }
    }

    /// Generate an internal node at a random level.
    pub fn next_internal(&mut self) -> GeneratedNode {
        let level = self.rng.random_range(1..=8);
        let keys = self.generate_keys();
        let values = (0..keys.len()).map(|_| self.generate_address()).collect();
        let subtrees = (0..keys.len())
            .map(|_| self.rng.random_range(1..=self.config.max_subtree_count))
            .collect();
        GeneratedNode {
            level,
            keys,
            values,
            subtrees,
            value_addresses: Vec::new(),
        }
    }

    /// Sorted, unique, non-empty keys. Occasionally none at all.
    fn generate_keys(&mut self) -> Vec<Vec<u8>> {
        let count = self.rng.random_range(0..=self.config.max_items);
        let mut keys = BTreeSet::new();
        while keys.len() < count {
            let len = self.rng.random_range(1..=self.config.max_key_length);
            keys.insert(self.generate_bytes(len));
        }
        keys.into_iter().collect()
    }

    fn generate_address(&mut self) -> Vec<u8> {
        self.generate_bytes(usize::from(self.config.address_width))
    }

    fn generate_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        self.rng.fill(bytes.as_mut_slice());
        bytes
    }
}
