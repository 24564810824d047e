//! Randomized codec testing.
//!
//! Nodes are generated from a seed, encoded, and checked against their
//! inputs and the structural invariants of the format. Given the same seed
//! every run is identical, so a failing seed reproduces exactly.

mod invariants;
mod node_gen;

pub use invariants::InvariantChecker;
pub use node_gen::{NodeGenConfig, NodeGenerator};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::buffer_pool::BufferPool;
    use crate::encode::{EncodeError, NodeEncoder};
    use crate::message::{HEADER_SIZE, Message};

    const NODES_PER_SEED: usize = 50;

    fn run_seed(seed: u64, config: NodeGenConfig) -> InvariantChecker {
        let encoder =
            NodeEncoder::new(BufferPool::new(1)).with_address_width(config.address_width);
        let mut generator = NodeGenerator::with_config(seed, config);
        let mut checker = InvariantChecker::new();
        for i in 0..NODES_PER_SEED {
            let node = generator.next_node();
            let msg = node.encode(&encoder).expect("should encode");
            checker.check_node(&node, &msg, i);
        }
        assert_eq!(encoder.pool().available(), 1, "scratch buffer leaked");
        checker
    }

    #[test]
    fn test_random_nodes_hold_invariants() {
        for seed in 0..20 {
            let checker = run_seed(seed, NodeGenConfig::default());
            assert!(
                !checker.has_violations(),
                "seed {seed}: {}",
                checker.violations()[0]
            );
        }
    }

    #[test]
    fn test_random_leaves_with_value_addresses() {
        let config = NodeGenConfig {
            value_address_rate: 0.3,
            address_width: 16,
            ..NodeGenConfig::default()
        };
        for seed in 100..120 {
            let checker = run_seed(seed, config.clone());
            assert!(
                !checker.has_violations(),
                "seed {seed}: {}",
                checker.violations()[0]
            );
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let encoder = NodeEncoder::new(BufferPool::new(1));
        let mut a = NodeGenerator::new(42);
        let mut b = NodeGenerator::new(42);
        for _ in 0..10 {
            let node_a = a.next_node();
            let node_b = b.next_node();
            assert_eq!(node_a, node_b);
            let msg_a = node_a.encode(&encoder).unwrap();
            let msg_b = node_b.encode(&encoder).unwrap();
            assert_eq!(msg_a.as_bytes(), msg_b.as_bytes());
        }
    }

    #[test]
    fn test_single_byte_corruption_is_rejected() {
        let encoder = NodeEncoder::new(BufferPool::new(1));
        let mut generator = NodeGenerator::new(7);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..NODES_PER_SEED {
            let msg = generator.next_node().encode(&encoder).unwrap();
            let mut bytes = msg.as_bytes().to_vec();
            let index = rng.random_range(0..bytes.len());
            bytes[index] ^= rng.random_range(1..=u8::MAX);

            let result = Message::from_bytes(bytes);
            assert!(result.is_err(), "corruption at byte {index} accepted");
        }
    }

    #[test]
    fn test_truncation_is_rejected() {
        let encoder = NodeEncoder::new(BufferPool::new(1));
        let mut generator = NodeGenerator::new(9);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..NODES_PER_SEED {
            let msg = generator.next_leaf().encode(&encoder).unwrap();
            if msg.size() == HEADER_SIZE {
                continue;
            }
            let len = rng.random_range(0..msg.size());
            let result = Message::from_bytes(msg.as_bytes()[..len].to_vec());
            assert!(result.is_err(), "truncation to {len} bytes accepted");
        }
    }

    #[test]
    fn test_concurrent_encoders_share_pool() {
        let pool = BufferPool::new(2);
        std::thread::scope(|s| {
            for seed in 0..4u64 {
                let encoder = NodeEncoder::new(Arc::clone(&pool));
                s.spawn(move || {
                    let mut generator = NodeGenerator::new(seed);
                    let mut checker = InvariantChecker::new();
                    for i in 0..NODES_PER_SEED {
                        let node = generator.next_node();
                        let msg = loop {
                            match node.encode(&encoder) {
                                Ok(msg) => break msg,
                                Err(EncodeError::PoolExhausted) => std::thread::yield_now(),
                                Err(e) => panic!("unexpected encode error: {e}"),
                            }
                        };
                        checker.check_node(&node, &msg, i);
                    }
                    assert!(!checker.has_violations(), "{}", checker.violations()[0]);
                });
            }
        });
        assert_eq!(pool.available(), 2);
    }
}
