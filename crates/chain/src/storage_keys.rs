//! # Submission Storage Keys
//!
//! Layout of the per-node submission flags the protocol writes when a
//! trusted node submits a report:
//!
//! ```text
//! coarse = keccak256(category_key ‖ node(20) ‖ block(32))
//! exact  = keccak256(category_key ‖ node(20) ‖ block(32) ‖ value(32) ...)
//! ```
//!
//! Integers are big-endian, left-padded to 32 bytes. The coarse flag says
//! "this node submitted something for this block"; the exact flag says
//! "this node submitted exactly these values".

use alloy_primitives::{Address, B256, U256};
use sha3::{Digest, Keccak256};
use watchtower_common::ReportCategory;

/// Flag set once `node` has submitted any values for `block`.
pub fn coarse_key(category: ReportCategory, node: Address, block: u64) -> B256 {
    B256::from_slice(&prefix(category, node, block).finalize())
}

/// Flag set once `node` has submitted exactly `values` for `block`.
pub fn exact_key(category: ReportCategory, node: Address, block: u64, values: &[U256]) -> B256 {
    let mut hasher = prefix(category, node, block);
    for value in values {
        hasher.update(value.to_be_bytes::<32>());
    }
    B256::from_slice(&hasher.finalize())
}

fn prefix(category: ReportCategory, node: Address, block: u64) -> Keccak256 {
    let mut hasher = Keccak256::new();
    hasher.update(category.submission_key().as_bytes());
    hasher.update(node.as_slice());
    hasher.update(U256::from(block).to_be_bytes::<32>());
    hasher
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE: Address = Address::repeat_byte(0x42);

    #[test]
    fn coarse_key_matches_manual_layout() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"network.balances.submitted.node");
        buf.extend_from_slice(NODE.as_slice());
        let mut block = [0u8; 32];
        block[24..].copy_from_slice(&1234u64.to_be_bytes());
        buf.extend_from_slice(&block);

        let expected = B256::from_slice(&Keccak256::digest(&buf));
        assert_eq!(coarse_key(ReportCategory::Balances, NODE, 1234), expected);
    }

    #[test]
    fn exact_key_depends_on_every_value() {
        let a = exact_key(ReportCategory::Prices, NODE, 10, &[U256::from(1u64)]);
        let b = exact_key(ReportCategory::Prices, NODE, 10, &[U256::from(2u64)]);
        let c = exact_key(ReportCategory::Prices, NODE, 11, &[U256::from(1u64)]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, exact_key(ReportCategory::Prices, NODE, 10, &[U256::from(1u64)]));
    }

    #[test]
    fn coarse_and_exact_differ_and_categories_are_separated() {
        let coarse = coarse_key(ReportCategory::Prices, NODE, 10);
        assert_ne!(coarse, exact_key(ReportCategory::Prices, NODE, 10, &[U256::ZERO]));
        assert_ne!(coarse, coarse_key(ReportCategory::Balances, NODE, 10));
        assert_eq!(coarse, exact_key(ReportCategory::Prices, NODE, 10, &[]));
    }
}
