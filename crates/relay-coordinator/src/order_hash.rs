//! Canonical `orderHash` computation.
//!
//! `orderHash` and `secretHash` are both SHA-256 digests (relay_core::secret
//! covers the latter); this module owns the former's canonical byte
//! encoding so every caller hashes the same bytes regardless of field
//! order in whatever wire format carried the order in.

use relay_core::types::{Amount, ChainAddress, Digest32, OrderHash, SecretHash, Timestamp};
use sha2::{Digest, Sha256};

pub struct OrderHashInput<'a> {
    pub maker: &'a ChainAddress,
    pub receiver: &'a ChainAddress,
    pub maker_asset: &'a ChainAddress,
    pub taker_asset: &'a ChainAddress,
    pub making_amount: Amount,
    pub taking_amount: Amount,
    pub secret_hash: &'a SecretHash,
    pub deadline_src: Timestamp,
    pub deadline_dst: Timestamp,
    pub salt_nonce: u64,
}

/// `sha256(maker || receiver || makerAsset || takerAsset || makingAmount ||
/// takingAmount || secretHash || deadlineSrc || deadlineDst || saltNonce)`,
/// each field in its canonical big-endian / UTF-8 form, length-prefixed
/// where variable-length so no two distinct inputs can collide by field
/// boundary shifting.
pub fn compute_order_hash(input: &OrderHashInput<'_>) -> OrderHash {
    let mut hasher = Sha256::new();
    hash_str(&mut hasher, &input.maker.0);
    hash_str(&mut hasher, &input.receiver.0);
    hash_str(&mut hasher, &input.maker_asset.0);
    hash_str(&mut hasher, &input.taker_asset.0);
    hasher.update(u256_to_be_bytes(input.making_amount));
    hasher.update(u256_to_be_bytes(input.taking_amount));
    hasher.update(input.secret_hash.as_bytes());
    hasher.update(input.deadline_src.to_be_bytes());
    hasher.update(input.deadline_dst.to_be_bytes());
    hasher.update(input.salt_nonce.to_be_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    Digest32::from_bytes(digest)
}

fn hash_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u32).to_be_bytes());
    hasher.update(s.as_bytes());
}

fn u256_to_be_bytes(amount: Amount) -> [u8; 32] {
    let mut buf = [0u8; 32];
    amount.to_big_endian(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input(salt: u64) -> OrderHashInput<'static> {
        OrderHashInput {
            maker: Box::leak(Box::new(ChainAddress("0xmaker".into()))),
            receiver: Box::leak(Box::new(ChainAddress("0xreceiver".into()))),
            maker_asset: Box::leak(Box::new(ChainAddress("0xassetA".into()))),
            taker_asset: Box::leak(Box::new(ChainAddress("0xassetB".into()))),
            making_amount: Amount::from(1_000u64),
            taking_amount: Amount::from(2_000u64),
            secret_hash: Box::leak(Box::new(Digest32::from_bytes([9u8; 32]))),
            deadline_src: 1_700_000_420,
            deadline_dst: 1_700_000_180,
            salt_nonce: salt,
        }
    }

    #[test]
    fn same_input_hashes_identically() {
        assert_eq!(compute_order_hash(&sample_input(1)), compute_order_hash(&sample_input(1)));
    }

    #[test]
    fn different_salt_changes_the_hash() {
        assert_ne!(compute_order_hash(&sample_input(1)), compute_order_hash(&sample_input(2)));
    }
}
