//! Signature schemes for the two chain families: secp256k1 ECDSA (EVM,
//! EIP-712) and Ed25519 (object chain). Free `sign`/`verify` functions plus
//! a small stateful `Signer` wrapper around each secret key.

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("signature does not recover to the expected address")]
    RecoveryMismatch,
    #[error("invalid key material")]
    InvalidKey,
}

/// EIP-712 domain separator fields.
pub struct Eip712Domain<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub chain_id: u64,
    pub verifying_contract: [u8; 20],
}

impl<'a> Eip712Domain<'a> {
    /// `1inch Limit Order Protocol`, version `4` is the canonical domain
    /// this relayer verifies against.
    pub fn limit_order_protocol_v4(chain_id: u64, verifying_contract: [u8; 20]) -> Self {
        Self {
            name: "1inch Limit Order Protocol",
            version: "4",
            chain_id,
            verifying_contract,
        }
    }

    /// keccak256(encode(EIP712Domain(...))) — the domain separator mixed
    /// into every typed-data hash for this contract.
    pub fn separator(&self) -> [u8; 32] {
        let mut hasher = Keccak256::new();
        hasher.update(keccak256(self.name.as_bytes()));
        hasher.update(keccak256(self.version.as_bytes()));
        hasher.update(self.chain_id.to_be_bytes());
        hasher.update([0u8; 12]);
        hasher.update(self.verifying_contract);
        hasher.finalize().into()
    }
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// EIP-712 typed-data digest: `keccak256("\x19\x01" || domain_separator || struct_hash)`.
pub fn eip712_digest(domain_separator: [u8; 32], struct_hash: [u8; 32]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update([0x19, 0x01]);
    hasher.update(domain_separator);
    hasher.update(struct_hash);
    hasher.finalize().into()
}

/// Recover the signer address from an ECDSA signature over `digest`.
/// Accepts both the legacy `(r, s, v)` layout and EIP-2098's compact
/// `(r, vs)` encoding.
pub fn recover_address(
    digest: [u8; 32],
    signature_bytes: &[u8],
) -> Result<[u8; 20], SignatureError> {
    let (sig, recovery_id) = decode_signature(signature_bytes)?;
    let verifying_key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|_| SignatureError::InvalidSignature)?;
    Ok(address_from_verifying_key(&verifying_key))
}

/// Verify that `signature_bytes` recovers to `expected_address` for `digest`.
pub fn verify_recovers_to(
    digest: [u8; 32],
    signature_bytes: &[u8],
    expected_address: &[u8; 20],
) -> Result<(), SignatureError> {
    let recovered = recover_address(digest, signature_bytes)?;
    if &recovered == expected_address {
        Ok(())
    } else {
        Err(SignatureError::RecoveryMismatch)
    }
}

fn decode_signature(bytes: &[u8]) -> Result<(EcdsaSignature, RecoveryId), SignatureError> {
    match bytes.len() {
        // (r, s, v) — 65 bytes.
        65 => {
            let sig = EcdsaSignature::from_slice(&bytes[..64])
                .map_err(|_| SignatureError::InvalidSignature)?;
            let v = bytes[64];
            let recovery_id = RecoveryId::from_byte(if v >= 27 { v - 27 } else { v })
                .ok_or(SignatureError::InvalidSignature)?;
            Ok((sig, recovery_id))
        }
        // Compact (r, vs) — EIP-2098, 64 bytes.
        64 => {
            let mut r = [0u8; 32];
            r.copy_from_slice(&bytes[..32]);
            let mut vs = [0u8; 32];
            vs.copy_from_slice(&bytes[32..]);
            let recovery_bit = (vs[0] & 0x80) != 0;
            vs[0] &= 0x7f;
            let mut sig_bytes = [0u8; 64];
            sig_bytes[..32].copy_from_slice(&r);
            sig_bytes[32..].copy_from_slice(&vs);
            let sig = EcdsaSignature::from_slice(&sig_bytes)
                .map_err(|_| SignatureError::InvalidSignature)?;
            let recovery_id = RecoveryId::from_byte(recovery_bit as u8)
                .ok_or(SignatureError::InvalidSignature)?;
            Ok((sig, recovery_id))
        }
        _ => Err(SignatureError::InvalidSignature),
    }
}

fn address_from_verifying_key(key: &VerifyingKey) -> [u8; 20] {
    let uncompressed = key.to_encoded_point(false);
    let hash = keccak256(&uncompressed.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    addr
}

/// A stateless ECDSA signer. `k256::ecdsa::SigningKey` zeroizes its scalar
/// on drop internally, so no extra wrapper is needed here.
pub struct EcdsaSigner {
    secret_key: SigningKey,
}

impl EcdsaSigner {
    pub fn from_bytes(sk_bytes: &[u8]) -> Result<Self, SignatureError> {
        let key = SigningKey::from_slice(sk_bytes).map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self { secret_key: key })
    }

    pub fn address(&self) -> [u8; 20] {
        address_from_verifying_key(self.secret_key.verifying_key())
    }

    /// Sign a 32-byte digest, returning the compact `(r, s, recovery_id)`
    /// encoding used on the wire.
    pub fn sign_prehash(&self, digest: [u8; 32]) -> (EcdsaSignature, RecoveryId) {
        use k256::ecdsa::signature::hazmat::PrehashSigner;
        self.secret_key
            .sign_prehash(&digest)
            .expect("signing a 32-byte digest is infallible")
    }
}

/// Ed25519 signer/verifier for the object chain, mirroring the same
/// zeroize-on-drop discipline.
pub mod ed25519 {
    use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

    use super::SignatureError;

    pub struct Ed25519Signer {
        key: SigningKey,
    }

    impl Ed25519Signer {
        pub fn from_bytes(sk_bytes: &[u8; 32]) -> Self {
            Self {
                key: SigningKey::from_bytes(sk_bytes),
            }
        }

        pub fn public_key_bytes(&self) -> [u8; 32] {
            self.key.verifying_key().to_bytes()
        }

        pub fn sign(&self, message: &[u8]) -> [u8; 64] {
            self.key.sign(message).to_bytes()
        }
    }

    pub fn verify(
        public_key_bytes: &[u8; 32],
        message: &[u8],
        signature_bytes: &[u8; 64],
    ) -> Result<(), SignatureError> {
        let vk = VerifyingKey::from_bytes(public_key_bytes).map_err(|_| SignatureError::InvalidKey)?;
        let sig = Signature::from_bytes(signature_bytes);
        vk.verify(message, &sig)
            .map_err(|_| SignatureError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::hazmat::PrehashSigner;

    #[test]
    fn ecdsa_sign_recover_round_trip() {
        let sk_bytes = [9u8; 32];
        let signer = EcdsaSigner::from_bytes(&sk_bytes).unwrap();
        let digest = keccak256(b"hello relayer");
        let (sig, recovery_id): (EcdsaSignature, RecoveryId) = signer.sign_prehash(digest);

        let mut encoded = sig.to_bytes().to_vec();
        encoded.push(27 + recovery_id.to_byte());

        let recovered = recover_address(digest, &encoded).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn compact_rvs_encoding_recovers_same_address() {
        let sk_bytes = [9u8; 32];
        let signer = EcdsaSigner::from_bytes(&sk_bytes).unwrap();
        let digest = keccak256(b"compact encoding");
        let (sig, recovery_id) = signer.sign_prehash(digest);

        let r = &sig.to_bytes()[..32];
        let mut s = [0u8; 32];
        s.copy_from_slice(&sig.to_bytes()[32..]);
        if recovery_id.to_byte() == 1 {
            s[0] |= 0x80;
        }
        let mut compact = Vec::with_capacity(64);
        compact.extend_from_slice(r);
        compact.extend_from_slice(&s);

        let recovered = recover_address(digest, &compact).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn ed25519_sign_verify_round_trip() {
        let sk = [3u8; 32];
        let signer = ed25519::Ed25519Signer::from_bytes(&sk);
        let msg = b"object chain escrow lock";
        let sig = signer.sign(msg);
        assert!(ed25519::verify(&signer.public_key_bytes(), msg, &sig).is_ok());
    }

    #[test]
    fn ed25519_tampered_message_fails() {
        let sk = [3u8; 32];
        let signer = ed25519::Ed25519Signer::from_bytes(&sk);
        let sig = signer.sign(b"original");
        assert!(ed25519::verify(&signer.public_key_bytes(), b"tampered", &sig).is_err());
    }
}
