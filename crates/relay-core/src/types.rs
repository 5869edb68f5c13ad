use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Arbitrary-precision asset amount / rate. Never a float — see
/// `relay-auction` for the one place fixed-point scaling (not floats)
/// enters the picture.
pub type Amount = U256;

/// Unix timestamp, seconds, UTC.
pub type Timestamp = i64;

/// Internal auto-increment identity for a `SwapOrder` row.
pub type OrderId = i64;

/// The chain a leg of a swap lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    /// An EVM chain — the source leg in this deployment.
    Evm,
    /// An object-model chain in the Sui family — the destination leg.
    ObjectChain,
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKind::Evm => write!(f, "evm"),
            ChainKind::ObjectChain => write!(f, "object_chain"),
        }
    }
}

// ── Digest32 ─────────────────────────────────────────────────────────────────

/// A 32-byte digest. Used for both `orderHash` and `secretHash` — both are
/// SHA-256 digests over canonical byte encodings (see `relay-core::secret`
/// and the order-hash computation in `relay-coordinator`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest32(pub [u8; 32]);

impl Digest32 {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for Digest32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Digest32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest32(0x{}…)", &self.to_hex()[..12])
    }
}

/// `orderHash` — unique identity of a `SwapOrder`.
pub type OrderHash = Digest32;

/// `secretHash` — commitment to the HTLC preimage.
pub type SecretHash = Digest32;

// ── Chain-agnostic handles ────────────────────────────────────────────────────

/// A chain-agnostic address: an EVM 20-byte address or an object-chain
/// 32-byte account address, carried as its canonical hex string so neither
/// adapter needs to understand the other's byte layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainAddress(pub String);

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chain-specific handle to a locked escrow: an address on EVM, an object
/// id on an object chain. Opaque to everything except the adapter that
/// produced it (spec's "escrow ref").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRef(pub String);

impl fmt::Display for EscrowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chain transaction hash, carried as its canonical hex/base58 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
