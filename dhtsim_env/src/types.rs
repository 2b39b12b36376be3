//! Hash and identity primitives shared by every cell.

use crate::error::EnvError;
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Width of every hash in bytes.
pub const HASH_LEN: usize = 32;

/// What a hash points at.
///
/// The type is part of the hash identity: an action hash and an entry hash
/// with the same 32 bytes are different values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HashType {
    Agent,
    Dna,
    Action,
    Entry,
    DhtOp,
}

impl HashType {
    /// One-byte tag mixed into content digests.
    pub fn tag(&self) -> u8 {
        match self {
            HashType::Agent => 0x20,
            HashType::Dna => 0x2d,
            HashType::Action => 0x29,
            HashType::Entry => 0x21,
            HashType::DhtOp => 0x24,
        }
    }

    /// Short human-readable prefix used by `Display`.
    pub fn prefix(&self) -> &'static str {
        match self {
            HashType::Agent => "agent",
            HashType::Dna => "dna",
            HashType::Action => "action",
            HashType::Entry => "entry",
            HashType::DhtOp => "op",
        }
    }
}

/// A typed, fixed-width content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HoloHash {
    hash_type: HashType,
    bytes: [u8; HASH_LEN],
}

/// Identity of an agent: the bytes of its ed25519 verifying key.
pub type AgentPubKey = HoloHash;
/// Namespace of a network: the hash of the DNA definition.
pub type DnaHash = HoloHash;
pub type ActionHash = HoloHash;
pub type EntryHash = HoloHash;
pub type DhtOpHash = HoloHash;
/// Any hash that can be the basis of a DHT op.
pub type AnyDhtHash = HoloHash;

impl HoloHash {
    /// Wraps raw bytes without hashing them.
    pub fn from_raw(hash_type: HashType, bytes: [u8; HASH_LEN]) -> Self {
        Self { hash_type, bytes }
    }

    /// SHA-256 of `data`, prefixed by the hash type tag.
    pub fn digest(hash_type: HashType, data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update([hash_type.tag()]);
        hasher.update(data);
        Self {
            hash_type,
            bytes: hasher.finalize().into(),
        }
    }

    /// Builds an agent key from an ed25519 verifying key.
    pub fn from_verifying_key(key: &VerifyingKey) -> AgentPubKey {
        Self::from_raw(HashType::Agent, key.to_bytes())
    }

    /// Builds an agent key from the public half of a signing key.
    pub fn from_signing_key(key: &SigningKey) -> AgentPubKey {
        Self::from_verifying_key(&key.verifying_key())
    }

    /// Parses a hex string produced by [`HoloHash::to_hex`].
    pub fn from_hex(hash_type: HashType, s: &str) -> Result<Self, EnvError> {
        let decoded = hex::decode(s).map_err(|e| EnvError::invalid_hash(e.to_string()))?;
        let bytes: [u8; HASH_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            EnvError::invalid_hash(format!("expected {} bytes, got {}", HASH_LEN, v.len()))
        })?;
        Ok(Self::from_raw(hash_type, bytes))
    }

    pub fn hash_type(&self) -> HashType {
        self.hash_type
    }

    pub fn bytes(&self) -> &[u8; HASH_LEN] {
        &self.bytes
    }

    /// Same bytes, different type (an agent key is also the hash of its agent entry).
    pub fn retype(&self, hash_type: HashType) -> Self {
        Self::from_raw(hash_type, self.bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// XOR distance between two hashes, ignoring their types.
    pub fn distance(&self, other: &HoloHash) -> DhtDistance {
        let mut out = [0u8; HASH_LEN];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.bytes[i] ^ other.bytes[i];
        }
        DhtDistance(out)
    }
}

impl fmt::Display for HoloHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 hex chars for readability
        write!(f, "{}:{}", self.hash_type.prefix(), &self.to_hex()[..8])
    }
}

impl fmt::Debug for HoloHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash_type.prefix(), self.to_hex())
    }
}

/// XOR distance interpreted as a big-endian unsigned 256-bit integer.
///
/// Byte-wise lexicographic ordering of the array is exactly that integer
/// ordering, so the derived `Ord` is the metric's total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DhtDistance(pub [u8; HASH_LEN]);

/// A cell is one agent running one DNA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    pub dna_hash: DnaHash,
    pub agent_pub_key: AgentPubKey,
}

impl CellId {
    pub fn new(dna_hash: DnaHash, agent_pub_key: AgentPubKey) -> Self {
        Self {
            dna_hash,
            agent_pub_key,
        }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dna_hash, self.agent_pub_key)
    }
}

/// Microseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn as_micros(&self) -> i64 {
        self.0
    }
}

impl TryFrom<SystemTime> for Timestamp {
    type Error = EnvError;

    fn try_from(time: SystemTime) -> Result<Self, Self::Error> {
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(|e| EnvError::ClockError(e.to_string()))?;
        i64::try_from(since_epoch.as_micros())
            .map(Timestamp)
            .map_err(|e| EnvError::ClockError(e.to_string()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}
