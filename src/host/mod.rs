//! Execution-context plumbing around a deployed token: caller identities,
//! signed call envelopes and replay protection.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::contract::{TokenCall, TokenContract, TokenReply};

const CALL_DOMAIN: &[u8] = b"token-ledger/call";

/// Spent `(key, nonce)` digests a [`CallHandler`] keeps by default, 32 bytes each.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_000_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HostError {
    #[error("malformed address: {0}")]
    MalformedAddress(String),
    #[error("malformed ed25519 key")]
    MalformedKey,
    #[error("malformed signature")]
    MalformedSignature,
    #[error("signature does not match call")]
    BadSignature,
    #[error("nonce {nonce} already used by this key")]
    Replay { nonce: u64 },
    #[error("replay guard is full ({capacity} spent nonces)")]
    ReplayCapacity { capacity: usize },
    #[error("call encoding failed: {0}")]
    Encode(String),
}

/// Account identity used by the host: the first 20 bytes of
/// `SHA-256(verifying key)`, written as `0x` followed by 40 hex digits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    pub const LEN: usize = 20;

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let digest = Sha256::digest(key.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..Self::LEN]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Address {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let raw = hex::decode(digits).map_err(|e| HostError::MalformedAddress(e.to_string()))?;
        let bytes: [u8; 20] = raw.try_into().map_err(|raw: Vec<u8>| {
            HostError::MalformedAddress(format!("expected 20 bytes, got {}", raw.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(serde::de::Error::custom)
    }
}

/// An ed25519 key able to sign calls on behalf of its [`Address`].
pub struct Signer {
    key: SigningKey,
}

impl Signer {
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Accepts exactly 32 secret bytes in hex.
    pub fn from_hex(secret_hex: &str) -> Result<Self, HostError> {
        let raw = hex::decode(secret_hex.trim()).map_err(|_| HostError::MalformedKey)?;
        let bytes: [u8; 32] = raw.try_into().map_err(|_| HostError::MalformedKey)?;
        Ok(Self {
            key: SigningKey::from_bytes(&bytes),
        })
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }

    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().as_bytes())
    }

    pub fn address(&self) -> Address {
        Address::from_verifying_key(&self.key.verifying_key())
    }

    pub fn sign_call(&self, nonce: u64, call: TokenCall) -> Result<SignedCall, HostError> {
        let message = signing_message(nonce, &call)?;
        let signature = self.key.sign(&message);
        Ok(SignedCall {
            public_key: self.key.verifying_key().to_bytes(),
            nonce,
            call,
            signature: general_purpose::STANDARD.encode(signature.to_bytes()),
        })
    }
}

/// A [`TokenCall`] authenticated by the caller's key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedCall {
    #[serde(with = "hex")]
    pub public_key: [u8; 32],
    pub nonce: u64,
    pub call: TokenCall,
    /// Base64 ed25519 signature over the domain-tagged nonce and call.
    pub signature: String,
}

impl SignedCall {
    /// Checks the signature and returns the authenticated caller.
    pub fn verify(&self) -> Result<Address, HostError> {
        let key = VerifyingKey::from_bytes(&self.public_key).map_err(|_| HostError::MalformedKey)?;
        let raw = general_purpose::STANDARD
            .decode(&self.signature)
            .map_err(|_| HostError::MalformedSignature)?;
        let signature = Signature::from_slice(&raw).map_err(|_| HostError::MalformedSignature)?;
        let message = signing_message(self.nonce, &self.call)?;
        key.verify_strict(&message, &signature)
            .map_err(|_| HostError::BadSignature)?;
        Ok(Address::from_verifying_key(&key))
    }
}

fn signing_message(nonce: u64, call: &TokenCall) -> Result<Vec<u8>, HostError> {
    let encoded = serde_json::to_vec(call).map_err(|e| HostError::Encode(e.to_string()))?;
    let mut message = Vec::with_capacity(CALL_DOMAIN.len() + 8 + encoded.len());
    message.extend_from_slice(CALL_DOMAIN);
    message.extend_from_slice(&nonce.to_le_bytes());
    message.extend_from_slice(&encoded);
    Ok(message)
}

/// Rejects a `(key, nonce)` pair seen before.
///
/// Spent pairs are never forgotten. Once `capacity` of them are held, every
/// new pair is refused with [`HostError::ReplayCapacity`].
pub struct ReplayGuard {
    seen: BTreeSet<[u8; 32]>,
    capacity: usize,
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: BTreeSet::new(),
            capacity,
        }
    }

    pub fn admit(&mut self, call: &SignedCall) -> Result<(), HostError> {
        let mut hasher = Sha256::new();
        hasher.update(call.public_key);
        hasher.update(call.nonce.to_le_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        if self.seen.contains(&digest) {
            return Err(HostError::Replay { nonce: call.nonce });
        }
        if self.seen.len() >= self.capacity {
            return Err(HostError::ReplayCapacity {
                capacity: self.capacity,
            });
        }
        self.seen.insert(digest);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Datagram answer of the UDP host.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServeReply {
    Ok { caller: Address, reply: TokenReply },
    Rejected { error: String },
}

/// Authenticates raw requests and runs them against one contract.
pub struct CallHandler {
    contract: TokenContract,
    guard: ReplayGuard,
}

impl CallHandler {
    pub fn new(contract: TokenContract) -> Self {
        Self::with_guard(contract, ReplayGuard::new())
    }

    pub fn with_guard(contract: TokenContract, guard: ReplayGuard) -> Self {
        Self { contract, guard }
    }

    pub fn contract(&self) -> &TokenContract {
        &self.contract
    }

    /// A nonce is spent once the signature checks out, even when the
    /// call itself reverts. Rejections are only logged at debug level; the
    /// caller owns the peer and reports them.
    pub fn handle(&mut self, request: &[u8]) -> ServeReply {
        let signed: SignedCall = match serde_json::from_slice(request) {
            Ok(signed) => signed,
            Err(err) => {
                debug!(error = %err, "malformed request");
                return ServeReply::Rejected {
                    error: format!("malformed request: {err}"),
                };
            }
        };
        let caller = match signed.verify().and_then(|caller| {
            self.guard.admit(&signed)?;
            Ok(caller)
        }) {
            Ok(caller) => caller,
            Err(err) => {
                debug!(error = %err, nonce = signed.nonce, "call rejected");
                return ServeReply::Rejected {
                    error: err.to_string(),
                };
            }
        };
        let reply = self.contract.execute(&caller, &signed.call);
        info!(
            caller = %caller,
            nonce = signed.nonce,
            reverted = reply.is_reverted(),
            "call executed"
        );
        ServeReply::Ok { caller, reply }
    }
}
