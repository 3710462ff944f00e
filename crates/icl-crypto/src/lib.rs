// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// INTERCLEAR - CRYPTOGRAPHY MODULE
//
// secp256k1 recoverable ECDSA for vote and mint-command attestations.
// - keccak256 / sha256 digests
// - recoverable signing, public-key recovery, registry verification
// - Ethereum-style address derivation (keccak of the 64-byte key body)
// - SignerOracle capability: the core never touches private keys
//   except through this boundary.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sha3::{Digest, Keccak256};
use std::collections::BTreeMap;
use zeroize::Zeroize;

/// Uncompressed SEC1 public key length (0x04 prefix + 64-byte body)
pub const PUBLIC_KEY_UNCOMPRESSED_LEN: usize = 65;
/// Compressed SEC1 public key length
pub const PUBLIC_KEY_COMPRESSED_LEN: usize = 33;
/// r(32) ‖ s(32) ‖ v(1)
pub const SIGNATURE_RSV_LEN: usize = 65;

/// Prefix applied to mint-command hashes before signing, byte-exact with
/// the on-chain executor contract.
const ETH_SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

#[derive(Debug, PartialEq, Eq)]
pub enum CryptoError {
    InvalidKey,
    InvalidSignature,
    InvalidRecoveryId,
    RecoveryFailed,
    InvalidAddress,
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CryptoError::InvalidKey => write!(f, "invalid key format"),
            CryptoError::InvalidSignature => write!(f, "invalid signature encoding"),
            CryptoError::InvalidRecoveryId => write!(f, "recovery id must be 0, 1, 27 or 28"),
            CryptoError::RecoveryFailed => write!(f, "public key recovery failed"),
            CryptoError::InvalidAddress => write!(f, "invalid address format"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// secp256k1 keypair. Public key is kept in the canonical 65-byte
/// uncompressed form.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KeyPair {
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

/// keccak256 digest
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// sha256 digest
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// `keccak256("\x19Ethereum Signed Message:\n32" ‖ h)`: the digest
/// validators actually sign for mint commands.
pub fn eth_signed_message_hash(h: &[u8; 32]) -> [u8; 32] {
    let mut data = Vec::with_capacity(ETH_SIGNED_MESSAGE_PREFIX.len() + 32);
    data.extend_from_slice(ETH_SIGNED_MESSAGE_PREFIX);
    data.extend_from_slice(h);
    keccak256(&data)
}

/// Generate a fresh random keypair.
pub fn generate_keypair() -> KeyPair {
    use rand::RngCore;
    let mut rng = rand::thread_rng();
    // A uniformly random 32-byte string is outside the curve order with
    // probability < 2^-127; loop rather than unwrap.
    loop {
        let mut candidate = [0u8; 32];
        rng.fill_bytes(&mut candidate);
        if let Ok(sk) = libsecp256k1::SecretKey::parse(&candidate) {
            let pk = libsecp256k1::PublicKey::from_secret_key(&sk);
            candidate.zeroize();
            return KeyPair {
                public_key: pk.serialize().to_vec(),
                secret_key: sk.serialize().to_vec(),
            };
        }
    }
}

/// Reconstruct a keypair from a 32-byte secret.
pub fn keypair_from_secret(secret: &[u8]) -> Result<KeyPair, CryptoError> {
    let sk =
        libsecp256k1::SecretKey::parse_slice(secret).map_err(|_| CryptoError::InvalidKey)?;
    let pk = libsecp256k1::PublicKey::from_secret_key(&sk);
    Ok(KeyPair {
        public_key: pk.serialize().to_vec(),
        secret_key: sk.serialize().to_vec(),
    })
}

/// Canonicalize a registered public key to the 65-byte uncompressed form.
/// Accepts 33-byte compressed and 65-byte uncompressed inputs.
pub fn canonical_public_key(bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if bytes.len() != PUBLIC_KEY_COMPRESSED_LEN && bytes.len() != PUBLIC_KEY_UNCOMPRESSED_LEN {
        return Err(CryptoError::InvalidKey);
    }
    let pk = libsecp256k1::PublicKey::parse_slice(bytes, None)
        .map_err(|_| CryptoError::InvalidKey)?;
    Ok(pk.serialize().to_vec())
}

/// Derive the bank-network address for a public key:
/// `0x` + hex(last 20 bytes of keccak256(uncompressed key body)).
pub fn derive_address(public_key: &[u8]) -> Result<String, CryptoError> {
    let canonical = canonical_public_key(public_key)?;
    let digest = keccak256(&canonical[1..PUBLIC_KEY_UNCOMPRESSED_LEN]);
    Ok(format!("0x{}", hex::encode(&digest[12..])))
}

/// Parse a `0x`-prefixed 20-byte hex address.
pub fn parse_address(address: &str) -> Result<[u8; 20], CryptoError> {
    let stripped = address
        .strip_prefix("0x")
        .ok_or(CryptoError::InvalidAddress)?;
    let bytes = hex::decode(stripped).map_err(|_| CryptoError::InvalidAddress)?;
    if bytes.len() != 20 {
        return Err(CryptoError::InvalidAddress);
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Normalize a recovery byte: accepts {0, 1, 27, 28}, returns {0, 1}.
pub fn normalize_v(v: u8) -> Result<u8, CryptoError> {
    match v {
        0 | 1 => Ok(v),
        27 | 28 => Ok(v - 27),
        _ => Err(CryptoError::InvalidRecoveryId),
    }
}

/// Sign a 32-byte digest, returning (r, s, v) with v ∈ {0, 1}.
pub fn sign_recoverable(
    secret: &[u8],
    digest: &[u8; 32],
) -> Result<([u8; 32], [u8; 32], u8), CryptoError> {
    let sk =
        libsecp256k1::SecretKey::parse_slice(secret).map_err(|_| CryptoError::InvalidKey)?;
    let message = libsecp256k1::Message::parse(digest);
    let (signature, recid) = libsecp256k1::sign(&message, &sk);
    let rs = signature.serialize();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&rs[0..32]);
    s.copy_from_slice(&rs[32..64]);
    Ok((r, s, recid.serialize()))
}

/// Recover the 65-byte uncompressed public key that produced (r, s, v)
/// over `digest`.
pub fn recover(
    digest: &[u8; 32],
    r: &[u8; 32],
    s: &[u8; 32],
    v: u8,
) -> Result<Vec<u8>, CryptoError> {
    let mut rs = [0u8; 64];
    rs[0..32].copy_from_slice(r);
    rs[32..64].copy_from_slice(s);
    let signature = libsecp256k1::Signature::parse_standard_slice(&rs)
        .map_err(|_| CryptoError::InvalidSignature)?;
    let recid = libsecp256k1::RecoveryId::parse(normalize_v(v)?)
        .map_err(|_| CryptoError::InvalidRecoveryId)?;
    let message = libsecp256k1::Message::parse(digest);
    let pk = libsecp256k1::recover(&message, &signature, &recid)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    Ok(pk.serialize().to_vec())
}

/// Verify that (r, s, v) over `digest` recovers to `registered_key`.
/// The registered key may be compressed or uncompressed; both sides are
/// canonicalized before the byte comparison.
pub fn verify_recoverable(
    registered_key: &[u8],
    digest: &[u8; 32],
    r: &[u8; 32],
    s: &[u8; 32],
    v: u8,
) -> bool {
    let canonical = match canonical_public_key(registered_key) {
        Ok(k) => k,
        Err(_) => return false,
    };
    match recover(digest, r, s, v) {
        Ok(recovered) => recovered == canonical,
        Err(_) => false,
    }
}

/// Pack (r, s, v) into the 65-byte wire encoding.
pub fn encode_rsv(r: &[u8; 32], s: &[u8; 32], v: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(SIGNATURE_RSV_LEN);
    out.extend_from_slice(r);
    out.extend_from_slice(s);
    out.push(v);
    out
}

/// Split a 65-byte wire signature into (r, s, v).
pub fn split_rsv(signature: &[u8]) -> Result<([u8; 32], [u8; 32], u8), CryptoError> {
    if signature.len() != SIGNATURE_RSV_LEN {
        return Err(CryptoError::InvalidSignature);
    }
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&signature[0..32]);
    s.copy_from_slice(&signature[32..64]);
    Ok((r, s, signature[64]))
}

/// Capability boundary around validator key custody. Nodes that hold no
/// keys return an empty address list and the signing sweep is a no-op.
pub trait SignerOracle: Send + Sync {
    /// Addresses this node can sign for.
    fn held_addresses(&self) -> Vec<String>;
    /// Sign `digest` with the key for `address`; None if the key is not held.
    fn sign_digest(
        &self,
        address: &str,
        digest: &[u8; 32],
    ) -> Option<Result<([u8; 32], [u8; 32], u8), CryptoError>>;
}

/// In-process keyring mapping validator address → secret key.
pub struct LocalKeyring {
    keys: BTreeMap<String, Vec<u8>>,
}

impl LocalKeyring {
    pub fn new() -> Self {
        Self {
            keys: BTreeMap::new(),
        }
    }

    /// Add a secret key; the held address is derived from it.
    pub fn insert_secret(&mut self, secret: &[u8]) -> Result<String, CryptoError> {
        let pair = keypair_from_secret(secret)?;
        let address = derive_address(&pair.public_key)?;
        self.keys.insert(address.clone(), pair.secret_key.clone());
        Ok(address)
    }

    /// Load hex-encoded secrets, one per line; blank lines and `#`
    /// comments are skipped.
    pub fn from_hex_lines(contents: &str) -> Result<Self, CryptoError> {
        let mut keyring = Self::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let secret = hex::decode(line).map_err(|_| CryptoError::InvalidKey)?;
            keyring.insert_secret(&secret)?;
        }
        Ok(keyring)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for LocalKeyring {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LocalKeyring {
    fn drop(&mut self) {
        for secret in self.keys.values_mut() {
            secret.zeroize();
        }
    }
}

impl SignerOracle for LocalKeyring {
    fn held_addresses(&self) -> Vec<String> {
        self.keys.keys().cloned().collect()
    }

    fn sign_digest(
        &self,
        address: &str,
        digest: &[u8; 32],
    ) -> Option<Result<([u8; 32], [u8; 32], u8), CryptoError>> {
        self.keys
            .get(address)
            .map(|secret| sign_recoverable(secret, digest))
    }
}
