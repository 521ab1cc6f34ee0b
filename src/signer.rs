//! Keccak-256 digests and recoverable secp256k1 signatures
//!
//! The signer only knows about 32-byte digests; it has no idea what a
//! transaction looks like.

use crate::error::{TxError, TxResult};

use ethers::core::k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use ethers::types::Address;
use std::fmt;

pub use ethers::utils::keccak256;

/// Length of `R ‖ S ‖ parity`
pub const SIGNATURE_LENGTH: usize = 65;

/// A 65-byte recoverable signature: 32-byte R, 32-byte S, parity (0 or 1)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawSignature([u8; SIGNATURE_LENGTH]);

impl RawSignature {
    /// Wrap externally produced signature bytes
    pub fn from_slice(bytes: &[u8]) -> TxResult<Self> {
        let bytes: [u8; SIGNATURE_LENGTH] = bytes.try_into().map_err(|_| {
            TxError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LENGTH,
                bytes.len()
            ))
        })?;
        if bytes[64] > 1 {
            return Err(TxError::InvalidSignature(format!(
                "recovery byte must be 0 or 1, got {}",
                bytes[64]
            )));
        }
        Ok(Self(bytes))
    }

    /// Parse a hex signature, with or without `0x`
    pub fn from_hex(signature_hex: &str) -> TxResult<Self> {
        let bytes = hex::decode(strip_0x(signature_hex))
            .map_err(|e| TxError::InvalidSignature(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn r(&self) -> &[u8] {
        &self.0[..32]
    }

    pub fn s(&self) -> &[u8] {
        &self.0[32..64]
    }

    /// Recovery parity, already normalized to 0 or 1
    pub fn recovery_id(&self) -> u8 {
        self.0[64]
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Recover the address that produced this signature over `digest`
    pub fn recover(&self, digest: &[u8; 32]) -> TxResult<Address> {
        let signature = Signature::try_from(&self.0[..64])
            .map_err(|e| TxError::InvalidSignature(e.to_string()))?;
        let recovery_id = RecoveryId::try_from(self.recovery_id())
            .map_err(|e| TxError::InvalidSignature(e.to_string()))?;
        let key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)
            .map_err(|e| TxError::InvalidSignature(e.to_string()))?;
        Ok(public_key_to_address(&key))
    }
}

impl fmt::Debug for RawSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawSignature(0x{})", self.to_hex())
    }
}

/// Holds a private key in memory and signs digests with it
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    /// Load a key from 64 hex digits, with or without `0x`
    pub fn from_hex(private_key_hex: &str) -> TxResult<Self> {
        let bytes = hex::decode(strip_0x(private_key_hex.trim()))
            .map_err(|e| TxError::InvalidKey(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TxError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let key = SigningKey::from_slice(&bytes).map_err(|e| TxError::InvalidKey(e.to_string()))?;
        let address = public_key_to_address(key.verifying_key());
        Ok(Self { key, address })
    }

    /// Address derived from the public key
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest. Signing is deterministic (RFC 6979) and S is
    /// always in the lower half of the curve order.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> TxResult<RawSignature> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| TxError::InvalidSignature(e.to_string()))?;

        // A high S flips the parity of the recovered point
        let (signature, is_y_odd) = match signature.normalize_s() {
            Some(low_s) => (low_s, !recovery_id.is_y_odd()),
            None => (signature, recovery_id.is_y_odd()),
        };

        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = u8::from(is_y_odd);
        Ok(RawSignature(out))
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Derive the account address from a public key
pub fn public_key_to_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 prefix byte, hash the remaining 64 bytes
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Parse a 32-byte hash given as hex
pub fn parse_hash(hash_hex: &str) -> TxResult<[u8; 32]> {
    let bytes = hex::decode(strip_0x(hash_hex.trim()))
        .map_err(|e| TxError::InvalidHash(format!("{}: {}", hash_hex, e)))?;
    bytes
        .try_into()
        .map_err(|_| TxError::InvalidHash(format!("{}: expected 32 bytes", hash_hex)))
}

/// Sign an externally supplied hash; returns the 65-byte signature as hex
pub fn sign_hash(private_key_hex: &str, hash_hex: &str) -> TxResult<String> {
    let signer = LocalSigner::from_hex(private_key_hex)?;
    let digest = parse_hash(hash_hex)?;
    Ok(signer.sign_digest(&digest)?.to_hex())
}

pub(crate) fn strip_0x(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}
