//! Transaction entity and its signing protocol
//!
//! A `Transaction` is created unsigned by the builders, has its fee and nonce
//! filled in by the resolver, and becomes immutable once signed. Signing runs
//! the same steps whether the key is local (`sign`) or the signature comes
//! from elsewhere (`inject_signature`):
//!
//! 1. preimage `[nonce, gasPrice, gasLimit, to, value, data]`, plus
//!    `[chainId, 0, 0]` when the chain id is non-zero
//! 2. digest = keccak256(rlp(preimage))
//! 3. 65-byte signature over the digest
//! 4. `v = parity + 35 + 2 * chainId`, or `27 + parity` without a chain id
//! 5. R and S stripped of leading zero bytes
//! 6. raw = rlp(`[nonce, gasPrice, gasLimit, to, value, data, v, r, s]`)

use super::fee::FeeOption;
use crate::chain::{parse_chain_id, ChainKind, ChainSpec};
use crate::error::{TxError, TxResult};
use crate::rlp::{encode_list, trim_leading_zeros, RlpItem};
use crate::signer::{keccak256, strip_0x, LocalSigner, RawSignature};

use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Chain-id adjusted signature values as written into the raw transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSignature {
    pub v: u64,
    /// Minimal big-endian, never a leading zero byte
    pub r: Bytes,
    pub s: Bytes,
}

/// A legacy EVM transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    kind: ChainKind,
    from: Address,
    /// `None` marks a contract deployment
    to: Option<Address>,
    value: U256,
    nonce: u64,
    gas_price: u64,
    #[serde(rename = "gas")]
    gas_limit: u64,
    #[serde(rename = "input")]
    data: Bytes,
    signature: Option<TxSignature>,
    raw: Option<Bytes>,
    hash: Option<H256>,
}

impl Transaction {
    /// Create an unsigned transaction with unresolved fee and nonce
    pub fn new(
        kind: ChainKind,
        from: Address,
        to: Option<Address>,
        value: U256,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            kind,
            from,
            to,
            value,
            nonce: 0,
            gas_price: 0,
            gas_limit: 0,
            data: data.into(),
            signature: None,
            raw: None,
            hash: None,
        }
    }

    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    pub fn from(&self) -> Address {
        self.from
    }

    pub fn to(&self) -> Option<Address> {
        self.to
    }

    pub fn is_deployment(&self) -> bool {
        self.to.is_none()
    }

    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn gas_price(&self) -> u64 {
        self.gas_price
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    /// Payload bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn fee(&self) -> FeeOption {
        FeeOption::new(self.gas_price, self.gas_limit)
    }

    pub fn signature(&self) -> Option<&TxSignature> {
        self.signature.as_ref()
    }

    /// Signed canonical encoding, ready for broadcast
    pub fn raw(&self) -> Option<&Bytes> {
        self.raw.as_ref()
    }

    /// Hash of the signed transaction
    pub fn hash(&self) -> Option<H256> {
        self.hash
    }

    pub fn is_signed(&self) -> bool {
        self.raw.is_some()
    }

    // ---- mutation, refused once signed ----

    fn ensure_unsigned(&self) -> TxResult<()> {
        if self.is_signed() {
            return Err(TxError::AlreadySigned);
        }
        Ok(())
    }

    /// Apply the non-zero parts of `fee`; zero entries leave the current
    /// value in place
    pub fn set_fee(&mut self, fee: &FeeOption) -> TxResult<()> {
        self.ensure_unsigned()?;
        if fee.gas_price != 0 {
            self.gas_price = fee.gas_price;
        }
        if fee.gas_limit != 0 {
            self.gas_limit = fee.gas_limit;
        }
        Ok(())
    }

    pub fn set_value(&mut self, value: U256) -> TxResult<()> {
        self.ensure_unsigned()?;
        self.value = value;
        Ok(())
    }

    pub fn set_nonce(&mut self, nonce: u64) -> TxResult<()> {
        self.ensure_unsigned()?;
        self.nonce = nonce;
        Ok(())
    }

    pub(crate) fn set_from(&mut self, from: Address) -> TxResult<()> {
        self.ensure_unsigned()?;
        self.from = from;
        Ok(())
    }

    // ---- signing ----

    fn unsigned_fields(&self) -> Vec<RlpItem> {
        vec![
            self.nonce.into(),
            self.gas_price.into(),
            self.gas_limit.into(),
            self.to.into(),
            self.value.into(),
            RlpItem::Bytes(self.data.to_vec()),
        ]
    }

    /// Preimage fields for `chain_id`
    pub fn signing_fields(&self, chain_id: u64) -> Vec<RlpItem> {
        let mut fields = self.unsigned_fields();
        if chain_id != 0 {
            fields.push(chain_id.into());
            fields.push(0u64.into());
            fields.push(0u64.into());
        }
        fields
    }

    /// Digest the signature is computed over
    pub fn signing_hash(&self, chain_id: u64) -> [u8; 32] {
        keccak256(&encode_list(&self.signing_fields(chain_id)))
    }

    /// Hex digest for an offline signer
    pub fn signing_hash_hex(&self, chain_id: &str) -> TxResult<String> {
        let chain_id = parse_chain_id(chain_id)?;
        Ok(hex::encode(self.signing_hash(chain_id)))
    }

    /// Sign with a hex private key for a decimal chain id
    pub fn sign(&mut self, private_key_hex: &str, chain_id: &str) -> TxResult<()> {
        let signer = LocalSigner::from_hex(private_key_hex)?;
        let chain = ChainSpec::new(self.kind, parse_chain_id(chain_id)?);
        self.sign_with(&signer, &chain)
    }

    /// Sign for `chain`, which must be of this transaction's kind
    pub fn sign_with(&mut self, signer: &LocalSigner, chain: &ChainSpec) -> TxResult<()> {
        if chain.kind != self.kind {
            return Err(TxError::TypeMismatch {
                expected: chain.kind,
                found: self.kind,
            });
        }
        self.ensure_signable()?;
        let digest = self.signing_hash(chain.chain_id);
        let signature = signer.sign_digest(&digest)?;
        self.apply_signature(&signature, chain.chain_id)
    }

    /// Finish the transaction with a 65-byte signature produced elsewhere
    /// over `signing_hash_hex(chain_id)`
    pub fn inject_signature(&mut self, signature_hex: &str, chain_id: &str) -> TxResult<()> {
        let signature = RawSignature::from_hex(signature_hex)?;
        let chain_id = parse_chain_id(chain_id)?;
        self.ensure_signable()?;
        self.apply_signature(&signature, chain_id)
    }

    fn ensure_signable(&self) -> TxResult<()> {
        self.ensure_unsigned()?;
        if self.gas_price == 0 {
            return Err(TxError::FeeUnresolved("gas price"));
        }
        if self.gas_limit == 0 {
            return Err(TxError::FeeUnresolved("gas limit"));
        }
        Ok(())
    }

    fn apply_signature(&mut self, signature: &RawSignature, chain_id: u64) -> TxResult<()> {
        let v = recovery_value(signature.recovery_id(), chain_id)?;
        let r = trim_leading_zeros(signature.r()).to_vec();
        let s = trim_leading_zeros(signature.s()).to_vec();

        let mut fields = self.unsigned_fields();
        fields.push(v.into());
        fields.push(RlpItem::Bytes(r.clone()));
        fields.push(RlpItem::Bytes(s.clone()));

        let raw = encode_list(&fields);
        let hash = H256::from(keccak256(&raw));

        debug!(
            "Signed {} transaction {:?} for chain id {} (nonce {}, v {})",
            self.kind, hash, chain_id, self.nonce, v
        );

        self.signature = Some(TxSignature {
            v,
            r: r.into(),
            s: s.into(),
        });
        self.raw = Some(raw.into());
        self.hash = Some(hash);
        Ok(())
    }

    // ---- transport ----

    /// Hex of the JSON form, for carrying an unsigned (or signed)
    /// transaction to another process
    pub fn encode(&self) -> TxResult<String> {
        let json = serde_json::to_vec(self).map_err(|e| TxError::Encoding(e.to_string()))?;
        Ok(hex::encode(json))
    }

    pub fn decode(encoded: &str) -> TxResult<Self> {
        let json = hex::decode(strip_0x(encoded.trim()))
            .map_err(|e| TxError::Encoding(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| TxError::Encoding(e.to_string()))
    }
}

/// Recovery value written into the transaction
pub fn recovery_value(parity: u8, chain_id: u64) -> TxResult<u64> {
    let parity = u64::from(parity);
    if chain_id == 0 {
        return Ok(27 + parity);
    }
    chain_id
        .checked_mul(2)
        .and_then(|doubled| doubled.checked_add(35 + parity))
        .ok_or_else(|| TxError::InvalidChainId(format!("{} is too large", chain_id)))
}
