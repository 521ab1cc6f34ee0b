//! Decoding of signed legacy transactions
//!
//! Inverse of `Transaction::sign`: splits the broadcast bytes back into their
//! nine fields, derives the chain id carried by `v`, and recovers the sender.

use crate::error::{TxError, TxResult};
use crate::rlp::{decode_list, encode_list, RlpItem};
use crate::signer::{keccak256, RawSignature, SIGNATURE_LENGTH};

use ethers::types::{Address, H256, U256};

/// The nine fields of a signed legacy transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub nonce: u64,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Vec<u8>,
    pub v: u64,
    pub r: Vec<u8>,
    pub s: Vec<u8>,
    /// Hash of the decoded bytes
    pub hash: H256,
}

impl RawTransaction {
    pub fn decode(bytes: &[u8]) -> TxResult<Self> {
        let fields = decode_list(bytes)?;
        if fields.len() != 9 {
            return Err(TxError::Encoding(format!(
                "signed transaction has {} fields, expected 9",
                fields.len()
            )));
        }
        if let Some(index) = fields
            .iter()
            .position(|field| matches!(field, RlpItem::List(_)))
        {
            return Err(TxError::Encoding(format!(
                "field {} is a list, expected a byte string",
                index
            )));
        }

        let to = match fields[3].as_bytes()? {
            [] => None,
            address if address.len() == 20 => Some(Address::from_slice(address)),
            other => {
                return Err(TxError::Encoding(format!(
                    "recipient is {} bytes long",
                    other.len()
                )))
            }
        };

        // R and S are integers on the wire: the accessor rejects padding
        fields[7].as_u256()?;
        fields[8].as_u256()?;

        Ok(Self {
            nonce: fields[0].as_u64()?,
            gas_price: fields[1].as_u64()?,
            gas_limit: fields[2].as_u64()?,
            to,
            value: fields[4].as_u256()?,
            data: fields[5].as_bytes()?.to_vec(),
            v: fields[6].as_u64()?,
            r: fields[7].as_bytes()?.to_vec(),
            s: fields[8].as_bytes()?.to_vec(),
            hash: H256::from(keccak256(bytes)),
        })
    }

    /// Chain id bound by `v`; `None` for unprotected signatures
    pub fn chain_id(&self) -> Option<u64> {
        if self.v >= 35 {
            Some((self.v - 35) / 2)
        } else {
            None
        }
    }

    /// Parity of the recovered point (0 or 1)
    pub fn recovery_id(&self) -> TxResult<u8> {
        match self.v {
            27 | 28 => Ok((self.v - 27) as u8),
            v if v >= 35 => Ok(((v - 35) % 2) as u8),
            v => Err(TxError::InvalidSignature(format!("unexpected v {}", v))),
        }
    }

    /// Digest the sender signed, for the chain id carried by `v`
    pub fn signing_hash(&self) -> [u8; 32] {
        self.signing_hash_for(self.chain_id().unwrap_or(0))
    }

    /// Digest this transaction would have for `chain_id`
    pub fn signing_hash_for(&self, chain_id: u64) -> [u8; 32] {
        let mut fields: Vec<RlpItem> = vec![
            self.nonce.into(),
            self.gas_price.into(),
            self.gas_limit.into(),
            self.to.into(),
            self.value.into(),
            RlpItem::Bytes(self.data.clone()),
        ];
        if chain_id != 0 {
            fields.push(chain_id.into());
            fields.push(0u64.into());
            fields.push(0u64.into());
        }
        keccak256(&encode_list(&fields))
    }

    /// Recover the sender address
    pub fn recover_sender(&self) -> TxResult<Address> {
        self.recover_for(self.chain_id().unwrap_or(0))
    }

    /// Recover the address that would have signed this transaction on
    /// `chain_id`. For any chain other than the one bound by `v` the result
    /// is an unrelated address.
    pub fn recover_for(&self, chain_id: u64) -> TxResult<Address> {
        if self.r.len() > 32 || self.s.len() > 32 {
            return Err(TxError::InvalidSignature(
                "R or S longer than 32 bytes".to_string(),
            ));
        }
        let mut signature = [0u8; SIGNATURE_LENGTH];
        signature[32 - self.r.len()..32].copy_from_slice(&self.r);
        signature[64 - self.s.len()..64].copy_from_slice(&self.s);
        signature[64] = self.recovery_id()?;
        RawSignature::from_slice(&signature)?.recover(&self.signing_hash_for(chain_id))
    }
}
