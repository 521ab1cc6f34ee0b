//! Network provider seam
//!
//! Everything the transaction layer needs from a JSON-RPC node, expressed as
//! plain request/response calls. "Not found" is a typed condition rather than
//! an error string so the confirmation poller can tell it apart from real
//! failures.

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use thiserror::Error;

/// Message used for `eth_call` and `eth_estimateGas`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMsg {
    pub from: Address,
    /// `None` simulates contract creation from `data`
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: Option<U256>,
}

/// Subset of a transaction receipt used by the poller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: H256,
    pub block_number: u64,
    pub transaction_index: u64,
    pub gas_used: u64,
    pub contract_address: Option<Address>,
    pub status: Option<bool>,
}

/// A mined (or pending) transaction as reported by the node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxDetail {
    pub hash: H256,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub value: U256,
    pub input: Bytes,
    pub gas_price: u64,
    pub gas: u64,
    pub block_number: Option<u64>,
    /// Provider record as returned, serialized to JSON
    pub raw: Vec<u8>,
}

/// Provider failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("not found")]
    NotFound,

    /// A receipt came back but did not decode as a standard receipt. Some
    /// node versions disagree on field encodings; the fields that could be
    /// read are kept.
    #[error("malformed receipt (block {block_number}, index {transaction_index}): {message}")]
    MalformedReceipt {
        block_number: u64,
        transaction_index: u64,
        gas_used: u64,
        contract_address: Option<Address>,
        message: String,
    },

    #[error("{0}")]
    Rpc(String),

    #[error("{field} does not fit in 64 bits: {value}")]
    Overflow { field: &'static str, value: U256 },
}

/// JSON-RPC operations consumed by the transaction layer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// Chain id the node reports
    async fn chain_id(&self) -> Result<u64, ProviderError>;

    /// Recommended gas price in wei
    async fn gas_price(&self) -> Result<u64, ProviderError>;

    /// Account nonce at the latest block
    async fn nonce_of(&self, address: Address) -> Result<u64, ProviderError>;

    /// Native balance at the latest block
    async fn balance_of(&self, address: Address) -> Result<U256, ProviderError>;

    /// Dry-run `msg` and report the gas it needs
    async fn estimate_gas(&self, msg: &CallMsg) -> Result<u64, ProviderError>;

    /// Execute `msg` read-only and return the output bytes
    async fn call(&self, msg: &CallMsg) -> Result<Bytes, ProviderError>;

    /// Broadcast a signed transaction
    async fn send_raw(&self, raw: Bytes) -> Result<H256, ProviderError>;

    async fn receipt_of(&self, hash: H256) -> Result<Receipt, ProviderError>;

    async fn transaction_of(&self, hash: H256) -> Result<TxDetail, ProviderError>;
}

/// Narrow a node-reported quantity to 64 bits
pub fn to_u64(field: &'static str, value: U256) -> Result<u64, ProviderError> {
    if value > U256::from(u64::MAX) {
        return Err(ProviderError::Overflow { field, value });
    }
    Ok(value.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_u64_bounds() {
        assert_eq!(to_u64("gas", U256::from(21_000u64)).unwrap(), 21_000);
        assert_eq!(to_u64("gas", U256::from(u64::MAX)).unwrap(), u64::MAX);
        let too_big = U256::from(u64::MAX) + 1;
        assert_eq!(
            to_u64("gas", too_big),
            Err(ProviderError::Overflow {
                field: "gas",
                value: too_big
            })
        );
    }
}
