//! ethers-backed HTTP provider

use super::provider::{to_u64, CallMsg, NetworkProvider, ProviderError, Receipt, TxDetail};
use crate::config::ChainConfig;
use crate::error::{TxError, TxResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// JSON-RPC provider for one chain
pub struct RpcProvider {
    /// Chain name from configuration, for log context
    name: String,
    http: Provider<Http>,
}

impl RpcProvider {
    /// Create a provider for a configured chain
    pub fn new(name: &str, config: &ChainConfig) -> TxResult<Self> {
        let http = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| TxError::Config(format!("invalid RPC URL for {}: {}", name, e)))?
            .interval(Duration::from_millis(100));

        debug!("Added HTTP provider for chain {}: {}", name, config.rpc_url);

        Ok(Self {
            name: name.to_string(),
            http,
        })
    }

    fn rpc_error(&self, operation: &str, err: impl std::fmt::Display) -> ProviderError {
        warn!("{} failed on chain {}: {}", operation, self.name, err);
        ProviderError::Rpc(format!("{}: {}", operation, err))
    }

    fn to_request(msg: &CallMsg) -> TypedTransaction {
        let mut request = TransactionRequest::new()
            .from(msg.from)
            .data(msg.data.clone());
        if let Some(to) = msg.to {
            request = request.to(to);
        }
        if let Some(value) = msg.value {
            request = request.value(value);
        }
        TypedTransaction::Legacy(request)
    }
}

#[async_trait]
impl NetworkProvider for RpcProvider {
    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let id = self
            .http
            .get_chainid()
            .await
            .map_err(|e| self.rpc_error("eth_chainId", e))?;
        to_u64("chain id", id)
    }

    async fn gas_price(&self) -> Result<u64, ProviderError> {
        let price = self
            .http
            .get_gas_price()
            .await
            .map_err(|e| self.rpc_error("eth_gasPrice", e))?;
        to_u64("gas price", price)
    }

    async fn nonce_of(&self, address: Address) -> Result<u64, ProviderError> {
        let nonce = self
            .http
            .get_transaction_count(address, Some(BlockNumber::Latest.into()))
            .await
            .map_err(|e| self.rpc_error("eth_getTransactionCount", e))?;
        to_u64("nonce", nonce)
    }

    async fn balance_of(&self, address: Address) -> Result<U256, ProviderError> {
        self.http
            .get_balance(address, Some(BlockNumber::Latest.into()))
            .await
            .map_err(|e| self.rpc_error("eth_getBalance", e))
    }

    async fn estimate_gas(&self, msg: &CallMsg) -> Result<u64, ProviderError> {
        let gas = self
            .http
            .estimate_gas(&Self::to_request(msg), None)
            .await
            .map_err(|e| self.rpc_error("eth_estimateGas", e))?;
        to_u64("gas limit", gas)
    }

    async fn call(&self, msg: &CallMsg) -> Result<Bytes, ProviderError> {
        self.http
            .call(&Self::to_request(msg), Some(BlockNumber::Latest.into()))
            .await
            .map_err(|e| self.rpc_error("eth_call", e))
    }

    async fn send_raw(&self, raw: Bytes) -> Result<H256, ProviderError> {
        let pending = self
            .http
            .send_raw_transaction(raw)
            .await
            .map_err(|e| self.rpc_error("eth_sendRawTransaction", e))?;
        Ok(pending.tx_hash())
    }

    async fn receipt_of(&self, hash: H256) -> Result<Receipt, ProviderError> {
        // Fetched as raw JSON so that a receipt in a non-standard encoding
        // still yields the fields the poller needs.
        let value: Option<Value> = self
            .http
            .request("eth_getTransactionReceipt", [hash])
            .await
            .map_err(|e| self.rpc_error("eth_getTransactionReceipt", e))?;

        match value {
            None | Some(Value::Null) => Err(ProviderError::NotFound),
            Some(value) => parse_receipt(value),
        }
    }

    async fn transaction_of(&self, hash: H256) -> Result<TxDetail, ProviderError> {
        let tx = self
            .http
            .get_transaction(hash)
            .await
            .map_err(|e| self.rpc_error("eth_getTransactionByHash", e))?
            .ok_or(ProviderError::NotFound)?;

        let raw = serde_json::to_vec(&tx).map_err(|e| ProviderError::Rpc(e.to_string()))?;

        Ok(TxDetail {
            hash: tx.hash,
            from: tx.from,
            to: tx.to,
            nonce: to_u64("nonce", tx.nonce)?,
            value: tx.value,
            input: tx.input,
            gas_price: to_u64("gas price", tx.gas_price.unwrap_or_default())?,
            gas: to_u64("gas limit", tx.gas)?,
            block_number: tx.block_number.map(|b| b.as_u64()),
            raw,
        })
    }
}

fn parse_receipt(value: Value) -> Result<Receipt, ProviderError> {
    match serde_json::from_value::<TransactionReceipt>(value.clone()) {
        Ok(receipt) => Ok(Receipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|b| b.as_u64()).unwrap_or(0),
            transaction_index: receipt.transaction_index.as_u64(),
            gas_used: to_u64("gas used", receipt.gas_used.unwrap_or_default())?,
            contract_address: receipt.contract_address,
            status: receipt.status.map(|s| s.as_u64() == 1),
        }),
        Err(e) => Err(ProviderError::MalformedReceipt {
            block_number: lenient_u64(value.get("blockNumber")),
            transaction_index: lenient_u64(value.get("transactionIndex")),
            gas_used: lenient_u64(value.get("gasUsed")),
            contract_address: value
                .get("contractAddress")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
            message: e.to_string(),
        }),
    }
}

/// Read a quantity that may be a hex string, a decimal string or a number
fn lenient_u64(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => match s.strip_prefix("0x") {
            Some(hex_digits) => u64::from_str_radix(hex_digits, 16).unwrap_or(0),
            None => s.parse().unwrap_or(0),
        },
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn standard_receipt() -> Value {
        json!({
            "transactionHash": format!("0x{}", "11".repeat(32)),
            "transactionIndex": "0x0",
            "blockHash": format!("0x{}", "22".repeat(32)),
            "blockNumber": "0x10",
            "from": format!("0x{}", "aa".repeat(20)),
            "to": null,
            "cumulativeGasUsed": "0x5208",
            "gasUsed": "0x5208",
            "contractAddress": format!("0x{}", "cc".repeat(20)),
            "logs": [],
            "logsBloom": format!("0x{}", "00".repeat(256)),
            "status": "0x1",
            "effectiveGasPrice": "0x1"
        })
    }

    #[test]
    fn test_parse_standard_receipt() {
        let receipt = parse_receipt(standard_receipt()).unwrap();
        assert_eq!(receipt.block_number, 16);
        assert_eq!(receipt.gas_used, 21_000);
        assert_eq!(receipt.status, Some(true));
        assert_eq!(
            receipt.contract_address,
            Some(Address::from_slice(&[0xcc; 20]))
        );
    }

    #[test]
    fn test_parse_malformed_receipt_keeps_fields() {
        let mut value = standard_receipt();
        // numeric index and no logs array: some node versions do this
        value["transactionIndex"] = json!(0);
        value["logs"] = json!("broken");

        match parse_receipt(value) {
            Err(ProviderError::MalformedReceipt {
                block_number,
                transaction_index,
                gas_used,
                contract_address,
                ..
            }) => {
                assert_eq!(block_number, 16);
                assert_eq!(transaction_index, 0);
                assert_eq!(gas_used, 21_000);
                assert!(contract_address.is_some());
            }
            other => panic!("expected malformed receipt, got {:?}", other),
        }
    }

    #[test]
    fn test_lenient_u64() {
        assert_eq!(lenient_u64(Some(&json!("0x1f"))), 31);
        assert_eq!(lenient_u64(Some(&json!("42"))), 42);
        assert_eq!(lenient_u64(Some(&json!(7))), 7);
        assert_eq!(lenient_u64(Some(&json!(null))), 0);
        assert_eq!(lenient_u64(None), 0);
    }

    #[test]
    fn test_deployment_request_has_no_recipient() {
        let msg = CallMsg {
            from: Address::from_slice(&[0xaa; 20]),
            to: None,
            data: Bytes::from(vec![0x60, 0x80]),
            value: None,
        };
        let request = RpcProvider::to_request(&msg);
        assert!(request.to().is_none());
        assert_eq!(request.from(), Some(&msg.from));
    }
}
