//! Transaction builders
//!
//! `TxBuilder` assembles plain transactions and resolves their fee and
//! nonce; `ContractTxBuilder` adds ABI encoding on top for deployments and
//! contract invocations. Both return unsigned transactions.

use super::fee::{FeeOption, FeeResolver};
use super::transaction::Transaction;
use crate::abi::ContractAbi;
use crate::chain::{ChainKind, NetworkProvider};
use crate::error::{TxError, TxResult};
use crate::signer::strip_0x;

use ethers::abi::Token;
use ethers::types::{Address, U256};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Parameters of a plain transaction. Zero nonce, gas price or gas limit
/// are resolved against the provider.
#[derive(Debug, Clone, Default)]
pub struct BuildTxParam {
    pub from: String,
    /// Empty for a contract deployment
    pub to: String,
    pub value: U256,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub payload: Vec<u8>,
}

/// Parameters of a contract deployment
#[derive(Debug, Clone, Default)]
pub struct BuildDeployTxReq {
    pub from: String,
    pub abi: String,
    /// Hex init code, with or without `0x`
    pub bytecode: String,
    pub params: Vec<Token>,
    pub nonce: u64,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: u64,
}

/// Parameters of a contract invocation
#[derive(Debug, Clone, Default)]
pub struct BuildInvokeTxReq {
    pub from: String,
    pub abi: String,
    pub method: String,
    pub params: Vec<Token>,
    pub nonce: u64,
    pub value: U256,
    pub contract_address: String,
    pub gas_limit: u64,
    pub gas_price: u64,
}

/// Parse a hex account address
pub fn parse_address(address: &str) -> TxResult<Address> {
    Address::from_str(address.trim()).map_err(|e| TxError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Builds unsigned transactions for one chain family
#[derive(Clone)]
pub struct TxBuilder {
    kind: ChainKind,
    resolver: FeeResolver,
}

impl TxBuilder {
    pub fn new(kind: ChainKind, provider: Arc<dyn NetworkProvider>) -> Self {
        Self {
            kind,
            resolver: FeeResolver::new(provider),
        }
    }

    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    pub fn resolver(&self) -> &FeeResolver {
        &self.resolver
    }

    /// Build an unsigned transaction with nonce and fee resolved
    pub async fn build_tx(&self, param: BuildTxParam) -> TxResult<Transaction> {
        if param.from.trim().is_empty() {
            return Err(TxError::MissingSender);
        }
        let from = parse_address(&param.from)?;
        let to = match param.to.trim() {
            "" => None,
            to => Some(parse_address(to)?),
        };

        let mut tx = Transaction::new(self.kind, from, to, param.value, param.payload);
        tx.set_nonce(param.nonce)?;
        tx.set_fee(&FeeOption::new(param.gas_price, param.gas_limit))?;

        self.resolver.resolve(&mut tx, None).await?;

        info!(
            "Built {} {} from {:?} (nonce {}, gas price {}, gas limit {})",
            self.kind,
            if tx.is_deployment() { "deployment" } else { "transaction" },
            from,
            tx.nonce(),
            tx.gas_price(),
            tx.gas_limit()
        );
        Ok(tx)
    }

    /// Restore a transaction from `Transaction::encode` output
    pub fn decode_tx(&self, encoded: &str) -> TxResult<Transaction> {
        let tx = Transaction::decode(encoded)?;
        if tx.kind() != self.kind {
            return Err(TxError::TypeMismatch {
                expected: self.kind,
                found: tx.kind(),
            });
        }
        Ok(tx)
    }
}

/// Builds contract deployments and invocations
#[derive(Clone)]
pub struct ContractTxBuilder {
    builder: TxBuilder,
}

impl ContractTxBuilder {
    pub fn new(builder: TxBuilder) -> Self {
        Self { builder }
    }

    /// Payload is `bytecode ‖ constructor args`, recipient is empty
    pub async fn build_deploy_tx(&self, req: BuildDeployTxReq) -> TxResult<Transaction> {
        let abi = ContractAbi::parse(&req.abi)?;
        let bytecode = hex::decode(strip_0x(req.bytecode.trim()))
            .map_err(|e| TxError::Encoding(format!("bytecode: {}", e)))?;
        let payload = abi.encode_constructor(bytecode, &req.params)?;

        debug!("Deployment payload is {} bytes", payload.len());

        self.builder
            .build_tx(BuildTxParam {
                from: req.from,
                to: String::new(),
                value: req.value,
                nonce: req.nonce,
                gas_limit: req.gas_limit,
                gas_price: req.gas_price,
                payload,
            })
            .await
    }

    /// Payload is `selector ‖ args`, recipient is the contract
    pub async fn build_invoke_tx(&self, req: BuildInvokeTxReq) -> TxResult<Transaction> {
        let abi = ContractAbi::parse(&req.abi)?;
        let payload = abi.encode_call(&req.method, &req.params)?;
        if req.contract_address.trim().is_empty() {
            return Err(TxError::InvalidAddress {
                address: req.contract_address,
                reason: "contract address is empty".to_string(),
            });
        }

        debug!("Invoking {} at {}", req.method, req.contract_address);

        self.builder
            .build_tx(BuildTxParam {
                from: req.from,
                to: req.contract_address,
                value: req.value,
                nonce: req.nonce,
                gas_limit: req.gas_limit,
                gas_price: req.gas_price,
                payload,
            })
            .await
    }
}
