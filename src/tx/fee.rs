//! Fee and nonce resolution
//!
//! Fills the gas price, gas limit and nonce a transaction still lacks. For
//! each field the first non-zero source wins:
//!
//! - gas price: fee option, the transaction itself, `eth_gasPrice`
//! - gas limit: fee option, the transaction itself, `eth_estimateGas`
//! - nonce: the transaction itself, the account nonce at the latest block
//!
//! Provider errors abort resolution unchanged.

use super::transaction::Transaction;
use crate::chain::{CallMsg, NetworkProvider};
use crate::error::TxResult;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Optional fee override. Zero means "let the resolver pick".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeOption {
    pub gas_price: u64,
    pub gas_limit: u64,
}

impl FeeOption {
    pub fn new(gas_price: u64, gas_limit: u64) -> Self {
        Self {
            gas_price,
            gas_limit,
        }
    }
}

/// Resolves fees and nonces against a provider
#[derive(Clone)]
pub struct FeeResolver {
    provider: Arc<dyn NetworkProvider>,
}

impl FeeResolver {
    pub fn new(provider: Arc<dyn NetworkProvider>) -> Self {
        Self { provider }
    }

    /// Fill every unresolved field of `tx`
    pub async fn resolve(&self, tx: &mut Transaction, fee: Option<&FeeOption>) -> TxResult<()> {
        self.resolve_nonce(tx).await?;
        self.resolve_gas_price(tx, fee).await?;
        self.resolve_gas_limit(tx, fee).await?;
        Ok(())
    }

    pub async fn resolve_nonce(&self, tx: &mut Transaction) -> TxResult<()> {
        if tx.nonce() != 0 {
            return Ok(());
        }
        let nonce = self.provider.nonce_of(tx.from()).await?;
        debug!("Nonce for {:?} from provider: {}", tx.from(), nonce);
        tx.set_nonce(nonce)
    }

    pub async fn resolve_gas_price(
        &self,
        tx: &mut Transaction,
        fee: Option<&FeeOption>,
    ) -> TxResult<()> {
        let explicit = fee.map(|f| f.gas_price).unwrap_or(0);
        let gas_price = if explicit != 0 {
            debug!("Gas price from fee option: {}", explicit);
            explicit
        } else if tx.gas_price() != 0 {
            return Ok(());
        } else {
            let price = self.provider.gas_price().await?;
            debug!("Gas price from provider: {}", price);
            price
        };
        tx.set_fee(&FeeOption::new(gas_price, 0))
    }

    pub async fn resolve_gas_limit(
        &self,
        tx: &mut Transaction,
        fee: Option<&FeeOption>,
    ) -> TxResult<()> {
        let explicit = fee.map(|f| f.gas_limit).unwrap_or(0);
        let gas_limit = if explicit != 0 {
            debug!("Gas limit from fee option: {}", explicit);
            explicit
        } else if tx.gas_limit() != 0 {
            return Ok(());
        } else {
            let limit = self.provider.estimate_gas(&call_msg(tx)).await?;
            debug!(
                "Gas limit from estimate ({}): {}",
                if tx.is_deployment() { "deployment" } else { "call" },
                limit
            );
            limit
        };
        tx.set_fee(&FeeOption::new(0, gas_limit))
    }

    /// Current gas price and simulated gas limit, without touching `tx`
    pub async fn estimate(&self, tx: &Transaction) -> TxResult<FeeOption> {
        let gas_price = self.provider.gas_price().await?;
        let gas_limit = self.provider.estimate_gas(&call_msg(tx)).await?;
        Ok(FeeOption::new(gas_price, gas_limit))
    }
}

/// Simulation message for `tx`. Deployments run the init code with no
/// recipient and no value; calls carry `from/to/data/value`.
pub fn call_msg(tx: &Transaction) -> CallMsg {
    match tx.to() {
        None => CallMsg {
            from: tx.from(),
            to: None,
            data: tx.data().clone(),
            value: None,
        },
        Some(to) => CallMsg {
            from: tx.from(),
            to: Some(to),
            data: tx.data().clone(),
            value: Some(tx.value()),
        },
    }
}
