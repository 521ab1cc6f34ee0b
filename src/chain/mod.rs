//! Chain module - chain parameterization and the network provider seam
//!
//! Every supported chain family speaks the same EVM transaction format, so
//! they share one implementation and differ only in configuration.

pub mod provider;
pub mod rpc;

pub use provider::{CallMsg, NetworkProvider, ProviderError, Receipt, TxDetail};
pub use rpc::RpcProvider;

use crate::error::{TxError, TxResult};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported chain families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    Ethereum,
    Binance,
    Okex,
}

impl ChainKind {
    /// Numeric chain type used by callers that select a chain by number
    pub fn type_id(self) -> u32 {
        match self {
            ChainKind::Ethereum => 1,
            ChainKind::Binance => 2,
            ChainKind::Okex => 3,
        }
    }

    pub fn from_type_id(type_id: u32) -> Option<Self> {
        match type_id {
            1 => Some(ChainKind::Ethereum),
            2 => Some(ChainKind::Binance),
            3 => Some(ChainKind::Okex),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChainKind::Ethereum => "ethereum",
            ChainKind::Binance => "binance",
            ChainKind::Okex => "okex",
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChainKind {
    type Err = TxError;

    /// Accepts a name, a short alias or a numeric type id
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(type_id) = s.trim().parse::<u32>() {
            return Self::from_type_id(type_id)
                .ok_or_else(|| TxError::Config(format!("unknown chain type id: {}", type_id)));
        }
        match s.to_ascii_lowercase().as_str() {
            "ethereum" | "eth" => Ok(ChainKind::Ethereum),
            "binance" | "bsc" => Ok(ChainKind::Binance),
            "okex" | "okc" => Ok(ChainKind::Okex),
            other => Err(TxError::Config(format!("unsupported chain kind: {}", other))),
        }
    }
}

/// One concrete network: a chain family plus its replay-protection id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSpec {
    pub kind: ChainKind,
    pub chain_id: u64,
}

impl ChainSpec {
    pub fn new(kind: ChainKind, chain_id: u64) -> Self {
        Self { kind, chain_id }
    }
}

/// Parse a decimal chain id
pub fn parse_chain_id(chain_id: &str) -> TxResult<u64> {
    chain_id
        .trim()
        .parse::<u64>()
        .map_err(|e| TxError::InvalidChainId(format!("{}: {}", chain_id, e)))
}
