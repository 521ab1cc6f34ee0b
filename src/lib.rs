//! Multi-chain transaction layer for EVM-compatible networks
//!
//! Builds unsigned transactions, resolves their fee and nonce, signs them
//! with a chain-id bound recoverable signature, broadcasts the canonical
//! encoding and polls the network until the outcome is known. Ethereum,
//! Binance Smart Chain and OKX Chain share one implementation and differ only
//! in their `ChainSpec`.

pub mod abi;
pub mod chain;
pub mod config;
pub mod error;
pub mod rlp;
pub mod signer;
pub mod tx;

pub use chain::{ChainKind, ChainSpec, NetworkProvider};
pub use error::{ErrorKind, TxError, TxResult};
pub use tx::{EvmClient, FeeOption, Transaction, TxBuilder, TxQueryResult};
