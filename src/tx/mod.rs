//! Transaction module - entity, signing, fee resolution, building and confirmation

pub mod builder;
pub mod client;
pub mod fee;
pub mod poller;
pub mod raw;
pub mod transaction;

pub use builder::{
    parse_address, BuildDeployTxReq, BuildInvokeTxReq, BuildTxParam, ContractTxBuilder, TxBuilder,
};
pub use client::{CallContractParam, CallContractRes, EvmClient, DEFAULT_CALLER};
pub use fee::{FeeOption, FeeResolver};
pub use poller::{ConfirmationPoller, TxQueryResult, DEFAULT_POLL_INTERVAL};
pub use raw::RawTransaction;
pub use transaction::{Transaction, TxSignature};
