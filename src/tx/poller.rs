//! Confirmation polling
//!
//! A submitted transaction is either pending (no receipt yet) or mined.
//! The poller checks the receipt, and once mined fetches the full
//! transaction. With `wait` it keeps checking on a fixed interval until the
//! transaction is mined or the caller cancels.

use crate::chain::{NetworkProvider, ProviderError, Receipt, TxDetail};
use crate::error::{TxError, TxResult};
use crate::signer::parse_hash;

use ethers::types::{Address, Bytes, H256, U256};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Interval between receipt checks while waiting
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Snapshot of a transaction's outcome. A pending result carries only the
/// hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxQueryResult {
    pub tx_hash: H256,
    pub mined: bool,
    pub contract_address: Option<Address>,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub nonce: u64,
    pub value: U256,
    pub data: Bytes,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub block_number: u64,
    pub status: Option<bool>,
    /// Provider record of the transaction, JSON encoded
    pub raw: Bytes,
}

impl TxQueryResult {
    fn pending(tx_hash: H256) -> Self {
        Self {
            tx_hash,
            ..Default::default()
        }
    }

    fn record_receipt(&mut self, receipt: &MinedReceipt) {
        self.mined = true;
        self.gas_used = receipt.gas_used;
        self.contract_address = receipt.contract_address;
        self.status = receipt.status;
    }

    fn record_detail(&mut self, detail: TxDetail) {
        self.from = Some(detail.from);
        self.to = detail.to;
        self.nonce = detail.nonce;
        self.value = detail.value;
        self.data = detail.input;
        self.gas_price = detail.gas_price;
        self.gas_limit = detail.gas;
        self.block_number = detail.block_number.unwrap_or(0);
        self.raw = detail.raw.into();
    }
}

/// Receipt fields kept once a transaction is known to be mined
#[derive(Debug, Clone, PartialEq, Eq)]
struct MinedReceipt {
    gas_used: u64,
    contract_address: Option<Address>,
    status: Option<bool>,
}

impl From<Receipt> for MinedReceipt {
    fn from(receipt: Receipt) -> Self {
        Self {
            gas_used: receipt.gas_used,
            contract_address: receipt.contract_address,
            status: receipt.status,
        }
    }
}

/// Polls a provider for transaction outcomes
#[derive(Clone)]
pub struct ConfirmationPoller {
    provider: Arc<dyn NetworkProvider>,
    interval: Duration,
}

impl ConfirmationPoller {
    pub fn new(provider: Arc<dyn NetworkProvider>) -> Self {
        Self::with_interval(provider, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(provider: Arc<dyn NetworkProvider>, interval: Duration) -> Self {
        Self { provider, interval }
    }

    /// Query the outcome of `tx_hash`. Without `wait` this returns after one
    /// check; with `wait` it does not return until the transaction is mined
    /// or a provider call fails.
    pub async fn query(&self, tx_hash: &str, wait: bool) -> TxResult<TxQueryResult> {
        self.run(tx_hash, wait, None).await
    }

    /// Wait until `tx_hash` is mined, or until `cancel` turns `true`.
    /// Cancelling has no effect on the transaction itself.
    pub async fn query_until(
        &self,
        tx_hash: &str,
        cancel: watch::Receiver<bool>,
    ) -> TxResult<TxQueryResult> {
        self.run(tx_hash, true, Some(cancel)).await
    }

    async fn run(
        &self,
        tx_hash: &str,
        wait: bool,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> TxResult<TxQueryResult> {
        let hash = parse_tx_hash(tx_hash)?;
        let mut result = TxQueryResult::pending(hash);

        loop {
            if let Some(receipt) = self.check_receipt(hash).await? {
                result.record_receipt(&receipt);
                let detail = self.provider.transaction_of(hash).await?;
                result.record_detail(detail);
                info!(
                    "Transaction {:?} mined in block {} (gas used {})",
                    hash, result.block_number, result.gas_used
                );
                return Ok(result);
            }

            if !wait {
                debug!("Transaction {:?} pending", hash);
                return Ok(result);
            }

            debug!(
                "Transaction {:?} pending, checking again in {:?}",
                hash, self.interval
            );

            match cancel.as_mut() {
                Some(cancel) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.interval) => {}
                        _ = cancelled(cancel) => {
                            info!("Stopped waiting for transaction {:?}", hash);
                            return Err(TxError::Cancelled(format!("{:?}", hash)));
                        }
                    }
                }
                None => tokio::time::sleep(self.interval).await,
            }
        }
    }

    /// `None` while pending
    async fn check_receipt(&self, hash: H256) -> TxResult<Option<MinedReceipt>> {
        match self.provider.receipt_of(hash).await {
            Ok(receipt) => Ok(Some(receipt.into())),
            Err(ProviderError::NotFound) => Ok(None),
            // Some node versions return a receipt this provider cannot fully
            // parse for transactions that are mined at index 0.
            Err(ProviderError::MalformedReceipt {
                block_number,
                transaction_index,
                gas_used,
                contract_address,
                message,
            }) if block_number != 0 && transaction_index == 0 => {
                warn!(
                    "Accepting partial receipt for {:?} at block {}: {}",
                    hash, block_number, message
                );
                Ok(Some(MinedReceipt {
                    gas_used,
                    contract_address,
                    status: None,
                }))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Resolves once the flag is `true`. Never resolves if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Parse a transaction hash, refusing the empty and the zero hash
pub fn parse_tx_hash(tx_hash: &str) -> TxResult<H256> {
    if tx_hash.trim().is_empty() {
        return Err(TxError::InvalidHash("empty hash".to_string()));
    }
    let hash = H256::from(parse_hash(tx_hash)?);
    if hash.is_zero() {
        return Err(TxError::InvalidHash(tx_hash.to_string()));
    }
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::provider::MockNetworkProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    fn hash() -> H256 {
        H256::from_slice(&[0x11; 32])
    }

    fn receipt() -> Receipt {
        Receipt {
            transaction_hash: hash(),
            block_number: 120,
            transaction_index: 4,
            gas_used: 21_000,
            contract_address: None,
            status: Some(true),
        }
    }

    fn detail() -> TxDetail {
        TxDetail {
            hash: hash(),
            from: Address::from_slice(&[0xaa; 20]),
            to: Some(Address::from_slice(&[0xbb; 20])),
            nonce: 3,
            value: U256::from(1000u64),
            input: Bytes::default(),
            gas_price: 20,
            gas: 21_000,
            block_number: Some(120),
            raw: b"{}".to_vec(),
        }
    }

    fn poller(provider: MockNetworkProvider) -> ConfirmationPoller {
        ConfirmationPoller::with_interval(Arc::new(provider), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_zero_and_empty_hash_make_no_network_call() {
        let mut provider = MockNetworkProvider::new();
        provider.expect_receipt_of().never();
        provider.expect_transaction_of().never();
        let poller = poller(provider);

        let zero = format!("0x{}", "0".repeat(64));
        for bad in [zero.as_str(), "", "0x1234"] {
            assert!(matches!(
                poller.query(bad, false).await,
                Err(TxError::InvalidHash(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_pending_without_wait_returns_hash_only() {
        let mut provider = MockNetworkProvider::new();
        provider
            .expect_receipt_of()
            .times(1)
            .returning(|_| Err(ProviderError::NotFound));
        provider.expect_transaction_of().never();

        let result = poller(provider).query(HASH, false).await.unwrap();
        assert_eq!(result, TxQueryResult::pending(hash()));
        assert!(!result.mined);
        assert_eq!(result.from, None);
        assert_eq!(result.gas_used, 0);
    }

    #[tokio::test]
    async fn test_mined_query_is_idempotent() {
        let mut provider = MockNetworkProvider::new();
        provider.expect_receipt_of().times(2).returning(|_| Ok(receipt()));
        provider
            .expect_transaction_of()
            .times(2)
            .returning(|_| Ok(detail()));
        let poller = poller(provider);

        let first = poller.query(HASH, false).await.unwrap();
        let second = poller.query(HASH, false).await.unwrap();
        assert_eq!(first, second);
        assert!(first.mined);
        assert_eq!(first.gas_used, 21_000);
        assert_eq!(first.block_number, 120);
        assert_eq!(first.from, Some(Address::from_slice(&[0xaa; 20])));
        assert_eq!(first.raw.to_vec(), b"{}".to_vec());
    }

    #[tokio::test]
    async fn test_wait_polls_until_mined() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut provider = MockNetworkProvider::new();
        provider.expect_receipt_of().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(ProviderError::NotFound)
            } else {
                Ok(Receipt {
                    contract_address: Some(Address::from_slice(&[0xcc; 20])),
                    ..receipt()
                })
            }
        });
        provider
            .expect_transaction_of()
            .times(1)
            .returning(|_| Ok(detail()));

        let result = poller(provider).query(HASH, true).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(result.mined);
        assert_eq!(
            result.contract_address,
            Some(Address::from_slice(&[0xcc; 20]))
        );
    }

    #[tokio::test]
    async fn test_provider_error_is_returned() {
        let mut provider = MockNetworkProvider::new();
        provider
            .expect_receipt_of()
            .times(1)
            .returning(|_| Err(ProviderError::Rpc("503".into())));

        let err = poller(provider).query(HASH, true).await.unwrap_err();
        assert!(matches!(err, TxError::Network(ProviderError::Rpc(_))));
    }

    #[tokio::test]
    async fn test_partial_receipt_at_index_zero_counts_as_mined() {
        let mut provider = MockNetworkProvider::new();
        provider.expect_receipt_of().returning(|_| {
            Err(ProviderError::MalformedReceipt {
                block_number: 120,
                transaction_index: 0,
                gas_used: 53_000,
                contract_address: None,
                message: "invalid type".into(),
            })
        });
        provider
            .expect_transaction_of()
            .times(1)
            .returning(|_| Ok(detail()));

        let result = poller(provider).query(HASH, false).await.unwrap();
        assert!(result.mined);
        assert_eq!(result.gas_used, 53_000);
        assert_eq!(result.status, None);
    }

    #[tokio::test]
    async fn test_other_partial_receipts_are_errors() {
        for (block_number, transaction_index) in [(0, 0), (120, 2)] {
            let mut provider = MockNetworkProvider::new();
            provider.expect_receipt_of().returning(move |_| {
                Err(ProviderError::MalformedReceipt {
                    block_number,
                    transaction_index,
                    gas_used: 0,
                    contract_address: None,
                    message: "invalid type".into(),
                })
            });
            provider.expect_transaction_of().never();

            let err = poller(provider).query(HASH, false).await.unwrap_err();
            assert!(matches!(
                err,
                TxError::Network(ProviderError::MalformedReceipt { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_waiting() {
        let mut provider = MockNetworkProvider::new();
        provider
            .expect_receipt_of()
            .returning(|_| Err(ProviderError::NotFound));
        provider.expect_transaction_of().never();
        let poller = poller(provider);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { poller.query_until(HASH, cancel_rx).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_tx.send(true).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, TxError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_dropped_cancel_sender_keeps_waiting() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut provider = MockNetworkProvider::new();
        provider.expect_receipt_of().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ProviderError::NotFound)
            } else {
                Ok(receipt())
            }
        });
        provider.expect_transaction_of().returning(|_| Ok(detail()));

        let (cancel_tx, cancel_rx) = watch::channel(false);
        drop(cancel_tx);

        let result = poller(provider).query_until(HASH, cancel_rx).await.unwrap();
        assert!(result.mined);
    }
}
