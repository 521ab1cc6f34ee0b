//! Per-chain client
//!
//! Ties the builders, the resolver, the signer and the poller to one
//! provider and one optional local key.

use super::builder::{parse_address, BuildTxParam, ContractTxBuilder, TxBuilder};
use super::fee::{FeeOption, FeeResolver};
use super::poller::{ConfirmationPoller, TxQueryResult};
use super::transaction::Transaction;
use crate::abi::ContractAbi;
use crate::chain::{CallMsg, ChainKind, ChainSpec, NetworkProvider, RpcProvider};
use crate::config::{ChainConfig, PollerConfig};
use crate::error::{TxError, TxResult};
use crate::signer::LocalSigner;

use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256, U256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Caller used for read-only contract calls when none is given
pub const DEFAULT_CALLER: &str = "0x3F43E75Aaba2c2fD6E227C10C6E7DC125A93DE3c";

/// Read-only contract call
#[derive(Debug, Clone, Default)]
pub struct CallContractParam {
    /// Defaults to `DEFAULT_CALLER`
    pub from: Option<String>,
    pub contract_address: String,
    pub abi: String,
    /// Method name; a trailing `()` is ignored
    pub called_func: String,
    pub params: Vec<Token>,
}

/// Result of a read-only contract call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallContractRes {
    pub raw: Bytes,
    /// Outputs by name, or by position when unnamed
    pub decoded: BTreeMap<String, Token>,
}

/// Client for one EVM chain
pub struct EvmClient {
    kind: ChainKind,
    /// Configured chain id; the provider is asked when unset
    chain_id: Option<u64>,
    provider: Arc<dyn NetworkProvider>,
    signer: Option<LocalSigner>,
    tx_builder: TxBuilder,
    contract_builder: ContractTxBuilder,
    poller: ConfirmationPoller,
}

impl EvmClient {
    pub fn new(kind: ChainKind, provider: Arc<dyn NetworkProvider>, poll_interval: Duration) -> Self {
        let tx_builder = TxBuilder::new(kind, provider.clone());
        Self {
            kind,
            chain_id: None,
            contract_builder: ContractTxBuilder::new(tx_builder.clone()),
            tx_builder,
            poller: ConfirmationPoller::with_interval(provider.clone(), poll_interval),
            provider,
            signer: None,
        }
    }

    /// Connect to a configured chain over HTTP
    pub fn connect(name: &str, chain: &ChainConfig, poller: &PollerConfig) -> TxResult<Self> {
        let provider = Arc::new(RpcProvider::new(name, chain)?);
        let client = Self::new(chain.kind, provider, poller.interval());
        Ok(match chain.chain_id {
            Some(chain_id) => client.with_chain_id(chain_id),
            None => client,
        })
    }

    /// Pin the chain id instead of asking the provider
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    pub fn tx_builder(&self) -> &TxBuilder {
        &self.tx_builder
    }

    pub fn contract_builder(&self) -> &ContractTxBuilder {
        &self.contract_builder
    }

    fn resolver(&self) -> &FeeResolver {
        self.tx_builder.resolver()
    }

    /// Load the signing key
    pub fn set_private(&mut self, private_key_hex: &str) -> TxResult<()> {
        let signer = LocalSigner::from_hex(private_key_hex)?;
        info!("Loaded {} account {:?}", self.kind, signer.address());
        self.signer = Some(signer);
        Ok(())
    }

    /// Address of the loaded key
    pub fn account(&self) -> Option<Address> {
        self.signer.as_ref().map(LocalSigner::address)
    }

    fn signer(&self) -> TxResult<&LocalSigner> {
        self.signer.as_ref().ok_or(TxError::MissingPrivateKey)
    }

    pub async fn chain_id(&self) -> TxResult<u64> {
        match self.chain_id {
            Some(chain_id) => Ok(chain_id),
            None => Ok(self.provider.chain_id().await?),
        }
    }

    pub async fn chain_spec(&self) -> TxResult<ChainSpec> {
        Ok(ChainSpec::new(self.kind, self.chain_id().await?))
    }

    pub async fn balance_of(&self, address: &str) -> TxResult<U256> {
        let address = parse_address(address)?;
        Ok(self.provider.balance_of(address).await?)
    }

    fn check_kind(&self, tx: &Transaction) -> TxResult<()> {
        if tx.kind() != self.kind {
            return Err(TxError::TypeMismatch {
                expected: self.kind,
                found: tx.kind(),
            });
        }
        Ok(())
    }

    /// Send `amount` of the native asset from the loaded account
    pub async fn transfer(
        &self,
        to: &str,
        amount: U256,
        fee: Option<&FeeOption>,
    ) -> TxResult<H256> {
        let account = self.signer()?.address();
        let mut tx = self
            .tx_builder
            .build_tx(BuildTxParam {
                from: format!("{:?}", account),
                to: to.to_string(),
                value: amount,
                ..Default::default()
            })
            .await?;
        self.send_tx(&mut tx, fee).await
    }

    /// Resolve, sign with the loaded key and broadcast. Non-zero entries of
    /// `fee` take precedence over the transaction's own values.
    pub async fn send_tx(&self, tx: &mut Transaction, fee: Option<&FeeOption>) -> TxResult<H256> {
        self.check_kind(tx)?;
        let signer = self.signer()?;

        tx.set_from(signer.address())?;
        self.resolver().resolve(tx, fee).await?;

        let chain = self.chain_spec().await?;
        tx.sign_with(signer, &chain)?;

        self.send_signed_tx(tx).await
    }

    /// Broadcast a transaction that is already signed
    pub async fn send_signed_tx(&self, tx: &Transaction) -> TxResult<H256> {
        self.check_kind(tx)?;
        let raw = tx.raw().ok_or(TxError::NotSigned)?;

        let hash = self.provider.send_raw(raw.clone()).await?;
        info!(
            "Submitted {} transaction {:?} (nonce {})",
            self.kind,
            hash,
            tx.nonce()
        );
        Ok(hash)
    }

    /// Current gas price and simulated gas limit for `tx`
    pub async fn estimate_fee(&self, tx: &Transaction) -> TxResult<FeeOption> {
        self.check_kind(tx)?;
        self.resolver().estimate(tx).await
    }

    pub async fn query_tx(&self, tx_hash: &str, wait: bool) -> TxResult<TxQueryResult> {
        self.poller.query(tx_hash, wait).await
    }

    /// Wait for `tx_hash` until it is mined or `cancel` turns `true`
    pub async fn query_tx_until(
        &self,
        tx_hash: &str,
        cancel: watch::Receiver<bool>,
    ) -> TxResult<TxQueryResult> {
        self.poller.query_until(tx_hash, cancel).await
    }

    /// Read-only contract call
    pub async fn query_contract(&self, param: CallContractParam) -> TxResult<CallContractRes> {
        let abi = ContractAbi::parse(&param.abi)?;
        let method = param.called_func.trim().trim_matches(|c| c == '(' || c == ')');
        let data = abi.encode_call(method, &param.params)?;

        let from = match param.from.as_deref().map(str::trim) {
            None | Some("") => parse_address(DEFAULT_CALLER)?,
            Some(from) => parse_address(from)?,
        };
        let to = parse_address(&param.contract_address)?;

        let raw = self
            .provider
            .call(&CallMsg {
                from,
                to: Some(to),
                data: data.into(),
                value: None,
            })
            .await?;
        let decoded = abi.decode_output(method, &raw)?;

        Ok(CallContractRes { raw, decoded })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::tests::TOKEN_ABI;
    use crate::chain::provider::MockNetworkProvider;
    use crate::chain::ProviderError;
    use crate::signer::tests::{TEST_ADDRESS, TEST_KEY};
    use crate::tx::raw::RawTransaction;
    use mockall::predicate::eq;
    use std::str::FromStr;
    use std::sync::Mutex;

    const TO: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn client(provider: MockNetworkProvider) -> EvmClient {
        let mut client = EvmClient::new(
            ChainKind::Ethereum,
            Arc::new(provider),
            Duration::from_millis(5),
        );
        client.set_private(TEST_KEY).unwrap();
        client
    }

    fn unsigned(kind: ChainKind) -> Transaction {
        Transaction::new(
            kind,
            Address::zero(),
            Some(Address::from_str(TO).unwrap()),
            U256::from(1000u64),
            Vec::new(),
        )
    }

    #[test]
    fn test_account_follows_key() {
        let mut client = EvmClient::new(
            ChainKind::Binance,
            Arc::new(MockNetworkProvider::new()),
            Duration::from_secs(3),
        );
        assert_eq!(client.account(), None);
        assert!(matches!(
            client.set_private("0x12"),
            Err(TxError::InvalidKey(_))
        ));
        client.set_private(TEST_KEY).unwrap();
        assert_eq!(client.account(), Some(Address::from_str(TEST_ADDRESS).unwrap()));
    }

    #[tokio::test]
    async fn test_transfer_signs_with_provider_chain_id() {
        let sent: Arc<Mutex<Option<Bytes>>> = Arc::new(Mutex::new(None));
        let captured = sent.clone();

        let mut provider = MockNetworkProvider::new();
        provider
            .expect_nonce_of()
            .with(eq(Address::from_str(TEST_ADDRESS).unwrap()))
            .returning(|_| Ok(4));
        provider.expect_gas_price().returning(|| Ok(20));
        provider.expect_estimate_gas().returning(|_| Ok(21_000));
        provider.expect_chain_id().times(1).returning(|| Ok(56));
        provider.expect_send_raw().times(1).returning(move |raw| {
            *captured.lock().unwrap() = Some(raw);
            Ok(H256::from_slice(&[0x42; 32]))
        });

        let client = client(provider);
        let hash = client
            .transfer(TO, U256::from(1000u64), Some(&FeeOption::new(0, 30_000)))
            .await
            .unwrap();
        assert_eq!(hash, H256::from_slice(&[0x42; 32]));

        let raw = sent.lock().unwrap().clone().unwrap();
        let decoded = RawTransaction::decode(&raw).unwrap();
        assert_eq!(decoded.chain_id(), Some(56));
        assert_eq!(decoded.nonce, 4);
        assert_eq!(decoded.gas_price, 20);
        assert_eq!(decoded.gas_limit, 30_000);
        assert_eq!(
            decoded.recover_sender().unwrap(),
            Address::from_str(TEST_ADDRESS).unwrap()
        );
    }

    #[tokio::test]
    async fn test_configured_chain_id_skips_provider() {
        let mut provider = MockNetworkProvider::new();
        provider.expect_chain_id().never();
        provider.expect_nonce_of().returning(|_| Ok(1));
        provider.expect_send_raw().returning(|_| Ok(H256::from_slice(&[1; 32])));

        let client = client(provider).with_chain_id(1);
        let mut tx = unsigned(ChainKind::Ethereum);
        client
            .send_tx(&mut tx, Some(&FeeOption::new(10, 21_000)))
            .await
            .unwrap();

        assert_eq!(tx.from(), Address::from_str(TEST_ADDRESS).unwrap());
        let v = tx.signature().unwrap().v;
        assert!(v == 37 || v == 38);
    }

    #[tokio::test]
    async fn test_wrong_chain_kind_is_refused() {
        let mut provider = MockNetworkProvider::new();
        provider.expect_nonce_of().never();
        provider.expect_gas_price().never();
        provider.expect_send_raw().never();
        let client = client(provider);

        let mut tx = unsigned(ChainKind::Okex);
        assert!(matches!(
            client.send_tx(&mut tx, None).await,
            Err(TxError::TypeMismatch {
                expected: ChainKind::Ethereum,
                found: ChainKind::Okex
            })
        ));
        assert!(matches!(
            client.send_signed_tx(&tx).await,
            Err(TxError::TypeMismatch { .. })
        ));
        assert!(matches!(
            client.estimate_fee(&tx).await,
            Err(TxError::TypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_requires_key() {
        let client = EvmClient::new(
            ChainKind::Ethereum,
            Arc::new(MockNetworkProvider::new()),
            Duration::from_secs(3),
        );
        let mut tx = unsigned(ChainKind::Ethereum);
        assert!(matches!(
            client.send_tx(&mut tx, None).await,
            Err(TxError::MissingPrivateKey)
        ));
        assert!(matches!(
            client.transfer(TO, U256::one(), None).await,
            Err(TxError::MissingPrivateKey)
        ));
    }

    #[tokio::test]
    async fn test_send_signed_requires_signature() {
        let mut provider = MockNetworkProvider::new();
        provider.expect_send_raw().never();
        let client = client(provider);

        assert!(matches!(
            client.send_signed_tx(&unsigned(ChainKind::Ethereum)).await,
            Err(TxError::NotSigned)
        ));
    }

    #[tokio::test]
    async fn test_broadcast_error_is_surfaced() {
        let mut provider = MockNetworkProvider::new();
        provider
            .expect_send_raw()
            .times(1)
            .returning(|_| Err(ProviderError::Rpc("nonce too low".into())));
        let client = client(provider);

        let mut tx = unsigned(ChainKind::Ethereum);
        tx.set_nonce(1).unwrap();
        tx.set_fee(&FeeOption::new(1, 21_000)).unwrap();
        tx.sign(TEST_KEY, "1").unwrap();

        let err = client.send_signed_tx(&tx).await.unwrap_err();
        assert!(matches!(err, TxError::Network(ProviderError::Rpc(ref m)) if m == "nonce too low"));
    }

    #[tokio::test]
    async fn test_query_contract_decodes_outputs() {
        let mut provider = MockNetworkProvider::new();
        provider
            .expect_call()
            .withf(|msg| {
                msg.from == Address::from_str(DEFAULT_CALLER).unwrap()
                    && msg.to == Some(Address::from_str(TO).unwrap())
                    && msg.data[..4] == [0x70, 0xa0, 0x82, 0x31]
            })
            .times(1)
            .returning(|_| {
                let mut word = vec![0u8; 32];
                word[31] = 9;
                Ok(Bytes::from(word))
            });
        let client = client(provider);

        let res = client
            .query_contract(CallContractParam {
                contract_address: TO.to_string(),
                abi: TOKEN_ABI.to_string(),
                called_func: "balanceOf()".to_string(),
                params: vec![Token::Address(Address::from_str(TEST_ADDRESS).unwrap())],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(res.decoded.get("balance"), Some(&Token::Uint(U256::from(9u64))));
        assert_eq!(res.raw.len(), 32);
    }

    #[tokio::test]
    async fn test_query_contract_empty_result() {
        let mut provider = MockNetworkProvider::new();
        provider.expect_call().returning(|_| Ok(Bytes::default()));
        let client = client(provider);

        let res = client
            .query_contract(CallContractParam {
                from: Some(TEST_ADDRESS.to_string()),
                contract_address: TO.to_string(),
                abi: TOKEN_ABI.to_string(),
                called_func: "balanceOf".to_string(),
                params: vec![Token::Address(Address::zero())],
            })
            .await
            .unwrap();
        assert!(res.decoded.is_empty());
        assert!(res.raw.is_empty());
    }

    #[tokio::test]
    async fn test_query_contract_unknown_method() {
        let mut provider = MockNetworkProvider::new();
        provider.expect_call().never();
        let client = client(provider);

        let err = client
            .query_contract(CallContractParam {
                contract_address: TO.to_string(),
                abi: TOKEN_ABI.to_string(),
                called_func: "totalSupply()".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TxError::MethodNotFound(_)));
    }

    #[tokio::test]
    async fn test_balance_and_chain_spec() {
        let mut provider = MockNetworkProvider::new();
        provider
            .expect_balance_of()
            .with(eq(Address::from_str(TO).unwrap()))
            .returning(|_| Ok(U256::from(5u64)));
        provider.expect_chain_id().returning(|| Ok(66));
        let client = client(provider);

        assert_eq!(client.balance_of(TO).await.unwrap(), U256::from(5u64));
        assert_eq!(
            client.chain_spec().await.unwrap(),
            ChainSpec::new(ChainKind::Ethereum, 66)
        );
        assert!(matches!(
            client.balance_of("nope").await,
            Err(TxError::InvalidAddress { .. })
        ));
    }
}
