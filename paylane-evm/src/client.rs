//! Per-chain RPC access with the admin signer.
//!
//! One [`ChainClient`] exists per supported chain, built at startup and
//! immutable afterwards. Reads go straight through the provider and may run
//! concurrently. Admin-signed writes are serialized per chain: the admin
//! account has a single nonce per chain, so each write holds the chain's
//! write lock across submission *and* the receipt wait. Writes on different
//! chains proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_network::{Ethereum as AlloyEthereum, EthereumWallet, NetworkWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes, TxHash};
use alloy_provider::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy_provider::{Identity, PendingTransactionError, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::{TransactionReceipt, TransactionRequest};
use alloy_transport_http::reqwest::{Client as ReqwestClient, Url};
use alloy_transport_http::Http;
use tokio::sync::Mutex;

use paylane::registry::{ChainId, UnsupportedChainError};

use crate::error::EvmError;

/// Default HTTP timeout for individual RPC requests.
const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on receipt waits.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Combined filler type for gas, blob gas, nonce, and chain ID.
pub type AdminFiller =
    JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>;

/// The fully composed provider type used by the engine: filler layers for
/// gas, nonce, and chain id plus the admin wallet over a [`RootProvider`].
pub type AdminProvider = FillProvider<
    JoinFill<JoinFill<Identity, AdminFiller>, WalletFiller<EthereumWallet>>,
    RootProvider,
>;

/// Read/write access to a single chain.
#[derive(Debug)]
pub struct ChainClient {
    chain_id: ChainId,
    admin: Address,
    inner: AdminProvider,
    receipt_timeout: Duration,
    /// Serializes admin-signed writes on this chain.
    write_lock: Mutex<()>,
}

impl ChainClient {
    /// Connects a client for one chain with the admin wallet.
    pub fn connect(
        chain_id: ChainId,
        rpc_url: &str,
        wallet: EthereumWallet,
        receipt_timeout: Duration,
    ) -> Result<Self, EvmError> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| EvmError::Rpc(format!("invalid rpc url '{rpc_url}': {e}")))?;
        let http_client = ReqwestClient::builder()
            .timeout(RPC_REQUEST_TIMEOUT)
            .build()
            .map_err(EvmError::rpc)?;
        let transport = Http::with_client(http_client, url);
        let client = RpcClient::new(transport, false);

        let admin = NetworkWallet::<AlloyEthereum>::default_signer_address(&wallet);
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                BlobGasFiller::default(),
                JoinFill::new(NonceFiller::default(), ChainIdFiller::default()),
            ),
        );
        let inner: AdminProvider = ProviderBuilder::default()
            .filler(filler)
            .wallet(wallet)
            .connect_client(client);

        tracing::info!(chain_id, admin = %admin, "Connected chain client");

        Ok(Self {
            chain_id,
            admin,
            inner,
            receipt_timeout,
            write_lock: Mutex::new(()),
        })
    }

    /// The chain this client talks to.
    #[must_use]
    pub const fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// The admin account paying gas on this chain.
    #[must_use]
    pub const fn admin_address(&self) -> Address {
        self.admin
    }

    /// The underlying provider, for read-side contract instances.
    #[must_use]
    pub const fn provider(&self) -> &AdminProvider {
        &self.inner
    }

    /// Fetches the receipt of an already-submitted transaction, if mined.
    ///
    /// Used by reconciliation tooling to re-inspect settlement transactions
    /// that were sent but whose receipt wait was interrupted.
    pub async fn get_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, EvmError> {
        self.inner
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(EvmError::rpc)
    }

    /// Sends an admin-signed transaction and waits for its receipt.
    ///
    /// Holds the chain's write lock for the whole send-and-wait so two admin
    /// transactions never race on the account nonce. Once sent, the
    /// transaction is awaited regardless of caller cancellation further up;
    /// the future itself does not abort an in-flight submission.
    pub async fn send_admin(
        &self,
        to: Address,
        calldata: Bytes,
    ) -> Result<TransactionReceipt, EvmError> {
        let _guard = self.write_lock.lock().await;

        let tx = TransactionRequest::default()
            .with_from(self.admin)
            .with_to(to)
            .with_input(calldata);

        let pending = self
            .inner
            .send_transaction(tx)
            .await
            .map_err(EvmError::rpc)?;
        let tx_hash = *pending.tx_hash();
        tracing::debug!(chain_id = self.chain_id, tx = %tx_hash, to = %to, "Submitted admin transaction");

        let receipt = pending
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
            .map_err(|e| match e {
                PendingTransactionError::TxWatcher(_) => EvmError::ReceiptTimeout,
                other => EvmError::rpc(other),
            })?;

        if receipt.status() {
            Ok(receipt)
        } else {
            tracing::warn!(chain_id = self.chain_id, tx = %receipt.transaction_hash, "Admin transaction reverted");
            Err(EvmError::TransactionReverted(receipt.transaction_hash))
        }
    }
}

/// The set of connected chain clients, keyed by chain id.
#[derive(Debug, Clone, Default)]
pub struct ChainClients(HashMap<ChainId, Arc<ChainClient>>);

impl ChainClients {
    /// Builds the set from already-connected clients.
    #[must_use]
    pub fn new(clients: impl IntoIterator<Item = Arc<ChainClient>>) -> Self {
        Self(
            clients
                .into_iter()
                .map(|c| (c.chain_id(), c))
                .collect(),
        )
    }

    /// Returns the client for a chain.
    pub fn get(&self, chain_id: ChainId) -> Result<&Arc<ChainClient>, EvmError> {
        self.0
            .get(&chain_id)
            .ok_or(EvmError::UnsupportedChain(UnsupportedChainError(chain_id)))
    }

    /// Chain ids with a connected client.
    #[must_use]
    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.0.keys().copied().collect()
    }
}
