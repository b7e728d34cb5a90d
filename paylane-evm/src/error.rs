//! Error taxonomy for the on-chain engine.

use alloy_primitives::{TxHash, U256};
use paylane::model::TokenSymbol;
use paylane::registry::{ChainId, UnsupportedChainError};
use paylane_store::StoreError;

/// Errors raised by chain clients, the submitter, the validator, the
/// attestation client, and the transfer engine.
#[derive(Debug, thiserror::Error)]
pub enum EvmError {
    /// The chain id is outside the configured set.
    #[error(transparent)]
    UnsupportedChain(#[from] UnsupportedChainError),

    /// A non-USDC token cannot cross chains; raised before any write.
    #[error("unsupported route: {token} cannot move from chain {source_chain} to {target_chain}")]
    UnsupportedRoute {
        /// Token that cannot bridge.
        token: TokenSymbol,
        /// Funding chain.
        source_chain: ChainId,
        /// Payout chain.
        target_chain: ChainId,
    },

    /// The token has no deployment on the requested chain.
    #[error("{token} has no deployment on chain {chain_id}")]
    TokenNotDeployed {
        /// Requested token.
        token: TokenSymbol,
        /// Requested chain.
        chain_id: ChainId,
    },

    /// The permit's nonce no longer matches the on-chain vault nonce.
    ///
    /// An advanced nonce means the permit was already consumed; the caller
    /// may rely on the vault's current allowance state.
    #[error("stale permit: on-chain nonce is {on_chain}, permit carries {permit}")]
    PermitStale {
        /// Current on-chain nonce for `(owner, token, spender)`.
        on_chain: u64,
        /// Nonce the permit was signed with.
        permit: u64,
    },

    /// The user's token balance does not cover the required amount.
    #[error("insufficient balance: have {balance}, need {required}")]
    InsufficientBalance {
        /// On-chain balance.
        balance: U256,
        /// Amount the operation needs.
        required: U256,
    },

    /// The token-to-vault allowance is short and no token permit signature
    /// was supplied to fix it.
    #[error("insufficient token allowance toward the vault and no token permit signature supplied")]
    InsufficientTokenAllowance,

    /// The vault-to-admin allowance is short or expired.
    #[error("insufficient or expired vault allowance")]
    InsufficientAllowance,

    /// No receipt arrived within the configured bound.
    #[error("timed out waiting for transaction receipt")]
    ReceiptTimeout,

    /// The transaction landed but reverted.
    #[error("transaction reverted: {0}")]
    TransactionReverted(TxHash),

    /// The burn receipt carries no `MessageSent` event.
    #[error("burn receipt {0} contains no MessageSent event")]
    MessageEventMissing(TxHash),

    /// The attestation provider rejected or failed the poll.
    #[error("attestation failed: {0}")]
    AttestationFailed(String),

    /// The attestation polling budget ran out.
    #[error("attestation polling budget exhausted")]
    AttestationTimeout,

    /// A read-side RPC call failed; distinct from a negative check result.
    #[error("validation rpc failure: {0}")]
    Validation(#[from] alloy_contract::Error),

    /// Transport-level RPC failure on a write path.
    #[error("rpc failure: {0}")]
    Rpc(String),

    /// Datastore failure during settlement bookkeeping.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EvmError {
    /// Wraps a write-path transport error.
    pub fn rpc(err: impl std::fmt::Display) -> Self {
        Self::Rpc(err.to_string())
    }
}
