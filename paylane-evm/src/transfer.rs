//! Same-chain pulls and the cross-chain burn-and-mint state machine.
//!
//! The engine decides the route and drives it. Same-chain settlement is a
//! single vault `transferFrom` to the publisher. Cross-chain settlement is
//! the four-phase sequence pull -> approve -> burn -> redeem, with the
//! attestation wait in between and the payment record persisted *before*
//! the wait so a crash between burn and redeem leaves a recoverable record:
//!
//! ```text
//!     created -> burning -> awaiting-attestation -> redeeming -> complete
//!                  |                 |                  |
//!               failed            failed             failed
//! ```
//!
//! Failed transfers are recorded and surfaced, never automatically
//! reversed; the permit usage counter moves only after terminal success.

use std::sync::Arc;

use alloy_primitives::aliases::U160;
use alloy_primitives::{keccak256, Address, Bytes, Log, TxHash, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use chrono::Utc;
use uuid::Uuid;

use paylane::model::{AttestationStatus, CrossChainPayment, PaymentPreferences, TokenSymbol};
use paylane::registry::{ChainId, ChainRegistry};

use paylane_store::{CrossChainPaymentPatch, PaymentStore};

use crate::attestation::{AttestationClient, AttestationQuery};
use crate::client::ChainClients;
use crate::contract::{IAllowanceVault, IMessageTransmitter, IStablecoin, ITokenMessenger};
use crate::error::EvmError;

/// Attestation speed requested from the burn-mint protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    /// Attest at confirmed finality (~seconds), paying the fast-transfer fee.
    Fast,
    /// Wait for full finality.
    Standard,
}

impl TransferType {
    /// The `minFinalityThreshold` value the burn contract expects.
    #[must_use]
    pub const fn finality_threshold(self) -> u32 {
        match self {
            Self::Fast => 1000,
            Self::Standard => 2000,
        }
    }
}

/// The route a settlement takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Funding chain equals the payout chain: one vault pull.
    SameChain,
    /// Chains differ: burn on the source, mint on the target.
    CrossChain {
        /// Payout chain.
        target_chain: ChainId,
    },
}

/// Everything the engine needs to settle one call.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Paying user's id.
    pub user_id: String,
    /// Funded agent's id.
    pub agent_id: String,
    /// Paying user's wallet.
    pub user_address: Address,
    /// Publisher payout wallet.
    pub publisher: Address,
    /// Permit funding the call.
    pub permit_id: String,
    /// Funding token.
    pub token: TokenSymbol,
    /// Funding chain.
    pub source_chain_id: ChainId,
    /// Amount to settle, token base units.
    pub amount: U256,
    /// Publisher payout preferences.
    pub payout: PaymentPreferences,
}

/// Result of a terminal-success settlement.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// The settling transaction: the pull for same-chain, the mint for
    /// cross-chain.
    pub transaction_hash: TxHash,
    /// Burn message hash for cross-chain settlements.
    pub message_hash: Option<B256>,
    /// Cross-chain payment record id, when one was written.
    pub cross_chain_payment_id: Option<String>,
}

/// Executes settlements against the connected chains.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    clients: ChainClients,
    registry: Arc<ChainRegistry>,
    store: PaymentStore,
    attestation: AttestationClient,
    transfer_type: TransferType,
}

impl TransferEngine {
    /// Creates an engine over the connected clients and shared store.
    #[must_use]
    pub fn new(
        clients: ChainClients,
        registry: Arc<ChainRegistry>,
        store: PaymentStore,
        attestation: AttestationClient,
        transfer_type: TransferType,
    ) -> Self {
        Self {
            clients,
            registry,
            store,
            attestation,
            transfer_type,
        }
    }

    /// Whether settlement must leave the funding chain or change token.
    ///
    /// This is the pre-authorization predicate: `chain != payout_chain ||
    /// token != payout_token`.
    #[must_use]
    pub fn needs_cross_chain(
        token: TokenSymbol,
        source_chain_id: ChainId,
        payout: PaymentPreferences,
    ) -> bool {
        source_chain_id != payout.payout_chain_id || token != payout.payout_token
    }

    /// Decides the executable route, applying the bridge gate.
    ///
    /// Only USDC can cross chains: a non-USDC permit on a differing-chain
    /// route is rejected before any contract write. A token mismatch on the
    /// *same* chain settles as a same-chain pull of the funding token - the
    /// engine does not price-convert, and all supported tokens are 1-USD
    /// par.
    pub fn plan_route(
        token: TokenSymbol,
        source_chain_id: ChainId,
        payout: PaymentPreferences,
    ) -> Result<Route, EvmError> {
        if source_chain_id == payout.payout_chain_id {
            return Ok(Route::SameChain);
        }
        if !token.is_bridgeable() {
            return Err(EvmError::UnsupportedRoute {
                token,
                source_chain: source_chain_id,
                target_chain: payout.payout_chain_id,
            });
        }
        Ok(Route::CrossChain {
            target_chain: payout.payout_chain_id,
        })
    }

    /// Settles one call, driving the full route.
    ///
    /// On terminal success the permit's usage counter is incremented. On
    /// cross-chain failure the payment record is retained with its last
    /// status and the error surfaces to the caller.
    pub async fn execute(&self, request: &TransferRequest) -> Result<TransferOutcome, EvmError> {
        match Self::plan_route(request.token, request.source_chain_id, request.payout)? {
            Route::SameChain => self.settle_same_chain(request).await,
            Route::CrossChain { target_chain } => {
                self.settle_cross_chain(request, target_chain).await
            }
        }
    }

    fn token_address(&self, token: TokenSymbol, chain_id: ChainId) -> Result<Address, EvmError> {
        self.registry
            .token_address(token, chain_id)
            .ok_or(EvmError::TokenNotDeployed { token, chain_id })
    }

    /// One vault pull from the user straight to the publisher.
    async fn settle_same_chain(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferOutcome, EvmError> {
        let client = self.clients.get(request.source_chain_id)?;
        let token_addr = self.token_address(request.token, request.source_chain_id)?;
        let vault = self.registry.allowance_vault_address();

        let call = IAllowanceVault::transferFromCall {
            from: request.user_address,
            to: request.publisher,
            amount: U160::saturating_from(request.amount),
            token: token_addr,
        };
        let receipt = client.send_admin(vault, call.abi_encode().into()).await?;
        tracing::info!(
            permit_id = %request.permit_id,
            tx = %receipt.transaction_hash,
            amount = %request.amount,
            "Same-chain settlement complete"
        );

        self.bump_permit_usage(&request.permit_id).await?;

        Ok(TransferOutcome {
            transaction_hash: receipt.transaction_hash,
            message_hash: None,
            cross_chain_payment_id: None,
        })
    }

    /// Pull -> approve -> burn -> attest -> redeem across chains.
    async fn settle_cross_chain(
        &self,
        request: &TransferRequest,
        target_chain: ChainId,
    ) -> Result<TransferOutcome, EvmError> {
        let source = self.clients.get(request.source_chain_id)?;
        let target = self.clients.get(target_chain)?;
        let token_addr = self.token_address(request.token, request.source_chain_id)?;
        let vault = self.registry.allowance_vault_address();
        let messenger = self.registry.token_messenger(request.source_chain_id)?;
        let transmitter = self.registry.message_transmitter(target_chain)?;
        let source_domain = self
            .registry
            .destination_domain(request.source_chain_id)
            .ok_or(paylane::UnsupportedChainError(request.source_chain_id))?;
        let destination_domain = self
            .registry
            .destination_domain(target_chain)
            .ok_or(paylane::UnsupportedChainError(target_chain))?;

        // Phase 1: pull funds to the admin on the source chain.
        let pull = IAllowanceVault::transferFromCall {
            from: request.user_address,
            to: source.admin_address(),
            amount: U160::saturating_from(request.amount),
            token: token_addr,
        };
        source.send_admin(vault, pull.abi_encode().into()).await?;

        // Phase 2: let the messenger burn from the admin.
        let approve = IStablecoin::approveCall {
            spender: messenger,
            amount: request.amount,
        };
        source
            .send_admin(token_addr, approve.abi_encode().into())
            .await?;

        // Phase 3: burn toward the destination domain.
        let burn = ITokenMessenger::depositForBurnCall {
            amount: request.amount,
            destinationDomain: destination_domain,
            mintRecipient: request.publisher.into_word(),
            burnToken: token_addr,
            destinationCaller: B256::ZERO,
            maxFee: max_fee(request.amount),
            minFinalityThreshold: self.transfer_type.finality_threshold(),
        };
        let burn_receipt = source
            .send_admin(messenger, burn.abi_encode().into())
            .await?;
        let burn_tx = burn_receipt.transaction_hash;

        // Phase 4: the burn message is the attestation key.
        let message = message_from_logs(burn_receipt.inner.logs().iter().map(AsRef::as_ref))
            .ok_or(EvmError::MessageEventMissing(burn_tx))?;
        let message_hash = keccak256(&message);

        let record_id = Uuid::new_v4().to_string();
        self.store
            .create_cross_chain_payment(CrossChainPayment {
                id: record_id.clone(),
                user_id: request.user_id.clone(),
                agent_id: request.agent_id.clone(),
                source_chain_id: request.source_chain_id,
                target_chain_id: target_chain,
                amount: request.amount,
                token: request.token,
                message_hash,
                source_transaction_hash: burn_tx,
                target_transaction_hash: None,
                attestation_status: AttestationStatus::Pending,
                permit_id: request.permit_id.clone(),
                created_at: Utc::now(),
                completed_at: None,
                error_message: None,
            })
            .await?;
        tracing::info!(
            record_id = %record_id,
            burn_tx = %burn_tx,
            message_hash = %message_hash,
            destination_domain,
            "Burn complete, awaiting attestation"
        );

        // Phase 5: wait for the attestation provider.
        let bundle = match self
            .attestation
            .wait(AttestationQuery::V2 {
                source_domain,
                transaction_hash: burn_tx,
            })
            .await
        {
            Ok(bundle) => bundle,
            Err(err) => {
                self.mark_failed(&record_id, &err).await;
                return Err(err);
            }
        };

        // Phase 6: redeem on the target chain. Prefer the provider's copy of
        // the message; fall back to the one extracted from the burn receipt.
        let redeem_message = bundle.message.unwrap_or(message);
        let redeem = IMessageTransmitter::receiveMessageCall {
            message: redeem_message,
            attestation: bundle.attestation,
        };
        let mint_receipt = match target
            .send_admin(transmitter, redeem.abi_encode().into())
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                self.mark_failed(&record_id, &err).await;
                return Err(err);
            }
        };

        // Phase 7: finalize.
        self.store
            .update_cross_chain_payment(
                &record_id,
                CrossChainPaymentPatch {
                    attestation_status: Some(AttestationStatus::Complete),
                    target_transaction_hash: Some(mint_receipt.transaction_hash),
                    completed_at: Some(Utc::now()),
                    error_message: None,
                },
            )
            .await?;
        self.bump_permit_usage(&request.permit_id).await?;
        tracing::info!(
            record_id = %record_id,
            mint_tx = %mint_receipt.transaction_hash,
            "Cross-chain settlement complete"
        );

        Ok(TransferOutcome {
            transaction_hash: mint_receipt.transaction_hash,
            message_hash: Some(message_hash),
            cross_chain_payment_id: Some(record_id),
        })
    }

    async fn bump_permit_usage(&self, permit_id: &str) -> Result<(), EvmError> {
        let permit = self
            .store
            .permit(permit_id)
            .await
            .ok_or_else(|| paylane_store::StoreError::NotFound(permit_id.to_owned()))?;
        self.store
            .update_permit_usage(permit_id, permit.calls_used + 1)
            .await?;
        Ok(())
    }

    /// Records a terminal failure on the payment row; the record is kept
    /// for a later reconciliation pass.
    async fn mark_failed(&self, record_id: &str, err: &EvmError) {
        let patch = CrossChainPaymentPatch {
            attestation_status: Some(AttestationStatus::Failed),
            target_transaction_hash: None,
            completed_at: None,
            error_message: Some(err.to_string()),
        };
        if let Err(store_err) = self.store.update_cross_chain_payment(record_id, patch).await {
            tracing::error!(
                record_id = %record_id,
                error = %store_err,
                "Failed to record cross-chain payment failure"
            );
        }
    }
}

/// `maxFee` for a burn: 0.5% of the amount.
fn max_fee(amount: U256) -> U256 {
    amount * U256::from(5u64) / U256::from(1000u64)
}

/// Finds the `MessageSent(bytes)` event among receipt logs and returns the
/// decoded message bytes.
fn message_from_logs<'a>(logs: impl Iterator<Item = &'a Log>) -> Option<Bytes> {
    logs.filter_map(|log| IMessageTransmitter::MessageSent::decode_log(log).ok())
        .map(|ev| ev.data.message)
        .next()
}
