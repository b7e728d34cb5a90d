//! Brings on-chain allowance state in sync with a freshly signed permit.
//!
//! Submission order matters and each step awaits its receipt before the
//! next begins:
//!
//! 1. stale-nonce guard - a permit whose nonce differs from the on-chain
//!    vault nonce is never submitted;
//! 2. balance precheck - approving a vault for a balance the user does not
//!    have only spends gas;
//! 3. conditional EIP-2612 token permit, when the vault cannot yet draw
//!    from the user's balance and the user supplied a token signature;
//! 4. the vault permit itself.
//!
//! Revocations travel the same path: a zero-amount permit clears the vault
//! allowance on-chain.

use std::sync::Arc;

use alloy_primitives::{TxHash, U256};
use alloy_sol_types::SolCall;

use paylane::codec;
use paylane::model::Permit;
use paylane::registry::ChainRegistry;

use crate::client::ChainClients;
use crate::contract::{IAllowanceVault, IStablecoin, PermitSingle};
use crate::error::EvmError;
use crate::validator::ChainValidator;

/// Transactions produced by a successful submission.
#[derive(Debug, Clone, Copy)]
pub struct SubmitOutcome {
    /// The EIP-2612 approval, when one was needed.
    pub token_permit_tx: Option<TxHash>,
    /// The vault permit transaction.
    pub vault_permit_tx: TxHash,
}

/// Submits stored permits on-chain.
#[derive(Debug, Clone)]
pub struct PermitSubmitter {
    clients: ChainClients,
    registry: Arc<ChainRegistry>,
    validator: ChainValidator,
}

impl PermitSubmitter {
    /// Creates a submitter over the connected clients.
    #[must_use]
    pub fn new(clients: ChainClients, registry: Arc<ChainRegistry>) -> Self {
        let validator = ChainValidator::new(Arc::clone(&registry));
        Self {
            clients,
            registry,
            validator,
        }
    }

    /// Submits a permit, enforcing nonce freshness.
    ///
    /// Idempotent on [`EvmError::PermitStale`]: an advanced nonce means the
    /// permit was already consumed and the vault's current state stands.
    pub async fn submit(&self, permit: &Permit) -> Result<SubmitOutcome, EvmError> {
        let client = self.clients.get(permit.chain_id)?.as_ref();
        let token_addr = self
            .registry
            .token_address(permit.token, permit.chain_id)
            .ok_or(EvmError::TokenNotDeployed {
                token: permit.token,
                chain_id: permit.chain_id,
            })?;
        let vault_addr = self.registry.allowance_vault_address();

        // Stale-nonce guard before anything is sent.
        let vault_state = self
            .validator
            .check_vault_allowance(
                client,
                permit.token,
                permit.user_address,
                permit.spender_address,
                permit.amount,
            )
            .await?;
        if vault_state.nonce != permit.nonce {
            tracing::warn!(
                permit_id = %permit.id,
                on_chain = vault_state.nonce,
                permit_nonce = permit.nonce,
                "Rejecting stale permit"
            );
            return Err(EvmError::PermitStale {
                on_chain: vault_state.nonce,
                permit: permit.nonce,
            });
        }

        // A zero-amount revocation needs no balance; anything else does.
        if permit.amount > U256::ZERO {
            let balance = self
                .validator
                .check_balance(client, permit.token, permit.user_address, permit.amount)
                .await?;
            if !balance.sufficient() {
                return Err(EvmError::InsufficientBalance {
                    balance: balance.balance,
                    required: permit.amount,
                });
            }
        }

        // Let the vault draw from the user's balance if it cannot yet.
        let mut token_permit_tx = None;
        if permit.amount > U256::ZERO {
            let token_allowance = self
                .validator
                .check_token_allowance(client, permit.token, permit.user_address, permit.amount)
                .await?;
            if !token_allowance.sufficient() {
                let Some(token_sig) = &permit.token_permit_sig else {
                    return Err(EvmError::InsufficientTokenAllowance);
                };
                let call = IStablecoin::permitCall {
                    owner: permit.user_address,
                    spender: vault_addr,
                    value: U256::MAX,
                    deadline: U256::from(token_sig.deadline.as_secs()),
                    v: token_sig.sig.v,
                    r: token_sig.sig.r,
                    s: token_sig.sig.s,
                };
                let receipt = client
                    .send_admin(token_addr, call.abi_encode().into())
                    .await?;
                tracing::info!(
                    permit_id = %permit.id,
                    tx = %receipt.transaction_hash,
                    "Submitted token permit approving the vault"
                );
                token_permit_tx = Some(receipt.transaction_hash);
            }
        }

        // The vault permit itself, reconstructed from the signed message.
        let signed = codec::vault_permit_single(
            token_addr,
            permit.amount,
            permit.deadline.as_secs(),
            permit.nonce,
            permit.spender_address,
        );
        let call = IAllowanceVault::permitCall {
            owner: permit.user_address,
            permitSingle: PermitSingle::from(&signed),
            signature: permit.signature.to_bytes(),
        };
        let receipt = client
            .send_admin(vault_addr, call.abi_encode().into())
            .await?;
        tracing::info!(
            permit_id = %permit.id,
            tx = %receipt.transaction_hash,
            amount = %permit.amount,
            "Submitted vault permit"
        );

        Ok(SubmitOutcome {
            token_permit_tx,
            vault_permit_tx: receipt.transaction_hash,
        })
    }
}
