//! Permit administration flows: create-and-submit, listing, status updates,
//! and first-class revocation.
//!
//! Signature validation is mandatory here. The vault permit signature is
//! recovered over the typed-data digest and must match the claimed owner
//! before anything is stored or submitted; an attached token permit
//! signature is recovered against the stablecoin's own domain using the
//! current on-chain EIP-2612 nonce. A revocation is a new zero-amount
//! permit over the same `(user, token, chain, spender)` - never a mutation
//! of the original.

use alloy_primitives::{Address, U256};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use paylane::codec;
use paylane::model::{
    Permit, PermitStatus, SignatureParts, TokenPermitSig, TokenSymbol, UsdAmount,
};
use paylane::registry::ChainId;
use paylane::UnixTimestamp;
use paylane_evm::contract::IStablecoin;

use crate::error::RouterError;
use crate::service::RouterService;

/// Body of `POST /permits`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePermitRequest {
    /// Signing account.
    pub user_address: Address,
    /// Agent this permit funds; resolves the per-call price.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Token symbol.
    pub token: TokenSymbol,
    /// Source chain.
    pub chain_id: ChainId,
    /// Authorized amount in token base units.
    pub amount: U256,
    /// Vault nonce the permit was signed with.
    pub nonce: u64,
    /// Vault `sigDeadline` / allowance expiration.
    pub deadline: UnixTimestamp,
    /// Signature over the vault typed-data domain.
    pub signature: SignatureParts,
    /// Optional EIP-2612 signature approving the vault on the token.
    #[serde(default)]
    pub token_permit_sig: Option<TokenPermitSig>,
    /// Per-call price when no agent is named.
    #[serde(default)]
    pub cost_per_call: Option<UsdAmount>,
}

/// Body of `POST /permits/revoke`.
#[derive(Debug, Clone, Deserialize)]
pub struct RevokePermitRequest {
    /// Signing account.
    pub user_address: Address,
    /// Token whose allowance is being cleared.
    pub token: TokenSymbol,
    /// Chain the allowance lives on.
    pub chain_id: ChainId,
    /// Vault nonce the zero-amount permit was signed with.
    pub nonce: u64,
    /// Vault `sigDeadline`.
    pub deadline: UnixTimestamp,
    /// Signature over the zero-amount vault message.
    pub signature: SignatureParts,
}

/// Body of `PATCH /permits/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePermitRequest {
    /// New lifecycle status.
    pub status: PermitStatus,
}

/// Response for permit creation and revocation.
#[derive(Debug, Clone, Serialize)]
pub struct PermitResponse {
    /// The stored permit.
    pub permit: Permit,
    /// EIP-2612 approval transaction, when one was submitted.
    pub token_permit_tx: Option<String>,
    /// Vault permit transaction.
    pub vault_permit_tx: String,
}

impl RouterService {
    /// Creates, validates, stores, and submits a permit.
    ///
    /// The permit is stored before submission; a stale nonce surfaces as a
    /// conflict while the stored record stays `active` (it is filtered out
    /// at validation time because the on-chain allowance never matches).
    pub async fn create_permit(
        &self,
        request: CreatePermitRequest,
    ) -> Result<PermitResponse, RouterError> {
        let token_addr = self
            .registry
            .token_address(request.token, request.chain_id)
            .ok_or_else(|| {
                RouterError::InvalidParameters(format!(
                    "{} is not deployed on chain {}",
                    request.token, request.chain_id
                ))
            })?;

        let cost_per_call = match &request.agent_id {
            Some(agent_id) => {
                let agent = self
                    .store()
                    .agent(agent_id)
                    .await
                    .ok_or_else(|| RouterError::AgentNotFound(agent_id.clone()))?;
                agent.price_per_call
            }
            None => request.cost_per_call.ok_or_else(|| {
                RouterError::InvalidParameters(
                    "either agent_id or cost_per_call is required".to_owned(),
                )
            })?,
        };

        self.verify_vault_signature(
            &request.signature,
            request.user_address,
            request.chain_id,
            token_addr,
            request.amount,
            request.deadline,
            request.nonce,
        )?;
        if let Some(token_sig) = &request.token_permit_sig {
            self.verify_token_signature(
                token_sig,
                request.user_address,
                request.token,
                request.chain_id,
                token_addr,
            )
            .await?;
        }

        let permit = self.build_permit(
            request.user_address,
            request.agent_id,
            request.token,
            request.chain_id,
            request.amount,
            request.nonce,
            request.deadline,
            request.signature,
            request.token_permit_sig,
            cost_per_call,
        )?;
        self.store().create_permit(permit.clone()).await?;
        tracing::info!(
            permit_id = %permit.id,
            user = %permit.user_address,
            token = %permit.token,
            chain_id = permit.chain_id,
            amount = %permit.amount,
            "Stored permit, submitting on-chain"
        );

        let outcome = self.submitter.submit(&permit).await?;
        Ok(PermitResponse {
            permit,
            token_permit_tx: outcome.token_permit_tx.map(|tx| format!("{tx:#x}")),
            vault_permit_tx: format!("{:#x}", outcome.vault_permit_tx),
        })
    }

    /// Lists a user's permits, newest first.
    pub async fn list_permits(&self, user_address: Address) -> Result<Vec<Permit>, RouterError> {
        Ok(self.store().permits_by_user(user_address).await?)
    }

    /// Updates a permit's lifecycle status (local revocation bookkeeping).
    pub async fn update_permit_status(
        &self,
        permit_id: &str,
        request: UpdatePermitRequest,
    ) -> Result<Permit, RouterError> {
        match self
            .store()
            .update_permit_status(permit_id, request.status)
            .await
        {
            Ok(permit) => Ok(permit),
            Err(paylane_store::StoreError::NotFound(_)) => Err(RouterError::InvalidParameters(
                format!("unknown permit {permit_id}"),
            )),
            Err(err) => Err(err.into()),
        }
    }

    /// Submits a zero-amount revocation permit.
    ///
    /// Storing it supersedes the user's active permit for the same
    /// `(token, chain)` (marked `revoked`, retained for audit); submitting
    /// it clears the vault allowance on-chain, so subsequent calls against
    /// the superseded permit fail allowance validation.
    pub async fn revoke_permit(
        &self,
        request: RevokePermitRequest,
    ) -> Result<PermitResponse, RouterError> {
        let token_addr = self
            .registry
            .token_address(request.token, request.chain_id)
            .ok_or_else(|| {
                RouterError::InvalidParameters(format!(
                    "{} is not deployed on chain {}",
                    request.token, request.chain_id
                ))
            })?;

        self.verify_vault_signature(
            &request.signature,
            request.user_address,
            request.chain_id,
            token_addr,
            U256::ZERO,
            request.deadline,
            request.nonce,
        )?;

        let permit = self.build_permit(
            request.user_address,
            None,
            request.token,
            request.chain_id,
            U256::ZERO,
            request.nonce,
            request.deadline,
            request.signature,
            None,
            UsdAmount::ZERO,
        )?;
        self.store().create_permit(permit.clone()).await?;
        tracing::info!(
            permit_id = %permit.id,
            user = %permit.user_address,
            token = %permit.token,
            chain_id = permit.chain_id,
            "Stored revocation permit, clearing allowance on-chain"
        );

        let outcome = self.submitter.submit(&permit).await?;
        Ok(PermitResponse {
            permit,
            token_permit_tx: None,
            vault_permit_tx: format!("{:#x}", outcome.vault_permit_tx),
        })
    }

    /// Recovers the vault permit signature and checks the claimed owner.
    #[allow(clippy::too_many_arguments)]
    fn verify_vault_signature(
        &self,
        signature: &SignatureParts,
        owner: Address,
        chain_id: ChainId,
        token_addr: Address,
        amount: U256,
        deadline: UnixTimestamp,
        nonce: u64,
    ) -> Result<(), RouterError> {
        let message = codec::vault_permit_single(
            token_addr,
            amount,
            deadline.as_secs(),
            nonce,
            self.admin_address,
        );
        let digest = codec::vault_permit_digest(
            chain_id,
            self.registry.allowance_vault_address(),
            &message,
        );
        codec::verify_signer(digest, signature, owner)
            .map_err(|e| RouterError::InvalidParameters(format!("vault permit signature: {e}")))
    }

    /// Recovers the EIP-2612 signature against the stablecoin's domain,
    /// using the current on-chain nonce.
    async fn verify_token_signature(
        &self,
        token_sig: &TokenPermitSig,
        owner: Address,
        token: TokenSymbol,
        chain_id: ChainId,
        token_addr: Address,
    ) -> Result<(), RouterError> {
        let client = self.clients.get(chain_id)?;
        let contract = IStablecoin::new(token_addr, client.provider());
        let nonce = contract
            .nonces(owner)
            .call()
            .await
            .map_err(|e| RouterError::Internal(format!("reading token nonce: {e}")))?;

        let digest = codec::token_permit_digest(
            token,
            chain_id,
            token_addr,
            owner,
            self.registry.allowance_vault_address(),
            U256::MAX,
            nonce,
            token_sig.deadline.as_secs(),
        );
        codec::verify_signer(digest, &token_sig.sig, owner)
            .map_err(|e| RouterError::InvalidParameters(format!("token permit signature: {e}")))
    }

    /// Assembles the stored form of a permit.
    ///
    /// The `expires_at` bookkeeping mirror is derived exactly from the
    /// signed deadline; a deadline that does not map to a representable
    /// timestamp is rejected rather than mirrored approximately.
    #[allow(clippy::too_many_arguments)]
    fn build_permit(
        &self,
        user_address: Address,
        agent_id: Option<String>,
        token: TokenSymbol,
        chain_id: ChainId,
        amount: U256,
        nonce: u64,
        deadline: UnixTimestamp,
        signature: SignatureParts,
        token_permit_sig: Option<TokenPermitSig>,
        cost_per_call: UsdAmount,
    ) -> Result<Permit, RouterError> {
        let max_calls = if amount.is_zero() {
            0
        } else {
            Permit::max_calls_for(amount, cost_per_call)
        };
        let expires_at = i64::try_from(deadline.as_secs())
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .ok_or_else(|| {
                RouterError::InvalidParameters(format!("deadline {deadline} is out of range"))
            })?;
        Ok(Permit {
            id: Uuid::new_v4().to_string(),
            user_address,
            agent_id,
            token,
            chain_id,
            spender_address: self.admin_address,
            amount,
            nonce,
            deadline,
            signature,
            token_permit_sig,
            status: PermitStatus::Active,
            created_at: Utc::now(),
            expires_at,
            max_calls,
            calls_used: 0,
            cost_per_call,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use alloy_primitives::{address, B256};
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use url::Url;

    use paylane::registry::ChainRegistry;
    use paylane_evm::{
        AttestationClient, ChainClients, PermitSubmitter, TransferEngine, TransferType,
    };
    use paylane_store::PaymentStore;

    use super::*;

    const ADMIN: Address = address!("0x00000000000000000000000000000000000000ad");
    const CHAIN: ChainId = 84_532;
    const DEADLINE: u64 = 2_000_000_000;

    fn service() -> RouterService {
        let store = PaymentStore::in_memory();
        let registry = Arc::new(ChainRegistry::new());
        let clients = ChainClients::default();
        let attestation =
            AttestationClient::new(Url::parse("http://127.0.0.1:1/unused").unwrap());
        let engine = TransferEngine::new(
            clients.clone(),
            Arc::clone(&registry),
            store.clone(),
            attestation,
            TransferType::Standard,
        );
        let submitter = PermitSubmitter::new(clients.clone(), Arc::clone(&registry));
        RouterService::new(
            store,
            registry,
            clients,
            engine,
            submitter,
            ADMIN,
            Duration::from_secs(13),
            0,
        )
    }

    fn signer() -> PrivateKeySigner {
        // Deterministic test key.
        "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
            .parse()
            .unwrap()
    }

    fn usdc(service: &RouterService) -> Address {
        service
            .registry
            .token_address(TokenSymbol::Usdc, CHAIN)
            .unwrap()
    }

    /// Signs the vault permit message the way the frontend does.
    fn sign_vault_permit(
        service: &RouterService,
        signer: &PrivateKeySigner,
        token_addr: Address,
        amount: U256,
        nonce: u64,
    ) -> SignatureParts {
        let message = codec::vault_permit_single(token_addr, amount, DEADLINE, nonce, ADMIN);
        let digest = codec::vault_permit_digest(
            CHAIN,
            service.registry.allowance_vault_address(),
            &message,
        );
        SignatureParts::from(signer.sign_hash_sync(&digest).unwrap())
    }

    fn zero_sig() -> SignatureParts {
        SignatureParts {
            r: B256::ZERO,
            s: B256::ZERO,
            v: 27,
        }
    }

    #[test]
    fn test_vault_signature_round_trip() {
        let service = service();
        let signer = signer();
        let token = usdc(&service);
        let amount = U256::from(10_000_000u64);
        let sig = sign_vault_permit(&service, &signer, token, amount, 3);

        service
            .verify_vault_signature(
                &sig,
                signer.address(),
                CHAIN,
                token,
                amount,
                UnixTimestamp::from_secs(DEADLINE),
                3,
            )
            .unwrap();
    }

    #[test]
    fn test_tampered_amount_is_rejected() {
        let service = service();
        let signer = signer();
        let token = usdc(&service);
        let sig = sign_vault_permit(&service, &signer, token, U256::from(10_000_000u64), 3);

        let err = service
            .verify_vault_signature(
                &sig,
                signer.address(),
                CHAIN,
                token,
                U256::from(20_000_000u64),
                UnixTimestamp::from_secs(DEADLINE),
                3,
            )
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidParameters(_)));
    }

    #[test]
    fn test_wrong_owner_is_rejected() {
        let service = service();
        let signer = signer();
        let token = usdc(&service);
        let amount = U256::from(10_000_000u64);
        let sig = sign_vault_permit(&service, &signer, token, amount, 3);
        let other = address!("0x00000000000000000000000000000000000000bb");

        let err = service
            .verify_vault_signature(
                &sig,
                other,
                CHAIN,
                token,
                amount,
                UnixTimestamp::from_secs(DEADLINE),
                3,
            )
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidParameters(_)));
    }

    #[test]
    fn test_wrong_nonce_or_chain_is_rejected() {
        let service = service();
        let signer = signer();
        let token = usdc(&service);
        let amount = U256::from(10_000_000u64);
        let sig = sign_vault_permit(&service, &signer, token, amount, 3);

        // Replayed against the wrong nonce.
        assert!(service
            .verify_vault_signature(
                &sig,
                signer.address(),
                CHAIN,
                token,
                amount,
                UnixTimestamp::from_secs(DEADLINE),
                4,
            )
            .is_err());
        // Replayed against another chain's domain.
        assert!(service
            .verify_vault_signature(
                &sig,
                signer.address(),
                11_155_111,
                token,
                amount,
                UnixTimestamp::from_secs(DEADLINE),
                3,
            )
            .is_err());
    }

    #[test]
    fn test_revocation_permit_shape() {
        let service = service();
        let permit = service
            .build_permit(
                signer().address(),
                None,
                TokenSymbol::Usdc,
                CHAIN,
                U256::ZERO,
                5,
                UnixTimestamp::from_secs(DEADLINE),
                zero_sig(),
                None,
                UsdAmount::ZERO,
            )
            .unwrap();

        assert!(permit.amount.is_zero());
        assert_eq!(permit.max_calls, 0);
        assert_eq!(permit.calls_used, 0);
        assert_eq!(permit.cost_per_call, UsdAmount::ZERO);
        assert_eq!(permit.status, PermitStatus::Active);
        assert_eq!(permit.spender_address, ADMIN);
        // The bookkeeping mirror matches the signed deadline exactly.
        assert_eq!(permit.expires_at.timestamp(), 2_000_000_000);
    }

    #[test]
    fn test_out_of_range_deadline_is_rejected() {
        let service = service();
        let err = service
            .build_permit(
                signer().address(),
                None,
                TokenSymbol::Usdc,
                CHAIN,
                U256::from(10_000_000u64),
                0,
                UnixTimestamp::from_secs(u64::MAX),
                zero_sig(),
                None,
                UsdAmount::from_micros(100_000),
            )
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidParameters(_)));
    }
}
