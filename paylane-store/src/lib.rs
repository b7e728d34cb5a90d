//! Persistent state for the paylane payment router.
//!
//! [`PaymentStore`] owns permits, payments, cross-chain payments,
//! subscriptions, API call logs, and the read-only user/agent collections.
//! Nothing else mutates them. State lives behind a single `RwLock`; every
//! mutating method persists the full state to a JSON file (temp file +
//! rename) while the write lock is held, so the on-disk snapshot is always
//! internally consistent. Constructing the store without a path keeps it
//! purely in memory, which is what the tests use.
//!
//! Durability contract:
//!
//! - a subscription-usage update and the payment record for one call are
//!   written under the same lock acquisition, so they land in one snapshot;
//! - [`PaymentStore::create_payment`] is idempotent on `api_call_id`, so a
//!   retried settlement cannot double-charge;
//! - permit usage counters only move forward and never past `max_calls`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use alloy_primitives::{Address, TxHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use paylane::model::{
    Agent, ApiCallLog, AttestationStatus, CrossChainPayment, Payment, Permit, PermitStatus,
    Subscription, User,
};
use paylane::UnixTimestamp;

/// Errors raised by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record with the given id.
    #[error("record not found: {0}")]
    NotFound(String),
    /// The operation conflicts with existing state.
    #[error("{0}")]
    Conflict(String),
    /// The update violates a counter invariant.
    #[error("{0}")]
    Validation(String),
    /// Reading or writing the backing file failed.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// Full serializable state of the store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    permits: HashMap<String, Permit>,
    /// Lowercased user address -> permit ids, newest last.
    permits_by_user: HashMap<String, Vec<String>>,
    payments: HashMap<String, Payment>,
    /// `api_call_id` -> payment id, the at-most-once billing index.
    payments_by_call: HashMap<String, String>,
    cross_chain_payments: HashMap<String, CrossChainPayment>,
    subscriptions: HashMap<String, Subscription>,
    call_logs: Vec<ApiCallLog>,
    users: HashMap<String, User>,
    agents: HashMap<String, Agent>,
}

/// Fields of a [`CrossChainPayment`] that change after creation.
#[derive(Debug, Default, Clone)]
pub struct CrossChainPaymentPatch {
    /// New attestation status.
    pub attestation_status: Option<AttestationStatus>,
    /// Mint transaction hash.
    pub target_transaction_hash: Option<TxHash>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal error detail.
    pub error_message: Option<String>,
}

/// The shared datastore. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PaymentStore {
    state: Arc<RwLock<StoreState>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for PaymentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl PaymentStore {
    /// Creates an in-memory store with no persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            path: None,
        }
    }

    /// Opens a file-backed store, loading existing state if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::Persistence(e.to_string()))?;
            serde_json::from_str(&raw).map_err(|e| StoreError::Persistence(e.to_string()))?
        } else {
            StoreState::default()
        };
        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            path: Some(path),
        })
    }

    /// Writes the state snapshot to disk. Called with the write lock held.
    fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).map_err(|e| StoreError::Persistence(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| StoreError::Persistence(e.to_string()))?;
        Ok(())
    }

    // --- users and agents (read-only collaborators, seeded at startup) ---

    /// Inserts or replaces a user.
    pub async fn seed_user(&self, user: User) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.users.insert(user.id.clone(), user);
        self.persist(&state)
    }

    /// Inserts or replaces an agent.
    pub async fn seed_agent(&self, agent: Agent) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.agents.insert(agent.id.clone(), agent);
        self.persist(&state)
    }

    /// Looks up a user by API key.
    pub async fn user_by_api_key(&self, api_key: &str) -> Option<User> {
        let state = self.state.read().await;
        state.users.values().find(|u| u.api_key == api_key).cloned()
    }

    /// Looks up a user by id.
    pub async fn user(&self, id: &str) -> Option<User> {
        self.state.read().await.users.get(id).cloned()
    }

    /// Looks up an agent by id.
    pub async fn agent(&self, id: &str) -> Option<Agent> {
        self.state.read().await.agents.get(id).cloned()
    }

    // --- subscriptions ---

    /// Inserts or replaces a subscription.
    pub async fn upsert_subscription(&self, sub: Subscription) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.subscriptions.insert(sub.id.clone(), sub);
        self.persist(&state)
    }

    /// Finds the subscription linking a user to an agent.
    pub async fn subscription_for(&self, user_id: &str, agent_id: &str) -> Option<Subscription> {
        let state = self.state.read().await;
        state
            .subscriptions
            .values()
            .find(|s| s.user_id == user_id && s.agent_id == agent_id)
            .cloned()
    }

    /// Moves exactly one usage counter for a settled call.
    ///
    /// `was_free_trial` decrements `free_trials_remaining` and increments
    /// `free_trials_used`; otherwise `total_paid_calls` increments. The two
    /// are mutually exclusive per call.
    pub async fn update_subscription_usage(
        &self,
        id: &str,
        was_free_trial: bool,
    ) -> Result<Subscription, StoreError> {
        let mut state = self.state.write().await;
        let sub = state
            .subscriptions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        if was_free_trial {
            if sub.free_trials_remaining == 0 {
                return Err(StoreError::Validation(
                    "no free trials remaining".to_owned(),
                ));
            }
            sub.free_trials_remaining -= 1;
            sub.free_trials_used += 1;
        } else {
            sub.total_paid_calls += 1;
        }
        sub.updated_at = Utc::now();
        let updated = sub.clone();
        self.persist(&state)?;
        Ok(updated)
    }

    // --- permits ---

    /// Stores a new permit, superseding older active permits for the same
    /// `(user, token, chain)` triple. Superseded permits become `Revoked`
    /// and are retained for audit.
    pub async fn create_permit(&self, permit: Permit) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.permits.contains_key(&permit.id) {
            return Err(StoreError::Conflict(format!(
                "permit {} already exists",
                permit.id
            )));
        }
        let key = user_key(permit.user_address);
        let superseded: Vec<String> = state
            .permits
            .values()
            .filter(|p| {
                p.status == PermitStatus::Active
                    && p.user_address == permit.user_address
                    && p.token == permit.token
                    && p.chain_id == permit.chain_id
            })
            .map(|p| p.id.clone())
            .collect();
        for id in superseded {
            if let Some(old) = state.permits.get_mut(&id) {
                old.status = PermitStatus::Revoked;
                tracing::info!(permit_id = %id, by = %permit.id, "Superseded active permit");
            }
        }
        state
            .permits_by_user
            .entry(key)
            .or_default()
            .push(permit.id.clone());
        state.permits.insert(permit.id.clone(), permit);
        self.persist(&state)
    }

    /// Fetches a permit by id.
    pub async fn permit(&self, id: &str) -> Option<Permit> {
        self.state.read().await.permits.get(id).cloned()
    }

    /// Lists a user's permits, newest first, sweeping expired ones.
    ///
    /// Permits whose signed deadline or bookkeeping `expires_at` mirror has
    /// passed are flipped to `Expired` before the list is returned, so
    /// callers never see a stale `Active` status.
    pub async fn permits_by_user(&self, address: Address) -> Result<Vec<Permit>, StoreError> {
        let now = UnixTimestamp::now();
        let now_at = Utc::now();
        let mut state = self.state.write().await;
        let ids = state
            .permits_by_user
            .get(&user_key(address))
            .cloned()
            .unwrap_or_default();
        let mut swept = false;
        for id in &ids {
            if let Some(p) = state.permits.get_mut(id)
                && p.status == PermitStatus::Active
                && (p.deadline.is_expired(now) || p.expires_at <= now_at)
            {
                p.status = PermitStatus::Expired;
                swept = true;
            }
        }
        if swept {
            self.persist(&state)?;
        }
        let mut permits: Vec<Permit> = ids
            .iter()
            .filter_map(|id| state.permits.get(id).cloned())
            .collect();
        permits.reverse();
        Ok(permits)
    }

    /// Updates a permit's lifecycle status.
    pub async fn update_permit_status(
        &self,
        id: &str,
        status: PermitStatus,
    ) -> Result<Permit, StoreError> {
        let mut state = self.state.write().await;
        let permit = state
            .permits
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        permit.status = status;
        let updated = permit.clone();
        self.persist(&state)?;
        Ok(updated)
    }

    /// Sets a permit's usage counter.
    ///
    /// The counter is monotonic and bounded: moving it backwards or past
    /// `max_calls` is rejected.
    pub async fn update_permit_usage(
        &self,
        id: &str,
        calls_used: u32,
    ) -> Result<Permit, StoreError> {
        let mut state = self.state.write().await;
        let permit = state
            .permits
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        if calls_used < permit.calls_used {
            return Err(StoreError::Validation(format!(
                "usage cannot decrease ({} -> {calls_used})",
                permit.calls_used
            )));
        }
        if calls_used > permit.max_calls {
            return Err(StoreError::Validation(format!(
                "usage {calls_used} exceeds max_calls {}",
                permit.max_calls
            )));
        }
        permit.calls_used = calls_used;
        let updated = permit.clone();
        self.persist(&state)?;
        Ok(updated)
    }

    // --- payments ---

    /// Records a per-call payment, idempotently on `api_call_id`.
    ///
    /// If a payment for the same call already exists it is returned
    /// unchanged, so settlement retries cannot double-charge.
    pub async fn create_payment(&self, payment: Payment) -> Result<Payment, StoreError> {
        let mut state = self.state.write().await;
        if let Some(existing_id) = state.payments_by_call.get(&payment.api_call_id) {
            let existing = state
                .payments
                .get(existing_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(existing_id.clone()))?;
            tracing::debug!(
                api_call_id = %payment.api_call_id,
                payment_id = %existing.id,
                "Payment already recorded for call"
            );
            return Ok(existing);
        }
        state
            .payments_by_call
            .insert(payment.api_call_id.clone(), payment.id.clone());
        state.payments.insert(payment.id.clone(), payment.clone());
        self.persist(&state)?;
        Ok(payment)
    }

    /// Fetches a payment by id.
    pub async fn payment(&self, id: &str) -> Option<Payment> {
        self.state.read().await.payments.get(id).cloned()
    }

    // --- cross-chain payments ---

    /// Persists a cross-chain payment record (written at burn time).
    pub async fn create_cross_chain_payment(
        &self,
        payment: CrossChainPayment,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .cross_chain_payments
            .insert(payment.id.clone(), payment);
        self.persist(&state)
    }

    /// Applies a lifecycle patch to a cross-chain payment.
    pub async fn update_cross_chain_payment(
        &self,
        id: &str,
        patch: CrossChainPaymentPatch,
    ) -> Result<CrossChainPayment, StoreError> {
        let mut state = self.state.write().await;
        let payment = state
            .cross_chain_payments
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        if let Some(status) = patch.attestation_status {
            payment.attestation_status = status;
        }
        if let Some(tx) = patch.target_transaction_hash {
            payment.target_transaction_hash = Some(tx);
        }
        if let Some(at) = patch.completed_at {
            payment.completed_at = Some(at);
        }
        if let Some(msg) = patch.error_message {
            payment.error_message = Some(msg);
        }
        let updated = payment.clone();
        self.persist(&state)?;
        Ok(updated)
    }

    /// Fetches a cross-chain payment by id.
    pub async fn cross_chain_payment(&self, id: &str) -> Option<CrossChainPayment> {
        self.state
            .read()
            .await
            .cross_chain_payments
            .get(id)
            .cloned()
    }

    // --- call logs ---

    /// Appends an API call log entry. Written unconditionally per call.
    pub async fn log_api_call(&self, log: ApiCallLog) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.call_logs.push(log);
        self.persist(&state)
    }

    /// Returns call logs for a user, oldest first.
    pub async fn call_logs_for_user(&self, user_id: &str) -> Vec<ApiCallLog> {
        self.state
            .read()
            .await
            .call_logs
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect()
    }
}

fn user_key(address: Address) -> String {
    format!("{address:#x}")
}
