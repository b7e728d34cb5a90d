//! Per-request orchestration for metered API calls.
//!
//! Each call walks the same pipeline: authenticate -> subscription check ->
//! pre-authorize -> forward to the publisher -> log -> settle -> respond.
//! Pre-authorization decides between a free-trial call (no on-chain work)
//! and a paid call (permit selection plus balance/allowance validation and
//! the route decision). Settlement runs only after a 2xx publisher
//! response; failed settlements do not refund the publisher call - they are
//! recorded and surfaced as `ApiCallFailed`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::Address;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use paylane::model::{
    Agent, ApiCallLog, Payment, PaymentStatus, Permit, PermitStatus, Subscription,
    SubscriptionStatus, UsdAmount, User,
};
use paylane::registry::ChainRegistry;
use paylane::{select_permit, UnixTimestamp};
use paylane_evm::{
    ChainClients, ChainValidator, PermitSubmitter, TransferEngine, TransferRequest,
};
use paylane_store::PaymentStore;

use crate::error::RouterError;

/// Incoming metered call body.
#[derive(Debug, Clone, Deserialize)]
pub struct CallRequest {
    /// Method name forwarded to the publisher.
    pub method: String,
    /// Opaque parameters forwarded to the publisher.
    #[serde(default)]
    pub parameters: Value,
    /// Caller-supplied metadata, ignored by the router.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Billing block of a call response.
#[derive(Debug, Clone, Serialize)]
pub struct Billing {
    /// `"paid"` or `"free_trial"`.
    pub call_type: &'static str,
    /// Amount charged in dollars.
    pub cost_usd: f64,
    /// Free trials left on the subscription after this call.
    pub free_trials_remaining: u32,
    /// Total remaining permit value in dollars after this call.
    pub balance_after_call: f64,
}

/// Response metadata block.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    /// Request id, also present in tracing spans.
    pub request_id: String,
    /// Agent the call was routed to.
    pub agent_id: String,
    /// Response timestamp.
    pub timestamp: chrono::DateTime<Utc>,
}

/// Successful metered call response.
#[derive(Debug, Clone, Serialize)]
pub struct CallResponse {
    /// Always `true` on the success path.
    pub success: bool,
    /// Publisher response body.
    pub data: Value,
    /// Billing block.
    pub billing: Billing,
    /// Metadata block.
    pub metadata: ResponseMetadata,
}

/// Classification produced by pre-authorization.
#[derive(Debug)]
enum CallClass {
    /// Covered by the subscription's free-trial counter.
    FreeTrial,
    /// Funded by a permit.
    Paid {
        permit: Permit,
        cost: UsdAmount,
    },
}

/// Outcome of the settle step, produced on every forwarded call.
#[derive(Debug)]
struct Settlement {
    charged: UsdAmount,
    payment_id: Option<String>,
    free_trial: bool,
    free_trials_remaining: u32,
    balance_after: UsdAmount,
    error: Option<RouterError>,
}

/// Fixed-window per-user request limiter.
#[derive(Debug, Default)]
struct RateLimiter {
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

impl RateLimiter {
    async fn check(&self, key: &str, limit: u32) -> Result<(), RouterError> {
        if limit == 0 {
            return Ok(());
        }
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let entry = windows.entry(key.to_owned()).or_insert((now, 0));
        if now.duration_since(entry.0) >= Duration::from_secs(60) {
            *entry = (now, 0);
        }
        if entry.1 >= limit {
            return Err(RouterError::RateLimited);
        }
        entry.1 += 1;
        Ok(())
    }
}

/// The router service shared across request handlers.
pub struct RouterService {
    store: PaymentStore,
    pub(crate) registry: Arc<ChainRegistry>,
    pub(crate) clients: ChainClients,
    pub(crate) validator: ChainValidator,
    engine: TransferEngine,
    pub(crate) submitter: PermitSubmitter,
    http: reqwest::Client,
    publisher_timeout: Duration,
    pub(crate) admin_address: Address,
    rate_limit_per_minute: u32,
    limiter: RateLimiter,
}

impl std::fmt::Debug for RouterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterService")
            .field("admin_address", &self.admin_address)
            .finish_non_exhaustive()
    }
}

impl RouterService {
    /// Wires the service from already-constructed collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: PaymentStore,
        registry: Arc<ChainRegistry>,
        clients: ChainClients,
        engine: TransferEngine,
        submitter: PermitSubmitter,
        admin_address: Address,
        publisher_timeout: Duration,
        rate_limit_per_minute: u32,
    ) -> Self {
        let validator = ChainValidator::new(Arc::clone(&registry));
        Self {
            store,
            registry,
            clients,
            validator,
            engine,
            submitter,
            http: reqwest::Client::new(),
            publisher_timeout,
            admin_address,
            rate_limit_per_minute,
            limiter: RateLimiter::default(),
        }
    }

    /// The shared datastore.
    #[must_use]
    pub const fn store(&self) -> &PaymentStore {
        &self.store
    }

    /// Handles one metered API call end to end.
    pub async fn handle_call(
        &self,
        api_key: Option<&str>,
        agent_id: &str,
        request: CallRequest,
    ) -> Result<CallResponse, RouterError> {
        let api_key = api_key.ok_or(RouterError::Unauthorized)?;
        self.limiter.check(api_key, self.rate_limit_per_minute).await?;

        let user = self
            .store
            .user_by_api_key(api_key)
            .await
            .ok_or(RouterError::Unauthorized)?;
        if !user.is_approved {
            return Err(RouterError::Unauthorized);
        }

        let agent = self
            .store
            .agent(agent_id)
            .await
            .ok_or_else(|| RouterError::AgentNotFound(agent_id.to_owned()))?;

        let subscription = self
            .store
            .subscription_for(&user.id, &agent.id)
            .await
            .filter(|s| s.status == SubscriptionStatus::Active)
            .ok_or(RouterError::SubscriptionRequired)?;

        let class = self.pre_authorize(&user, &agent, &subscription).await?;

        let request_id = Uuid::new_v4().to_string();
        let class_label = match &class {
            CallClass::FreeTrial => "free_trial",
            CallClass::Paid { .. } => "paid",
        };
        tracing::info!(
            request_id = %request_id,
            user_id = %user.id,
            agent_id = %agent.id,
            class = class_label,
            "Forwarding metered call"
        );

        let request_timestamp = Utc::now();
        let started = Instant::now();
        let forwarded = self.forward(&agent, &request).await;
        let response_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let response_timestamp = Utc::now();

        match forwarded {
            Ok((http_status, data)) => {
                let settlement = self
                    .settle(&user, &agent, &subscription, class, &request_id)
                    .await;

                self.log_call(
                    &user,
                    &agent,
                    &request_id,
                    request_timestamp,
                    response_timestamp,
                    http_status,
                    response_time_ms,
                    &settlement,
                )
                .await;

                if let Some(error) = settlement.error {
                    return Err(error);
                }

                Ok(CallResponse {
                    success: true,
                    data,
                    billing: Billing {
                        call_type: if settlement.free_trial {
                            "free_trial"
                        } else {
                            "paid"
                        },
                        cost_usd: settlement.charged.as_dollars(),
                        free_trials_remaining: settlement.free_trials_remaining,
                        balance_after_call: settlement.balance_after.as_dollars(),
                    },
                    metadata: ResponseMetadata {
                        request_id,
                        agent_id: agent.id,
                        timestamp: response_timestamp,
                    },
                })
            }
            Err(error) => {
                // The publisher call failed; log the attempt and surface the
                // gateway error. No settlement runs.
                let settlement = Settlement {
                    charged: UsdAmount::ZERO,
                    payment_id: None,
                    free_trial: false,
                    free_trials_remaining: subscription.free_trials_remaining,
                    balance_after: UsdAmount::ZERO,
                    error: None,
                };
                self.log_call(
                    &user,
                    &agent,
                    &request_id,
                    request_timestamp,
                    response_timestamp,
                    error.status().as_u16(),
                    response_time_ms,
                    &settlement,
                )
                .await;
                Err(error)
            }
        }
    }

    /// Classifies the call and validates chain state for paid calls.
    async fn pre_authorize(
        &self,
        user: &User,
        agent: &Agent,
        subscription: &Subscription,
    ) -> Result<CallClass, RouterError> {
        if subscription.free_trials_remaining > 0 {
            return Ok(CallClass::FreeTrial);
        }

        let cost = agent.price_per_call;
        let permits = self.store.permits_by_user(user.wallet_address).await?;
        let active: Vec<Permit> = permits
            .into_iter()
            .filter(|p| p.status == PermitStatus::Active)
            .filter(|p| p.spender_address == self.admin_address)
            .filter(|p| {
                p.agent_id
                    .as_deref()
                    .is_none_or(|bound| bound == agent.id.as_str())
            })
            .collect();
        if active.is_empty() {
            return Err(RouterError::NoValidPermits);
        }

        let permit = select_permit(&active, agent, cost)
            .ok_or(RouterError::InsufficientPermitBalance)?
            .clone();

        // The route gate runs before the publisher is called so an
        // unroutable permit never burns a paid API call.
        TransferEngine::plan_route(permit.token, permit.chain_id, agent.payment_preferences)?;

        let client = self.clients.get(permit.chain_id)?.as_ref();
        let required = cost.as_token_units();

        let balance = self
            .validator
            .check_balance(client, permit.token, user.wallet_address, required)
            .await?;
        if !balance.sufficient() {
            return Err(RouterError::InsufficientBalance);
        }

        let vault = self
            .validator
            .check_vault_allowance(
                client,
                permit.token,
                user.wallet_address,
                self.admin_address,
                required,
            )
            .await?;
        if !vault.valid_at(UnixTimestamp::now()) {
            return Err(RouterError::InsufficientAllowance);
        }

        Ok(CallClass::Paid { permit, cost })
    }

    /// Forwards the call to the publisher endpoint.
    async fn forward(
        &self,
        agent: &Agent,
        request: &CallRequest,
    ) -> Result<(u16, Value), RouterError> {
        let body = json!({
            "method": request.method,
            "parameters": request.parameters,
            "metadata": {
                "router_version": env!("CARGO_PKG_VERSION"),
                "agent_id": agent.id,
            }
        });

        let response = self
            .http
            .post(&agent.api_endpoint)
            .bearer_auth(&agent.publisher_api_key)
            .timeout(self.publisher_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RouterError::PublisherTimeout
                } else {
                    RouterError::ApiCallFailed(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RouterError::ApiCallFailed(e.to_string()))?;
        if !status.is_success() {
            return Err(RouterError::ApiCallFailed(format!(
                "publisher returned HTTP {status}"
            )));
        }
        let data = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok((status.as_u16(), data))
    }

    /// Settles billing for a forwarded call. Exactly one of the free-trial
    /// counter or the paid counter moves.
    async fn settle(
        &self,
        user: &User,
        agent: &Agent,
        subscription: &Subscription,
        class: CallClass,
        api_call_id: &str,
    ) -> Settlement {
        match class {
            CallClass::FreeTrial => {
                match self
                    .store
                    .update_subscription_usage(&subscription.id, true)
                    .await
                {
                    Ok(updated) => Settlement {
                        charged: UsdAmount::ZERO,
                        payment_id: None,
                        free_trial: true,
                        free_trials_remaining: updated.free_trials_remaining,
                        balance_after: self.remaining_permit_value(user).await,
                        error: None,
                    },
                    Err(err) => Settlement {
                        charged: UsdAmount::ZERO,
                        payment_id: None,
                        free_trial: true,
                        free_trials_remaining: subscription.free_trials_remaining,
                        balance_after: UsdAmount::ZERO,
                        error: Some(err.into()),
                    },
                }
            }
            CallClass::Paid { permit, cost } => {
                let transfer = TransferRequest {
                    user_id: user.id.clone(),
                    agent_id: agent.id.clone(),
                    user_address: user.wallet_address,
                    publisher: agent.publisher_wallet_address,
                    permit_id: permit.id.clone(),
                    token: permit.token,
                    source_chain_id: permit.chain_id,
                    amount: cost.as_token_units(),
                    payout: agent.payment_preferences,
                };
                match self.engine.execute(&transfer).await {
                    Ok(outcome) => {
                        let mut error = None;
                        if let Err(err) = self
                            .store
                            .update_subscription_usage(&subscription.id, false)
                            .await
                        {
                            error = Some(err.into());
                        }
                        let payment = Payment {
                            id: Uuid::new_v4().to_string(),
                            user_id: user.id.clone(),
                            agent_id: agent.id.clone(),
                            amount: cost,
                            token: permit.token,
                            chain_id: permit.chain_id,
                            transaction_hash: Some(outcome.transaction_hash),
                            status: PaymentStatus::Completed,
                            api_call_id: api_call_id.to_owned(),
                            message_hash: outcome.message_hash,
                            cross_chain_payment_id: outcome.cross_chain_payment_id,
                            created_at: Utc::now(),
                        };
                        let payment_id = match self.store.create_payment(payment).await {
                            Ok(stored) => Some(stored.id),
                            Err(err) => {
                                error.get_or_insert(err.into());
                                None
                            }
                        };
                        Settlement {
                            charged: cost,
                            payment_id,
                            free_trial: false,
                            free_trials_remaining: subscription.free_trials_remaining,
                            balance_after: self.remaining_permit_value(user).await,
                            error,
                        }
                    }
                    Err(err) => {
                        // Failed transfers do not refund the API call. The
                        // payment row records the failure for reconciliation.
                        tracing::warn!(
                            api_call_id = %api_call_id,
                            permit_id = %permit.id,
                            error = %err,
                            "Settlement failed after successful publisher call"
                        );
                        let payment = Payment {
                            id: Uuid::new_v4().to_string(),
                            user_id: user.id.clone(),
                            agent_id: agent.id.clone(),
                            amount: cost,
                            token: permit.token,
                            chain_id: permit.chain_id,
                            transaction_hash: None,
                            status: PaymentStatus::Failed,
                            api_call_id: api_call_id.to_owned(),
                            message_hash: None,
                            cross_chain_payment_id: None,
                            created_at: Utc::now(),
                        };
                        let payment_id = self
                            .store
                            .create_payment(payment)
                            .await
                            .map(|p| p.id)
                            .ok();
                        Settlement {
                            charged: UsdAmount::ZERO,
                            payment_id,
                            free_trial: false,
                            free_trials_remaining: subscription.free_trials_remaining,
                            balance_after: self.remaining_permit_value(user).await,
                            error: Some(RouterError::ApiCallFailed(err.to_string())),
                        }
                    }
                }
            }
        }
    }

    /// Total remaining USD value across the user's active permits.
    async fn remaining_permit_value(&self, user: &User) -> UsdAmount {
        let Ok(permits) = self.store.permits_by_user(user.wallet_address).await else {
            return UsdAmount::ZERO;
        };
        let micros = permits
            .iter()
            .filter(|p| p.status == PermitStatus::Active)
            .map(|p| p.remaining_value().micros())
            .sum();
        UsdAmount::from_micros(micros)
    }

    /// Writes the call log entry. Failures are logged, never surfaced - the
    /// call outcome is already decided by now.
    #[allow(clippy::too_many_arguments)]
    async fn log_call(
        &self,
        user: &User,
        agent: &Agent,
        request_id: &str,
        request_timestamp: chrono::DateTime<Utc>,
        response_timestamp: chrono::DateTime<Utc>,
        http_status: u16,
        response_time_ms: u64,
        settlement: &Settlement,
    ) {
        let log = ApiCallLog {
            id: request_id.to_owned(),
            user_id: user.id.clone(),
            agent_id: agent.id.clone(),
            request_timestamp,
            response_timestamp,
            http_status,
            response_time_ms,
            is_free_trial: settlement.free_trial,
            charged_amount: settlement.charged,
            payment_id: settlement.payment_id.clone(),
        };
        if let Err(err) = self.store.log_api_call(log).await {
            tracing::error!(request_id = %request_id, error = %err, "Failed to write call log");
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, B256, U256};
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::{TimeZone, Utc};
    use url::Url;

    use paylane::model::{
        PaymentPreferences, PermitStatus, SignatureParts, TokenSymbol,
    };
    use paylane_evm::{AttestationClient, TransferType};

    use super::*;

    const USER_WALLET: alloy_primitives::Address =
        address!("0x00000000000000000000000000000000000000aa");
    const ADMIN: alloy_primitives::Address =
        address!("0x00000000000000000000000000000000000000ad");

    /// Spawns a stub publisher and returns its endpoint URL.
    async fn spawn_publisher(status: u16) -> String {
        let app = Router::new().route(
            "/api",
            post(move || async move {
                let body = Json(serde_json::json!({ "echo": true }));
                (axum::http::StatusCode::from_u16(status).unwrap(), body)
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn service_over(store: PaymentStore, rate_limit: u32) -> RouterService {
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
            rate_limit,
        )
    }

    fn user(approved: bool) -> User {
        User {
            id: "u-1".into(),
            api_key: "key-1".into(),
            wallet_address: USER_WALLET,
            is_approved: approved,
            created_at: Utc::now(),
        }
    }

    fn agent(endpoint: String) -> Agent {
        Agent {
            id: "a-1".into(),
            name: "echo".into(),
            price_per_call: UsdAmount::from_micros(100_000),
            payment_preferences: PaymentPreferences {
                payout_token: TokenSymbol::Usdc,
                payout_chain_id: 84_532,
            },
            publisher_wallet_address: address!("0x00000000000000000000000000000000000000bb"),
            api_endpoint: endpoint,
            publisher_api_key: "pk-1".into(),
            free_trial_tries: 3,
        }
    }

    fn subscription(trials: u32) -> Subscription {
        Subscription {
            id: "s-1".into(),
            user_id: "u-1".into(),
            agent_id: "a-1".into(),
            status: SubscriptionStatus::Active,
            free_trials_remaining: trials,
            free_trials_used: 0,
            total_paid_calls: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn permit(id: &str, token: TokenSymbol, chain_id: u64, max_calls: u32) -> Permit {
        Permit {
            id: id.into(),
            user_address: USER_WALLET,
            agent_id: None,
            token,
            chain_id,
            spender_address: ADMIN,
            amount: U256::from(u64::from(max_calls) * 100_000),
            nonce: 0,
            deadline: UnixTimestamp::from_secs(4_000_000_000),
            signature: SignatureParts {
                r: B256::ZERO,
                s: B256::ZERO,
                v: 27,
            },
            token_permit_sig: None,
            status: PermitStatus::Active,
            created_at: Utc::now(),
            expires_at: Utc.timestamp_opt(4_000_000_000, 0).unwrap(),
            max_calls,
            calls_used: 0,
            cost_per_call: UsdAmount::from_micros(100_000),
        }
    }

    fn call() -> CallRequest {
        CallRequest {
            method: "echo".into(),
            parameters: json!({"text": "hello"}),
            metadata: None,
        }
    }

    async fn seeded(trials: u32, publisher_status: u16) -> RouterService {
        let store = PaymentStore::in_memory();
        let endpoint = spawn_publisher(publisher_status).await;
        store.seed_user(user(true)).await.unwrap();
        store.seed_agent(agent(endpoint)).await.unwrap();
        store.upsert_subscription(subscription(trials)).await.unwrap();
        service_over(store, 0)
    }

    #[tokio::test]
    async fn test_free_trial_call_consumes_one_trial() {
        let service = seeded(3, 200).await;

        let response = service
            .handle_call(Some("key-1"), "a-1", call())
            .await
            .unwrap();
        assert_eq!(response.billing.call_type, "free_trial");
        assert!((response.billing.cost_usd - 0.0).abs() < f64::EPSILON);
        assert_eq!(response.billing.free_trials_remaining, 2);
        assert_eq!(response.data, json!({"echo": true}));

        // Exactly one counter moved.
        let sub = service
            .store()
            .subscription_for("u-1", "a-1")
            .await
            .unwrap();
        assert_eq!(sub.free_trials_remaining, 2);
        assert_eq!(sub.free_trials_used, 1);
        assert_eq!(sub.total_paid_calls, 0);

        // The call was logged.
        let logs = service.store().call_logs_for_user("u-1").await;
        assert_eq!(logs.len(), 1);
        assert!(logs[0].is_free_trial);
        assert_eq!(logs[0].http_status, 200);
        assert_eq!(logs[0].charged_amount, UsdAmount::ZERO);
    }

    #[tokio::test]
    async fn test_missing_or_unknown_key_is_unauthorized() {
        let service = seeded(3, 200).await;
        assert!(matches!(
            service.handle_call(None, "a-1", call()).await,
            Err(RouterError::Unauthorized)
        ));
        assert!(matches!(
            service.handle_call(Some("nope"), "a-1", call()).await,
            Err(RouterError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_unapproved_user_is_unauthorized() {
        let service = seeded(3, 200).await;
        service.store().seed_user(user(false)).await.unwrap();
        assert!(matches!(
            service.handle_call(Some("key-1"), "a-1", call()).await,
            Err(RouterError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_unknown_agent_is_not_found() {
        let service = seeded(3, 200).await;
        assert!(matches!(
            service.handle_call(Some("key-1"), "a-404", call()).await,
            Err(RouterError::AgentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_subscription_is_rejected() {
        let store = PaymentStore::in_memory();
        let endpoint = spawn_publisher(200).await;
        store.seed_user(user(true)).await.unwrap();
        store.seed_agent(agent(endpoint)).await.unwrap();
        let service = service_over(store, 0);
        assert!(matches!(
            service.handle_call(Some("key-1"), "a-1", call()).await,
            Err(RouterError::SubscriptionRequired)
        ));
    }

    #[tokio::test]
    async fn test_no_permits_after_trials_exhausted() {
        let service = seeded(0, 200).await;
        assert!(matches!(
            service.handle_call(Some("key-1"), "a-1", call()).await,
            Err(RouterError::NoValidPermits)
        ));
    }

    #[tokio::test]
    async fn test_exhausted_permit_is_insufficient() {
        let service = seeded(0, 200).await;
        let mut spent = permit("p-1", TokenSymbol::Usdc, 84_532, 10);
        spent.calls_used = 10;
        service.store().create_permit(spent).await.unwrap();
        assert!(matches!(
            service.handle_call(Some("key-1"), "a-1", call()).await,
            Err(RouterError::InsufficientPermitBalance)
        ));
    }

    #[tokio::test]
    async fn test_non_usdc_cross_chain_permit_is_unroutable() {
        // Agent pays out USDC on Base Sepolia; the only permit is PYUSD on
        // Ethereum. The gate fires before the publisher is called.
        let service = seeded(0, 200).await;
        service
            .store()
            .create_permit(permit("p-1", TokenSymbol::Pyusd, 1, 100))
            .await
            .unwrap();
        assert!(matches!(
            service.handle_call(Some("key-1"), "a-1", call()).await,
            Err(RouterError::UnsupportedRoute(_))
        ));
        assert!(service.store().call_logs_for_user("u-1").await.is_empty());
    }

    #[tokio::test]
    async fn test_publisher_failure_surfaces_and_preserves_trials() {
        let service = seeded(3, 500).await;
        let err = service
            .handle_call(Some("key-1"), "a-1", call())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::ApiCallFailed(_)));

        // The failed call consumed nothing but is still logged.
        let sub = service
            .store()
            .subscription_for("u-1", "a-1")
            .await
            .unwrap();
        assert_eq!(sub.free_trials_remaining, 3);
        assert_eq!(sub.free_trials_used, 0);
        let logs = service.store().call_logs_for_user("u-1").await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].http_status, 502);
    }

    #[tokio::test]
    async fn test_rate_limit_applies_per_key() {
        let store = PaymentStore::in_memory();
        let endpoint = spawn_publisher(200).await;
        store.seed_user(user(true)).await.unwrap();
        store.seed_agent(agent(endpoint)).await.unwrap();
        store.upsert_subscription(subscription(10)).await.unwrap();
        let service = service_over(store, 2);

        service.handle_call(Some("key-1"), "a-1", call()).await.unwrap();
        service.handle_call(Some("key-1"), "a-1", call()).await.unwrap();
        assert!(matches!(
            service.handle_call(Some("key-1"), "a-1", call()).await,
            Err(RouterError::RateLimited)
        ));
    }
}
