//! Data model for permits, subscriptions, payments, and call logs.
//!
//! The store (`paylane-store`) owns every mutable entity here; nothing else
//! mutates them. Amounts come in two currencies that happen to share a scale:
//! token base units (6-decimal stablecoins, as [`alloy_primitives::U256`])
//! and USD fixed-point ([`UsdAmount`], micro-dollars). All supported tokens
//! are treated as 1-USD par, so the two convert 1:1 at the boundary.

use alloy_primitives::{Address, Bytes, Signature, TxHash, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::ChainId;
use crate::timestamp::UnixTimestamp;

/// A supported stablecoin symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenSymbol {
    /// Circle USD Coin. The only token the burn-mint protocol carries.
    #[serde(rename = "USDC")]
    Usdc,
    /// PayPal USD.
    #[serde(rename = "PYUSD")]
    Pyusd,
}

impl TokenSymbol {
    /// Whether this token can cross chains via burn-and-mint.
    #[must_use]
    pub const fn is_bridgeable(&self) -> bool {
        matches!(self, Self::Usdc)
    }
}

impl std::fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usdc => write!(f, "USDC"),
            Self::Pyusd => write!(f, "PYUSD"),
        }
    }
}

impl std::str::FromStr for TokenSymbol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USDC" => Ok(Self::Usdc),
            "PYUSD" => Ok(Self::Pyusd),
            other => Err(format!("unknown token symbol '{other}'")),
        }
    }
}

/// USD fixed-point amount in micro-dollars (6 decimal places).
///
/// Matches the base-unit scale of the supported stablecoins, so a per-call
/// price converts to token units without rescaling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, Hash,
)]
#[serde(transparent)]
pub struct UsdAmount(pub u64);

impl UsdAmount {
    /// Zero dollars.
    pub const ZERO: Self = Self(0);

    /// Builds an amount from whole micro-dollars.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Raw micro-dollar value.
    #[must_use]
    pub const fn micros(&self) -> u64 {
        self.0
    }

    /// The amount as token base units (1-USD par, 6 decimals both sides).
    #[must_use]
    pub fn as_token_units(&self) -> U256 {
        U256::from(self.0)
    }

    /// The amount as a floating-point dollar value, for response bodies only.
    #[must_use]
    pub fn as_dollars(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        {
            self.0 as f64 / 1_000_000.0
        }
    }

    /// Saturating multiply by a call count.
    #[must_use]
    pub const fn saturating_mul(self, calls: u64) -> Self {
        Self(self.0.saturating_mul(calls))
    }
}

impl std::fmt::Display for UsdAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:06}", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

/// A split `(r, s, v)` signature as stored and transported.
///
/// The on-chain concatenation order is `r || s || v` (65 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureParts {
    /// The `r` scalar.
    pub r: B256,
    /// The `s` scalar.
    pub s: B256,
    /// Recovery id, Ethereum-style (27 or 28).
    pub v: u8,
}

impl SignatureParts {
    /// Converts to an alloy [`Signature`] for recovery.
    ///
    /// Accepts both Ethereum-style (27/28) and raw (0/1) recovery ids.
    #[must_use]
    pub fn to_signature(&self) -> Signature {
        let parity = matches!(self.v, 1 | 28);
        Signature::new(
            U256::from_be_bytes(self.r.0),
            U256::from_be_bytes(self.s.0),
            parity,
        )
    }

    /// The 65-byte `r || s || v` concatenation submitted on-chain.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(self.r.as_slice());
        out.extend_from_slice(self.s.as_slice());
        out.push(if matches!(self.v, 1 | 28) { 28 } else { 27 });
        Bytes::from(out)
    }
}

impl From<Signature> for SignatureParts {
    fn from(sig: Signature) -> Self {
        Self {
            r: B256::from(sig.r()),
            s: B256::from(sig.s()),
            v: 27 + u8::from(sig.v()),
        }
    }
}

/// An EIP-2612 token permit signature authorizing the AllowanceVault to draw
/// from the user's balance. Carries its own deadline because the stablecoin
/// validates it independently of the vault's `sigDeadline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPermitSig {
    /// Signature over the stablecoin's EIP-2612 domain.
    #[serde(flatten)]
    pub sig: SignatureParts,
    /// EIP-2612 `deadline`.
    pub deadline: UnixTimestamp,
}

/// Lifecycle status of a permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermitStatus {
    /// Usable for metered calls.
    Active,
    /// Deadline passed; retained for audit.
    Expired,
    /// Superseded or explicitly revoked; retained for audit.
    Revoked,
}

/// An off-chain spending authorization signed by a user.
///
/// The amount is immutable after signing; revocation is a new permit of
/// amount zero, never a mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permit {
    /// Unique id.
    pub id: String,
    /// The account that signed the permit.
    pub user_address: Address,
    /// The agent whose subscription this permit funds, when bound to one.
    pub agent_id: Option<String>,
    /// Token symbol; resolves to a contract address through the registry.
    pub token: TokenSymbol,
    /// Source chain.
    pub chain_id: ChainId,
    /// The admin account authorized to pull funds.
    pub spender_address: Address,
    /// Authorized amount in token base units.
    pub amount: U256,
    /// AllowanceVault nonce for `(owner, token, spender)` at signing time.
    /// Must equal the on-chain nonce at submission time.
    pub nonce: u64,
    /// Vault `sigDeadline` and allowance `expiration`.
    pub deadline: UnixTimestamp,
    /// Signature over the AllowanceVault typed-data domain.
    pub signature: SignatureParts,
    /// Optional EIP-2612 signature approving the vault on the token itself.
    pub token_permit_sig: Option<TokenPermitSig>,
    /// Lifecycle status.
    pub status: PermitStatus,
    /// Local bookkeeping.
    pub created_at: DateTime<Utc>,
    /// Bookkeeping mirror of `deadline`, derived exactly from it at
    /// creation time and consulted by the store's expiry sweep.
    pub expires_at: DateTime<Utc>,
    /// `floor(amount_usd / cost_per_call)` at creation time.
    pub max_calls: u32,
    /// Calls settled against this permit. Incremented only after terminal
    /// transfer success; never exceeds `max_calls`.
    pub calls_used: u32,
    /// Per-call price this permit was sized for.
    pub cost_per_call: UsdAmount,
}

impl Permit {
    /// Number of calls this permit can still fund.
    #[must_use]
    pub const fn calls_remaining(&self) -> u32 {
        self.max_calls.saturating_sub(self.calls_used)
    }

    /// Remaining USD value: `(max_calls - calls_used) * cost_per_call`.
    #[must_use]
    pub const fn remaining_value(&self) -> UsdAmount {
        self.cost_per_call
            .saturating_mul(self.calls_remaining() as u64)
    }

    /// Derives `max_calls` from the signed amount and a per-call price.
    ///
    /// Token base units and micro-dollars share a scale, so this is plain
    /// floor division. Zero-price agents get no cap from the amount.
    #[must_use]
    pub fn max_calls_for(amount: U256, cost_per_call: UsdAmount) -> u32 {
        if cost_per_call.micros() == 0 {
            return u32::MAX;
        }
        let calls = amount / U256::from(cost_per_call.micros());
        u32::try_from(calls).unwrap_or(u32::MAX)
    }
}

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Calls are admitted.
    Active,
    /// Calls are rejected with `SubscriptionRequired`.
    Cancelled,
}

/// A user's subscription to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique id.
    pub id: String,
    /// Subscribing user.
    pub user_id: String,
    /// Target agent.
    pub agent_id: String,
    /// Status.
    pub status: SubscriptionStatus,
    /// Free-trial calls left. Decrementing one and counting a paid call are
    /// mutually exclusive per call.
    pub free_trials_remaining: u32,
    /// Free-trial calls consumed.
    pub free_trials_used: u32,
    /// Paid calls settled.
    pub total_paid_calls: u64,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
    /// Last counter update.
    pub updated_at: DateTime<Utc>,
}

/// Payout preferences declared by an agent's publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPreferences {
    /// Token the publisher wants to receive.
    pub payout_token: TokenSymbol,
    /// Chain the publisher wants funds on.
    pub payout_chain_id: ChainId,
}

/// A metered API agent. External and read-only from the router's view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Price per metered call.
    pub price_per_call: UsdAmount,
    /// Where the publisher wants funds.
    pub payment_preferences: PaymentPreferences,
    /// Publisher's payout wallet.
    pub publisher_wallet_address: Address,
    /// Upstream API endpoint the router forwards to.
    pub api_endpoint: String,
    /// Bearer token for the upstream endpoint.
    pub publisher_api_key: String,
    /// Free-trial calls granted to each new subscription.
    pub free_trial_tries: u32,
}

/// A marketplace user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique id.
    pub id: String,
    /// Opaque bearer token for router authentication.
    pub api_key: String,
    /// On-chain account that signs permits.
    pub wallet_address: Address,
    /// Unapproved users are rejected at the door.
    pub is_approved: bool,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

/// Attestation lifecycle of a cross-chain payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationStatus {
    /// Burned; waiting for the attestation provider.
    Pending,
    /// Redeemed on the target chain.
    Complete,
    /// Terminal failure; retained for reconciliation.
    Failed,
}

/// A burn-and-mint transfer in flight or settled.
///
/// Written after the burn and before the attestation wait, so a crash
/// between burn and redeem leaves a recoverable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossChainPayment {
    /// Unique id.
    pub id: String,
    /// Paying user.
    pub user_id: String,
    /// Funded agent.
    pub agent_id: String,
    /// Burn chain.
    pub source_chain_id: ChainId,
    /// Mint chain.
    pub target_chain_id: ChainId,
    /// Transfer amount in token base units.
    pub amount: U256,
    /// Token carried (always USDC today; the gate enforces it).
    pub token: TokenSymbol,
    /// `keccak256` of the burn message; the attestation key.
    pub message_hash: B256,
    /// Burn transaction.
    pub source_transaction_hash: TxHash,
    /// Mint transaction, once redeemed.
    pub target_transaction_hash: Option<TxHash>,
    /// Attestation lifecycle.
    pub attestation_status: AttestationStatus,
    /// Permit that funded the transfer.
    pub permit_id: String,
    /// Created at burn time.
    pub created_at: DateTime<Utc>,
    /// Set when the mint lands.
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal error detail, if any.
    pub error_message: Option<String>,
}

/// Settlement status of a per-call payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Funds delivered to the publisher.
    Completed,
    /// Cross-chain; burned but not yet redeemed.
    PendingAttestation,
    /// Transfer failed after the API call succeeded.
    Failed,
}

/// Per-call payment receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Unique id.
    pub id: String,
    /// Paying user.
    pub user_id: String,
    /// Funded agent.
    pub agent_id: String,
    /// Charged amount.
    pub amount: UsdAmount,
    /// Token pulled.
    pub token: TokenSymbol,
    /// Source chain of the pull.
    pub chain_id: ChainId,
    /// Settlement transaction (pull or mint), when known.
    pub transaction_hash: Option<TxHash>,
    /// Settlement status.
    pub status: PaymentStatus,
    /// The metered call this payment settles. Idempotency key: at most one
    /// payment exists per call id.
    pub api_call_id: String,
    /// Burn message hash for cross-chain settlements.
    pub message_hash: Option<B256>,
    /// Link to the cross-chain payment record, when routed across chains.
    pub cross_chain_payment_id: Option<String>,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

/// Log entry for one metered API call, written unconditionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallLog {
    /// Unique id.
    pub id: String,
    /// Calling user.
    pub user_id: String,
    /// Target agent.
    pub agent_id: String,
    /// When the router accepted the request.
    pub request_timestamp: DateTime<Utc>,
    /// When the publisher responded (or errored).
    pub response_timestamp: DateTime<Utc>,
    /// Publisher HTTP status (gateway status on network failure).
    pub http_status: u16,
    /// Publisher round-trip in milliseconds.
    pub response_time_ms: u64,
    /// Whether the call consumed a free trial.
    pub is_free_trial: bool,
    /// Amount charged (zero for free trials and failures).
    pub charged_amount: UsdAmount,
    /// Payment record, when settlement produced one.
    pub payment_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permit_with(max_calls: u32, calls_used: u32, cost: u64) -> Permit {
        Permit {
            id: "p-1".into(),
            user_address: Address::ZERO,
            agent_id: None,
            token: TokenSymbol::Usdc,
            chain_id: 84_532,
            spender_address: Address::ZERO,
            amount: U256::from(10_000_000u64),
            nonce: 0,
            deadline: UnixTimestamp::from_secs(2_000_000_000),
            signature: SignatureParts {
                r: B256::ZERO,
                s: B256::ZERO,
                v: 27,
            },
            token_permit_sig: None,
            status: PermitStatus::Active,
            created_at: Utc::now(),
            expires_at: Utc::now(),
            max_calls,
            calls_used,
            cost_per_call: UsdAmount::from_micros(cost),
        }
    }

    #[test]
    fn test_max_calls_floor_division() {
        // 10 USDC at 0.10 USD per call -> 100 calls.
        assert_eq!(
            Permit::max_calls_for(U256::from(10_000_000u64), UsdAmount::from_micros(100_000)),
            100
        );
        // 0.15 USD amount at 0.10 -> 1 call, remainder dropped.
        assert_eq!(
            Permit::max_calls_for(U256::from(150_000u64), UsdAmount::from_micros(100_000)),
            1
        );
        assert_eq!(
            Permit::max_calls_for(U256::from(99_999u64), UsdAmount::from_micros(100_000)),
            0
        );
    }

    #[test]
    fn test_remaining_value() {
        let permit = permit_with(100, 40, 100_000);
        assert_eq!(permit.calls_remaining(), 60);
        assert_eq!(permit.remaining_value(), UsdAmount::from_micros(6_000_000));
    }

    #[test]
    fn test_exhausted_permit_has_zero_remaining() {
        let permit = permit_with(10, 10, 100_000);
        assert_eq!(permit.calls_remaining(), 0);
        assert_eq!(permit.remaining_value(), UsdAmount::ZERO);
    }

    #[test]
    fn test_signature_parts_roundtrip_through_bytes() {
        let parts = SignatureParts {
            r: B256::repeat_byte(0x11),
            s: B256::repeat_byte(0x22),
            v: 28,
        };
        let bytes = parts.to_bytes();
        assert_eq!(bytes.len(), 65);
        assert_eq!(&bytes[..32], B256::repeat_byte(0x11).as_slice());
        assert_eq!(&bytes[32..64], B256::repeat_byte(0x22).as_slice());
        assert_eq!(bytes[64], 28);
    }

    #[test]
    fn test_signature_parts_accepts_raw_parity() {
        let raw = SignatureParts {
            r: B256::repeat_byte(0x01),
            s: B256::repeat_byte(0x02),
            v: 1,
        };
        let eth = SignatureParts { v: 28, ..raw };
        assert_eq!(raw.to_signature(), eth.to_signature());
        assert_eq!(raw.to_bytes()[64], 28);
    }

    #[test]
    fn test_usd_amount_display() {
        assert_eq!(UsdAmount::from_micros(100_000).to_string(), "0.100000");
        assert_eq!(UsdAmount::from_micros(1_250_000).to_string(), "1.250000");
    }

    #[test]
    fn test_token_symbol_serde_uses_ticker() {
        assert_eq!(
            serde_json::to_string(&TokenSymbol::Usdc).unwrap(),
            "\"USDC\""
        );
        let parsed: TokenSymbol = serde_json::from_str("\"PYUSD\"").unwrap();
        assert_eq!(parsed, TokenSymbol::Pyusd);
    }

    #[test]
    fn test_only_usdc_is_bridgeable() {
        assert!(TokenSymbol::Usdc.is_bridgeable());
        assert!(!TokenSymbol::Pyusd.is_bridgeable());
    }
}
