//! Core types for the paylane gasless stablecoin payment router.
//!
//! End users subscribe to metered API agents by signing off-chain spending
//! authorizations (permits) over stablecoin contracts. The marketplace admin
//! submits those permits on-chain, pulls funds at per-call granularity, and
//! routes stablecoin across chains via burn-and-mint when the publisher wants
//! payout elsewhere. Consumers never pay gas; the admin does and is reimbursed
//! out of the metered flow.
//!
//! This crate is the I/O-free core shared by the on-chain engine
//! (`paylane-evm`), the datastore (`paylane-store`), and the HTTP service
//! (`paylane-router`):
//!
//! - [`registry`] - static chain, token, and burn-mint contract metadata
//! - [`codec`] - EIP-712 typed-data schemas for both permit flavors
//! - [`model`] - permits, subscriptions, payments, call logs
//! - [`selector`] - best-permit selection for a metered call
//! - [`timestamp`] - Unix-seconds timestamps used in permit deadlines

pub mod codec;
pub mod model;
pub mod registry;
pub mod selector;
pub mod timestamp;

pub use model::{
    Agent, ApiCallLog, AttestationStatus, CrossChainPayment, Payment, PaymentPreferences,
    PaymentStatus, Permit, PermitStatus, SignatureParts, Subscription, SubscriptionStatus,
    TokenPermitSig, TokenSymbol, UsdAmount, User,
};
pub use registry::{ChainId, ChainRegistry, UnsupportedChainError, ALLOWANCE_VAULT_ADDRESS};
pub use selector::select_permit;
pub use timestamp::UnixTimestamp;
