//! On-chain engine for the paylane payment router.
//!
//! Everything that touches a chain or the attestation provider lives here:
//!
//! - [`client`] - per-chain RPC access with the admin signer and serialized
//!   admin writes
//! - [`contract`] - minimal ABI surface of the external contracts
//! - [`validator`] - balance and allowance checks ahead of settlement
//! - [`submitter`] - brings on-chain allowance state in sync with a freshly
//!   signed permit
//! - [`attestation`] - long-poll client for the burn attestation provider
//! - [`transfer`] - same-chain pulls and the cross-chain burn-and-mint
//!   state machine
//!
//! The engine orchestrates contract calls; it never mints or burns tokens
//! itself, and failed cross-chain transfers are recorded and surfaced, not
//! automatically reversed.

pub mod attestation;
pub mod client;
pub mod contract;
pub mod error;
pub mod submitter;
pub mod transfer;
pub mod validator;

pub use attestation::{AttestationBundle, AttestationClient, AttestationQuery};
pub use client::{ChainClient, ChainClients};
pub use error::EvmError;
pub use submitter::{PermitSubmitter, SubmitOutcome};
pub use transfer::{Route, TransferEngine, TransferOutcome, TransferRequest, TransferType};
pub use validator::{BalanceCheck, ChainValidator, TokenAllowanceCheck, VaultAllowanceCheck};
