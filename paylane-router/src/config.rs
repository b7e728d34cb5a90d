//! Environment-driven configuration.
//!
//! # Environment Variables
//!
//! - `ADMIN_PKEY` - hex private key for the admin account, 32 bytes with or
//!   without `0x` prefix (required)
//! - `ADMIN_ADDRESS` - expected admin address; enforced to match the key at
//!   startup
//! - `ATTESTATION_API_URL` - attestation provider base URL
//!   (default `https://iris-api-sandbox.circle.com`)
//! - `RPC_URL_{chainId}` - RPC endpoint override per supported chain
//!   (e.g. `RPC_URL_84532`)
//! - `TOKEN_ADDRESS_{SYMBOL}_{chainId}` - token contract override
//!   (e.g. `TOKEN_ADDRESS_USDC_84532`)
//! - `STORE_PATH` - datastore file (default `paylane-store.json`)
//! - `PORT` - listen port (default `8402`)
//! - `TRANSFER_TYPE` - `fast` or `standard` burn finality (default
//!   `standard`)
//! - `PUBLISHER_TIMEOUT_SECS`, `RECEIPT_TIMEOUT_SECS`,
//!   `ATTESTATION_MAX_WAIT_SECS` - timeout knobs
//! - `RATE_LIMIT_PER_MINUTE` - per-user request budget (default `60`)

use std::path::PathBuf;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use url::Url;

use paylane::model::TokenSymbol;
use paylane::registry::ChainRegistry;
use paylane_evm::TransferType;

/// Default attestation provider.
const DEFAULT_ATTESTATION_API_URL: &str = "https://iris-api-sandbox.circle.com";

/// Startup configuration problems. All fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is absent.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    /// A variable holds an unparseable value.
    #[error("invalid {name}: {message}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Parse failure detail.
        message: String,
    },
    /// `ADMIN_ADDRESS` does not match the address derived from `ADMIN_PKEY`.
    #[error("ADMIN_ADDRESS {declared} does not match key-derived address {derived}")]
    AdminAddressMismatch {
        /// The declared address.
        declared: Address,
        /// The address derived from the key.
        derived: Address,
    },
}

/// Fully resolved router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Listen port.
    pub port: u16,
    /// Admin signer; pays gas and is the spender in every permit.
    pub admin_signer: PrivateKeySigner,
    /// Address derived from the admin key.
    pub admin_address: Address,
    /// Attestation provider base URL.
    pub attestation_api_url: Url,
    /// Datastore path; `None` keeps state in memory.
    pub store_path: Option<PathBuf>,
    /// Chain registry with env overrides applied.
    pub registry: ChainRegistry,
    /// Publisher HTTP forward timeout.
    pub publisher_timeout: Duration,
    /// Receipt wait bound for admin transactions.
    pub receipt_timeout: Duration,
    /// Total attestation polling budget.
    pub attestation_max_wait: Duration,
    /// Burn finality preference.
    pub transfer_type: TransferType,
    /// Per-user request budget per minute.
    pub rate_limit_per_minute: u32,
}

impl RouterConfig {
    /// Loads and validates configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let admin_signer = parse_admin_key()?;
        let admin_address = admin_signer.address();

        if let Ok(declared) = std::env::var("ADMIN_ADDRESS") {
            let declared: Address = declared.trim().parse().map_err(|e| ConfigError::Invalid {
                name: "ADMIN_ADDRESS",
                message: format!("{e}"),
            })?;
            if declared != admin_address {
                return Err(ConfigError::AdminAddressMismatch {
                    declared,
                    derived: admin_address,
                });
            }
        }

        let attestation_api_url = std::env::var("ATTESTATION_API_URL")
            .unwrap_or_else(|_| DEFAULT_ATTESTATION_API_URL.to_owned());
        let attestation_api_url: Url =
            attestation_api_url.parse().map_err(|e| ConfigError::Invalid {
                name: "ATTESTATION_API_URL",
                message: format!("{e}"),
            })?;

        let registry = registry_from_env()?;

        let transfer_type = match std::env::var("TRANSFER_TYPE").as_deref() {
            Ok("fast") => TransferType::Fast,
            Ok("standard") | Err(_) => TransferType::Standard,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    name: "TRANSFER_TYPE",
                    message: format!("expected 'fast' or 'standard', got '{other}'"),
                })
            }
        };

        Ok(Self {
            port: parse_or("PORT", 8402)?,
            admin_signer,
            admin_address,
            attestation_api_url,
            store_path: Some(
                std::env::var("STORE_PATH")
                    .unwrap_or_else(|_| "paylane-store.json".to_owned())
                    .into(),
            ),
            registry,
            publisher_timeout: Duration::from_secs(parse_or("PUBLISHER_TIMEOUT_SECS", 13)?),
            receipt_timeout: Duration::from_secs(parse_or("RECEIPT_TIMEOUT_SECS", 120)?),
            attestation_max_wait: Duration::from_secs(parse_or(
                "ATTESTATION_MAX_WAIT_SECS",
                20 * 60,
            )?),
            transfer_type,
            rate_limit_per_minute: parse_or("RATE_LIMIT_PER_MINUTE", 60)?,
        })
    }
}

fn parse_admin_key() -> Result<PrivateKeySigner, ConfigError> {
    let raw = std::env::var("ADMIN_PKEY").map_err(|_| ConfigError::Missing("ADMIN_PKEY"))?;
    raw.trim()
        .parse::<PrivateKeySigner>()
        .map_err(|e| ConfigError::Invalid {
            name: "ADMIN_PKEY",
            message: format!("{e}"),
        })
}

/// Builds the registry, applying `RPC_URL_*` and `TOKEN_ADDRESS_*` overrides.
fn registry_from_env() -> Result<ChainRegistry, ConfigError> {
    let mut registry = ChainRegistry::new();
    for chain_id in registry.supported_chains() {
        if let Ok(url) = std::env::var(format!("RPC_URL_{chain_id}")) {
            registry = registry.with_rpc_url(chain_id, url);
        }
        for symbol in [TokenSymbol::Usdc, TokenSymbol::Pyusd] {
            if let Ok(raw) = std::env::var(format!("TOKEN_ADDRESS_{symbol}_{chain_id}")) {
                let address: Address = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                    name: "TOKEN_ADDRESS override",
                    message: format!("{symbol} on {chain_id}: {e}"),
                })?;
                registry = registry.with_token_address(symbol, chain_id, address);
            }
        }
    }
    Ok(registry)
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            message: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}
