//! Static chain and token deployment metadata.
//!
//! The registry is the single source of truth for stablecoin contract
//! addresses, burn-mint (CCTP v2) contract addresses, destination-domain
//! ids, and RPC endpoints on each supported chain. It is built once at
//! startup and never mutated afterwards.
//!
//! Source for USDC deployments:
//! <https://developers.circle.com/stablecoins/usdc-contract-addresses>

use std::collections::HashMap;

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

use crate::model::TokenSymbol;

/// An EIP-155 chain ID (e.g., 8453 for Base, 84532 for Base Sepolia).
pub type ChainId = u64;

/// The canonical AllowanceVault contract.
///
/// Deployed via CREATE2 at the same address on every supported chain; batches
/// per-`(owner, token, spender)` allowances with `(amount, expiration, nonce)`.
pub const ALLOWANCE_VAULT_ADDRESS: Address = address!("0x000000000022D473030F116dDEE9F6B43aC78BA3");

// CCTP v2 contracts share one deployment address per environment.
const TOKEN_MESSENGER_MAINNET: Address = address!("0x28b5a0e9C621a5BadaA536219b3a228C8168cf5d");
const MESSAGE_TRANSMITTER_MAINNET: Address = address!("0x81D40F21F12A8F0E3252Bccb954D722d4c464B64");
const TOKEN_MESSENGER_TESTNET: Address = address!("0x8FE6B999Dc680CcFDD5Bf7EB0974218be2542DAA");
const MESSAGE_TRANSMITTER_TESTNET: Address = address!("0xE737e5cEBEEBa77EFE34D4aa090756590b1CE275");

/// Chain metadata for one supported EVM network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    /// EIP-155 chain ID.
    pub chain_id: ChainId,
    /// Human-readable network name.
    pub name: &'static str,
    /// Default HTTP RPC endpoint; overridable via `RPC_URL_{chainId}`.
    pub rpc_url: &'static str,
    /// Destination-domain id assigned by the attestation protocol
    /// (Ethereum = 0, Avalanche = 1, Arbitrum = 3, Base = 6).
    pub destination_domain: u32,
    /// TokenMessenger contract (burn side).
    pub token_messenger: Address,
    /// MessageTransmitter contract (mint side).
    pub message_transmitter: Address,
}

/// A stablecoin deployment on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDeployment {
    /// Token symbol.
    pub symbol: TokenSymbol,
    /// Chain the contract lives on.
    pub chain_id: ChainId,
    /// Contract address.
    pub address: Address,
    /// Decimal precision (6 for every supported stablecoin).
    pub decimals: u8,
}

/// The chain id requested is outside the configured set.
#[derive(Debug, thiserror::Error)]
#[error("unsupported chain id {0}")]
pub struct UnsupportedChainError(pub ChainId);

/// Well-known networks with their burn-mint contract deployments.
static CHAINS: &[ChainInfo] = &[
    ChainInfo {
        chain_id: 1,
        name: "ethereum",
        rpc_url: "https://ethereum-rpc.publicnode.com",
        destination_domain: 0,
        token_messenger: TOKEN_MESSENGER_MAINNET,
        message_transmitter: MESSAGE_TRANSMITTER_MAINNET,
    },
    ChainInfo {
        chain_id: 11_155_111,
        name: "ethereum-sepolia",
        rpc_url: "https://ethereum-sepolia-rpc.publicnode.com",
        destination_domain: 0,
        token_messenger: TOKEN_MESSENGER_TESTNET,
        message_transmitter: MESSAGE_TRANSMITTER_TESTNET,
    },
    ChainInfo {
        chain_id: 8453,
        name: "base",
        rpc_url: "https://mainnet.base.org",
        destination_domain: 6,
        token_messenger: TOKEN_MESSENGER_MAINNET,
        message_transmitter: MESSAGE_TRANSMITTER_MAINNET,
    },
    ChainInfo {
        chain_id: 84_532,
        name: "base-sepolia",
        rpc_url: "https://sepolia.base.org",
        destination_domain: 6,
        token_messenger: TOKEN_MESSENGER_TESTNET,
        message_transmitter: MESSAGE_TRANSMITTER_TESTNET,
    },
    ChainInfo {
        chain_id: 42_161,
        name: "arbitrum",
        rpc_url: "https://arb1.arbitrum.io/rpc",
        destination_domain: 3,
        token_messenger: TOKEN_MESSENGER_MAINNET,
        message_transmitter: MESSAGE_TRANSMITTER_MAINNET,
    },
    ChainInfo {
        chain_id: 43_113,
        name: "avalanche-fuji",
        rpc_url: "https://api.avax-test.network/ext/bc/C/rpc",
        destination_domain: 1,
        token_messenger: TOKEN_MESSENGER_TESTNET,
        message_transmitter: MESSAGE_TRANSMITTER_TESTNET,
    },
];

/// Well-known stablecoin deployments on the supported networks.
static TOKENS: &[TokenDeployment] = &[
    // Ethereum mainnet - native Circle USDC (FiatTokenV2.1)
    // Verify: https://etherscan.io/token/0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48
    TokenDeployment {
        symbol: TokenSymbol::Usdc,
        chain_id: 1,
        address: address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
        decimals: 6,
    },
    // Ethereum Sepolia - native Circle USDC testnet
    // Verify: https://sepolia.etherscan.io/address/0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238
    TokenDeployment {
        symbol: TokenSymbol::Usdc,
        chain_id: 11_155_111,
        address: address!("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"),
        decimals: 6,
    },
    // Base mainnet - native Circle USDC
    // Verify: https://basescan.org/token/0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913
    TokenDeployment {
        symbol: TokenSymbol::Usdc,
        chain_id: 8453,
        address: address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
        decimals: 6,
    },
    // Base Sepolia - native Circle USDC testnet
    // Verify: https://base-sepolia.blockscout.com/address/0x036CbD53842c5426634e7929541eC2318f3dCF7e
    TokenDeployment {
        symbol: TokenSymbol::Usdc,
        chain_id: 84_532,
        address: address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
        decimals: 6,
    },
    // Arbitrum One - native Circle USDC
    // Verify: https://arbiscan.io/token/0xaf88d065e77c8cC2239327C5EDb3A432268e5831
    TokenDeployment {
        symbol: TokenSymbol::Usdc,
        chain_id: 42_161,
        address: address!("0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
        decimals: 6,
    },
    // Avalanche Fuji - native Circle USDC testnet
    // Verify: https://testnet.snowtrace.io/token/0x5425890298aed601595a70ab815c96711a31bc65
    TokenDeployment {
        symbol: TokenSymbol::Usdc,
        chain_id: 43_113,
        address: address!("0x5425890298aed601595a70AB815c96711a31Bc65"),
        decimals: 6,
    },
    // Ethereum mainnet - PayPal USD
    // Verify: https://etherscan.io/token/0x6c3ea9036406852006290770bedfcaba0e23a0e8
    TokenDeployment {
        symbol: TokenSymbol::Pyusd,
        chain_id: 1,
        address: address!("0x6c3ea9036406852006290770BEdFcAbA0e23A0e8"),
        decimals: 6,
    },
    // Ethereum Sepolia - PayPal USD testnet
    // Verify: https://sepolia.etherscan.io/token/0xCaC524BcA292aaade2DF8A05cC58F0a65B1B3bB9
    TokenDeployment {
        symbol: TokenSymbol::Pyusd,
        chain_id: 11_155_111,
        address: address!("0xCaC524BcA292aaade2DF8A05cC58F0a65B1B3bB9"),
        decimals: 6,
    },
];

/// Registry of supported chains and token deployments.
///
/// Immutable after construction. Built from the static tables above with
/// optional per-deployment overrides (RPC endpoints, token addresses) applied
/// by the configuration layer at startup.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    rpc_overrides: HashMap<ChainId, String>,
    token_overrides: HashMap<(TokenSymbol, ChainId), Address>,
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainRegistry {
    /// Creates a registry over the built-in deployment tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rpc_overrides: HashMap::new(),
            token_overrides: HashMap::new(),
        }
    }

    /// Overrides the RPC endpoint for one chain.
    #[must_use]
    pub fn with_rpc_url(mut self, chain_id: ChainId, url: impl Into<String>) -> Self {
        self.rpc_overrides.insert(chain_id, url.into());
        self
    }

    /// Overrides a token contract address on one chain.
    #[must_use]
    pub fn with_token_address(
        mut self,
        symbol: TokenSymbol,
        chain_id: ChainId,
        address: Address,
    ) -> Self {
        self.token_overrides.insert((symbol, chain_id), address);
        self
    }

    /// Returns the metadata for a supported chain.
    pub fn chain(&self, chain_id: ChainId) -> Result<&'static ChainInfo, UnsupportedChainError> {
        CHAINS
            .iter()
            .find(|c| c.chain_id == chain_id)
            .ok_or(UnsupportedChainError(chain_id))
    }

    /// Returns every supported chain id.
    #[must_use]
    pub fn supported_chains(&self) -> Vec<ChainId> {
        CHAINS.iter().map(|c| c.chain_id).collect()
    }

    /// Whether the chain id is in the configured set.
    #[must_use]
    pub fn supports_chain(&self, chain_id: ChainId) -> bool {
        CHAINS.iter().any(|c| c.chain_id == chain_id)
    }

    /// Resolves a token symbol to its contract address on a chain.
    ///
    /// Returns `None` when the token has no deployment there.
    #[must_use]
    pub fn token_address(&self, symbol: TokenSymbol, chain_id: ChainId) -> Option<Address> {
        if let Some(addr) = self.token_overrides.get(&(symbol, chain_id)) {
            return Some(*addr);
        }
        TOKENS
            .iter()
            .find(|t| t.symbol == symbol && t.chain_id == chain_id)
            .map(|t| t.address)
    }

    /// The AllowanceVault address (constant across chains).
    #[must_use]
    pub const fn allowance_vault_address(&self) -> Address {
        ALLOWANCE_VAULT_ADDRESS
    }

    /// TokenMessenger contract for the burn leg of a cross-chain transfer.
    pub fn token_messenger(&self, chain_id: ChainId) -> Result<Address, UnsupportedChainError> {
        self.chain(chain_id).map(|c| c.token_messenger)
    }

    /// MessageTransmitter contract for the mint leg of a cross-chain transfer.
    pub fn message_transmitter(&self, chain_id: ChainId) -> Result<Address, UnsupportedChainError> {
        self.chain(chain_id).map(|c| c.message_transmitter)
    }

    /// Destination-domain id for a chain, `None` when the chain is unknown.
    #[must_use]
    pub fn destination_domain(&self, chain_id: ChainId) -> Option<u32> {
        self.chain(chain_id).ok().map(|c| c.destination_domain)
    }

    /// RPC endpoint for a chain, honoring configured overrides.
    pub fn rpc_url(&self, chain_id: ChainId) -> Result<String, UnsupportedChainError> {
        if let Some(url) = self.rpc_overrides.get(&chain_id) {
            return Ok(url.clone());
        }
        self.chain(chain_id).map(|c| c.rpc_url.to_owned())
    }

    /// Decimal precision of a supported stablecoin.
    #[must_use]
    pub const fn decimals(&self, _symbol: TokenSymbol) -> u8 {
        // Every supported stablecoin is 6-decimal; the symbol parameter keeps
        // the call sites honest should that change.
        6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_chains_resolve() {
        let registry = ChainRegistry::new();
        for chain_id in [1, 11_155_111, 8453, 84_532, 42_161, 43_113] {
            assert!(registry.chain(chain_id).is_ok(), "chain {chain_id}");
        }
    }

    #[test]
    fn test_unknown_chain_is_rejected() {
        let registry = ChainRegistry::new();
        let err = registry.chain(999_999).unwrap_err();
        assert_eq!(err.0, 999_999);
        assert!(registry.rpc_url(999_999).is_err());
        assert!(registry.token_messenger(999_999).is_err());
        assert!(registry.destination_domain(999_999).is_none());
    }

    #[test]
    fn test_destination_domains() {
        let registry = ChainRegistry::new();
        assert_eq!(registry.destination_domain(11_155_111), Some(0));
        assert_eq!(registry.destination_domain(84_532), Some(6));
        assert_eq!(registry.destination_domain(42_161), Some(3));
        assert_eq!(registry.destination_domain(43_113), Some(1));
    }

    #[test]
    fn test_usdc_on_every_chain() {
        let registry = ChainRegistry::new();
        for chain_id in registry.supported_chains() {
            assert!(
                registry.token_address(TokenSymbol::Usdc, chain_id).is_some(),
                "USDC missing on {chain_id}"
            );
        }
    }

    #[test]
    fn test_pyusd_only_on_ethereum() {
        let registry = ChainRegistry::new();
        assert!(registry.token_address(TokenSymbol::Pyusd, 1).is_some());
        assert!(
            registry
                .token_address(TokenSymbol::Pyusd, 11_155_111)
                .is_some()
        );
        assert!(registry.token_address(TokenSymbol::Pyusd, 84_532).is_none());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let custom = address!("0x00000000000000000000000000000000DeaDBeef");
        let registry = ChainRegistry::new()
            .with_rpc_url(84_532, "http://localhost:8545")
            .with_token_address(TokenSymbol::Usdc, 84_532, custom);
        assert_eq!(registry.rpc_url(84_532).unwrap(), "http://localhost:8545");
        assert_eq!(
            registry.token_address(TokenSymbol::Usdc, 84_532),
            Some(custom)
        );
        // Other chains keep the built-in values.
        assert_eq!(registry.rpc_url(8453).unwrap(), "https://mainnet.base.org");
    }

    #[test]
    fn test_vault_address_is_chain_independent() {
        let registry = ChainRegistry::new();
        assert_eq!(registry.allowance_vault_address(), ALLOWANCE_VAULT_ADDRESS);
    }
}
