//! On-chain balance and allowance checks ahead of settlement.
//!
//! Each check returns a structured result rather than an exception: a short
//! balance is a *negative result*, not an error. Only unrecoverable RPC
//! failures surface as [`EvmError::Validation`].

use std::sync::Arc;

use alloy_primitives::{Address, U256};

use paylane::model::TokenSymbol;
use paylane::registry::ChainRegistry;
use paylane::UnixTimestamp;

use crate::client::ChainClient;
use crate::contract::{IAllowanceVault, IStablecoin};
use crate::error::EvmError;

/// Result of a token balance check.
#[derive(Debug, Clone, Copy)]
pub struct BalanceCheck {
    /// On-chain balance.
    pub balance: U256,
    /// Amount the call needs.
    pub required: U256,
}

impl BalanceCheck {
    /// `balance >= required`, inclusive.
    #[must_use]
    pub fn sufficient(&self) -> bool {
        self.balance >= self.required
    }
}

/// Result of a token-to-vault allowance check.
#[derive(Debug, Clone, Copy)]
pub struct TokenAllowanceCheck {
    /// ERC-20 allowance toward the vault.
    pub allowance: U256,
    /// Amount the call needs.
    pub required: U256,
}

impl TokenAllowanceCheck {
    /// Whether the vault can already draw the required amount.
    #[must_use]
    pub fn sufficient(&self) -> bool {
        self.allowance >= self.required
    }
}

/// Result of a vault-to-admin allowance check.
#[derive(Debug, Clone, Copy)]
pub struct VaultAllowanceCheck {
    /// Granted amount.
    pub amount: U256,
    /// Allowance expiration, Unix seconds.
    pub expiration: u64,
    /// Current vault nonce for `(owner, token, spender)`.
    pub nonce: u64,
    /// Amount the call needs.
    pub required: U256,
}

impl VaultAllowanceCheck {
    /// Valid iff the amount covers the requirement and the expiration lies
    /// strictly in the future (`expiration == now` is expired).
    #[must_use]
    pub fn valid_at(&self, now: UnixTimestamp) -> bool {
        self.amount >= self.required && self.expiration > now.as_secs()
    }
}

/// Reads chain state needed to admit a metered call.
#[derive(Debug, Clone)]
pub struct ChainValidator {
    registry: Arc<ChainRegistry>,
}

impl ChainValidator {
    /// Creates a validator over the shared registry.
    #[must_use]
    pub fn new(registry: Arc<ChainRegistry>) -> Self {
        Self { registry }
    }

    fn token_address(
        &self,
        token: TokenSymbol,
        client: &ChainClient,
    ) -> Result<Address, EvmError> {
        self.registry
            .token_address(token, client.chain_id())
            .ok_or(EvmError::TokenNotDeployed {
                token,
                chain_id: client.chain_id(),
            })
    }

    /// Reads `balanceOf(user)` on the token contract.
    pub async fn check_balance(
        &self,
        client: &ChainClient,
        token: TokenSymbol,
        user: Address,
        required: U256,
    ) -> Result<BalanceCheck, EvmError> {
        let token_addr = self.token_address(token, client)?;
        let contract = IStablecoin::new(token_addr, client.provider());
        let balance = contract.balanceOf(user).call().await?;
        Ok(BalanceCheck { balance, required })
    }

    /// Reads the ERC-20 allowance the user granted the vault.
    pub async fn check_token_allowance(
        &self,
        client: &ChainClient,
        token: TokenSymbol,
        user: Address,
        required: U256,
    ) -> Result<TokenAllowanceCheck, EvmError> {
        let token_addr = self.token_address(token, client)?;
        let vault = self.registry.allowance_vault_address();
        let contract = IStablecoin::new(token_addr, client.provider());
        let allowance = contract.allowance(user, vault).call().await?;
        Ok(TokenAllowanceCheck {
            allowance,
            required,
        })
    }

    /// Reads the vault's `(amount, expiration, nonce)` for
    /// `(user, token, spender)`.
    pub async fn check_vault_allowance(
        &self,
        client: &ChainClient,
        token: TokenSymbol,
        user: Address,
        spender: Address,
        required: U256,
    ) -> Result<VaultAllowanceCheck, EvmError> {
        let token_addr = self.token_address(token, client)?;
        let vault = IAllowanceVault::new(self.registry.allowance_vault_address(), client.provider());
        let allowance = vault.allowance(user, token_addr, spender).call().await?;
        Ok(VaultAllowanceCheck {
            amount: U256::from(allowance.amount),
            expiration: allowance.expiration.to::<u64>(),
            nonce: allowance.nonce.to::<u64>(),
            required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_boundary_is_inclusive() {
        let exact = BalanceCheck {
            balance: U256::from(100_000u64),
            required: U256::from(100_000u64),
        };
        assert!(exact.sufficient());
        let short = BalanceCheck {
            balance: U256::from(99_999u64),
            required: U256::from(100_000u64),
        };
        assert!(!short.sufficient());
    }

    #[test]
    fn test_vault_expiration_boundary_is_strict() {
        let now = UnixTimestamp::from_secs(1_000);
        let base = VaultAllowanceCheck {
            amount: U256::from(1_000_000u64),
            expiration: 1_000,
            nonce: 0,
            required: U256::from(100_000u64),
        };
        assert!(!base.valid_at(now), "expiration == now is expired");
        let later = VaultAllowanceCheck {
            expiration: 1_001,
            ..base
        };
        assert!(later.valid_at(now));
    }

    #[test]
    fn test_vault_amount_must_cover_required() {
        let now = UnixTimestamp::from_secs(0);
        let short = VaultAllowanceCheck {
            amount: U256::from(50_000u64),
            expiration: 10,
            nonce: 0,
            required: U256::from(100_000u64),
        };
        assert!(!short.valid_at(now));
    }
}
