//! EIP-712 typed-data schemas for both permit flavors.
//!
//! Two distinct schemas share this codec surface:
//!
//! - **Token permit** (EIP-2612): the stablecoin's built-in signed approval,
//!   used here only to let the AllowanceVault draw from the user. Domain
//!   `name`/`version` depend on the `(token, chain)` pair - signing with the
//!   wrong version yields unrecoverable signatures, so the mapping lives in
//!   one place ([`token_domain_params`]) and is covered by round-trip tests.
//! - **Vault permit** (`PermitSingle`): the AllowanceVault's batched
//!   allowance grant with `(amount, expiration, nonce)` details.
//!
//! Signatures are stored as split `(r, s, v)` parts; the digest helpers here
//! pair with [`recover_signer`] to validate submissions before anything is
//! sent on-chain.

use alloy_primitives::aliases::{U160, U48};
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{eip712_domain, sol, Eip712Domain, SolStruct};

use crate::model::{SignatureParts, TokenSymbol};
use crate::registry::ChainId;

sol! {
    /// EIP-2612 `Permit` message as defined by the stablecoin contracts.
    ///
    /// Type hash:
    /// `Permit(address owner,address spender,uint256 value,uint256 nonce,uint256 deadline)`
    #[derive(Debug)]
    struct Permit {
        address owner;
        address spender;
        uint256 value;
        uint256 nonce;
        uint256 deadline;
    }

    /// Allowance details inside a vault permit.
    #[derive(Debug)]
    struct PermitDetails {
        address token;
        uint160 amount;
        uint48 expiration;
        uint48 nonce;
    }

    /// AllowanceVault `PermitSingle` message.
    ///
    /// Type hash:
    /// `PermitSingle(PermitDetails details,address spender,uint256 sigDeadline)PermitDetails(address token,uint160 amount,uint48 expiration,uint48 nonce)`
    #[derive(Debug)]
    struct PermitSingle {
        PermitDetails details;
        address spender;
        uint256 sigDeadline;
    }
}

/// Signature did not recover to the expected signer, or was malformed.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The `(r, s, v)` parts do not form a recoverable signature.
    #[error("malformed signature: {0}")]
    MalformedSignature(#[from] alloy_primitives::SignatureError),
    /// Recovered signer differs from the claimed owner.
    #[error("signature recovers to {recovered}, expected {expected}")]
    SignerMismatch {
        /// Address the signature actually recovers to.
        recovered: Address,
        /// Address the permit claims as owner.
        expected: Address,
    },
}

/// EIP-712 domain `(name, version)` for a stablecoin's EIP-2612 permit.
///
/// The recognized pairs: USDC on Ethereum Sepolia signs as
/// `("USD Coin", "2")`, USDC elsewhere as `("USD Coin", "1")`, PYUSD as
/// `("PayPal USD", "1")`. Anything else falls back to `("USD Coin", "1")`.
#[must_use]
pub fn token_domain_params(token: TokenSymbol, chain_id: ChainId) -> (&'static str, &'static str) {
    match (token, chain_id) {
        (TokenSymbol::Usdc, 11_155_111) => ("USD Coin", "2"),
        (TokenSymbol::Pyusd, _) => ("PayPal USD", "1"),
        _ => ("USD Coin", "1"),
    }
}

/// Builds the EIP-2612 domain for a stablecoin contract.
#[must_use]
pub fn token_permit_domain(
    token: TokenSymbol,
    chain_id: ChainId,
    verifying_contract: Address,
) -> Eip712Domain {
    let (name, version) = token_domain_params(token, chain_id);
    eip712_domain! {
        name: name,
        version: version,
        chain_id: chain_id,
        verifying_contract: verifying_contract,
    }
}

/// Builds the AllowanceVault domain for a chain.
#[must_use]
pub fn vault_domain(chain_id: ChainId, verifying_contract: Address) -> Eip712Domain {
    eip712_domain! {
        name: "Permit2",
        version: "1",
        chain_id: chain_id,
        verifying_contract: verifying_contract,
    }
}

/// Signing digest for an EIP-2612 token permit.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn token_permit_digest(
    token: TokenSymbol,
    chain_id: ChainId,
    token_contract: Address,
    owner: Address,
    spender: Address,
    value: U256,
    nonce: U256,
    deadline: u64,
) -> B256 {
    let domain = token_permit_domain(token, chain_id, token_contract);
    let message = Permit {
        owner,
        spender,
        value,
        nonce,
        deadline: U256::from(deadline),
    };
    message.eip712_signing_hash(&domain)
}

/// Builds the `PermitSingle` message for a vault permit.
///
/// The permit's single `deadline` doubles as the allowance `expiration` and
/// the signature's `sigDeadline`. Amounts above `uint160::MAX` are clamped
/// to the on-chain field width.
#[must_use]
pub fn vault_permit_single(
    token_contract: Address,
    amount: U256,
    deadline: u64,
    nonce: u64,
    spender: Address,
) -> PermitSingle {
    PermitSingle {
        details: PermitDetails {
            token: token_contract,
            amount: U160::saturating_from(amount),
            expiration: U48::saturating_from(deadline),
            nonce: U48::saturating_from(nonce),
        },
        spender,
        sigDeadline: U256::from(deadline),
    }
}

/// Signing digest for a vault permit.
#[must_use]
pub fn vault_permit_digest(
    chain_id: ChainId,
    vault: Address,
    message: &PermitSingle,
) -> B256 {
    message.eip712_signing_hash(&vault_domain(chain_id, vault))
}

/// Recovers the signer address from a digest and split signature.
pub fn recover_signer(digest: B256, sig: &SignatureParts) -> Result<Address, CodecError> {
    Ok(sig.to_signature().recover_address_from_prehash(&digest)?)
}

/// Recovers and checks the signer against the claimed owner.
pub fn verify_signer(
    digest: B256,
    sig: &SignatureParts,
    expected: Address,
) -> Result<(), CodecError> {
    let recovered = recover_signer(digest, sig)?;
    if recovered == expected {
        Ok(())
    } else {
        Err(CodecError::SignerMismatch {
            recovered,
            expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    use super::*;
    use crate::registry::{ChainRegistry, ALLOWANCE_VAULT_ADDRESS};

    fn signer() -> PrivateKeySigner {
        // Deterministic test key.
        "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_domain_params_disambiguate_versions() {
        assert_eq!(
            token_domain_params(TokenSymbol::Usdc, 11_155_111),
            ("USD Coin", "2")
        );
        assert_eq!(
            token_domain_params(TokenSymbol::Usdc, 84_532),
            ("USD Coin", "1")
        );
        assert_eq!(
            token_domain_params(TokenSymbol::Usdc, 1),
            ("USD Coin", "1")
        );
        assert_eq!(
            token_domain_params(TokenSymbol::Pyusd, 1),
            ("PayPal USD", "1")
        );
        assert_eq!(
            token_domain_params(TokenSymbol::Pyusd, 11_155_111),
            ("PayPal USD", "1")
        );
    }

    #[test]
    fn test_token_permit_sign_recover_all_recognized_pairs() {
        let registry = ChainRegistry::new();
        let signer = signer();
        let spender = address!("0x00000000000000000000000000000000000000aa");
        let pairs = [
            (TokenSymbol::Usdc, 1u64),
            (TokenSymbol::Usdc, 11_155_111),
            (TokenSymbol::Usdc, 8453),
            (TokenSymbol::Usdc, 84_532),
            (TokenSymbol::Usdc, 42_161),
            (TokenSymbol::Usdc, 43_113),
            (TokenSymbol::Pyusd, 1),
            (TokenSymbol::Pyusd, 11_155_111),
        ];
        for (token, chain_id) in pairs {
            let contract = registry.token_address(token, chain_id).unwrap();
            let digest = token_permit_digest(
                token,
                chain_id,
                contract,
                signer.address(),
                spender,
                U256::MAX,
                U256::ZERO,
                2_000_000_000,
            );
            let sig = signer.sign_hash_sync(&digest).unwrap();
            let parts = SignatureParts::from(sig);
            let recovered = recover_signer(digest, &parts).unwrap();
            assert_eq!(recovered, signer.address(), "{token} on {chain_id}");
        }
    }

    #[test]
    fn test_vault_permit_sign_recover_all_chains() {
        let registry = ChainRegistry::new();
        let signer = signer();
        let admin = address!("0x00000000000000000000000000000000000000aa");
        for chain_id in registry.supported_chains() {
            let token = registry.token_address(TokenSymbol::Usdc, chain_id).unwrap();
            let message =
                vault_permit_single(token, U256::from(10_000_000u64), 2_000_000_000, 0, admin);
            let digest = vault_permit_digest(chain_id, ALLOWANCE_VAULT_ADDRESS, &message);
            let sig = signer.sign_hash_sync(&digest).unwrap();
            let parts = SignatureParts::from(sig);
            assert_eq!(
                recover_signer(digest, &parts).unwrap(),
                signer.address(),
                "chain {chain_id}"
            );
        }
    }

    #[test]
    fn test_verify_signer_rejects_wrong_owner() {
        let signer = signer();
        let other = address!("0x00000000000000000000000000000000000000bb");
        let message = vault_permit_single(
            address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
            U256::from(1_000_000u64),
            2_000_000_000,
            3,
            other,
        );
        let digest = vault_permit_digest(84_532, ALLOWANCE_VAULT_ADDRESS, &message);
        let sig = signer.sign_hash_sync(&digest).unwrap();
        let parts = SignatureParts::from(sig);
        assert!(verify_signer(digest, &parts, signer.address()).is_ok());
        let err = verify_signer(digest, &parts, other).unwrap_err();
        assert!(matches!(err, CodecError::SignerMismatch { .. }));
    }

    #[test]
    fn test_digest_differs_per_chain() {
        let token = address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e");
        let admin = address!("0x00000000000000000000000000000000000000aa");
        let message = vault_permit_single(token, U256::from(1u64), 2_000_000_000, 0, admin);
        let base = vault_permit_digest(84_532, ALLOWANCE_VAULT_ADDRESS, &message);
        let sepolia = vault_permit_digest(11_155_111, ALLOWANCE_VAULT_ADDRESS, &message);
        assert_ne!(base, sepolia);
    }

    #[test]
    fn test_wrong_version_breaks_recovery_pairing() {
        // A signature produced over version "1" must not verify against the
        // version "2" domain of the same contract.
        let signer = signer();
        let contract = address!("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238");
        let message = Permit {
            owner: signer.address(),
            spender: Address::ZERO,
            value: U256::from(5u64),
            nonce: U256::ZERO,
            deadline: U256::from(2_000_000_000u64),
        };
        let v1 = eip712_domain! {
            name: "USD Coin",
            version: "1",
            chain_id: 11_155_111,
            verifying_contract: contract,
        };
        let v2 = eip712_domain! {
            name: "USD Coin",
            version: "2",
            chain_id: 11_155_111,
            verifying_contract: contract,
        };
        let sig = signer.sign_hash_sync(&message.eip712_signing_hash(&v1)).unwrap();
        let parts = SignatureParts::from(sig);
        let recovered = recover_signer(message.eip712_signing_hash(&v2), &parts).unwrap();
        assert_ne!(recovered, signer.address());
    }
}
