//! Solidity interface definitions for on-chain interactions.
//!
//! Only the functions the engine actually calls are declared:
//!
//! - [`IStablecoin`] - ERC-20 + EIP-2612 subset for USDC-style tokens
//! - [`IAllowanceVault`] - batched-allowance contract
//!   (`permit` / `allowance` / `transferFrom`)
//! - [`ITokenMessenger`] - burn side of the cross-chain transfer protocol
//! - [`IMessageTransmitter`] - mint side, plus the `MessageSent` event the
//!   burn receipt is scanned for
//!
//! References:
//! - EIP-2612: <https://eips.ethereum.org/EIPS/eip-2612>
//! - CCTP v2 TokenMessenger/MessageTransmitter:
//!   <https://developers.circle.com/stablecoins/evm-smart-contracts>

use alloy_sol_types::sol;

sol! {
    /// Minimal ERC-20 + EIP-2612 interface for the supported stablecoins.
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IStablecoin {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
        function permit(
            address owner,
            address spender,
            uint256 value,
            uint256 deadline,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
        function nonces(address owner) external view returns (uint256);
    }
}

sol! {
    /// Allowance details tracked per `(owner, token, spender)`.
    ///
    /// Mirrors the typed-data struct the user signs; the contract input
    /// struct is distinct from the signed struct even though the fields
    /// match, so the engine converts at the call boundary.
    #[allow(missing_docs)]
    #[derive(Debug)]
    struct PermitDetails {
        address token;
        uint160 amount;
        uint48 expiration;
        uint48 nonce;
    }

    /// Single-allowance permit accepted by the vault.
    #[allow(missing_docs)]
    #[derive(Debug)]
    struct PermitSingle {
        PermitDetails details;
        address spender;
        uint256 sigDeadline;
    }

    /// The canonical AllowanceVault.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IAllowanceVault {
        function permit(address owner, PermitSingle memory permitSingle, bytes calldata signature) external;
        function allowance(address owner, address token, address spender)
            external
            view
            returns (uint160 amount, uint48 expiration, uint48 nonce);
        function transferFrom(address from, address to, uint160 amount, address token) external;
    }
}

sol! {
    /// Burn entry point of the cross-chain transfer protocol (v2).
    ///
    /// `minFinalityThreshold`: 1000 attests at confirmed finality (fast),
    /// 2000 waits for full finality (standard). `destinationCaller` of
    /// `bytes32(0)` lets anyone redeem on the destination chain.
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface ITokenMessenger {
        function depositForBurn(
            uint256 amount,
            uint32 destinationDomain,
            bytes32 mintRecipient,
            address burnToken,
            bytes32 destinationCaller,
            uint256 maxFee,
            uint32 minFinalityThreshold
        ) external;
    }
}

sol! {
    /// Mint entry point plus the burn event.
    ///
    /// `MessageSent(bytes)` has the fixed topic
    /// `0x8c5261668696ce22758910d05bab8f186d6eb247ceac2af2e82c7dc17669b036`;
    /// the attestation provider keys on `keccak256` of the decoded message.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IMessageTransmitter {
        function receiveMessage(bytes calldata message, bytes calldata attestation) external returns (bool);
        event MessageSent(bytes message);
    }
}

impl From<&paylane::codec::PermitSingle> for PermitSingle {
    fn from(signed: &paylane::codec::PermitSingle) -> Self {
        Self {
            details: PermitDetails {
                token: signed.details.token,
                amount: signed.details.amount,
                expiration: signed.details.expiration,
                nonce: signed.details.nonce,
            },
            spender: signed.spender,
            sigDeadline: signed.sigDeadline,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::b256;
    use alloy_sol_types::SolEvent;

    use super::*;

    #[test]
    fn test_message_sent_topic_matches_fixed_signature() {
        assert_eq!(
            IMessageTransmitter::MessageSent::SIGNATURE_HASH,
            b256!("0x8c5261668696ce22758910d05bab8f186d6eb247ceac2af2e82c7dc17669b036")
        );
    }
}
