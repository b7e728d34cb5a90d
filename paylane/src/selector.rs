//! Best-permit selection for a metered call.
//!
//! Given a user's active permits, the agent's payout preferences, and the
//! call price, picks the permit to settle against: a preferred-route match
//! beats any USDC permit, which beats anything else. USDC ranks above other
//! tokens because only USDC can cross chains; a non-USDC pick on a
//! cross-chain route is later rejected by the transfer engine's gate.

use crate::model::{Agent, Permit, UsdAmount};

/// Picks the best permit for a call costing `cost`, or `None` if nothing
/// qualifies.
///
/// 1. Keep permits whose remaining USD value covers `cost` (inclusive).
/// 2. Prefer permits matching the agent's `(payout_token, payout_chain)`.
/// 3. Else prefer USDC permits.
/// 4. Else any token.
///
/// Ties break by remaining value descending, then by newest `created_at`.
#[must_use]
pub fn select_permit<'a>(
    permits: &'a [Permit],
    agent: &Agent,
    cost: UsdAmount,
) -> Option<&'a Permit> {
    let eligible: Vec<&Permit> = permits
        .iter()
        .filter(|p| p.remaining_value() >= cost)
        .collect();

    let preferred = eligible.iter().copied().filter(|p| {
        p.token == agent.payment_preferences.payout_token
            && p.chain_id == agent.payment_preferences.payout_chain_id
    });
    if let Some(best) = pick(preferred) {
        return Some(best);
    }

    let usdc = eligible.iter().copied().filter(|p| p.token.is_bridgeable());
    if let Some(best) = pick(usdc) {
        return Some(best);
    }

    pick(eligible.into_iter())
}

/// Largest remaining value wins; newest permit breaks ties.
fn pick<'a>(candidates: impl Iterator<Item = &'a Permit>) -> Option<&'a Permit> {
    candidates.max_by(|a, b| {
        a.remaining_value()
            .cmp(&b.remaining_value())
            .then(a.created_at.cmp(&b.created_at))
    })
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, B256, U256};
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::model::{
        PaymentPreferences, PermitStatus, SignatureParts, TokenSymbol, UsdAmount,
    };
    use crate::timestamp::UnixTimestamp;

    const CENT: u64 = 10_000;

    fn agent() -> Agent {
        Agent {
            id: "agent-1".into(),
            name: "echo".into(),
            price_per_call: UsdAmount::from_micros(10 * CENT),
            payment_preferences: PaymentPreferences {
                payout_token: TokenSymbol::Usdc,
                payout_chain_id: 84_532,
            },
            publisher_wallet_address: Address::ZERO,
            api_endpoint: "https://publisher.example/api".into(),
            publisher_api_key: "pk".into(),
            free_trial_tries: 0,
        }
    }

    fn permit(
        id: &str,
        token: TokenSymbol,
        chain_id: u64,
        max_calls: u32,
        calls_used: u32,
        created_secs: i64,
    ) -> Permit {
        Permit {
            id: id.into(),
            user_address: Address::ZERO,
            agent_id: None,
            token,
            chain_id,
            spender_address: Address::ZERO,
            amount: U256::from(u64::from(max_calls) * 10 * CENT),
            nonce: 0,
            deadline: UnixTimestamp::from_secs(2_000_000_000),
            signature: SignatureParts {
                r: B256::ZERO,
                s: B256::ZERO,
                v: 27,
            },
            token_permit_sig: None,
            status: PermitStatus::Active,
            created_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
            expires_at: Utc.timestamp_opt(2_000_000_000, 0).unwrap(),
            max_calls,
            calls_used,
            cost_per_call: UsdAmount::from_micros(10 * CENT),
        }
    }

    #[test]
    fn test_preferred_route_beats_larger_usdc_elsewhere() {
        let permits = vec![
            permit("big-remote", TokenSymbol::Usdc, 11_155_111, 1000, 0, 1),
            permit("small-local", TokenSymbol::Usdc, 84_532, 5, 0, 2),
        ];
        let best = select_permit(&permits, &agent(), UsdAmount::from_micros(10 * CENT)).unwrap();
        assert_eq!(best.id, "small-local");
    }

    #[test]
    fn test_usdc_beats_other_tokens_when_no_preferred_match() {
        let permits = vec![
            permit("pyusd", TokenSymbol::Pyusd, 11_155_111, 1000, 0, 1),
            permit("usdc", TokenSymbol::Usdc, 11_155_111, 5, 0, 2),
        ];
        let best = select_permit(&permits, &agent(), UsdAmount::from_micros(10 * CENT)).unwrap();
        assert_eq!(best.id, "usdc");
    }

    #[test]
    fn test_falls_back_to_any_token() {
        let permits = vec![permit("pyusd", TokenSymbol::Pyusd, 1, 10, 0, 1)];
        let best = select_permit(&permits, &agent(), UsdAmount::from_micros(10 * CENT)).unwrap();
        assert_eq!(best.id, "pyusd");
    }

    #[test]
    fn test_insufficient_remaining_value_is_filtered() {
        // 10 max, 10 used: zero remaining calls makes the permit ineligible.
        let permits = vec![
            permit("spent", TokenSymbol::Usdc, 84_532, 10, 10, 1),
            permit("one-left", TokenSymbol::Usdc, 84_532, 10, 9, 2),
        ];
        let best = select_permit(&permits, &agent(), UsdAmount::from_micros(10 * CENT)).unwrap();
        assert_eq!(best.id, "one-left");
    }

    #[test]
    fn test_exact_remaining_value_is_eligible() {
        let permits = vec![permit("exact", TokenSymbol::Usdc, 84_532, 1, 0, 1)];
        assert!(
            select_permit(&permits, &agent(), UsdAmount::from_micros(10 * CENT)).is_some()
        );
    }

    #[test]
    fn test_none_when_nothing_qualifies() {
        let permits = vec![permit("spent", TokenSymbol::Usdc, 84_532, 3, 3, 1)];
        assert!(select_permit(&permits, &agent(), UsdAmount::from_micros(10 * CENT)).is_none());
        assert!(select_permit(&[], &agent(), UsdAmount::from_micros(CENT)).is_none());
    }

    #[test]
    fn test_largest_remaining_value_wins_within_tier() {
        let permits = vec![
            permit("small", TokenSymbol::Usdc, 84_532, 10, 0, 1),
            permit("large", TokenSymbol::Usdc, 84_532, 100, 0, 1),
        ];
        let best = select_permit(&permits, &agent(), UsdAmount::from_micros(10 * CENT)).unwrap();
        assert_eq!(best.id, "large");
    }

    #[test]
    fn test_newest_wins_on_equal_value() {
        let permits = vec![
            permit("older", TokenSymbol::Usdc, 84_532, 10, 0, 100),
            permit("newer", TokenSymbol::Usdc, 84_532, 10, 0, 200),
        ];
        let best = select_permit(&permits, &agent(), UsdAmount::from_micros(10 * CENT)).unwrap();
        assert_eq!(best.id, "newer");
    }
}
