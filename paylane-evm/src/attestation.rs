//! Long-poll client for the burn attestation provider.
//!
//! The provider exposes two generations of the same lookup: v2 keys on the
//! burn transaction hash and source domain, v1 (legacy) on the message
//! hash. Both sit behind one logical [`AttestationClient::wait`] with the
//! generation chosen by the [`AttestationQuery`] variant.
//!
//! Polling contract: fixed interval per generation, bounded total budget,
//! HTTP 404 means *pending, keep polling*. Any other HTTP error terminates
//! the wait. The wait future is cancel-safe - dropping it stops polling and
//! leaves the associated payment record pending for a reconciler.

use std::time::Duration;

use alloy_primitives::{hex, Bytes, TxHash, B256};
use serde::Deserialize;
use url::Url;

use crate::error::EvmError;

/// Default polling interval for the legacy message-hash endpoint.
pub const V1_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default polling interval for the transaction-hash endpoint.
pub const V2_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default total polling budget.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(20 * 60);

/// How the attestation is looked up.
#[derive(Debug, Clone, Copy)]
pub enum AttestationQuery {
    /// Preferred: keyed by source domain and burn transaction hash.
    V2 {
        /// Destination-domain id of the *source* chain.
        source_domain: u32,
        /// Burn transaction hash.
        transaction_hash: TxHash,
    },
    /// Legacy: keyed by the burn message hash.
    V1 {
        /// `keccak256` of the burn message.
        message_hash: B256,
    },
}

/// A completed attestation, ready for redemption.
#[derive(Debug, Clone)]
pub struct AttestationBundle {
    /// The burn message bytes, when the provider returns them (v2 does;
    /// v1 callers already hold the message from the burn receipt).
    pub message: Option<Bytes>,
    /// The attestation signature bytes.
    pub attestation: Bytes,
}

#[derive(Debug, Deserialize)]
struct V2Response {
    messages: Vec<V2Message>,
}

#[derive(Debug, Deserialize)]
struct V2Message {
    status: String,
    attestation: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct V1Response {
    status: String,
    attestation: Option<String>,
}

/// Polls the attestation provider until a burn is attested or the budget
/// runs out.
#[derive(Debug, Clone)]
pub struct AttestationClient {
    http: reqwest::Client,
    base_url: Url,
    v1_interval: Duration,
    v2_interval: Duration,
    max_wait: Duration,
}

impl AttestationClient {
    /// Creates a client against the provider's base URL.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            v1_interval: V1_POLL_INTERVAL,
            v2_interval: V2_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// Overrides the total polling budget.
    #[must_use]
    pub const fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Overrides the per-generation polling intervals.
    #[must_use]
    pub const fn with_intervals(mut self, v1: Duration, v2: Duration) -> Self {
        self.v1_interval = v1;
        self.v2_interval = v2;
        self
    }

    /// Polls until the attestation completes.
    ///
    /// Returns [`EvmError::AttestationTimeout`] when the budget is
    /// exhausted and [`EvmError::AttestationFailed`] on any non-404 HTTP
    /// error or a failed attestation status.
    pub async fn wait(&self, query: AttestationQuery) -> Result<AttestationBundle, EvmError> {
        let (url, interval) = match query {
            AttestationQuery::V2 {
                source_domain,
                transaction_hash,
            } => {
                let mut url = self
                    .base_url
                    .join(&format!("v2/messages/{source_domain}"))
                    .map_err(|e| EvmError::AttestationFailed(e.to_string()))?;
                url.query_pairs_mut()
                    .append_pair("transactionHash", &format!("{transaction_hash:#x}"));
                (url, self.v2_interval)
            }
            AttestationQuery::V1 { message_hash } => {
                let url = self
                    .base_url
                    .join(&format!("attestations/{message_hash:#x}"))
                    .map_err(|e| EvmError::AttestationFailed(e.to_string()))?;
                (url, self.v1_interval)
            }
        };

        let max_attempts = (self.max_wait.as_secs() / interval.as_secs().max(1)).max(1);
        for attempt in 0..max_attempts {
            if let Some(bundle) = self.poll_once(&url, &query).await? {
                tracing::info!(attempt, url = %url, "Attestation complete");
                return Ok(bundle);
            }
            tokio::time::sleep(interval).await;
        }

        tracing::warn!(url = %url, "Attestation polling budget exhausted");
        Err(EvmError::AttestationTimeout)
    }

    /// One poll. `Ok(None)` means still pending.
    async fn poll_once(
        &self,
        url: &Url,
        query: &AttestationQuery,
    ) -> Result<Option<AttestationBundle>, EvmError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| EvmError::AttestationFailed(e.to_string()))?;

        // The provider answers 404 until it has seen the burn.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(EvmError::AttestationFailed(format!(
                "provider returned HTTP {}",
                response.status()
            )));
        }

        match query {
            AttestationQuery::V2 { .. } => {
                let body: V2Response = response
                    .json()
                    .await
                    .map_err(|e| EvmError::AttestationFailed(e.to_string()))?;
                let Some(first) = body.messages.first() else {
                    return Ok(None);
                };
                if first.status != "complete" {
                    return Ok(None);
                }
                let attestation = first
                    .attestation
                    .as_deref()
                    .ok_or_else(|| {
                        EvmError::AttestationFailed("complete message without attestation".into())
                    })
                    .and_then(decode_hex)?;
                let message = first.message.as_deref().map(decode_hex).transpose()?;
                Ok(Some(AttestationBundle {
                    message,
                    attestation,
                }))
            }
            AttestationQuery::V1 { .. } => {
                let body: V1Response = response
                    .json()
                    .await
                    .map_err(|e| EvmError::AttestationFailed(e.to_string()))?;
                if body.status != "complete" {
                    return Ok(None);
                }
                let attestation = body
                    .attestation
                    .as_deref()
                    .ok_or_else(|| {
                        EvmError::AttestationFailed("complete status without attestation".into())
                    })
                    .and_then(decode_hex)?;
                Ok(Some(AttestationBundle {
                    message: None,
                    attestation,
                }))
            }
        }
    }
}

fn decode_hex(raw: &str) -> Result<Bytes, EvmError> {
    hex::decode(raw)
        .map(Bytes::from)
        .map_err(|e| EvmError::AttestationFailed(format!("invalid hex in response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex_accepts_prefixed_and_bare() {
        assert_eq!(decode_hex("0xdeadbeef").unwrap().as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode_hex("deadbeef").unwrap().as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
        assert!(decode_hex("0xzz").is_err());
    }

    #[test]
    fn test_v2_response_shape() {
        let body: V2Response = serde_json::from_str(
            r#"{"messages":[{"status":"complete","attestation":"0x01","message":"0x02"}]}"#,
        )
        .unwrap();
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].status, "complete");
    }

    #[test]
    fn test_v1_response_pending_has_no_attestation() {
        let body: V1Response =
            serde_json::from_str(r#"{"status":"pending_confirmations","attestation":null}"#)
                .unwrap();
        assert_eq!(body.status, "pending_confirmations");
        assert!(body.attestation.is_none());
    }
}
