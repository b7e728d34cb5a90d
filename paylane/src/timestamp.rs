//! Unix timestamp utilities for permit validity windows.
//!
//! Permit deadlines, AllowanceVault expirations, and EIP-2612 `deadline`
//! fields are all Unix-seconds values. [`UnixTimestamp`] keeps them in one
//! place and serializes them as stringified integers so JSON consumers do not
//! lose precision on 64-bit values.

use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::SystemTime;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Seconds since the Unix epoch (1970-01-01T00:00:00Z).
///
/// Used for:
///
/// - **permit `deadline`**: latest time the AllowanceVault accepts the
///   signature (`sigDeadline`), also reused as the allowance `expiration`
/// - **token permit `deadline`**: latest time the stablecoin accepts the
///   EIP-2612 approval
///
/// # Serialization
///
/// Serialized as a stringified integer: `"1699999999"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnixTimestamp(u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(Self(ts))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

impl UnixTimestamp {
    /// Creates a timestamp from a raw seconds value.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns the current system time.
    ///
    /// # Panics
    ///
    /// Panics if the system clock is set before the Unix epoch, which does
    /// not happen on properly configured systems.
    #[must_use]
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("SystemTime before UNIX epoch?!?")
            .as_secs();
        Self(now)
    }

    /// Returns raw seconds since the Unix epoch.
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Whether this timestamp lies strictly in the past.
    ///
    /// An expiration equal to `now` counts as expired: allowance validity
    /// requires `expiration > now`.
    #[must_use]
    pub fn is_expired(&self, now: Self) -> bool {
        self.0 <= now.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_string() {
        let ts = UnixTimestamp::from_secs(1_699_999_999);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "\"1699999999\"");
    }

    #[test]
    fn test_deserializes_from_string() {
        let ts: UnixTimestamp = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(ts.as_secs(), 42);
    }

    #[test]
    fn test_rejects_negative() {
        let result: Result<UnixTimestamp, _> = serde_json::from_str("\"-5\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_expiration_is_strict() {
        let now = UnixTimestamp::from_secs(1000);
        assert!(UnixTimestamp::from_secs(999).is_expired(now));
        assert!(UnixTimestamp::from_secs(1000).is_expired(now));
        assert!(!UnixTimestamp::from_secs(1001).is_expired(now));
    }

    #[test]
    fn test_add_saturates() {
        let ts = UnixTimestamp::from_secs(u64::MAX - 1) + 10;
        assert_eq!(ts.as_secs(), u64::MAX);
    }
}
