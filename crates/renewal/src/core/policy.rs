//! Renewal policy
//!
//! Pairs the TTL requested from the issuer with the window before expiry in
//! which a key is renewed. The window must be strictly shorter than the TTL:
//! otherwise a freshly issued key would already be due, and every run would
//! rotate again.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Minutes in a day, used when the window is configured in days
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// When to renew and how long new keys live
///
/// # Example
///
/// ```
/// use signing_key_renewal::RenewalPolicy;
///
/// let policy = RenewalPolicy::from_days(20_160, 3).unwrap();
/// assert_eq!(policy.renew_within_minutes(), 3 * 1440);
///
/// // A window as long as the TTL is rejected
/// assert!(RenewalPolicy::from_days(1440, 1).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalPolicy {
    ttl_minutes: u32,
    renew_within_minutes: u32,
}

impl RenewalPolicy {
    /// Build a policy with the renewal window given in minutes
    pub fn from_minutes(ttl_minutes: u32, renew_within_minutes: u32) -> Result<Self, ConfigError> {
        let policy = Self {
            ttl_minutes,
            renew_within_minutes,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Build a policy with the renewal window given in days
    pub fn from_days(ttl_minutes: u32, renew_within_days: u32) -> Result<Self, ConfigError> {
        let minutes = renew_within_days
            .checked_mul(MINUTES_PER_DAY)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "renew_within_days".into(),
                reason: format!("{renew_within_days} days overflows a minute count"),
            })?;
        Self::from_minutes(ttl_minutes, minutes)
    }

    /// Validate the policy invariant
    ///
    /// # Validation Rules
    ///
    /// - `ttl_minutes` > 0
    /// - `renew_within_minutes` < `ttl_minutes`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "signing_key_ttl_minutes".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.renew_within_minutes >= self.ttl_minutes {
            return Err(ConfigError::ValidationFailed(format!(
                "renewal window ({} minutes) must be shorter than the key TTL ({} minutes)",
                self.renew_within_minutes, self.ttl_minutes
            )));
        }
        Ok(())
    }

    /// TTL requested for newly issued keys, in minutes
    pub fn ttl_minutes(&self) -> u32 {
        self.ttl_minutes
    }

    /// Renewal window, in minutes
    pub fn renew_within_minutes(&self) -> u32 {
        self.renew_within_minutes
    }

    /// TTL as a duration
    pub fn ttl(&self) -> Duration {
        Duration::minutes(i64::from(self.ttl_minutes))
    }

    /// Renewal window as a duration
    pub fn renew_within(&self) -> Duration {
        Duration::minutes(i64::from(self.renew_within_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_accepts_window_shorter_than_ttl() {
        let policy = RenewalPolicy::from_days(20_160, 3).unwrap();
        assert_eq!(policy.ttl(), Duration::days(14));
        assert_eq!(policy.renew_within(), Duration::days(3));
    }

    #[test]
    fn test_rejects_zero_ttl() {
        assert!(matches!(
            RenewalPolicy::from_minutes(0, 0),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_rejects_equal_window() {
        assert!(RenewalPolicy::from_minutes(60, 60).is_err());
        assert!(RenewalPolicy::from_minutes(60, 59).is_ok());
    }

    #[test]
    fn test_rejects_overflowing_days() {
        assert!(RenewalPolicy::from_days(u32::MAX, u32::MAX).is_err());
    }

    proptest! {
        #[test]
        fn window_at_or_beyond_ttl_is_rejected(ttl in 1u32..200_000, days in 0u32..200) {
            let result = RenewalPolicy::from_days(ttl, days);
            if u64::from(days) * 1440 >= u64::from(ttl) {
                prop_assert!(result.is_err());
            } else {
                prop_assert!(result.is_ok());
            }
        }
    }
}
