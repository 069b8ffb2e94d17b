//! Renewal decision engine
//!
//! A pure function of `(current record, policy, now)`. The caller supplies
//! `now`; nothing here reads a clock, so every boundary is testable.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::core::{RenewalPolicy, SigningKeyRecord};

/// Why a key is (or is not) due for renewal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RenewalDecision {
    /// No key stored yet
    Initial,
    /// The key has already expired
    Overdue {
        /// How long ago the key expired
        #[serde(with = "seconds")]
        expired_for: Duration,
    },
    /// Expiry falls inside the renewal window
    DueSoon {
        /// Time left before expiry
        #[serde(with = "seconds")]
        remaining: Duration,
    },
    /// Expiry is further out than the renewal window
    NotDue {
        /// Time left before expiry
        #[serde(with = "seconds")]
        remaining: Duration,
    },
}

impl RenewalDecision {
    /// Whether a new key must be issued
    #[must_use]
    pub fn should_renew(&self) -> bool {
        !matches!(self, Self::NotDue { .. })
    }

    /// Whether the renewal is late rather than proactive
    #[must_use]
    pub fn is_overdue(&self) -> bool {
        matches!(self, Self::Overdue { .. })
    }

    /// Emit the decision at the severity it deserves
    pub(crate) fn log(&self, secret_id: &str) {
        match self {
            Self::Initial => {
                tracing::info!(secret_id, "No signing key stored yet, issuing one");
            }
            Self::Overdue { expired_for } => {
                tracing::warn!(
                    secret_id,
                    expired_for_secs = expired_for.num_seconds(),
                    "Signing key already expired, renewing overdue key"
                );
            }
            Self::DueSoon { remaining } => {
                tracing::info!(
                    secret_id,
                    remaining_secs = remaining.num_seconds(),
                    "Signing key inside renewal window, renewing"
                );
            }
            Self::NotDue { remaining } => {
                tracing::info!(
                    secret_id,
                    remaining_secs = remaining.num_seconds(),
                    "Signing key not eligible for renewal yet"
                );
            }
        }
    }
}

/// Classify the current key against the policy at `now`
///
/// # Example
///
/// ```
/// use chrono::{Duration, Utc};
/// use signing_key_renewal::{RenewalDecision, RenewalPolicy, evaluate};
///
/// let policy = RenewalPolicy::from_days(20_160, 3).unwrap();
/// assert_eq!(evaluate(None, &policy, Utc::now()), RenewalDecision::Initial);
/// ```
#[must_use]
pub fn evaluate(
    current: Option<&SigningKeyRecord>,
    policy: &RenewalPolicy,
    now: DateTime<Utc>,
) -> RenewalDecision {
    let Some(record) = current else {
        return RenewalDecision::Initial;
    };

    let remaining = record.remaining(now);
    if remaining <= Duration::zero() {
        RenewalDecision::Overdue {
            expired_for: -remaining,
        }
    } else if remaining <= policy.renew_within() {
        RenewalDecision::DueSoon { remaining }
    } else {
        RenewalDecision::NotDue { remaining }
    }
}

/// `true` when the key is absent or `expires_at - now <= renew_within`
#[must_use]
pub fn should_renew(
    current: Option<&SigningKeyRecord>,
    policy: &RenewalPolicy,
    now: DateTime<Utc>,
) -> bool {
    evaluate(current, policy, now).should_renew()
}

mod seconds {
    use chrono::Duration;
    use serde::Serializer;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }
}
