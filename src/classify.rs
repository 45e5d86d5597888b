use crate::tls::{ProbeError, ProbeOutcome};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default grace period: the last 10% of the certificate lifetime
pub const DEFAULT_GRACE_PERIOD: f64 = 0.10;

/// Certificate lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Valid,
    Expiring,
    Expired,
    Invalid,
    Error,
}

impl Status {
    pub const ALL: [Self; 5] = [
        Self::Valid,
        Self::Expiring,
        Self::Expired,
        Self::Invalid,
        Self::Error,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Expiring => "expiring",
            Self::Expired => "expired",
            Self::Invalid => "invalid",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    /// Instant used for every comparison of this classification
    pub observed_at: DateTime<Utc>,
    pub servername: String,
    pub status: Status,
    /// Empty when `status` is `error`
    pub valid_to: Option<DateTime<Utc>>,
    /// Empty when `status` is `error`
    pub grace_threshold: Option<DateTime<Utc>>,
}

/// Classify a probe outcome.
///
/// `grace_period` is a fraction of the total certificate lifetime in `[0, 1]`;
/// the caller validates the range. First matching rule wins:
///
/// 1. no certificate (or unusable validity dates) → `error`
/// 2. `valid_to < now`, or the TLS library reported expiry → `expired`
/// 3. any identity, chain or connection error → `invalid`
/// 4. `now >= grace_threshold` → `expiring`
/// 5. otherwise → `valid`
#[must_use]
pub fn classify(
    outcome: &ProbeOutcome,
    grace_period: f64,
    now: DateTime<Utc>,
) -> ClassificationResult {
    let error = || ClassificationResult {
        observed_at: now,
        servername: outcome.servername.clone(),
        status: Status::Error,
        valid_to: None,
        grace_threshold: None,
    };

    let Some(certificate) = &outcome.certificate else {
        return error();
    };

    let valid_to = certificate.valid_to;
    let Some(grace_threshold) = grace_threshold(certificate.valid_from, valid_to, grace_period)
    else {
        return error();
    };

    let status = if valid_to < now || outcome.errors().any(ProbeError::is_expired) {
        Status::Expired
    } else if outcome.errors().next().is_some() {
        Status::Invalid
    } else if now >= grace_threshold {
        Status::Expiring
    } else {
        Status::Valid
    };

    ClassificationResult {
        observed_at: now,
        servername: outcome.servername.clone(),
        status,
        valid_to: Some(valid_to),
        grace_threshold: Some(grace_threshold),
    }
}

/// `valid_to - (valid_to - valid_from) * grace_period`, at millisecond precision.
///
/// Returns `None` when the validity window is inverted.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn grace_threshold(
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    grace_period: f64,
) -> Option<DateTime<Utc>> {
    let period_ms = (valid_to - valid_from).num_milliseconds();
    if period_ms < 0 {
        return None;
    }

    let grace_ms = (period_ms as f64 * grace_period).round() as i64;
    valid_to.checked_sub_signed(TimeDelta::try_milliseconds(grace_ms)?)
}
