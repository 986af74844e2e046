//! TTL countdown arithmetic, independent of where the start time is stored.
//!
//! A countdown is fully described by `(now, start, ttl)`. Only `start` is
//! persisted (as an RFC3339 annotation); everything else is recomputed on
//! every pass, which is what makes the policies restart-safe.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

/// Where a countdown stands at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlState {
    /// No countdown has been started.
    Idle,
    /// Started, deadline still ahead by `remaining`.
    Armed { remaining: Duration },
    /// Deadline reached or passed.
    Due,
}

impl TtlState {
    /// Evaluate a countdown. `Due` is inclusive of the deadline itself.
    pub fn evaluate(now: DateTime<Utc>, start: Option<DateTime<Utc>>, ttl: TimeDelta) -> Self {
        let Some(start) = start else {
            return TtlState::Idle;
        };
        let deadline = deadline(start, ttl);
        if now >= deadline {
            TtlState::Due
        } else {
            TtlState::Armed {
                remaining: remaining_until(deadline, now),
            }
        }
    }
}

/// `start + ttl`, saturating at the latest representable time.
pub fn deadline(start: DateTime<Utc>, ttl: TimeDelta) -> DateTime<Utc> {
    start
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Time left until `deadline`, zero once it has passed.
pub fn remaining_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (deadline - now).to_std().unwrap_or(Duration::ZERO)
}

/// Provisioner TTLs are whole seconds; saturate instead of overflowing.
pub fn ttl_from_secs(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Annotation encoding: RFC3339, second precision, UTC with a `Z` suffix.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Accepts any RFC3339 offset, normalised to UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}
