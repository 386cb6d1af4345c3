use chrono::{DateTime, Utc};
use std::f64::consts::LN_2;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Fractional days from `earlier` to `now`, never negative.
pub fn days_since(earlier: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - earlier).num_milliseconds() as f64;
    (millis / MILLIS_PER_DAY).max(0.0)
}

/// Exponential decay: the multiplier halves every `half_life_days`.
pub fn time_decay(occurred_at: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 1.0;
    }
    (-LN_2 * days_since(occurred_at, now) / half_life_days).exp()
}
