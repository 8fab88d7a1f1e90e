//! Trading-session windows and the per-session risk policy.
//!
//! Sessions are fixed UTC windows: 00:00-07:00 is the low-volatility Asia
//! session, everything else counts as London/New York. The session at entry
//! time is captured on the position and governs its risk-reward policy for
//! the life of the trade, regardless of the session the clock later moves
//! into.

use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// UTC time-of-day trading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Session {
    /// 00:00-07:00 UTC, low volatility
    Asia,
    /// 07:00-24:00 UTC, high volatility
    LondonNewYork,
}

impl Session {
    /// Session containing the given UTC hour.
    pub fn from_hour(hour: u32) -> Self {
        if hour < 7 {
            Session::Asia
        } else {
            Session::LondonNewYork
        }
    }

    /// Session containing the given timestamp.
    pub fn of(ts: DateTime<Utc>) -> Self {
        Self::from_hour(ts.hour())
    }

    pub fn is_asia(&self) -> bool {
        matches!(self, Session::Asia)
    }
}

/// Risk-reward parameters a session imposes on new entries.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    /// Initial stop distance as a multiple of ATR
    pub stop_ratio: Decimal,

    /// Take-profit distance as a multiple of the stop distance
    pub target_ratio: Decimal,

    /// Whether the stop trails while the position is open
    pub trailing: bool,
}
