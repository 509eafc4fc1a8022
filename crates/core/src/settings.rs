use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::payment::PaymentMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// Window of `days` either side of `center`, inclusive.
    pub fn around(center: NaiveDate, days: u64) -> Self {
        DateRange {
            start: center.checked_sub_days(Days::new(days)).unwrap_or(center),
            end: center.checked_add_days(Days::new(days)).unwrap_or(center),
        }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Match-window width in days per payment channel. The legacy scripts used
/// anything from ±1 to ±30 depending on the channel; this makes the choice
/// explicit configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchWindows {
    pub card: u64,
    pub etransfer: u64,
    pub cheque: u64,
    pub cash: u64,
    #[serde(rename = "default")]
    pub fallback: u64,
}

impl Default for MatchWindows {
    fn default() -> Self {
        MatchWindows {
            card: 3,
            etransfer: 1,
            cheque: 10,
            cash: 1,
            fallback: 3,
        }
    }
}

impl MatchWindows {
    pub fn for_method(&self, method: Option<PaymentMethod>) -> u64 {
        match method {
            Some(PaymentMethod::Card) => self.card,
            Some(PaymentMethod::ETransfer) => self.etransfer,
            Some(PaymentMethod::Cheque) => self.cheque,
            Some(PaymentMethod::Cash) => self.cash,
            Some(PaymentMethod::Other) | None => self.fallback,
        }
    }

    pub fn widest(&self) -> u64 {
        self.card
            .max(self.etransfer)
            .max(self.cheque)
            .max(self.cash)
            .max(self.fallback)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconSettings {
    pub windows: MatchWindows,
    /// Candidate amounts must equal the transaction amount within this
    /// tolerance.
    pub amount_epsilon_cents: i64,
    /// Auto-match only when the single best candidate scores at or above
    /// this floor.
    pub confidence_floor: f64,
    /// An unreconciled transaction older than the widest window plus this
    /// many days is reported as stale.
    pub stale_after_days: u64,
}

impl Default for ReconSettings {
    fn default() -> Self {
        ReconSettings {
            windows: MatchWindows::default(),
            amount_epsilon_cents: 1,
            confidence_floor: 0.7,
            stale_after_days: 30,
        }
    }
}

impl ReconSettings {
    pub fn from_toml(toml_content: &str) -> Result<Self, String> {
        toml::from_str(toml_content).map_err(|e| format!("Failed to parse settings TOML: {e}"))
    }

    /// Candidate date window for a transaction, by payment channel.
    pub fn window_around(&self, date: NaiveDate, method: Option<PaymentMethod>) -> DateRange {
        DateRange::around(date, self.windows.for_method(method))
    }

    /// Age in days past which an unreconciled transaction is considered
    /// stale and surfaced by the reporter.
    pub fn stale_age_days(&self) -> u64 {
        self.windows.widest() + self.stale_after_days
    }
}
