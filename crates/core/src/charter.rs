use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CharterStatus {
    Active,
    Cancelled,
}

impl CharterStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CharterStatus::Active => "active",
            CharterStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CharterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CharterStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CharterStatus::Active),
            "cancelled" => Ok(CharterStatus::Cancelled),
            other => Err(format!("Unknown charter status: '{other}'")),
        }
    }
}

/// A sold service. `total_due_cents` is set once at sale time;
/// `paid_cents` and `balance_cents` are derived caches with the balance
/// recalculator as their only writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charter {
    pub id: Option<i64>,
    pub reserve_number: String,
    pub client: Option<String>,
    pub charter_date: Option<NaiveDate>,
    /// NULL in the legacy data means the total was never entered; the
    /// recalculator treats it as zero and sets `needs_review`.
    pub total_due_cents: Option<i64>,
    pub paid_cents: i64,
    pub balance_cents: i64,
    pub status: CharterStatus,
    pub needs_review: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Charter {
    pub fn new(reserve_number: &str, total_due_cents: Option<i64>) -> Self {
        Charter {
            id: None,
            reserve_number: reserve_number.to_string(),
            client: None,
            charter_date: None,
            total_due_cents,
            paid_cents: 0,
            balance_cents: total_due_cents.unwrap_or(0),
            status: CharterStatus::Active,
            needs_review: false,
            created_at: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == CharterStatus::Cancelled
    }
}
