use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransactionId(pub i64);

impl fmt::Display for BankTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reconciliation state of a bank line. `Flagged` is a diagnostic overlay
/// applied by the conflict reporter; a corrected transaction returns to
/// `Matched`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconStatus {
    Unreconciled,
    Matched,
    Flagged,
}

impl ReconStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconStatus::Unreconciled => "unreconciled",
            ReconStatus::Matched => "matched",
            ReconStatus::Flagged => "flagged",
        }
    }
}

impl fmt::Display for ReconStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReconStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unreconciled" => Ok(ReconStatus::Unreconciled),
            "matched" => Ok(ReconStatus::Matched),
            "flagged" => Ok(ReconStatus::Flagged),
            other => Err(format!("Unknown reconciliation status: '{other}'")),
        }
    }
}

/// Immutable record of a real-world bank line. Created only by import;
/// removed only through the audited correction path.
///
/// Exactly one of `debit_cents` / `credit_cents` is set. `account_number`
/// and `bank_balance_cents` are trusted inputs from the statement and are
/// never re-derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: Option<BankTransactionId>,
    pub account_number: String,
    pub transaction_date: NaiveDate,
    pub posted_date: Option<NaiveDate>,
    pub description: String,
    pub debit_cents: Option<i64>,
    pub credit_cents: Option<i64>,
    pub bank_balance_cents: Option<i64>,
    pub source_file: String,
    pub content_hash: String,
    pub status: ReconStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl BankTransaction {
    /// Magnitude of the line regardless of direction. This is the value
    /// candidates are compared against during matching.
    pub fn unsigned_amount_cents(&self) -> i64 {
        self.debit_cents.or(self.credit_cents).unwrap_or(0)
    }

    /// Signed amount from the account holder's perspective: credits
    /// (deposits) positive, debits (withdrawals) negative.
    pub fn signed_amount_cents(&self) -> i64 {
        match (self.debit_cents, self.credit_cents) {
            (Some(d), None) => -d,
            (None, Some(c)) => c,
            _ => 0,
        }
    }

    pub fn is_deposit(&self) -> bool {
        self.credit_cents.is_some()
    }
}
