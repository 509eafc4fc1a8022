use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    Exact,
    Fuzzy,
    Manual,
    AutoGenerated,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Fuzzy => "fuzzy",
            MatchType::Manual => "manual",
            MatchType::AutoGenerated => "auto_generated",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(MatchType::Exact),
            "fuzzy" => Ok(MatchType::Fuzzy),
            "manual" => Ok(MatchType::Manual),
            "auto_generated" => Ok(MatchType::AutoGenerated),
            other => Err(format!("Unknown match type: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Active,
    Superseded,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Active => "active",
            MatchStatus::Superseded => "superseded",
        }
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MatchStatus::Active),
            "superseded" => Ok(MatchStatus::Superseded),
            other => Err(format!("Unknown match status: '{other}'")),
        }
    }
}

/// The business-side entity a match record points at. Exactly one of the
/// two columns is populated in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchTarget {
    Receipt(i64),
    Payment(i64),
}

impl MatchTarget {
    pub fn receipt_id(self) -> Option<i64> {
        match self {
            MatchTarget::Receipt(id) => Some(id),
            MatchTarget::Payment(_) => None,
        }
    }

    pub fn payment_id(self) -> Option<i64> {
        match self {
            MatchTarget::Receipt(_) => None,
            MatchTarget::Payment(id) => Some(id),
        }
    }
}

impl fmt::Display for MatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchTarget::Receipt(id) => write!(f, "receipt #{id}"),
            MatchTarget::Payment(id) => write!(f, "payment #{id}"),
        }
    }
}

/// Audit entry linking one bank transaction to one receipt or payment.
/// A bank transaction may carry several active records only when it is a
/// bulk deposit covering several invoices; a receipt or payment has at
/// most one active record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: Option<i64>,
    pub banking_transaction_id: i64,
    pub target: MatchTarget,
    pub match_date: NaiveDate,
    pub match_type: MatchType,
    pub match_status: MatchStatus,
    pub confidence: f64,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_accessors() {
        let r = MatchTarget::Receipt(7);
        assert_eq!(r.receipt_id(), Some(7));
        assert_eq!(r.payment_id(), None);

        let p = MatchTarget::Payment(9);
        assert_eq!(p.receipt_id(), None);
        assert_eq!(p.payment_id(), Some(9));
    }

    #[test]
    fn match_type_round_trip() {
        for t in [
            MatchType::Exact,
            MatchType::Fuzzy,
            MatchType::Manual,
            MatchType::AutoGenerated,
        ] {
            assert_eq!(t.as_str().parse::<MatchType>().unwrap(), t);
        }
    }
}
