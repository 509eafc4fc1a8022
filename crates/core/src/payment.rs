use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a payment arrived. Drives the match window: card settlements lag
/// several days, e-transfers land same-day, cheques can clear weeks later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Cheque,
    Card,
    ETransfer,
    Other,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Cheque => "cheque",
            PaymentMethod::Card => "card",
            PaymentMethod::ETransfer => "etransfer",
            PaymentMethod::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "cheque" | "check" => Ok(PaymentMethod::Cheque),
            "card" | "visa" | "mastercard" => Ok(PaymentMethod::Card),
            "etransfer" | "e-transfer" => Ok(PaymentMethod::ETransfer),
            "other" => Ok(PaymentMethod::Other),
            other => Err(format!("Unknown payment method: '{other}'")),
        }
    }
}

/// Money received against a charter. Linkage is by the charter's business
/// key (`reserve_number`), never the internal surrogate id; a charter's
/// financial state is the aggregate of all its payments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Option<i64>,
    pub reserve_number: String,
    pub amount_cents: i64,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub banking_transaction_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(
        reserve_number: &str,
        amount_cents: i64,
        payment_date: NaiveDate,
        method: PaymentMethod,
    ) -> Self {
        Payment {
            id: None,
            reserve_number: reserve_number.to_string(),
            amount_cents,
            payment_date,
            method,
            banking_transaction_id: None,
            created_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parses_common_spellings() {
        assert_eq!("e-transfer".parse::<PaymentMethod>().unwrap(), PaymentMethod::ETransfer);
        assert_eq!("check".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cheque);
        assert_eq!("CARD".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert!("wire".parse::<PaymentMethod>().is_err());
    }
}
