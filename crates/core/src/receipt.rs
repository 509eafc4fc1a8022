use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Business-side expense or revenue record. May exist without a bank link
/// (manually entered); once `banking_transaction_id` is set the link is
/// immutable outside the audited correction path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: Option<i64>,
    pub receipt_date: NaiveDate,
    pub vendor: String,
    pub gross_cents: i64,
    pub gst_cents: Option<i64>,
    pub memo: Option<String>,
    pub banking_transaction_id: Option<i64>,
    /// Anchor id of the split family this receipt belongs to, when it is
    /// one part of a charge split across payment instruments.
    pub split_group_id: Option<i64>,
    pub is_split_receipt: bool,
    pub potential_duplicate: bool,
    pub verified_by_edit: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Receipt {
    pub fn new(receipt_date: NaiveDate, vendor: &str, gross_cents: i64) -> Self {
        Receipt {
            id: None,
            receipt_date,
            vendor: vendor.to_string(),
            gross_cents,
            gst_cents: None,
            memo: None,
            banking_transaction_id: None,
            split_group_id: None,
            is_split_receipt: false,
            potential_duplicate: false,
            verified_by_edit: false,
            created_at: None,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.banking_transaction_id.is_some()
    }
}
