pub mod audit;
pub mod bank;
pub mod charters;
pub mod db;
pub mod matches;
pub mod payments;
pub mod receipts;
pub mod session;

pub use audit::{append_audit, delete_bank_transaction_with_audit, delete_receipt_with_audit, unlink_receipt_with_audit, AuditEntry};
pub use db::{create_db, DbPool};
pub use session::{RunMode, Session};
