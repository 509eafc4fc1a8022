pub mod bank;
pub mod charter;
pub mod match_record;
pub mod money;
pub mod payment;
pub mod receipt;
pub mod settings;

pub use bank::{BankTransaction, BankTransactionId, ReconStatus};
pub use charter::{Charter, CharterStatus};
pub use match_record::{MatchRecord, MatchStatus, MatchTarget, MatchType};
pub use money::Money;
pub use payment::{Payment, PaymentMethod};
pub use receipt::Receipt;
pub use settings::{DateRange, MatchWindows, ReconSettings};
