pub mod balance;
pub mod fingerprint;
pub mod import;
pub mod matcher;
pub mod report;
pub mod split;

pub use balance::{
    cancel_charter, recalculate, recalculate_all, BalanceError, BatchRecalcSummary, RecalcOutcome,
};
pub use fingerprint::{fingerprint, normalize_description};
pub use import::{
    import_row, import_rows, BankRow, ImportError, ImportSummary, RowError, RowOutcome,
};
pub use matcher::{
    attach_match, decide, find_candidates, run_matcher, AttachOutcome, MatchDecision, MatchError,
    MatchSummary, MatchTier, ScoredCandidate,
};
pub use report::{run_report, Finding, Report, ReportError};
pub use split::{marker_target, resolve_groups, run_split_resolver, SplitError, SplitGroup, SplitSummary};
