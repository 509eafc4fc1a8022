use ledgermend_core::Receipt;
use ledgermend_storage::{receipts, Session};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// One family of receipts that jointly represent a single real-world
/// charge. The anchor is the minimum member id, which keeps reruns from
/// re-choosing it.
#[derive(Debug, Clone, Serialize)]
pub struct SplitGroup {
    pub anchor_id: i64,
    pub member_ids: Vec<i64>,
    /// At least one member carries an explicit `split with #NNN` marker.
    /// Families without one are grouped but reported as unverified.
    pub has_marker: bool,
    /// A member whose amount equals the sum of its siblings — a leftover
    /// totaling row. Excluded from the family instead of merged.
    pub synthetic_parent_id: Option<i64>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SplitSummary {
    pub groups: usize,
    pub members_updated: usize,
    pub unverified_groups: usize,
    pub synthetic_parents: usize,
}

/// Extract the receipt id referenced by an explicit split marker in a
/// memo, e.g. "split with #12345".
pub fn marker_target(memo: &str) -> Option<i64> {
    let re = marker_regex();
    re.captures(memo)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn marker_regex() -> &'static regex::Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?i)split\s+with\s+#(\d+)").expect("static regex"))
}

/// Union-find over receipt ids; path-halving keeps it simple and fast
/// enough for full-table scans.
struct GroupIndex {
    parent: HashMap<i64, i64>,
}

impl GroupIndex {
    fn new() -> Self {
        GroupIndex {
            parent: HashMap::new(),
        }
    }

    fn find(&mut self, id: i64) -> i64 {
        let mut root = id;
        while let Some(&p) = self.parent.get(&root) {
            if p == root {
                break;
            }
            root = p;
        }
        let mut cur = id;
        while let Some(&p) = self.parent.get(&cur) {
            if p == root {
                break;
            }
            self.parent.insert(cur, root);
            cur = p;
        }
        root
    }

    fn union(&mut self, a: i64, b: i64) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        // Smaller root wins so component roots are stable across input
        // orderings.
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent.insert(hi, lo);
    }

    fn insert(&mut self, id: i64) {
        self.parent.entry(id).or_insert(id);
    }
}

/// Group receipts into split families. Pure: takes the full receipt scan,
/// returns the groups; running it twice over the same input yields the
/// same result.
pub fn resolve_groups(receipts: &[Receipt]) -> Vec<SplitGroup> {
    let mut index = GroupIndex::new();
    let by_id: HashMap<i64, &Receipt> = receipts
        .iter()
        .filter_map(|r| r.id.map(|id| (id, r)))
        .collect();

    // Vendor+date buckets.
    let mut buckets: BTreeMap<(String, chrono::NaiveDate), Vec<i64>> = BTreeMap::new();
    for r in receipts {
        let Some(id) = r.id else { continue };
        index.insert(id);
        buckets
            .entry((r.vendor.clone(), r.receipt_date))
            .or_default()
            .push(id);
    }
    for ids in buckets.values() {
        for pair in ids.windows(2) {
            index.union(pair[0], pair[1]);
        }
    }

    // Explicit marker edges, which may join across vendor/date.
    for r in receipts {
        let (Some(id), Some(memo)) = (r.id, r.memo.as_deref()) else {
            continue;
        };
        if let Some(other) = marker_target(memo) {
            if by_id.contains_key(&other) {
                index.union(id, other);
            }
        }
    }

    // Collect components of size >= 2, ordered by root for determinism.
    let mut components: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    for id in by_id.keys() {
        components.entry(index.find(*id)).or_default().push(*id);
    }

    let mut groups = Vec::new();
    for (_, mut member_ids) in components {
        if member_ids.len() < 2 {
            continue;
        }
        member_ids.sort_unstable();

        let synthetic_parent_id = detect_synthetic_parent(&member_ids, &by_id);
        if let Some(parent) = synthetic_parent_id {
            member_ids.retain(|&id| id != parent);
        }
        if member_ids.len() < 2 {
            // Excluding the totaling row left a single real receipt;
            // nothing to group.
            continue;
        }

        let has_marker = member_ids.iter().chain(synthetic_parent_id.iter()).any(|id| {
            by_id
                .get(id)
                .and_then(|r| r.memo.as_deref())
                .is_some_and(|m| marker_target(m).is_some())
        });

        groups.push(SplitGroup {
            anchor_id: member_ids[0],
            member_ids,
            has_marker,
            synthetic_parent_id,
        });
    }
    groups
}

/// A member whose amount equals the sum of all its siblings is a leftover
/// totaling row from an earlier process, not a real part of the split.
fn detect_synthetic_parent(member_ids: &[i64], by_id: &HashMap<i64, &Receipt>) -> Option<i64> {
    if member_ids.len() < 3 {
        return None;
    }
    let total: i64 = member_ids
        .iter()
        .filter_map(|id| by_id.get(id).map(|r| r.gross_cents))
        .sum();
    member_ids
        .iter()
        .find(|id| {
            by_id
                .get(*id)
                .is_some_and(|r| r.gross_cents == total - r.gross_cents)
        })
        .copied()
}

/// Full-table split resolution. Stamps every member with its family
/// anchor and flags synthetic parents; rerunning changes nothing.
pub async fn run_split_resolver(
    session: &mut Session,
    limit: Option<usize>,
) -> Result<(SplitSummary, Vec<SplitGroup>), SplitError> {
    let all = receipts::list_all(session.conn()).await?;
    let mut groups = resolve_groups(&all);
    if let Some(n) = limit {
        groups.truncate(n);
    }

    let by_id: HashMap<i64, &Receipt> = all.iter().filter_map(|r| r.id.map(|id| (id, r))).collect();
    let mut summary = SplitSummary {
        groups: groups.len(),
        ..SplitSummary::default()
    };

    for group in &groups {
        for &member in &group.member_ids {
            let already = by_id
                .get(&member)
                .is_some_and(|r| r.split_group_id == Some(group.anchor_id) && r.is_split_receipt);
            if !already {
                receipts::set_split_group(session.conn(), member, group.anchor_id).await?;
                summary.members_updated += 1;
            }
        }
        if let Some(parent) = group.synthetic_parent_id {
            summary.synthetic_parents += 1;
            let flagged = by_id.get(&parent).is_some_and(|r| r.potential_duplicate);
            if !flagged {
                receipts::mark_potential_duplicate(session.conn(), parent).await?;
            }
            tracing::debug!(receipt = parent, anchor = group.anchor_id, "synthetic parent excluded");
        }
        if !group.has_marker {
            summary.unverified_groups += 1;
        }
    }

    tracing::info!(
        groups = summary.groups,
        members_updated = summary.members_updated,
        unverified = summary.unverified_groups,
        synthetic_parents = summary.synthetic_parents,
        "split resolution complete"
    );
    Ok((summary, groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn receipt(id: i64, day: u32, vendor: &str, cents: i64, memo: Option<&str>) -> Receipt {
        let mut r = Receipt::new(date(day), vendor, cents);
        r.id = Some(id);
        r.memo = memo.map(str::to_string);
        r
    }

    #[test]
    fn marker_parses_case_insensitive() {
        assert_eq!(marker_target("Split with #12345"), Some(12345));
        assert_eq!(marker_target("paid half, split   with #7"), Some(7));
        assert_eq!(marker_target("no marker here"), None);
    }

    #[test]
    fn vendor_date_pairs_group_with_min_anchor() {
        let rs = vec![
            receipt(5, 15, "AIRPORT PARKING", 4000, None),
            receipt(2, 15, "AIRPORT PARKING", 6000, None),
            receipt(9, 16, "AIRPORT PARKING", 6000, None), // other date
        ];
        let groups = resolve_groups(&rs);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].anchor_id, 2);
        assert_eq!(groups[0].member_ids, vec![2, 5]);
        assert!(!groups[0].has_marker);
    }

    #[test]
    fn marker_joins_across_vendor_and_date() {
        let rs = vec![
            receipt(1, 15, "CASH PART", 5000, None),
            receipt(2, 16, "CARD PART", 7000, Some("split with #1")),
        ];
        let groups = resolve_groups(&rs);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].member_ids, vec![1, 2]);
        assert!(groups[0].has_marker);
    }

    #[test]
    fn marker_to_unknown_receipt_is_ignored() {
        let rs = vec![receipt(1, 15, "X", 5000, Some("split with #999"))];
        assert!(resolve_groups(&rs).is_empty());
    }

    #[test]
    fn singletons_do_not_group() {
        let rs = vec![
            receipt(1, 15, "A", 5000, None),
            receipt(2, 16, "B", 5000, None),
        ];
        assert!(resolve_groups(&rs).is_empty());
    }

    #[test]
    fn synthetic_parent_detected_and_excluded() {
        let rs = vec![
            receipt(1, 15, "DEPOT FUEL", 5000, Some("split with #2")),
            receipt(2, 15, "DEPOT FUEL", 7000, None),
            receipt(3, 15, "DEPOT FUEL", 12000, None), // totaling row
        ];
        let groups = resolve_groups(&rs);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].synthetic_parent_id, Some(3));
        assert_eq!(groups[0].member_ids, vec![1, 2]);
        assert_eq!(groups[0].anchor_id, 1);
    }

    #[test]
    fn rerun_produces_identical_grouping() {
        let rs = vec![
            receipt(4, 15, "DEPOT FUEL", 5000, Some("split with #8")),
            receipt(8, 15, "DEPOT FUEL", 7000, None),
            receipt(11, 20, "WASH BAY", 2000, None),
            receipt(12, 20, "WASH BAY", 2500, None),
        ];
        let first = resolve_groups(&rs);
        let second = resolve_groups(&rs);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first[0].anchor_id, 4);
        assert_eq!(first[1].anchor_id, 11);
    }
}
