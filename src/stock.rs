use crate::models::{StockGroup, StockRecord, StockSummary};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};

pub const DEFAULT_PER_PAGE: usize = 50;

pub fn filter_by_groups(records: Vec<StockRecord>, group_ids: &[i64]) -> Vec<StockRecord> {
    if group_ids.is_empty() {
        return records;
    }
    let wanted: HashSet<i64> = group_ids.iter().copied().collect();
    records
        .into_iter()
        .filter(|record| wanted.contains(&record.group_id))
        .collect()
}

pub fn search(records: Vec<StockRecord>, query: &str) -> Vec<StockRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|record| {
            record.group_name.to_lowercase().contains(&needle)
                || record.good_name.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Distinct groups sorted by name; the first name seen for an id wins.
pub fn unique_groups(records: &[StockRecord]) -> Vec<StockGroup> {
    let mut by_id: BTreeMap<i64, String> = BTreeMap::new();
    for record in records {
        by_id
            .entry(record.group_id)
            .or_insert_with(|| record.group_name.clone());
    }
    let mut groups: Vec<StockGroup> = by_id
        .into_iter()
        .map(|(id, name)| StockGroup { id, name })
        .collect();
    groups.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    groups
}

pub fn summarize(records: &[StockRecord]) -> StockSummary {
    StockSummary {
        total_items: records.len(),
        total_quantity: records
            .iter()
            .fold(Decimal::ZERO, |sum, record| sum.saturating_add(record.quantity)),
        total_sum: records
            .iter()
            .fold(Decimal::ZERO, |sum, record| sum.saturating_add(record.total_sum)),
        groups_count: records
            .iter()
            .map(|record| record.group_id)
            .collect::<HashSet<_>>()
            .len(),
    }
}

/// Returns the requested page (clamped into range) and the page count.
pub fn paginate(records: &[StockRecord], page: usize, per_page: usize) -> (&[StockRecord], usize) {
    if records.is_empty() {
        return (&[], 0);
    }
    let per_page = per_page.max(1);
    let total_pages = records.len().div_ceil(per_page);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * per_page;
    let end = (start + per_page).min(records.len());
    (&records[start..end], total_pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(group_id: i64, group_name: &str, good_name: &str, quantity: i64) -> StockRecord {
        StockRecord {
            group_name: group_name.to_string(),
            group_id,
            good_id: quantity,
            good_name: good_name.to_string(),
            quantity: Decimal::from(quantity),
            price: Decimal::from(2),
            total_sum: Decimal::from(quantity * 2),
        }
    }

    fn sample() -> Vec<StockRecord> {
        vec![
            record(2, "Tea", "Green tea", 3),
            record(1, "Coffee", "Espresso beans", 5),
            record(1, "Coffee", "Decaf", 1),
        ]
    }

    #[test]
    fn filter_keeps_selected_groups_or_everything() {
        assert_eq!(filter_by_groups(sample(), &[]).len(), 3);
        let coffee = filter_by_groups(sample(), &[1]);
        assert_eq!(coffee.len(), 2);
        assert!(coffee.iter().all(|r| r.group_id == 1));
    }

    #[test]
    fn search_matches_group_or_good_case_insensitively() {
        assert_eq!(search(sample(), "TEA").len(), 1);
        assert_eq!(search(sample(), "beans").len(), 1);
        assert_eq!(search(sample(), "coffee").len(), 2);
        assert_eq!(search(sample(), "  ").len(), 3);
    }

    #[test]
    fn groups_are_unique_and_sorted() {
        let groups = unique_groups(&sample());
        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Coffee", "Tea"]);
    }

    #[test]
    fn summary_covers_all_records() {
        let summary = summarize(&sample());
        assert_eq!(summary.total_items, 3);
        assert_eq!(summary.total_quantity, Decimal::from(9));
        assert_eq!(summary.total_sum, Decimal::from(18));
        assert_eq!(summary.groups_count, 2);
    }

    #[test]
    fn summary_saturates_huge_values() {
        let mut huge = record(1, "Coffee", "Beans", 1);
        huge.total_sum = Decimal::MAX;
        let summary = summarize(&[huge.clone(), huge]);
        assert_eq!(summary.total_sum, Decimal::MAX);
        assert_eq!(summary.total_quantity, Decimal::from(2));
    }

    #[test]
    fn pagination_clamps_page() {
        let records = sample();
        let (page, pages) = paginate(&records, 1, 2);
        assert_eq!((page.len(), pages), (2, 2));
        let (page, _) = paginate(&records, 9, 2);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].good_name, "Decaf");
        let (page, pages) = paginate(&[], 1, 2);
        assert!(page.is_empty());
        assert_eq!(pages, 0);
    }
}
