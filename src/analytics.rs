use crate::errors::ValidationError;
use crate::models::{
    Metric, MetricRow, MetricSource, PivotTable, SalesRecord, SalesSources, SalesSummary,
    SortDirection, SortKey, SortOrder,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub records: Vec<SalesRecord>,
    pub rejected: Vec<ValidationError>,
}

#[derive(Debug, Clone)]
pub struct SalesAggregator {
    categories: Vec<String>,
}

impl SalesAggregator {
    pub fn new(categories: Vec<String>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Merges every source into one record per `(store_name, order_date)`.
    ///
    /// Values landing on the same key are added together. The returned
    /// records are ordered by store name, then date.
    pub fn merge(&self, sources: &SalesSources) -> MergeOutcome {
        let mut index: HashMap<(String, NaiveDate), usize> = HashMap::new();
        let mut records: Vec<SalesRecord> = Vec::new();
        let mut rejected = Vec::new();

        let inputs = [
            (MetricSource::Cash, sources.cash.as_deref()),
            (MetricSource::Cups, sources.cups.as_deref()),
            (MetricSource::Packages, sources.packages.as_deref()),
        ];

        for (metric, rows) in inputs {
            for (position, row) in rows.unwrap_or_default().iter().enumerate() {
                if let Err(err) = self.check_row(metric, position, row) {
                    rejected.push(err);
                    continue;
                }

                let key = (row.store_name.trim().to_string(), row.order_date);
                let slot = *index.entry(key.clone()).or_insert_with(|| {
                    records.push(SalesRecord::empty(key.0, key.1, &self.categories));
                    records.len() - 1
                });
                let record = &mut records[slot];

                let total = match &row.metric {
                    Metric::Cash => &mut record.total_cash,
                    Metric::PackagesKg => &mut record.packages_kg,
                    Metric::Cups { category } => {
                        record.cup_counts.entry(category.clone()).or_default()
                    }
                };
                match total.checked_add(row.value) {
                    Some(sum) => *total = sum,
                    None => rejected.push(ValidationError::ValueOutOfRange {
                        metric,
                        index: position,
                        value: row.value.to_string(),
                    }),
                }
            }
        }

        sort_records(&mut records, SortOrder::default());
        MergeOutcome { records, rejected }
    }

    fn check_row(
        &self,
        metric: MetricSource,
        index: usize,
        row: &MetricRow,
    ) -> Result<(), ValidationError> {
        if row.store_name.trim().is_empty() {
            return Err(ValidationError::MissingStoreName { metric, index });
        }
        if let Metric::Cups { category } = &row.metric {
            if !self.categories.iter().any(|known| known == category) {
                return Err(ValidationError::UnknownCategory {
                    metric,
                    index,
                    category: category.clone(),
                });
            }
        }
        Ok(())
    }
}

pub fn sort_records(records: &mut [SalesRecord], order: SortOrder) {
    records.sort_by(|a, b| compare_records(a, b, order));
}

fn compare_records(a: &SalesRecord, b: &SalesRecord, order: SortOrder) -> Ordering {
    let by_store_then_date = || {
        a.store_name
            .cmp(&b.store_name)
            .then_with(|| a.order_date.cmp(&b.order_date))
    };

    let primary = match order.key {
        SortKey::Store => return directed(by_store_then_date(), order.direction),
        SortKey::Date => {
            let ordering = a
                .order_date
                .cmp(&b.order_date)
                .then_with(|| a.store_name.cmp(&b.store_name));
            return directed(ordering, order.direction);
        }
        SortKey::Sum => a.total_cash.cmp(&b.total_cash),
        SortKey::Cups => a.total_cups().cmp(&b.total_cups()),
        SortKey::Packages => a.packages_kg.cmp(&b.packages_kg),
    };

    // ties on a metric always fall back to store, then date, ascending
    directed(primary, order.direction).then_with(by_store_then_date)
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

pub fn summarize(records: &[SalesRecord], categories: &[String]) -> SalesSummary {
    let mut total_cash_sum = Decimal::ZERO;
    let mut total_packages_sum = Decimal::ZERO;
    let mut cup_totals: BTreeMap<String, Decimal> = categories
        .iter()
        .map(|category| (category.clone(), Decimal::ZERO))
        .collect();
    let mut stores = HashSet::new();
    let mut dates = BTreeSet::new();

    // totals saturate at Decimal::MAX rather than overflow
    for record in records {
        total_cash_sum = total_cash_sum.saturating_add(record.total_cash);
        total_packages_sum = total_packages_sum.saturating_add(record.packages_kg);
        for (category, count) in &record.cup_counts {
            let total = cup_totals.entry(category.clone()).or_default();
            *total = total.saturating_add(*count);
        }
        stores.insert(record.store_name.as_str());
        dates.insert(record.order_date);
    }

    SalesSummary {
        total_cash_sum,
        total_cups_sum: cup_totals
            .values()
            .fold(Decimal::ZERO, |sum, count| sum.saturating_add(*count)),
        total_packages_sum,
        cup_totals,
        distinct_store_count: stores.len(),
        distinct_date_count: dates.len(),
        start_date: dates.first().copied(),
        end_date: dates.last().copied(),
    }
}

/// Lays records out as dates down, stores across. Stores follow
/// `store_order`; stores with data but absent from it are appended by name.
pub fn build_pivot_table(records: &[SalesRecord], store_order: &[String]) -> PivotTable {
    let mut data: BTreeMap<NaiveDate, BTreeMap<String, SalesRecord>> = BTreeMap::new();
    let mut present = BTreeSet::new();

    for record in records {
        present.insert(record.store_name.clone());
        data.entry(record.order_date)
            .or_default()
            .insert(record.store_name.clone(), record.clone());
    }

    let mut stores: Vec<String> = store_order
        .iter()
        .filter(|name| present.contains(*name))
        .cloned()
        .collect();
    let mut seen: HashSet<String> = stores.iter().cloned().collect();
    for name in present {
        if seen.insert(name.clone()) {
            stores.push(name);
        }
    }

    PivotTable {
        stores,
        dates: data.keys().copied().collect(),
        data,
    }
}
