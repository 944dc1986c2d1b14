use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    Cash,
    Cups,
    Packages,
}

impl fmt::Display for MetricSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricSource::Cash => "cash",
            MetricSource::Cups => "cups",
            MetricSource::Packages => "packages",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metric {
    Cash,
    Cups { category: String },
    PackagesKg,
}

/// One observation of a single metric for a store on a day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRow {
    pub store_name: String,
    pub order_date: NaiveDate,
    pub metric: Metric,
    pub value: Decimal,
}

impl MetricRow {
    pub fn cash(store_name: impl Into<String>, order_date: NaiveDate, value: Decimal) -> Self {
        Self {
            store_name: store_name.into(),
            order_date,
            metric: Metric::Cash,
            value,
        }
    }

    pub fn cups(
        store_name: impl Into<String>,
        order_date: NaiveDate,
        category: impl Into<String>,
        value: Decimal,
    ) -> Self {
        Self {
            store_name: store_name.into(),
            order_date,
            metric: Metric::Cups {
                category: category.into(),
            },
            value,
        }
    }

    pub fn packages(store_name: impl Into<String>, order_date: NaiveDate, value: Decimal) -> Self {
        Self {
            store_name: store_name.into(),
            order_date,
            metric: Metric::PackagesKg,
            value,
        }
    }
}

/// Rows per upstream query. `None` means the source was unavailable and the
/// caller chose to merge without it.
#[derive(Debug, Clone, Default)]
pub struct SalesSources {
    pub cash: Option<Vec<MetricRow>>,
    pub cups: Option<Vec<MetricRow>>,
    pub packages: Option<Vec<MetricRow>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesRecord {
    pub store_name: String,
    pub order_date: NaiveDate,
    pub total_cash: Decimal,
    pub cup_counts: BTreeMap<String, Decimal>,
    pub packages_kg: Decimal,
}

impl SalesRecord {
    pub fn empty(store_name: String, order_date: NaiveDate, categories: &[String]) -> Self {
        Self {
            store_name,
            order_date,
            total_cash: Decimal::ZERO,
            cup_counts: categories
                .iter()
                .map(|category| (category.clone(), Decimal::ZERO))
                .collect(),
            packages_kg: Decimal::ZERO,
        }
    }

    pub fn total_cups(&self) -> Decimal {
        self.cup_counts
            .values()
            .fold(Decimal::ZERO, |sum, count| sum.saturating_add(*count))
    }

    pub fn cups(&self, category: &str) -> Decimal {
        self.cup_counts.get(category).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesSummary {
    pub total_cash_sum: Decimal,
    pub total_cups_sum: Decimal,
    pub total_packages_sum: Decimal,
    pub cup_totals: BTreeMap<String, Decimal>,
    pub distinct_store_count: usize,
    pub distinct_date_count: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Date,
    #[default]
    Store,
    Sum,
    Cups,
    Packages,
}

impl SortKey {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "date" => Some(Self::Date),
            "store" => Some(Self::Store),
            "sum" => Some(Self::Sum),
            "cups" => Some(Self::Cups),
            "packages" => Some(Self::Packages),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Store => "store",
            Self::Sum => "sum",
            Self::Cups => "cups",
            Self::Packages => "packages",
        }
    }

    /// Metric totals read best largest-first, names and dates in natural order.
    pub fn default_direction(self) -> SortDirection {
        match self {
            Self::Date | Self::Store => SortDirection::Asc,
            Self::Sum | Self::Cups | Self::Packages => SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortOrder {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    pub stores: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub data: BTreeMap<NaiveDate, BTreeMap<String, SalesRecord>>,
}

impl PivotTable {
    pub fn cell(&self, date: NaiveDate, store: &str) -> Option<&SalesRecord> {
        self.data.get(&date).and_then(|row| row.get(store))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Store {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockRecord {
    pub group_name: String,
    pub group_id: i64,
    pub good_id: i64,
    pub good_name: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub total_sum: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockGroup {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockSummary {
    pub total_items: usize,
    pub total_quantity: Decimal,
    pub total_sum: Decimal,
    pub groups_count: usize,
}

#[derive(Debug, Serialize)]
pub struct SalesResponse {
    pub records: Vec<SalesRecord>,
    pub summary: SalesSummary,
    pub missing_sources: Vec<MetricSource>,
    pub rejected_rows: Vec<String>,
}
