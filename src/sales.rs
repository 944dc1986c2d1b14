use crate::analytics::{self, SalesAggregator};
use crate::config::PartialSourcePolicy;
use crate::errors::{AppError, PartialSourceError, ProxyError, QueryError, ValidationError};
use crate::models::{
    MetricRow, MetricSource, PivotTable, SalesRecord, SalesResponse, SalesSources, SalesSummary,
    SortDirection, SortKey, SortOrder, Store,
};
use crate::normalize::{self, Normalized};
use crate::proxy::{ProxyClient, RawSales};
use chrono::{Datelike, NaiveDate, Utc};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, QueryError> {
        if start > end {
            return Err(QueryError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// First day of the month through `today`.
    pub fn current_month(today: NaiveDate) -> Self {
        Self {
            start: today.with_day(1).unwrap_or(today),
            end: today,
        }
    }

    pub fn current_month_utc() -> Self {
        Self::current_month(Utc::now().date_naive())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SalesFilters {
    pub range: DateRange,
    pub store_ids: Vec<i64>,
    pub sort: SortOrder,
}

impl SalesFilters {
    /// Reads `start_date`, `end_date`, repeated `store`, `sort` and `order`.
    /// Missing dates fall back to `default_range`; unreadable store ids are
    /// skipped.
    pub fn from_query(params: &[(String, String)], default_range: DateRange) -> Result<Self, AppError> {
        let value = |name: &str| {
            params
                .iter()
                .rev()
                .find(|(key, value)| key == name && !value.trim().is_empty())
                .map(|(_, value)| value.trim())
        };
        let date = |name: &str, fallback: NaiveDate| match value(name) {
            Some(text) => text
                .parse::<NaiveDate>()
                .map_err(|_| AppError::bad_request(format!("{name} must be YYYY-MM-DD, got '{text}'"))),
            None => Ok(fallback),
        };

        let range = DateRange::new(
            date("start_date", default_range.start)?,
            date("end_date", default_range.end)?,
        )?;

        let store_ids = params
            .iter()
            .filter(|(key, _)| key == "store")
            .filter_map(|(_, value)| value.trim().parse::<i64>().ok())
            .collect();

        let key = value("sort").and_then(SortKey::parse).unwrap_or_default();
        let direction = value("order")
            .and_then(SortDirection::parse)
            .unwrap_or_else(|| key.default_direction());

        Ok(Self {
            range,
            store_ids,
            sort: SortOrder::new(key, direction),
        })
    }
}

pub fn is_load_requested(params: &[(String, String)]) -> bool {
    params.iter().any(|(key, value)| key == "load" && value == "1")
}

#[derive(Debug, Clone)]
pub struct SalesReport {
    pub stores: Vec<Store>,
    pub records: Vec<SalesRecord>,
    pub summary: SalesSummary,
    pub pivot: PivotTable,
    pub missing_sources: Vec<MetricSource>,
    pub rejected: Vec<ValidationError>,
}

impl SalesReport {
    pub fn into_payload(self) -> SalesResponse {
        SalesResponse {
            records: self.records,
            summary: self.summary,
            missing_sources: self.missing_sources,
            rejected_rows: self.rejected.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SalesError {
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    #[error(transparent)]
    Partial(#[from] PartialSourceError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl From<SalesError> for AppError {
    fn from(err: SalesError) -> Self {
        match err {
            SalesError::Query(err) => err.into(),
            other => AppError::bad_gateway(other),
        }
    }
}

/// Loads stores and the three metric sources, then merges, sorts and
/// summarizes them. An empty store selection means every store.
pub async fn load_sales(
    client: &ProxyClient,
    aggregator: &SalesAggregator,
    policy: PartialSourcePolicy,
    filters: &SalesFilters,
) -> Result<SalesReport, SalesError> {
    let stores = client.get_stores().await?;
    let store_ids: Vec<i64> = if filters.store_ids.is_empty() {
        stores.iter().map(|store| store.id).collect()
    } else {
        filters.store_ids.clone()
    };

    if store_ids.is_empty() {
        info!("no stores available, nothing to aggregate");
        return Ok(build_report(
            stores,
            aggregator,
            SalesSources::default(),
            Vec::new(),
            Vec::new(),
            filters.sort,
        ));
    }

    let raw = client.get_sales(&store_ids, &filters.range).await?;

    let (sources, missing_sources, rejected) = prepare_sources(raw, aggregator.categories(), policy)?;
    Ok(build_report(
        stores,
        aggregator,
        sources,
        missing_sources,
        rejected,
        filters.sort,
    ))
}

type Prepared = (SalesSources, Vec<MetricSource>, Vec<ValidationError>);

/// Applies the partial-source policy and normalizes what arrived.
pub fn prepare_sources(
    raw: RawSales,
    categories: &[String],
    policy: PartialSourcePolicy,
) -> Result<Prepared, PartialSourceError> {
    let failures = raw.failures();
    if let Some((metric, err)) = failures.first() {
        if policy == PartialSourcePolicy::Fail {
            return Err(PartialSourceError {
                metric: *metric,
                reason: err.to_string(),
            });
        }
    }
    for (metric, err) in &failures {
        warn!("{metric} query failed, treating it as zero: {err}");
    }
    let missing_sources = failures.iter().map(|(metric, _)| *metric).collect();

    let mut rejected = Vec::new();
    let mut take = |result: Result<Vec<Value>, ProxyError>, parse: &dyn Fn(&[Value]) -> Normalized<MetricRow>| {
        result.ok().map(|rows| {
            let normalized = parse(&rows);
            rejected.extend(normalized.rejected);
            normalized.rows
        })
    };

    let sources = SalesSources {
        cash: take(raw.cash, &normalize::cash_rows),
        cups: take(raw.cups, &|rows: &[Value]| normalize::cup_rows(rows, categories)),
        packages: take(raw.packages, &normalize::package_rows),
    };

    Ok((sources, missing_sources, rejected))
}

fn build_report(
    stores: Vec<Store>,
    aggregator: &SalesAggregator,
    sources: SalesSources,
    missing_sources: Vec<MetricSource>,
    mut rejected: Vec<ValidationError>,
    sort: SortOrder,
) -> SalesReport {
    let outcome = aggregator.merge(&sources);
    rejected.extend(outcome.rejected);
    for err in &rejected {
        warn!("dropped metric row: {err}");
    }

    let mut records = outcome.records;
    analytics::sort_records(&mut records, sort);
    let summary = analytics::summarize(&records, aggregator.categories());
    let store_order: Vec<String> = stores.iter().map(|store| store.name.clone()).collect();
    let pivot = analytics::build_pivot_table(&records, &store_order);

    SalesReport {
        stores,
        records,
        summary,
        pivot,
        missing_sources,
        rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn day(value: &str) -> NaiveDate {
        value.parse().unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn categories() -> Vec<String> {
        vec!["Mono".to_string(), "Blend".to_string()]
    }

    fn raw(cups: Result<Vec<Value>, ProxyError>) -> RawSales {
        RawSales {
            cash: Ok(vec![
                json!({"STORE_NAME": "A", "ORDER_DATE": "2025-01-01", "TOTAL_CASH": 100}),
                json!({"STORE_NAME": null, "ORDER_DATE": "2025-01-01", "TOTAL_CASH": 10}),
            ]),
            cups,
            packages: Ok(vec![]),
        }
    }

    #[test]
    fn current_month_starts_on_the_first() {
        let range = DateRange::current_month(day("2025-03-17"));
        assert_eq!(range.start, day("2025-03-01"));
        assert_eq!(range.end, day("2025-03-17"));
    }

    #[test]
    fn filters_fall_back_to_defaults() {
        let default = DateRange::current_month(day("2025-03-17"));
        let filters = SalesFilters::from_query(&[], default).unwrap();
        assert_eq!(filters.range, default);
        assert!(filters.store_ids.is_empty());
        assert_eq!(filters.sort, SortOrder::new(SortKey::Store, SortDirection::Asc));
    }

    #[test]
    fn filters_read_stores_and_sort() {
        let default = DateRange::current_month(day("2025-03-17"));
        let query = params(&[
            ("start_date", "2025-02-01"),
            ("end_date", "2025-02-10"),
            ("store", "3"),
            ("store", "oops"),
            ("store", "7"),
            ("sort", "sum"),
        ]);
        let filters = SalesFilters::from_query(&query, default).unwrap();
        assert_eq!(filters.range, DateRange::new(day("2025-02-01"), day("2025-02-10")).unwrap());
        assert_eq!(filters.store_ids, vec![3, 7]);
        assert_eq!(filters.sort, SortOrder::new(SortKey::Sum, SortDirection::Desc));

        let query = params(&[("sort", "sum"), ("order", "asc")]);
        let filters = SalesFilters::from_query(&query, default).unwrap();
        assert_eq!(filters.sort.direction, SortDirection::Asc);
    }

    #[test]
    fn filters_reject_bad_dates() {
        let default = DateRange::current_month(day("2025-03-17"));
        let inverted = params(&[("start_date", "2025-02-10"), ("end_date", "2025-02-01")]);
        let err = SalesFilters::from_query(&inverted, default).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(
            DateRange::new(day("2025-02-10"), day("2025-02-01")),
            Err(QueryError::InvertedRange {
                start: day("2025-02-10"),
                end: day("2025-02-01"),
            })
        );
        let garbage = params(&[("start_date", "02/10/2025")]);
        assert!(SalesFilters::from_query(&garbage, default).is_err());
    }

    #[test]
    fn load_flag_must_be_one() {
        assert!(is_load_requested(&params(&[("load", "1")])));
        assert!(!is_load_requested(&params(&[("load", "yes")])));
    }

    #[test]
    fn failed_source_is_an_error_under_fail_policy() {
        let raw = raw(Err(ProxyError::Unauthorized));
        let err = prepare_sources(raw, &categories(), PartialSourcePolicy::Fail).unwrap_err();
        assert_eq!(err.metric, MetricSource::Cups);
    }

    #[test]
    fn failed_source_is_zero_under_zero_policy() {
        let raw = raw(Err(ProxyError::Unauthorized));
        let (sources, missing, rejected) =
            prepare_sources(raw, &categories(), PartialSourcePolicy::Zero).unwrap();
        assert_eq!(missing, vec![MetricSource::Cups]);
        assert!(sources.cups.is_none());
        assert_eq!(rejected.len(), 1);

        let aggregator = SalesAggregator::new(categories());
        let report = build_report(
            vec![],
            &aggregator,
            sources,
            missing,
            rejected,
            SortOrder::default(),
        );
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].total_cash, Decimal::from(100));
        assert_eq!(report.records[0].total_cups(), Decimal::ZERO);
        assert_eq!(report.into_payload().rejected_rows.len(), 1);
    }

    #[test]
    fn complete_sources_merge_into_report() {
        let cups = Ok(vec![
            json!({"STORE_NAME": "A", "ORDER_DATE": "2025-01-01", "MonoCup": 5, "BlendCup": 0}),
        ]);
        let (sources, missing, rejected) =
            prepare_sources(raw(cups), &categories(), PartialSourcePolicy::Fail).unwrap();
        assert!(missing.is_empty());

        let aggregator = SalesAggregator::new(categories());
        let report = build_report(
            vec![Store { id: 1, name: "A".to_string() }],
            &aggregator,
            sources,
            missing,
            rejected,
            SortOrder::default(),
        );
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].cups("Mono"), Decimal::from(5));
        assert_eq!(report.summary.total_cash_sum, Decimal::from(100));
        assert_eq!(report.pivot.stores, vec!["A"]);
        assert_eq!(report.rejected.len(), 1);
    }
}
