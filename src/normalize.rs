use crate::errors::ValidationError;
use crate::models::{MetricRow, MetricSource, StockRecord, Store};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

pub const STORE_NAME: &str = "STORE_NAME";
pub const ORDER_DATE: &str = "ORDER_DATE";
pub const TOTAL_CASH: &str = "TOTAL_CASH";
pub const PACKAGES_KG: &str = "PACKAGES_KG";

#[derive(Debug, Clone)]
pub struct Normalized<T> {
    pub rows: Vec<T>,
    pub rejected: Vec<ValidationError>,
}

impl<T> Default for Normalized<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<T> Normalized<T> {
    fn push(&mut self, result: Result<Vec<T>, ValidationError>) {
        match result {
            Ok(rows) => self.rows.extend(rows),
            Err(err) => self.rejected.push(err),
        }
    }
}

pub fn cup_column(category: &str) -> String {
    format!("{category}Cup")
}

pub fn cash_rows(rows: &[Value]) -> Normalized<MetricRow> {
    let mut out = Normalized::default();
    for (index, row) in rows.iter().enumerate() {
        out.push(single_metric(MetricSource::Cash, index, row, TOTAL_CASH).map(
            |(store, date, value)| vec![MetricRow::cash(store, date, value)],
        ));
    }
    out
}

pub fn package_rows(rows: &[Value]) -> Normalized<MetricRow> {
    let mut out = Normalized::default();
    for (index, row) in rows.iter().enumerate() {
        out.push(single_metric(MetricSource::Packages, index, row, PACKAGES_KG).map(
            |(store, date, value)| vec![MetricRow::packages(store, date, value)],
        ));
    }
    out
}

/// Expands each cups row into one metric row per category, read from the
/// `<Category>Cup` column.
pub fn cup_rows(rows: &[Value], categories: &[String]) -> Normalized<MetricRow> {
    let metric = MetricSource::Cups;
    let mut out = Normalized::default();
    for (index, row) in rows.iter().enumerate() {
        let parsed = as_object(metric, index, row).and_then(|object| {
            let (store, date) = row_key(metric, index, object)?;
            categories
                .iter()
                .map(|category| {
                    let column = cup_column(category);
                    let value = decimal_field(metric, index, object, &column)?;
                    Ok(MetricRow::cups(store.clone(), date, category.clone(), value))
                })
                .collect::<Result<Vec<_>, _>>()
        });
        out.push(parsed);
    }
    out
}

pub fn stores(rows: &[Value]) -> Vec<Store> {
    let mut stores: Vec<Store> = rows
        .iter()
        .filter_map(|row| {
            let object = row.as_object()?;
            let id = integer(field(object, "ID")?)?;
            let name = text(field(object, "NAME")?)?;
            Some(Store { id, name })
        })
        .collect();
    stores.sort_by(|a, b| a.name.cmp(&b.name));
    stores
}

/// Stock rows are lenient: absent or unreadable fields fall back to empty or
/// zero, matching how the inventory screen has always treated them.
pub fn stock_rows(rows: &[Value]) -> Vec<StockRecord> {
    rows.iter()
        .filter_map(Value::as_object)
        .map(|object| {
            let number = |column: &str| {
                field(object, column)
                    .and_then(parse_decimal)
                    .unwrap_or_default()
            };
            let id = |column: &str| field(object, column).and_then(integer).unwrap_or_default();
            let name = |column: &str| field(object, column).and_then(text).unwrap_or_default();

            StockRecord {
                group_name: name("GROUP_NAME"),
                group_id: id("GROUP_ID"),
                good_id: id("GOOD_ID"),
                good_name: name("GOOD_NAME"),
                quantity: number("QUANTITY"),
                price: number("PRICE"),
                total_sum: number("TOTAL_SUM"),
            }
        })
        .collect()
}

fn single_metric(
    metric: MetricSource,
    index: usize,
    row: &Value,
    column: &str,
) -> Result<(String, NaiveDate, Decimal), ValidationError> {
    let object = as_object(metric, index, row)?;
    let (store, date) = row_key(metric, index, object)?;
    let value = decimal_field(metric, index, object, column)?;
    Ok((store, date, value))
}

fn as_object(
    metric: MetricSource,
    index: usize,
    row: &Value,
) -> Result<&Map<String, Value>, ValidationError> {
    row.as_object()
        .ok_or(ValidationError::NotAnObject { metric, index })
}

fn row_key(
    metric: MetricSource,
    index: usize,
    object: &Map<String, Value>,
) -> Result<(String, NaiveDate), ValidationError> {
    let store = field(object, STORE_NAME)
        .and_then(text)
        .ok_or(ValidationError::MissingStoreName { metric, index })?;

    let raw_date = field(object, ORDER_DATE)
        .filter(|value| !value.is_null())
        .ok_or(ValidationError::MissingOrderDate { metric, index })?;
    let date = match raw_date {
        Value::String(value) if value.trim().is_empty() => {
            return Err(ValidationError::MissingOrderDate { metric, index });
        }
        Value::String(value) => {
            normalize_date(value).ok_or_else(|| ValidationError::InvalidOrderDate {
                metric,
                index,
                value: value.clone(),
            })?
        }
        other => {
            return Err(ValidationError::InvalidOrderDate {
                metric,
                index,
                value: other.to_string(),
            });
        }
    };

    Ok((store, date))
}

fn decimal_field(
    metric: MetricSource,
    index: usize,
    object: &Map<String, Value>,
    column: &str,
) -> Result<Decimal, ValidationError> {
    match field(object, column) {
        None | Some(Value::Null) => Ok(Decimal::ZERO),
        Some(value) => parse_decimal(value).ok_or_else(|| ValidationError::NonNumericValue {
            metric,
            index,
            field: column.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Looks a column up by name, ignoring ASCII case. Firebird upper-cases
/// unquoted aliases, so `MonoCup` arrives as `MONOCUP`.
pub fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).or_else(|| {
        object
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

fn text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(value) => value.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(value) => value.trim().parse().ok(),
        _ => None,
    }
}

/// Numbers and numeric strings (a decimal comma is accepted). `None` for
/// anything else, null included.
fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => decimal_from_str(&number.to_string()),
        Value::String(text) => {
            let cleaned = text.trim().replace(',', ".");
            if cleaned.is_empty() {
                return None;
            }
            decimal_from_str(&cleaned)
        }
        _ => None,
    }
}

fn decimal_from_str(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

pub fn normalize_date(value: &str) -> Option<NaiveDate> {
    let text = value.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|datetime| datetime.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn categories() -> Vec<String> {
        vec!["Mono".to_string(), "Blend".to_string(), "Caotina".to_string()]
    }

    fn day(value: &str) -> NaiveDate {
        value.parse().unwrap()
    }

    #[test]
    fn normalize_date_understands_isoformat_with_time() {
        assert_eq!(normalize_date("2024-01-05T10:30:00"), Some(day("2024-01-05")));
        assert_eq!(normalize_date("2024-01-05 10:30:00.250"), Some(day("2024-01-05")));
        assert_eq!(normalize_date("2024-01-05T23:30:00+03:00"), Some(day("2024-01-05")));
        assert_eq!(normalize_date("2024-01-05T10:30:00Z"), Some(day("2024-01-05")));
        assert_eq!(normalize_date(" 2024-01-05 "), Some(day("2024-01-05")));
        assert_eq!(normalize_date("05.01.2024"), None);
        assert_eq!(normalize_date(""), None);
    }

    #[test]
    fn cash_rows_accept_strings_numbers_and_decimal_commas() {
        let rows = vec![
            json!({"STORE_NAME": "Store A", "ORDER_DATE": "2024-05-01", "TOTAL_CASH": "15.50"}),
            json!({"store_name": " Store B ", "order_date": "2024-05-01", "total_cash": 7.75}),
            json!({"STORE_NAME": "Store C", "ORDER_DATE": "2024-05-01", "TOTAL_CASH": "3,25"}),
            json!({"STORE_NAME": "Store D", "ORDER_DATE": "2024-05-01", "TOTAL_CASH": null}),
        ];

        let parsed = cash_rows(&rows);
        assert!(parsed.rejected.is_empty());
        let values: Vec<_> = parsed
            .rows
            .iter()
            .map(|row| (row.store_name.as_str(), row.value))
            .collect();
        assert_eq!(
            values,
            vec![
                ("Store A", Decimal::new(1550, 2)),
                ("Store B", Decimal::new(775, 2)),
                ("Store C", Decimal::new(325, 2)),
                ("Store D", Decimal::ZERO),
            ]
        );
    }

    #[test]
    fn null_store_name_is_rejected_and_dropped() {
        let rows = vec![
            json!({"STORE_NAME": null, "ORDER_DATE": "2025-01-01", "TOTAL_CASH": 10}),
            json!({"STORE_NAME": "A", "ORDER_DATE": "2025-01-01", "TOTAL_CASH": 10}),
        ];

        let parsed = cash_rows(&rows);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(
            parsed.rejected,
            vec![ValidationError::MissingStoreName {
                metric: MetricSource::Cash,
                index: 0,
            }]
        );
    }

    #[test]
    fn bad_dates_and_values_are_reported() {
        let rows = vec![
            json!({"STORE_NAME": "A", "TOTAL_CASH": 1}),
            json!({"STORE_NAME": "A", "ORDER_DATE": "yesterday", "TOTAL_CASH": 1}),
            json!({"STORE_NAME": "A", "ORDER_DATE": "2025-01-01", "TOTAL_CASH": "abc"}),
            json!({"STORE_NAME": "A", "ORDER_DATE": "2025-01-01", "TOTAL_CASH": true}),
            json!(["A", "2025-01-01", 1]),
        ];

        let parsed = cash_rows(&rows);
        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.rejected.len(), 5);
        assert!(matches!(
            parsed.rejected[0],
            ValidationError::MissingOrderDate { index: 0, .. }
        ));
        assert!(matches!(
            parsed.rejected[1],
            ValidationError::InvalidOrderDate { index: 1, .. }
        ));
        assert!(matches!(
            &parsed.rejected[2],
            ValidationError::NonNumericValue { index: 2, field, .. } if field == TOTAL_CASH
        ));
        assert!(matches!(
            parsed.rejected[3],
            ValidationError::NonNumericValue { index: 3, .. }
        ));
        assert!(matches!(
            parsed.rejected[4],
            ValidationError::NotAnObject { index: 4, .. }
        ));
    }

    #[test]
    fn cup_rows_expand_per_category_case_insensitively() {
        let rows = vec![json!({
            "STORE_NAME": "Store A",
            "ORDER_DATE": "2024-05-01T00:00:00",
            "MONOCUP": 4,
            "BlendCup": "5",
            "AllCup": 10
        })];

        let parsed = cup_rows(&rows, &categories());
        assert!(parsed.rejected.is_empty());
        assert_eq!(
            parsed.rows,
            vec![
                MetricRow::cups("Store A", day("2024-05-01"), "Mono", Decimal::from(4)),
                MetricRow::cups("Store A", day("2024-05-01"), "Blend", Decimal::from(5)),
                MetricRow::cups("Store A", day("2024-05-01"), "Caotina", Decimal::ZERO),
            ]
        );
    }

    #[test]
    fn package_rows_read_kilograms() {
        let rows = vec![json!({"STORE_NAME": "Store A", "ORDER_DATE": "2024-05-01", "PACKAGES_KG": "2.5"})];
        let parsed = package_rows(&rows);
        assert_eq!(
            parsed.rows,
            vec![MetricRow::packages("Store A", day("2024-05-01"), Decimal::new(25, 1))]
        );
    }

    #[test]
    fn stores_are_sorted_by_name_and_skip_incomplete_rows() {
        let rows = vec![
            json!({"ID": 2, "NAME": "Zeta"}),
            json!({"ID": "1", "NAME": "Alpha"}),
            json!({"ID": 3}),
        ];
        let parsed = stores(&rows);
        assert_eq!(
            parsed,
            vec![
                Store { id: 1, name: "Alpha".to_string() },
                Store { id: 2, name: "Zeta".to_string() },
            ]
        );
    }

    #[test]
    fn stock_rows_default_missing_fields() {
        let rows = vec![json!({"GROUP_NAME": "Coffee", "GROUP_ID": 7, "GOOD_NAME": "Beans", "QUANTITY": "1,5"})];
        let parsed = stock_rows(&rows);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].group_id, 7);
        assert_eq!(parsed[0].good_id, 0);
        assert_eq!(parsed[0].quantity, Decimal::new(15, 1));
        assert_eq!(parsed[0].price, Decimal::ZERO);
    }
}
