use crate::config::CupCategory;
use crate::errors::QueryError;
use crate::normalize::cup_column;
use crate::sales::DateRange;
use serde_json::Value;

pub const STORES_QUERY: &str = "SELECT ID, NAME FROM STORGRP ORDER BY NAME";

const ORDER_FILTER: &str = "WHERE D.STORGRPID IN ({stores})
  AND D.CSDTKTHBID IN ('1', '2', '3', '5')
  AND D.DAT_ >= ? AND D.DAT_ <= ?";

const TEST_ORDER_FILTER: &str = "  AND NOT (
      D.comment LIKE '%мы;%' OR
      D.comment LIKE '%Мы;%' OR
      D.comment LIKE '%Тестирование%')";

const GROUPING: &str = "GROUP BY stgp.NAME, D.DAT_
ORDER BY stgp.NAME, D.DAT_";

#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn ids(values: &[i64]) -> impl Iterator<Item = Value> + '_ {
    values.iter().map(|id| Value::from(*id))
}

fn range_params(range: &DateRange) -> [Value; 2] {
    [
        Value::from(range.start.to_string()),
        Value::from(range.end.to_string()),
    ]
}

fn order_filter(store_count: usize) -> String {
    ORDER_FILTER.replace("{stores}", &placeholders(store_count))
}

fn ensure_stores(store_ids: &[i64]) -> Result<(), QueryError> {
    if store_ids.is_empty() {
        return Err(QueryError::NoStores);
    }
    Ok(())
}

/// Cash per store and day. No goods join here, so order sums are not repeated
/// once per line item.
pub fn sums_query(store_ids: &[i64], range: &DateRange) -> Result<SqlQuery, QueryError> {
    ensure_stores(store_ids)?;
    let sql = format!(
        "SELECT
    stgp.NAME AS STORE_NAME,
    D.DAT_ AS ORDER_DATE,
    SUM(D.SUMMA) AS TOTAL_CASH
FROM STORZAKAZDT D
JOIN STORGRP stgp ON D.STORGRPID = stgp.ID
{filter}
{tests}
{GROUPING}",
        filter = order_filter(store_ids.len()),
        tests = TEST_ORDER_FILTER,
    );

    let params = ids(store_ids).chain(range_params(range)).collect();
    Ok(SqlQuery { sql, params })
}

pub fn cups_query(
    store_ids: &[i64],
    range: &DateRange,
    categories: &[CupCategory],
) -> Result<SqlQuery, QueryError> {
    ensure_stores(store_ids)?;

    let columns: Vec<String> = categories
        .iter()
        .map(|category| {
            format!(
                "    COALESCE(SUM(CASE WHEN G.OWNER IN ({}) THEN GD.Source ELSE NULL END), 0) AS {}",
                placeholders(category.group_ids.len()),
                cup_column(&category.name),
            )
        })
        .collect();

    let sql = format!(
        "SELECT
    stgp.NAME AS STORE_NAME,
    D.DAT_ AS ORDER_DATE,
{columns}
FROM STORZAKAZDT D
JOIN STORZDTGDS GD ON D.ID = GD.SZID
JOIN GOODS G ON GD.GODSId = G.ID
JOIN STORGRP stgp ON D.STORGRPID = stgp.ID
{filter}
{tests}
{GROUPING}",
        columns = columns.join(",\n"),
        filter = order_filter(store_ids.len()),
        tests = TEST_ORDER_FILTER,
    );

    let params = categories
        .iter()
        .flat_map(|category| ids(&category.group_ids))
        .chain(ids(store_ids))
        .chain(range_params(range))
        .collect();
    Ok(SqlQuery { sql, params })
}

/// Packaged kilograms. Test orders are counted here on purpose: stock left
/// the shelf regardless of the comment.
pub fn packages_query(
    store_ids: &[i64],
    range: &DateRange,
    package_groups: &[i64],
) -> Result<SqlQuery, QueryError> {
    ensure_stores(store_ids)?;
    let sql = format!(
        "SELECT
    stgp.NAME AS STORE_NAME,
    D.DAT_ AS ORDER_DATE,
    SUM(GD.SOURCE) AS PACKAGES_KG
FROM STORZAKAZDT D
JOIN STORZDTGDS GD ON D.ID = GD.SZID
JOIN GOODS G ON GD.GODSId = G.ID
JOIN STORGRP stgp ON D.STORGRPID = stgp.ID
{filter}
  AND G.OWNER IN ({groups})
{GROUPING}",
        filter = order_filter(store_ids.len()),
        groups = placeholders(package_groups.len()),
    );

    let params = ids(store_ids)
        .chain(range_params(range))
        .chain(ids(package_groups))
        .collect();
    Ok(SqlQuery { sql, params })
}
