use crate::config::Settings;
use crate::models::{
    SalesRecord, SalesSummary, SortDirection, SortKey, StockGroup, StockRecord, StockSummary,
    Store,
};
use crate::sales::{DateRange, SalesFilters, SalesReport};
use reqwest::Url;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::fmt::Write;

pub enum Health {
    NotLoaded,
    Up(Value),
    Down(String),
}

pub struct DashboardView {
    pub range: DateRange,
    pub loaded: bool,
    pub health: Health,
    pub stores: Vec<Store>,
    pub report: Option<SalesReport>,
    pub error: Option<String>,
}

pub struct SalesView {
    pub filters: SalesFilters,
    pub loaded: bool,
    pub stores: Vec<Store>,
    pub report: Option<SalesReport>,
    pub error: Option<String>,
}

pub struct StockPage {
    pub rows: Vec<StockRecord>,
    pub total_pages: usize,
    pub summary: StockSummary,
}

pub struct StockView {
    pub loaded: bool,
    pub configured: bool,
    pub search: String,
    pub group_ids: Vec<i64>,
    pub page: usize,
    pub per_page: usize,
    pub groups: Vec<StockGroup>,
    pub result: Option<StockPage>,
    pub error: Option<String>,
}

pub fn render_dashboard(settings: &Settings, view: &DashboardView, preview_rows: usize) -> String {
    let mut body = String::new();
    let _ = write!(
        body,
        r#"<header>
      <h1>Overview</h1>
      <p class="subtitle">{} &rarr; {} (UTC month to date)</p>
    </header>"#,
        view.range.start, view.range.end
    );

    if let Some(error) = &view.error {
        body.push_str(&banner("error", error));
    }

    if !view.loaded {
        body.push_str(&load_prompt("/?load=1", "Load this month's figures from the proxy API."));
        return layout(settings, "Overview", "/", &body);
    }

    body.push_str(&health_panel(&view.health));

    if let Some(report) = &view.report {
        body.push_str(&report_notices(report));
        body.push_str(&summary_panel(&report.summary, &settings.category_names()));
        let _ = write!(
            body,
            r#"<section class="card"><h2>Latest rows</h2><p class="hint">{} stores configured, showing {} of {} rows.</p>"#,
            view.stores.len(),
            report.records.len().min(preview_rows),
            report.records.len()
        );
        let preview: Vec<&SalesRecord> = report.records.iter().take(preview_rows).collect();
        body.push_str(&records_table(&preview, &settings.category_names()));
        body.push_str(r#"<p><a class="link" href="/sales?load=1">Open the full sales table</a></p></section>"#);
    }

    layout(settings, "Overview", "/", &body)
}

pub fn render_sales(settings: &Settings, view: &SalesView) -> String {
    let categories = settings.category_names();
    let mut body = String::from(
        r#"<header>
      <h1>Sales</h1>
      <p class="subtitle">Cash, cups and packaged kilograms per store and day.</p>
    </header>"#,
    );

    body.push_str(&sales_form(&view.filters, &view.stores));

    if let Some(error) = &view.error {
        body.push_str(&banner("error", error));
    }

    if !view.loaded {
        body.push_str(&load_prompt_text("Pick a period and press Show to query the proxy API."));
        return layout(settings, "Sales", "/sales", &body);
    }

    if let Some(report) = &view.report {
        body.push_str(&report_notices(report));
        body.push_str(&summary_panel(&report.summary, &categories));

        if report.records.is_empty() {
            body.push_str(&banner("info", "No sales for the selected period."));
        } else {
            let rows: Vec<&SalesRecord> = report.records.iter().collect();
            body.push_str(r#"<section class="card"><h2>Rows</h2>"#);
            body.push_str(&records_table(&rows, &categories));
            body.push_str("</section>");
            body.push_str(&pivot_table(report));
        }
    }

    layout(settings, "Sales", "/sales", &body)
}

pub fn render_stock(settings: &Settings, view: &StockView) -> String {
    let mut body = String::from(
        r#"<header>
      <h1>Stock</h1>
      <p class="subtitle">Goods on hand by group.</p>
    </header>"#,
    );

    if !view.configured {
        body.push_str(&banner(
            "info",
            "Stock is not configured. Set STOCK_QUERY to the query that returns GROUP_NAME, GROUP_ID, GOOD_ID, GOOD_NAME, QUANTITY, PRICE and TOTAL_SUM.",
        ));
        return layout(settings, "Stock", "/stock", &body);
    }

    body.push_str(&stock_form(view));

    if let Some(error) = &view.error {
        body.push_str(&banner("error", error));
    }

    match &view.result {
        None if !view.loaded => {
            body.push_str(&load_prompt_text("Press Show to load stock from the proxy API."))
        }
        None => {}
        Some(page) => {
            let summary = &page.summary;
            let _ = write!(
                body,
                r#"<section class="panel">{}{}{}{}</section>"#,
                stat("Items", &summary.total_items.to_string()),
                stat("Quantity", &quantity(summary.total_quantity)),
                stat("Value", &money(summary.total_sum)),
                stat("Groups", &summary.groups_count.to_string()),
            );

            if page.rows.is_empty() {
                body.push_str(&banner("info", "Nothing matches the current filter."));
            } else {
                body.push_str(&stock_table(&page.rows));
                body.push_str(&pagination(view, page.total_pages));
            }
        }
    }

    layout(settings, "Stock", "/stock", &body)
}

pub fn render_not_found(settings: &Settings) -> String {
    let body = r#"<header><h1>Page not found</h1></header>
    <p class="hint">The page you asked for does not exist. <a class="link" href="/">Back to the overview</a>.</p>"#;
    layout(settings, "Not found", "", body)
}

fn layout(settings: &Settings, title: &str, active: &str, body: &str) -> String {
    let nav: String = [("/", "Overview"), ("/sales", "Sales"), ("/stock", "Stock")]
        .iter()
        .map(|(href, label)| {
            let class = if *href == active { "tab active" } else { "tab" };
            format!(r#"<a class="{class}" href="{href}">{label}</a>"#)
        })
        .collect();

    LAYOUT_HTML
        .replace("{{TITLE}}", &escape(title))
        .replace("{{APP_NAME}}", &escape(&settings.app_name))
        .replace("{{APP_VERSION}}", &escape(&settings.app_version))
        .replace("{{NAV}}", &nav)
        .replace("{{BODY}}", body)
}

fn banner(kind: &str, message: &str) -> String {
    format!(r#"<div class="banner" data-type="{kind}">{}</div>"#, escape(message))
}

fn load_prompt(href: &str, message: &str) -> String {
    format!(
        r#"<section class="card"><p class="hint">{}</p><a class="button" href="{href}">Load data</a></section>"#,
        escape(message)
    )
}

fn load_prompt_text(message: &str) -> String {
    format!(r#"<p class="hint">{}</p>"#, escape(message))
}

fn stat(label: &str, value: &str) -> String {
    format!(
        r#"<div class="stat"><span class="label">{}</span><span class="value">{}</span></div>"#,
        escape(label),
        escape(value)
    )
}

fn health_panel(health: &Health) -> String {
    let (kind, text) = match health {
        Health::NotLoaded => ("info", "not loaded".to_string()),
        Health::Up(body) => {
            let status = body
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("ok")
                .to_string();
            ("ok", status)
        }
        Health::Down(message) => ("error", format!("error: {message}")),
    };
    format!(
        r#"<p class="status" data-type="{kind}">Proxy API: {}</p>"#,
        escape(&text)
    )
}

fn report_notices(report: &SalesReport) -> String {
    let mut out = String::new();
    if !report.missing_sources.is_empty() {
        let names: Vec<String> = report.missing_sources.iter().map(ToString::to_string).collect();
        out.push_str(&banner(
            "warning",
            &format!(
                "Some figures are incomplete: the {} query failed and is shown as zero.",
                names.join(", ")
            ),
        ));
    }
    if !report.rejected.is_empty() {
        out.push_str(&banner(
            "warning",
            &format!(
                "{} malformed row(s) from the proxy API were skipped.",
                report.rejected.len()
            ),
        ));
    }
    out
}

fn summary_panel(summary: &SalesSummary, categories: &[String]) -> String {
    let mut cards = vec![
        stat("Cash", &money(summary.total_cash_sum)),
        stat("Cups", &count(summary.total_cups_sum)),
        stat("Packages, kg", &quantity(summary.total_packages_sum)),
        stat("Stores", &summary.distinct_store_count.to_string()),
        stat("Days", &summary.distinct_date_count.to_string()),
    ];
    for category in categories {
        let total = summary.cup_totals.get(category).copied().unwrap_or_default();
        cards.push(stat(&format!("{category} cups"), &count(total)));
    }
    format!(r#"<section class="panel">{}</section>"#, cards.concat())
}

fn records_table(records: &[&SalesRecord], categories: &[String]) -> String {
    let mut html = String::from(r#"<div class="table-wrap"><table><thead><tr><th>Store</th><th>Date</th>"#);
    for category in categories {
        let _ = write!(html, r#"<th class="num">{}</th>"#, escape(category));
    }
    html.push_str(r#"<th class="num">Cups</th><th class="num">Cash</th><th class="num">Packages, kg</th></tr></thead><tbody>"#);

    for record in records {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td>",
            escape(&record.store_name),
            record.order_date
        );
        for category in categories {
            let _ = write!(html, r#"<td class="num">{}</td>"#, count(record.cups(category)));
        }
        let _ = write!(
            html,
            r#"<td class="num">{}</td><td class="num">{}</td><td class="num">{}</td></tr>"#,
            count(record.total_cups()),
            money(record.total_cash),
            quantity(record.packages_kg)
        );
    }

    html.push_str("</tbody></table></div>");
    html
}

fn pivot_table(report: &SalesReport) -> String {
    let pivot = &report.pivot;
    let mut html = String::from(
        r#"<section class="card"><h2>By store</h2><p class="hint">Cash / cups per day.</p><div class="table-wrap"><table><thead><tr><th>Date</th>"#,
    );
    for store in &pivot.stores {
        let _ = write!(html, r#"<th class="num">{}</th>"#, escape(store));
    }
    html.push_str("</tr></thead><tbody>");

    for date in &pivot.dates {
        let _ = write!(html, "<tr><td>{date}</td>");
        for store in &pivot.stores {
            match pivot.cell(*date, store) {
                Some(record) => {
                    let _ = write!(
                        html,
                        r#"<td class="num">{} / {}</td>"#,
                        money(record.total_cash),
                        count(record.total_cups())
                    );
                }
                None => html.push_str(r#"<td class="num muted">&mdash;</td>"#),
            }
        }
        html.push_str("</tr>");
    }

    html.push_str("</tbody></table></div></section>");
    html
}

fn sales_form(filters: &SalesFilters, stores: &[Store]) -> String {
    let mut store_options = String::new();
    for store in stores {
        let selected = if filters.store_ids.contains(&store.id) { " selected" } else { "" };
        let _ = write!(
            store_options,
            r#"<option value="{}"{selected}>{}</option>"#,
            store.id,
            escape(&store.name)
        );
    }

    let sort_options: String = [
        (SortKey::Store, "Store"),
        (SortKey::Date, "Date"),
        (SortKey::Sum, "Cash"),
        (SortKey::Cups, "Cups"),
        (SortKey::Packages, "Packages"),
    ]
    .iter()
    .map(|(key, label)| {
        let selected = if *key == filters.sort.key { " selected" } else { "" };
        format!(r#"<option value="{}"{selected}>{label}</option>"#, key.as_str())
    })
    .collect();

    let order_options: String = [(SortDirection::Asc, "Ascending"), (SortDirection::Desc, "Descending")]
        .iter()
        .map(|(direction, label)| {
            let selected = if *direction == filters.sort.direction { " selected" } else { "" };
            format!(r#"<option value="{}"{selected}>{label}</option>"#, direction.as_str())
        })
        .collect();

    format!(
        r#"<form class="filters" method="get" action="/sales">
      <input type="hidden" name="load" value="1" />
      <label>From <input type="date" name="start_date" value="{start}" /></label>
      <label>To <input type="date" name="end_date" value="{end}" /></label>
      <label>Stores <select name="store" multiple size="4">{store_options}</select></label>
      <label>Sort <select name="sort">{sort_options}</select></label>
      <label>Order <select name="order">{order_options}</select></label>
      <button class="button" type="submit">Show</button>
    </form>"#,
        start = filters.range.start,
        end = filters.range.end,
    )
}

fn stock_form(view: &StockView) -> String {
    let mut group_options = String::new();
    for group in &view.groups {
        let selected = if view.group_ids.contains(&group.id) { " selected" } else { "" };
        let _ = write!(
            group_options,
            r#"<option value="{}"{selected}>{}</option>"#,
            group.id,
            escape(&group.name)
        );
    }

    format!(
        r#"<form class="filters" method="get" action="/stock">
      <input type="hidden" name="load" value="1" />
      <label>Search <input type="search" name="search" value="{search}" /></label>
      <label>Groups <select name="group" multiple size="4">{group_options}</select></label>
      <label>Per page <input type="number" min="1" name="per_page" value="{per_page}" /></label>
      <button class="button" type="submit">Show</button>
    </form>"#,
        search = escape(&view.search),
        per_page = view.per_page,
    )
}

fn stock_table(rows: &[StockRecord]) -> String {
    let mut html = String::from(
        r#"<div class="table-wrap"><table><thead><tr><th>Group</th><th>Good</th><th class="num">Quantity</th><th class="num">Price</th><th class="num">Value</th></tr></thead><tbody>"#,
    );
    for row in rows {
        let _ = write!(
            html,
            r#"<tr><td>{}</td><td>{}</td><td class="num">{}</td><td class="num">{}</td><td class="num">{}</td></tr>"#,
            escape(&row.group_name),
            escape(&row.good_name),
            quantity(row.quantity),
            money(row.price),
            money(row.total_sum)
        );
    }
    html.push_str("</tbody></table></div>");
    html
}

fn pagination(view: &StockView, total_pages: usize) -> String {
    if total_pages <= 1 {
        return String::new();
    }
    let current = view.page.clamp(1, total_pages);
    let mut html = String::from(r#"<nav class="pages">"#);
    for page in 1..=total_pages {
        if page == current {
            let _ = write!(html, r#"<span class="tab active">{page}</span>"#);
        } else {
            let _ = write!(
                html,
                r#"<a class="tab" href="/stock?{}">{page}</a>"#,
                escape(&stock_query_string(view, page))
            );
        }
    }
    html.push_str("</nav>");
    html
}

fn stock_query_string(view: &StockView, page: usize) -> String {
    let mut pairs = vec![
        ("load".to_string(), "1".to_string()),
        ("page".to_string(), page.to_string()),
        ("per_page".to_string(), view.per_page.to_string()),
    ];
    if !view.search.is_empty() {
        pairs.push(("search".to_string(), view.search.clone()));
    }
    for id in &view.group_ids {
        pairs.push(("group".to_string(), id.to_string()));
    }

    Url::parse("http://localhost/stock")
        .map(|mut url| {
            url.query_pairs_mut().extend_pairs(pairs);
            url.query().unwrap_or_default().to_string()
        })
        .unwrap_or_default()
}

fn money(value: Decimal) -> String {
    format!(
        "{:.2}",
        value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

fn count(value: Decimal) -> String {
    value.normalize().to_string()
}

fn quantity(value: Decimal) -> String {
    value
        .round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

const LAYOUT_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{{TITLE}} &middot; {{APP_NAME}}</title>
  <style>
    @import url('https://fonts.googleapis.com/css2?family=Space+Grotesk:wght@400;500;600&family=Fraunces:wght@600&display=swap');

    :root {
      --bg-1: #f8f3e6;
      --bg-2: #f5d3a7;
      --ink: #2b2a28;
      --accent: #ff6b4a;
      --accent-2: #2f4858;
      --card: rgba(255, 255, 255, 0.86);
      --shadow: 0 24px 60px rgba(47, 72, 88, 0.18);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: radial-gradient(circle at top, var(--bg-2), transparent 60%),
        linear-gradient(135deg, var(--bg-1), #ffe9d4 60%, #f9f2e9 100%);
      color: var(--ink);
      font-family: "Space Grotesk", "Trebuchet MS", sans-serif;
      display: grid;
      justify-items: center;
      padding: 32px 18px 48px;
    }

    .app {
      width: min(1180px, 100%);
      background: var(--card);
      backdrop-filter: blur(12px);
      border-radius: 28px;
      box-shadow: var(--shadow);
      padding: 36px;
      display: grid;
      gap: 24px;
    }

    .topbar {
      display: flex;
      flex-wrap: wrap;
      align-items: center;
      justify-content: space-between;
      gap: 16px;
    }

    .brand {
      font-family: "Fraunces", "Georgia", serif;
      font-size: 1.2rem;
      color: var(--accent-2);
    }

    h1 {
      font-family: "Fraunces", "Georgia", serif;
      font-weight: 600;
      font-size: clamp(1.8rem, 4vw, 2.4rem);
      margin: 0;
    }

    h2 {
      margin: 0 0 8px;
      font-size: 1.2rem;
    }

    .subtitle {
      margin: 6px 0 0;
      color: #5f5c57;
    }

    .tabs {
      display: flex;
      gap: 6px;
      padding: 6px;
      background: rgba(47, 72, 88, 0.08);
      border-radius: 999px;
    }

    .tab {
      border-radius: 999px;
      padding: 8px 14px;
      font-size: 0.9rem;
      font-weight: 600;
      color: #6b645d;
      text-decoration: none;
    }

    .tab.active {
      background: white;
      color: var(--accent-2);
      box-shadow: 0 8px 16px rgba(47, 72, 88, 0.12);
    }

    .panel {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(160px, 1fr));
      gap: 16px;
    }

    .stat, .card {
      background: white;
      border-radius: 18px;
      padding: 18px;
      border: 1px solid rgba(47, 72, 88, 0.08);
    }

    .stat {
      display: grid;
      gap: 8px;
    }

    .stat .label {
      font-size: 0.8rem;
      text-transform: uppercase;
      letter-spacing: 0.12em;
      color: #8b857d;
    }

    .stat .value {
      font-size: 1.5rem;
      font-weight: 600;
      color: var(--accent-2);
    }

    .filters {
      display: flex;
      flex-wrap: wrap;
      align-items: end;
      gap: 14px;
    }

    .filters label {
      display: grid;
      gap: 4px;
      font-size: 0.85rem;
      color: #6b645d;
    }

    input, select {
      font: inherit;
      padding: 8px 10px;
      border-radius: 12px;
      border: 1px solid rgba(47, 72, 88, 0.2);
      background: white;
    }

    .button {
      appearance: none;
      border: none;
      border-radius: 999px;
      padding: 12px 20px;
      font: inherit;
      font-weight: 600;
      cursor: pointer;
      background: var(--accent);
      color: white;
      text-decoration: none;
      display: inline-block;
      box-shadow: 0 10px 24px rgba(255, 107, 74, 0.3);
    }

    .link {
      color: var(--accent-2);
      font-weight: 600;
    }

    .table-wrap {
      overflow-x: auto;
    }

    table {
      width: 100%;
      border-collapse: collapse;
      font-size: 0.92rem;
    }

    th, td {
      padding: 8px 10px;
      border-bottom: 1px solid rgba(47, 72, 88, 0.08);
      text-align: left;
      white-space: nowrap;
    }

    th {
      font-size: 0.75rem;
      text-transform: uppercase;
      letter-spacing: 0.08em;
      color: #8b857d;
    }

    .num {
      text-align: right;
      font-variant-numeric: tabular-nums;
    }

    .muted {
      color: #b3ada6;
    }

    .banner {
      border-radius: 14px;
      padding: 12px 16px;
      background: rgba(47, 72, 88, 0.08);
    }

    .banner[data-type="error"] {
      background: rgba(198, 59, 43, 0.12);
      color: #c63b2b;
    }

    .banner[data-type="warning"] {
      background: rgba(255, 179, 71, 0.2);
      color: #8a5a00;
    }

    .status {
      margin: 0;
      font-size: 0.95rem;
      color: #6b645d;
    }

    .status[data-type="error"] {
      color: #c63b2b;
    }

    .status[data-type="ok"] {
      color: #2d7a4b;
    }

    .pages {
      display: flex;
      flex-wrap: wrap;
      gap: 6px;
      margin-top: 12px;
    }

    .hint {
      margin: 0 0 12px;
      color: #6f6a65;
      font-size: 0.9rem;
    }

    footer {
      color: #8b857d;
      font-size: 0.8rem;
    }

    @media (max-width: 600px) {
      .app {
        padding: 28px 22px;
      }
    }
  </style>
</head>
<body>
  <main class="app">
    <div class="topbar">
      <span class="brand">{{APP_NAME}}</span>
      <nav class="tabs">{{NAV}}</nav>
    </div>
    {{BODY}}
    <footer>{{APP_NAME}} v{{APP_VERSION}}</footer>
  </main>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn settings() -> Settings {
        Settings::from_lookup(|name| (name == "PROXY_PRIMARY_TOKEN").then(|| "t".to_string()))
            .unwrap()
    }

    #[test]
    fn escape_neutralises_markup() {
        assert_eq!(escape(r#"<b>"A&B"</b>"#), "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;");
    }

    #[test]
    fn number_formats() {
        assert_eq!(money(Decimal::new(15505, 3)), "15.51");
        assert_eq!(money(Decimal::new(-15505, 3)), "-15.51");
        assert_eq!(money(Decimal::from(100)), "100.00");
        assert_eq!(count(Decimal::new(500, 2)), "5");
        assert_eq!(quantity(Decimal::new(12345, 4)), "1.235");
    }

    #[test]
    fn unconfigured_stock_renders_placeholder() {
        let view = StockView {
            loaded: true,
            configured: false,
            search: String::new(),
            group_ids: Vec::new(),
            page: 1,
            per_page: 50,
            groups: Vec::new(),
            result: None,
            error: None,
        };
        let html = render_stock(&settings(), &view);
        assert!(html.contains("Stock is not configured"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn stock_links_keep_filters() {
        let view = StockView {
            loaded: true,
            configured: true,
            search: "green tea".to_string(),
            group_ids: vec![4],
            page: 1,
            per_page: 20,
            groups: Vec::new(),
            result: None,
            error: None,
        };
        assert_eq!(
            stock_query_string(&view, 2),
            "load=1&page=2&per_page=20&search=green+tea&group=4"
        );
    }

    #[test]
    fn dashboard_without_load_prompts_and_escapes_app_name() {
        let mut settings = settings();
        settings.app_name = "<Cafe>".to_string();
        let view = DashboardView {
            range: DateRange::current_month("2025-01-15".parse().unwrap()),
            loaded: false,
            health: Health::NotLoaded,
            stores: Vec::new(),
            report: None,
            error: Some("proxy down".to_string()),
        };
        let html = render_dashboard(&settings, &view, 10);
        assert!(html.contains("2025-01-01"));
        assert!(html.contains("/?load=1"));
        assert!(html.contains("proxy down"));
        assert!(html.contains("&lt;Cafe&gt;"));
        assert!(!html.contains("<Cafe>"));
    }
}
