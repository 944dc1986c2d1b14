use crate::errors::AppError;
use crate::models::{SalesResponse, Store};
use crate::normalize;
use crate::sales::{is_load_requested, load_sales, DateRange, SalesFilters};
use crate::state::AppState;
use crate::stock;
use crate::ui::{
    render_dashboard, render_not_found, render_sales, render_stock, DashboardView, Health,
    SalesView, StockPage, StockView,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    Json,
};
use serde_json::Value;
use tracing::warn;

type Params = Query<Vec<(String, String)>>;

const PREVIEW_ROWS: usize = 10;

pub async fn dashboard(State(state): State<AppState>, Query(params): Params) -> Html<String> {
    let range = DateRange::current_month_utc();
    let mut view = DashboardView {
        range,
        loaded: is_load_requested(&params),
        health: Health::NotLoaded,
        stores: Vec::new(),
        report: None,
        error: None,
    };

    if view.loaded {
        let filters = SalesFilters {
            range,
            store_ids: Vec::new(),
            sort: Default::default(),
        };
        let (health, report) = tokio::join!(
            state.client.health(),
            load_sales(
                &state.client,
                &state.aggregator,
                state.settings.partial_sources,
                &filters,
            ),
        );

        view.health = match health {
            Ok(body) => Health::Up(body),
            Err(err) => Health::Down(err.to_string()),
        };
        match report {
            Ok(report) => {
                view.stores = report.stores.clone();
                view.report = Some(report);
            }
            Err(err) => {
                warn!("dashboard load failed: {err}");
                view.error = Some(format!("Could not load data from the proxy API: {err}"));
            }
        }
    }

    Html(render_dashboard(&state.settings, &view, PREVIEW_ROWS))
}

pub async fn sales(
    State(state): State<AppState>,
    Query(params): Params,
) -> Result<Html<String>, AppError> {
    let filters = SalesFilters::from_query(&params, DateRange::current_month_utc())?;
    let mut view = SalesView {
        filters,
        loaded: is_load_requested(&params),
        stores: Vec::new(),
        report: None,
        error: None,
    };

    if view.loaded {
        match load_sales(
            &state.client,
            &state.aggregator,
            state.settings.partial_sources,
            &view.filters,
        )
        .await
        {
            Ok(report) => {
                view.stores = report.stores.clone();
                view.report = Some(report);
            }
            Err(err) => {
                warn!("sales load failed: {err}");
                view.error = Some(format!("Sales query failed: {err}"));
                view.stores = stores_or_empty(&state).await;
            }
        }
    } else {
        view.stores = stores_or_empty(&state).await;
    }

    Ok(Html(render_sales(&state.settings, &view)))
}

pub async fn stock(State(state): State<AppState>, Query(params): Params) -> Html<String> {
    let value = |name: &str| {
        params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.trim().to_string())
    };
    let page = value("page").and_then(|v| v.parse().ok()).unwrap_or(1);
    let per_page = value("per_page")
        .and_then(|v| v.parse().ok())
        .filter(|n: &usize| *n > 0)
        .unwrap_or(stock::DEFAULT_PER_PAGE);
    let search = value("search").unwrap_or_default();
    let group_ids: Vec<i64> = params
        .iter()
        .filter(|(key, _)| key == "group")
        .filter_map(|(_, value)| value.trim().parse().ok())
        .collect();

    let mut view = StockView {
        loaded: is_load_requested(&params),
        configured: state.settings.stock_query.is_some(),
        search,
        group_ids,
        page,
        per_page,
        groups: Vec::new(),
        result: None,
        error: None,
    };

    if view.configured {
        match state.client.get_stock().await {
            Ok(rows) => {
                let records = normalize::stock_rows(&rows.unwrap_or_default());
                view.groups = stock::unique_groups(&records);
                if view.loaded {
                    let records = stock::filter_by_groups(records, &view.group_ids);
                    let records = stock::search(records, &view.search);
                    let summary = stock::summarize(&records);
                    let (rows, total_pages) = stock::paginate(&records, view.page, view.per_page);
                    view.result = Some(StockPage {
                        rows: rows.to_vec(),
                        total_pages,
                        summary,
                    });
                }
            }
            Err(err) if view.loaded => {
                warn!("stock load failed: {err}");
                view.error = Some(format!("Stock query failed: {err}"));
            }
            Err(err) => warn!("stock groups unavailable: {err}"),
        }
    }

    Html(render_stock(&state.settings, &view))
}

pub async fn api_sales(
    State(state): State<AppState>,
    Query(params): Params,
) -> Result<Json<SalesResponse>, AppError> {
    let filters = SalesFilters::from_query(&params, DateRange::current_month_utc())?;
    let report = load_sales(
        &state.client,
        &state.aggregator,
        state.settings.partial_sources,
        &filters,
    )
    .await?;
    Ok(Json(report.into_payload()))
}

pub async fn api_stores(State(state): State<AppState>) -> Result<Json<Vec<Store>>, AppError> {
    Ok(Json(state.client.get_stores().await?))
}

pub async fn api_health(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    Ok(Json(state.client.health().await?))
}

pub async fn not_found(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html(render_not_found(&state.settings)))
}

async fn stores_or_empty(state: &AppState) -> Vec<Store> {
    match state.client.get_stores().await {
        Ok(stores) => stores,
        Err(err) => {
            warn!("store list unavailable: {err}");
            Vec::new()
        }
    }
}
