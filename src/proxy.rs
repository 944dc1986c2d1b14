use crate::config::Settings;
use crate::errors::{ProxyError, QueryError};
use crate::models::{MetricSource, Store};
use crate::normalize;
use crate::queries::{self, SqlQuery};
use crate::sales::DateRange;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

const RETRY_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];
const RETRIES: u32 = 1;
const BACKOFF: Duration = Duration::from_millis(300);

/// Raw rows of the three metric queries. Each one fails on its own so the
/// caller can decide what a missing source means.
#[derive(Debug)]
pub struct RawSales {
    pub cash: Result<Vec<Value>, ProxyError>,
    pub cups: Result<Vec<Value>, ProxyError>,
    pub packages: Result<Vec<Value>, ProxyError>,
}

impl RawSales {
    pub fn failures(&self) -> Vec<(MetricSource, &ProxyError)> {
        [
            (MetricSource::Cash, self.cash.as_ref().err()),
            (MetricSource::Cups, self.cups.as_ref().err()),
            (MetricSource::Packages, self.packages.as_ref().err()),
        ]
        .into_iter()
        .filter_map(|(metric, err)| err.map(|err| (metric, err)))
        .collect()
    }
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a [Value]>,
}

/// Client for the HTTP proxy that runs SQL against the Firebird database.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: Client,
    base_url: String,
    tokens: Vec<String>,
    settings: Settings,
}

impl ProxyClient {
    pub fn new(settings: &Settings) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .timeout(settings.proxy_timeout)
            .connect_timeout(settings.proxy_timeout)
            .build()?;

        let mut tokens = vec![settings.proxy_primary_token.clone()];
        tokens.extend(settings.proxy_fallback_token.clone());

        Ok(Self {
            client,
            base_url: settings.proxy_api_url.trim_end_matches('/').to_string(),
            tokens,
            settings: settings.clone(),
        })
    }

    pub async fn health(&self) -> Result<Value, ProxyError> {
        let response = self.request(Method::GET, "/api/health", None).await?;
        Ok(response.json().await?)
    }

    pub async fn get_stores(&self) -> Result<Vec<Store>, ProxyError> {
        let rows = self.execute_query(queries::STORES_QUERY, None).await?;
        Ok(normalize::stores(&rows))
    }

    pub async fn get_sales(
        &self,
        store_ids: &[i64],
        range: &DateRange,
    ) -> Result<RawSales, QueryError> {
        let sums = queries::sums_query(store_ids, range)?;
        let cups = queries::cups_query(store_ids, range, &self.settings.cup_categories)?;
        let packages = queries::packages_query(store_ids, range, &self.settings.package_groups)?;

        let (cash, cups, packages) = tokio::join!(
            self.run(&sums),
            self.run(&cups),
            self.run(&packages),
        );
        Ok(RawSales {
            cash,
            cups,
            packages,
        })
    }

    /// Runs the configured stock query. `Ok(None)` when none is configured.
    pub async fn get_stock(&self) -> Result<Option<Vec<Value>>, ProxyError> {
        match &self.settings.stock_query {
            Some(query) => self.execute_query(query, None).await.map(Some),
            None => Ok(None),
        }
    }

    async fn run(&self, query: &SqlQuery) -> Result<Vec<Value>, ProxyError> {
        self.execute_query(&query.sql, Some(query.params.as_slice())).await
    }

    pub async fn execute_query(
        &self,
        query: &str,
        params: Option<&[Value]>,
    ) -> Result<Vec<Value>, ProxyError> {
        let payload = serde_json::to_value(QueryRequest { query, params })
            .map_err(|err| ProxyError::UnexpectedResponse(err.to_string()))?;
        let response = self.request(Method::POST, "/api/query", Some(&payload)).await?;
        let body: Value = response.json().await?;
        rows_from_body(body)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ProxyError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error = None;

        for (index, token) in self.tokens.iter().enumerate() {
            let response = match self.send_with_retry(&method, &url, token, body).await {
                Ok(response) => response,
                Err(err) => {
                    error!("proxy API request failed ({method} {url}): {err}");
                    last_error = Some(ProxyError::Http(err));
                    continue;
                }
            };

            let status = response.status();
            let has_fallback = index + 1 < self.tokens.len();
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) && has_fallback {
                warn!("proxy token {} rejected with {status}, trying fallback token", index + 1);
                continue;
            }
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                last_error = Some(ProxyError::Unauthorized);
                break;
            }
            if status.is_client_error() || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                return Err(ProxyError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or(ProxyError::Unauthorized))
    }

    async fn send_with_retry(
        &self,
        method: &Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut attempt = 0;
        loop {
            let mut request = self
                .client
                .request(method.clone(), url)
                .bearer_auth(token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let retry_after = BACKOFF * 2u32.pow(attempt);
            match request.send().await {
                Ok(response) if attempt < RETRIES && RETRY_STATUSES.contains(&response.status()) => {
                    debug!("proxy answered {}, retrying {method} {url}", response.status());
                }
                Ok(response) => return Ok(response),
                Err(err) if attempt < RETRIES && (err.is_connect() || err.is_timeout()) => {
                    debug!("proxy request error, retrying {method} {url}: {err}");
                }
                Err(err) => return Err(err),
            }

            attempt += 1;
            sleep(retry_after).await;
        }
    }
}

fn rows_from_body(body: Value) -> Result<Vec<Value>, ProxyError> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut object) => {
            if object.get("success").and_then(Value::as_bool) == Some(false) {
                let reason = ["error", "detail", "message"]
                    .iter()
                    .find_map(|key| object.get(*key))
                    .map(|value| match value {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| "no reason given".to_string());
                return Err(ProxyError::QueryRejected(reason));
            }
            match object.remove("data") {
                Some(Value::Array(rows)) => Ok(rows),
                Some(Value::Null) => Ok(Vec::new()),
                Some(other) => Err(ProxyError::UnexpectedResponse(format!(
                    "data is not a list: {other}"
                ))),
                None => Err(ProxyError::UnexpectedResponse(
                    "response has no data field".to_string(),
                )),
            }
        }
        other => Err(ProxyError::UnexpectedResponse(other.to_string())),
    }
}
