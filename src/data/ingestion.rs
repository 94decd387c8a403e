use super::table::{PriceField, PriceSeries, PriceTable, RawPriceTable};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const ADJUSTED_CLOSE_FIELD: &str = "Adj Close";
pub const CLOSE_FIELD: &str = "Close";

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Source of historical prices for a set of assets.
///
/// Implementations return a single raw table for the whole universe or fail
/// as a whole. Assets that could not be retrieved individually should still
/// appear, as columns without observations.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(
        &self,
        assets: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: &str,
    ) -> Result<RawPriceTable>;
}

/// Adjusted and plain closes of one asset.
#[derive(Debug, Clone)]
pub struct AssetHistory {
    pub adjusted: PriceSeries,
    pub close: PriceSeries,
}

impl AssetHistory {
    fn empty(asset: &str) -> Self {
        Self {
            adjusted: PriceSeries::empty(asset),
            close: PriceSeries::empty(asset),
        }
    }
}

/// Price source backed by the Yahoo Finance v8 chart endpoint.
///
/// One request is issued per asset. A failing asset is logged and returned
/// as an empty column instead of failing the whole fetch.
#[derive(Clone)]
pub struct YahooPriceSource {
    client: reqwest::Client,
    base_url: String,
}

impl YahooPriceSource {
    /// Creates a new `YahooPriceSource` with a 10 second request timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new() -> Result<Self> {
        Self::with_base_url(CHART_URL)
    }

    /// Same as [`YahooPriceSource::new`] but against another chart endpoint.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PipelineError::Fetch(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Fetches the adjusted and plain close history of one asset.
    ///
    /// # Arguments
    /// * `asset`: Yahoo ticker, e.g. "AAPL" or "BTC-USD"
    /// * `start`: Beginning of the window (inclusive)
    /// * `end`: End of the window (inclusive)
    /// * `interval`: Sampling interval, e.g. "1d"
    ///
    /// # Errors
    /// Returns an error if:
    /// - The request fails or the endpoint answers with a non-success status
    /// - The response cannot be parsed
    /// - The endpoint reports an error or no result for the asset
    pub async fn fetch_asset(
        &self,
        asset: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: &str,
    ) -> Result<AssetHistory> {
        let url = format!("{}/{}", self.base_url, asset);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", start.timestamp().to_string()),
                ("period2", end.timestamp().to_string()),
                ("interval", interval.to_string()),
                ("events", "div,splits".to_string()),
            ])
            .send()
            .await
            .map_err(|e| PipelineError::Fetch(format!("{}: {}", asset, e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Fetch(format!(
                "{}: HTTP {}",
                asset,
                response.status()
            )));
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Fetch(format!("{}: invalid response: {}", asset, e)))?;

        parse_chart(asset, body, interval == "1d")
    }
}

#[async_trait]
impl PriceSource for YahooPriceSource {
    async fn fetch(
        &self,
        assets: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: &str,
    ) -> Result<RawPriceTable> {
        info!(assets = assets.len(), %start, %end, interval, "Fetching price history");

        let mut histories = Vec::with_capacity(assets.len());
        for asset in assets {
            let history = match self.fetch_asset(asset, start, end, interval).await {
                Ok(history) => history,
                Err(e) => {
                    warn!(asset = %asset, error = %e, "Price history unavailable");
                    AssetHistory::empty(asset)
                }
            };
            histories.push(history);
        }

        merge_histories(histories)
    }
}

/// Lays per-asset histories out as a two-field raw table.
///
/// # Errors
/// Returns [`PipelineError::Fetch`] if not a single asset has a price.
pub fn merge_histories(histories: Vec<AssetHistory>) -> Result<RawPriceTable> {
    if histories
        .iter()
        .all(|h| h.adjusted.is_empty() && h.close.is_empty())
    {
        return Err(PipelineError::Fetch(
            "no price data returned for any asset".to_string(),
        ));
    }

    let (adjusted, close): (Vec<_>, Vec<_>) = histories
        .into_iter()
        .map(|h| (h.adjusted, h.close))
        .unzip();

    let mut raw = RawPriceTable::new();
    // A source that never supplied adjusted prices gets a close-only table.
    if adjusted.iter().any(|s| !s.is_empty()) {
        let close_only = close_only_assets(&adjusted, &close);
        if !close_only.is_empty() {
            debug!(
                assets = %close_only.join(", "),
                "Assets without adjusted close will be dropped when adjusted close is selected"
            );
        }
        raw.push_field(
            PriceField::new(ADJUSTED_CLOSE_FIELD),
            PriceTable::from_series(adjusted),
        );
    }
    raw.push_field(PriceField::new(CLOSE_FIELD), PriceTable::from_series(close));

    Ok(raw)
}

/// Assets that have plain closes but no adjusted close.
fn close_only_assets(adjusted: &[PriceSeries], close: &[PriceSeries]) -> Vec<String> {
    adjusted
        .iter()
        .zip(close)
        .filter(|(a, c)| a.is_empty() && !c.is_empty())
        .map(|(_, c)| c.asset.clone())
        .collect()
}

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize, Debug)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    description: String,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    adjclose: Option<Vec<AdjClose>>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Deserialize, Debug)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn parse_chart(asset: &str, body: ChartResponse, daily: bool) -> Result<AssetHistory> {
    if let Some(error) = body.chart.error {
        return Err(PipelineError::Fetch(format!(
            "{}: {}",
            asset, error.description
        )));
    }

    let result = body
        .chart
        .result
        .and_then(|mut results| results.pop())
        .ok_or_else(|| PipelineError::Fetch(format!("{}: no chart result", asset)))?;

    let timestamps: Vec<DateTime<Utc>> = result
        .timestamp
        .iter()
        .map(|&ts| {
            let instant = Utc.timestamp_opt(ts, 0).single();
            if daily {
                // Different exchanges stamp the same session at different
                // hours; daily rows must share one axis.
                instant.and_then(|t| t.date_naive().and_hms_opt(0, 0, 0).map(|d| d.and_utc()))
            } else {
                instant
            }
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| PipelineError::Fetch(format!("{}: invalid timestamp", asset)))?;

    let close = result
        .indicators
        .quote
        .first()
        .map(|q| q.close.as_slice())
        .unwrap_or_default();
    let adjusted = result
        .indicators
        .adjclose
        .as_ref()
        .and_then(|list| list.first())
        .map(|a| a.adjclose.as_slice())
        .unwrap_or_default();

    let history = AssetHistory {
        adjusted: observed_series(asset, &timestamps, adjusted),
        close: observed_series(asset, &timestamps, close),
    };
    debug!(
        asset,
        adjusted = history.adjusted.points().len(),
        close = history.close.points().len(),
        "Parsed chart response"
    );

    Ok(history)
}

fn observed_series(
    asset: &str,
    timestamps: &[DateTime<Utc>],
    values: &[Option<f64>],
) -> PriceSeries {
    let points = timestamps
        .iter()
        .zip(values)
        .filter_map(|(timestamp, value)| {
            value
                .filter(|price| price.is_finite())
                .map(|price| (*timestamp, price))
        })
        .collect();

    PriceSeries::new(asset, points)
}
