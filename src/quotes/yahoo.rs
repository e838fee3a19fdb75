//! Yahoo Finance chart API quote source.
//!
//! Unauthenticated and unreliable for some symbols: unknown tickers come
//! back as 404 or with empty/null price arrays. Two tiers are tried per
//! lookup: the live regular market price from the chart metadata, then the
//! most recent finite daily close.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;

use super::QuoteSource;

const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteBlock>,
}

#[derive(Debug, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Quote source backed by Yahoo's v8 chart endpoint.
pub struct YahooQuoteSource {
    base_url: String,
    client: Client,
}

impl Default for YahooQuoteSource {
    fn default() -> Self {
        Self::new()
    }
}

impl YahooQuoteSource {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            base_url: YAHOO_BASE_URL.to_string(),
            client,
        }
    }

    /// Override API base URL (useful for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn usable(price: f64) -> bool {
        price.is_finite() && price > 0.0
    }
}

#[async_trait::async_trait]
impl QuoteSource for YahooQuoteSource {
    async fn latest_price(&self, symbol: &str) -> Result<Option<f64>> {
        let url = format!(
            "{}/v8/finance/chart/{symbol}",
            self.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .get(&url)
            .query(&[("range", "5d"), ("interval", "1d")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Unknown symbols come back as 404; treat as "no quote".
            if status.as_u16() == 404 {
                return Ok(None);
            }
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("yahoo chart request failed ({status}): {body}"));
        }

        let envelope: ChartEnvelope = response.json().await?;

        if let Some(error) = envelope.chart.error {
            return Err(anyhow!(
                "yahoo chart error ({}): {}",
                error.code,
                error.description
            ));
        }

        let Some(result) = envelope.chart.result.and_then(|mut r| {
            if r.is_empty() {
                None
            } else {
                Some(r.remove(0))
            }
        }) else {
            return Ok(None);
        };

        // Tier 1: live regular market price.
        if let Some(price) = result.meta.regular_market_price.filter(|p| Self::usable(*p)) {
            return Ok(Some(price));
        }

        // Tier 2: most recent finite daily close.
        let close = result
            .indicators
            .unwrap_or_default()
            .quote
            .into_iter()
            .flat_map(|block| block.close.into_iter().rev())
            .flatten()
            .find(|p| Self::usable(*p));

        Ok(close)
    }

    fn name(&self) -> &str {
        "yahoo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chart_payload() {
        let json = r#"{
            "chart": {
                "result": [{
                    "meta": {"regularMarketPrice": 187.23, "currency": "USD"},
                    "indicators": {"quote": [{"close": [185.1, null, 186.4]}]}
                }],
                "error": null
            }
        }"#;

        let envelope: ChartEnvelope = serde_json::from_str(json).unwrap();
        let result = &envelope.chart.result.unwrap()[0];
        assert_eq!(result.meta.regular_market_price, Some(187.23));
    }

    #[test]
    fn parses_error_payload() {
        let json = r#"{
            "chart": {
                "result": null,
                "error": {"code": "Not Found", "description": "No data found"}
            }
        }"#;

        let envelope: ChartEnvelope = serde_json::from_str(json).unwrap();
        assert!(envelope.chart.result.is_none());
        assert_eq!(envelope.chart.error.unwrap().code, "Not Found");
    }

    #[test]
    fn usable_rejects_non_positive_and_nan() {
        assert!(YahooQuoteSource::usable(12.5));
        assert!(!YahooQuoteSource::usable(0.0));
        assert!(!YahooQuoteSource::usable(-3.0));
        assert!(!YahooQuoteSource::usable(f64::NAN));
        assert!(!YahooQuoteSource::usable(f64::INFINITY));
    }

    #[test]
    fn provider_name() {
        assert_eq!(YahooQuoteSource::new().name(), "yahoo");
    }
}
