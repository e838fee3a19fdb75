//! The sync engine: one pass from token exchange to write-back summary.
//!
//! Stage order is authenticate, list, extract, resolve, write. Failures in
//! the first two stages abort the run; everything after degrades per record
//! and is reported in the summary.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::SecondsFormat;
use futures::StreamExt;
use reqwest::Client;
use serde_json::json;

use crate::bitable::BitableClient;
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::quotes::{QuoteResolver, YahooQuoteSource};

use super::{extract_instruments, SyncSummary, UpdateOutcome};

/// Coordinates one synchronization pass.
pub struct SyncEngine {
    config: SyncConfig,
    bitable: BitableClient,
    resolver: QuoteResolver,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build an engine with an explicit clock so tests can pin the written
    /// timestamp.
    pub fn with_clock(config: SyncConfig, clock: Arc<dyn Clock>) -> Result<Self, SyncError> {
        let client = match config.request_timeout {
            Some(timeout) => Client::builder().timeout(timeout).build().map_err(|e| {
                SyncError::Config(format!("failed to build http client: {e}"))
            })?,
            None => Client::new(),
        };

        let bitable = BitableClient::with_client(
            config.app_id.clone(),
            config.app_secret.clone(),
            client.clone(),
        )
        .with_base_url(config.api_base.clone());

        let source =
            Arc::new(YahooQuoteSource::with_client(client).with_base_url(config.quote_base.clone()));
        let resolver = QuoteResolver::new(source, config.lookup_delay, config.lookup_concurrency)
            .with_clock(clock);

        Ok(Self {
            config,
            bitable,
            resolver,
        })
    }

    /// Run one pass. Only returns `Err` for the fatal conditions (auth or
    /// listing); per-symbol and per-record failures end up in the summary.
    pub async fn run(&self) -> Result<SyncSummary, SyncError> {
        let config = &self.config;

        let token = self.bitable.tenant_access_token().await?;

        let records = self
            .bitable
            .list_records(&token, &config.app_token, &config.table_id, config.page_size)
            .await?;
        tracing::info!(records = records.len(), table = %config.table_id, "listed table records");

        let extraction = extract_instruments(records, &config.fields.symbol);
        let mut summary = SyncSummary {
            skipped_no_identifier: extraction.skipped_no_identifier,
            ..Default::default()
        };

        if extraction.instruments.is_empty() {
            tracing::warn!(
                skipped = extraction.skipped_no_identifier,
                "no valid identifiers found, nothing to sync"
            );
            return Ok(summary);
        }

        // Resolve each distinct symbol once even when several rows share it.
        let mut seen = HashSet::new();
        let symbols: Vec<String> = extraction
            .instruments
            .iter()
            .map(|i| i.symbol.clone())
            .filter(|s| seen.insert(s.clone()))
            .collect();

        let book = self.resolver.resolve(&symbols).await;

        // Records without a resolved price are left untouched.
        let mut priced = Vec::new();
        for instrument in &extraction.instruments {
            match book.get(&instrument.symbol) {
                Some(quote) => priced.push((instrument, quote.clone())),
                None => summary.unresolved += 1,
            }
        }

        let bitable = &self.bitable;
        let token = &token;
        let app_token = config.app_token.as_str();
        let table_id = config.table_id.as_str();
        let price_field = &config.fields.price;
        let updated_field = &config.fields.updated_at;

        let outcomes: Vec<UpdateOutcome> =
            futures::stream::iter(priced.into_iter().map(|(instrument, quote)| async move {
                let mut fields = HashMap::new();
                fields.insert(price_field.clone(), json!(quote.price));
                fields.insert(
                    updated_field.clone(),
                    json!(quote
                        .observed_at
                        .to_rfc3339_opts(SecondsFormat::Secs, true)),
                );

                match bitable
                    .update_record(token, app_token, table_id, &instrument.record_id, &fields)
                    .await
                {
                    Ok(()) => {
                        tracing::debug!(
                            record = %instrument.record_id,
                            symbol = %instrument.symbol,
                            price = quote.price,
                            "record updated"
                        );
                        UpdateOutcome::ok(instrument.record_id.as_str(), instrument.symbol.as_str())
                    }
                    Err(e) => {
                        tracing::warn!(
                            record = %instrument.record_id,
                            symbol = %instrument.symbol,
                            error = %e,
                            "record update failed"
                        );
                        UpdateOutcome::failed(
                            instrument.record_id.as_str(),
                            instrument.symbol.as_str(),
                            e.to_string(),
                        )
                    }
                }
            }))
            .buffer_unordered(config.write_concurrency.max(1))
            .collect()
            .await;

        summary.attempted = outcomes.len();
        summary.succeeded = outcomes.iter().filter(|o| o.succeeded).count();
        summary.failed = summary.attempted - summary.succeeded;

        tracing::info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            unresolved = summary.unresolved,
            skipped = summary.skipped_no_identifier,
            "sync pass complete"
        );

        Ok(summary)
    }
}
