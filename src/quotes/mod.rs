//! Best-effort quote resolution.
//!
//! Resolution never fails as a whole: each symbol is looked up in isolation
//! and failures degrade to missing entries in the resulting [`QuoteBook`].

pub mod symbol;
pub mod yahoo;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::StreamExt;

use crate::clock::{Clock, SystemClock};

pub use yahoo::YahooQuoteSource;

/// A resolved price for one display symbol.
#[derive(Debug, Clone)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

/// Trait for quote sources - fetches a current price for one symbol.
///
/// `Ok(None)` means the source has no usable price for the symbol; `Err`
/// means the lookup itself failed. The resolver treats both as a missing
/// entry, never as a fatal condition.
#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    async fn latest_price(&self, symbol: &str) -> Result<Option<f64>>;

    /// Human-readable name for this source.
    fn name(&self) -> &str;
}

/// Outcome of resolving a set of symbols. Absence of a key signals an
/// unresolved symbol; the reason is kept alongside for the summary.
#[derive(Debug, Default)]
pub struct QuoteBook {
    pub quotes: HashMap<String, Quote>,
    /// (display symbol, reason) pairs for symbols that yielded no price.
    pub unresolved: Vec<(String, String)>,
}

impl QuoteBook {
    pub fn get(&self, display_symbol: &str) -> Option<&Quote> {
        self.quotes.get(display_symbol)
    }
}

/// Resolves display symbols to quotes with bounded concurrency and a fixed
/// courtesy delay per worker between lookups.
pub struct QuoteResolver {
    source: Arc<dyn QuoteSource>,
    delay: Duration,
    concurrency: usize,
    clock: Arc<dyn Clock>,
}

impl QuoteResolver {
    pub fn new(source: Arc<dyn QuoteSource>, delay: Duration, concurrency: usize) -> Self {
        Self {
            source,
            delay,
            concurrency: concurrency.max(1),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Resolve every symbol independently. A failed or empty lookup drops
    /// the symbol from the book and records a warning; it never aborts the
    /// remaining lookups.
    pub async fn resolve(&self, display_symbols: &[String]) -> QuoteBook {
        let source = &self.source;
        let delay = self.delay;

        let results: Vec<(String, Result<Option<f64>>)> =
            futures::stream::iter(display_symbols.iter().cloned().map(|display| async move {
                let lookup = symbol::lookup_symbol(&display);
                let outcome = source.latest_price(&lookup).await;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                (display, outcome)
            }))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut book = QuoteBook::default();
        for (display_symbol, outcome) in results {
            match outcome {
                Ok(Some(price)) if price.is_finite() && price > 0.0 => {
                    book.quotes.insert(
                        display_symbol.clone(),
                        Quote {
                            symbol: display_symbol,
                            price,
                            observed_at: self.clock.now(),
                        },
                    );
                }
                Ok(_) => {
                    tracing::warn!(symbol = %display_symbol, source = source.name(), "no usable price");
                    book.unresolved
                        .push((display_symbol, "no usable price".to_string()));
                }
                Err(e) => {
                    tracing::warn!(symbol = %display_symbol, source = source.name(), error = %e, "quote lookup failed");
                    book.unresolved.push((display_symbol, e.to_string()));
                }
            }
        }
        book
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    enum Scripted {
        Price(f64),
        Missing,
        Fail(&'static str),
    }

    struct ScriptedSource {
        outcomes: HashMap<String, Scripted>,
    }

    #[async_trait::async_trait]
    impl QuoteSource for ScriptedSource {
        async fn latest_price(&self, symbol: &str) -> Result<Option<f64>> {
            match self.outcomes.get(symbol) {
                Some(Scripted::Price(p)) => Ok(Some(*p)),
                Some(Scripted::Missing) | None => Ok(None),
                Some(Scripted::Fail(msg)) => Err(anyhow!(*msg)),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn resolver(outcomes: HashMap<String, Scripted>) -> QuoteResolver {
        QuoteResolver::new(
            Arc::new(ScriptedSource { outcomes }),
            Duration::ZERO,
            2,
        )
    }

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn failed_lookup_does_not_abort_others() {
        let resolver = resolver(HashMap::from([
            ("A".to_string(), Scripted::Fail("connection reset")),
            ("B".to_string(), Scripted::Price(42.0)),
        ]));

        let book = resolver.resolve(&symbols(&["A", "B"])).await;
        assert_eq!(book.quotes.len(), 1);
        assert_eq!(book.get("B").unwrap().price, 42.0);
        assert_eq!(book.unresolved.len(), 1);
        assert_eq!(book.unresolved[0].0, "A");
        assert!(book.unresolved[0].1.contains("connection reset"));
    }

    #[tokio::test]
    async fn missing_price_is_dropped_not_inserted() {
        let resolver = resolver(HashMap::from([
            ("GONE".to_string(), Scripted::Missing),
        ]));

        let book = resolver.resolve(&symbols(&["GONE"])).await;
        assert!(book.quotes.is_empty());
        assert_eq!(book.unresolved.len(), 1);
    }

    #[tokio::test]
    async fn non_finite_and_non_positive_prices_are_rejected() {
        let resolver = resolver(HashMap::from([
            ("NAN".to_string(), Scripted::Price(f64::NAN)),
            ("ZERO".to_string(), Scripted::Price(0.0)),
            ("OK".to_string(), Scripted::Price(1.5)),
        ]));

        let book = resolver.resolve(&symbols(&["NAN", "ZERO", "OK"])).await;
        assert_eq!(book.quotes.len(), 1);
        assert!(book.get("OK").is_some());
        assert_eq!(book.unresolved.len(), 2);
    }

    #[tokio::test]
    async fn lookup_uses_rewritten_symbol_but_keys_by_display() {
        // The scripted source only knows the provider form.
        let resolver = resolver(HashMap::from([
            ("600519.SS".to_string(), Scripted::Price(1700.0)),
        ]));

        let book = resolver.resolve(&symbols(&["600519.SH"])).await;
        assert_eq!(book.get("600519.SH").unwrap().price, 1700.0);
        assert!(book.get("600519.SS").is_none());
    }

    #[tokio::test]
    async fn timestamp_comes_from_the_clock() {
        use crate::clock::FixedClock;
        use chrono::TimeZone;

        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let resolver = resolver(HashMap::from([
            ("AAPL".to_string(), Scripted::Price(187.0)),
        ]))
        .with_clock(Arc::new(FixedClock::new(now)));

        let book = resolver.resolve(&symbols(&["AAPL"])).await;
        assert_eq!(book.get("AAPL").unwrap().observed_at, now);
    }
}
