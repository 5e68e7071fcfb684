//! Price resolution over ordered provider fallback chains.
//!
//! The resolver never returns an error: every failure degrades to an absent
//! entry in the output map, and the caller layers fresh quotes over the
//! last-known cache so holdings without a fresh quote keep their old price.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::price::{CryptoProvider, CryptoQuote, EquityProvider, EquityQuote};

pub const EQUITY_TIMEOUT: Duration = Duration::from_secs(8);

pub struct PriceResolver {
    crypto_chain: Vec<Arc<dyn CryptoProvider>>,
    equity_chain: Vec<Arc<dyn EquityProvider>>,
    equity_timeout: Duration,
}

impl PriceResolver {
    /// Providers are tried in the given order; this is a fallback chain,
    /// never a race.
    pub fn new(
        crypto_chain: Vec<Arc<dyn CryptoProvider>>,
        equity_chain: Vec<Arc<dyn EquityProvider>>,
    ) -> Self {
        PriceResolver {
            crypto_chain,
            equity_chain,
            equity_timeout: EQUITY_TIMEOUT,
        }
    }

    pub fn with_equity_timeout(mut self, timeout: Duration) -> Self {
        self.equity_timeout = timeout;
        self
    }

    /// Resolves the crypto ids against the chain, first success wins. A later
    /// provider is only consulted when the one before it fails outright;
    /// exhausting the chain yields an empty map.
    pub async fn resolve_crypto(&self, ids: &[String]) -> HashMap<String, CryptoQuote> {
        if ids.is_empty() {
            return HashMap::new();
        }

        for provider in &self.crypto_chain {
            match provider.fetch_prices(ids).await {
                Ok(quotes) => {
                    debug!(
                        "Resolved {}/{} crypto ids via {}",
                        quotes.len(),
                        ids.len(),
                        provider.name()
                    );
                    return quotes;
                }
                Err(e) => {
                    warn!(
                        "Crypto provider {} failed: {}. Trying next.",
                        provider.name(),
                        e
                    );
                }
            }
        }
        warn!("All crypto providers exhausted, no fresh quotes this cycle");
        HashMap::new()
    }

    /// Resolves every symbol independently and concurrently. Each symbol
    /// walks the proxy chain in order under a per-call timeout; a symbol
    /// whose chain is exhausted is absent from the result, not an error.
    pub async fn resolve_equities(&self, symbols: &[String]) -> HashMap<String, EquityQuote> {
        let attempts = symbols.iter().map(|symbol| async move {
            let quote = self.resolve_one_equity(symbol).await;
            (symbol.clone(), quote)
        });

        join_all(attempts)
            .await
            .into_iter()
            .filter_map(|(symbol, quote)| quote.map(|q| (symbol, q)))
            .collect()
    }

    async fn resolve_one_equity(&self, symbol: &str) -> Option<EquityQuote> {
        for provider in &self.equity_chain {
            match timeout(self.equity_timeout, provider.fetch_quote(symbol)).await {
                Ok(Ok(quote)) => {
                    debug!("Resolved {} via {}", symbol, provider.name());
                    return Some(quote);
                }
                Ok(Err(e)) => {
                    warn!(
                        "Equity provider {} failed for {}: {}. Trying next.",
                        provider.name(),
                        symbol,
                        e
                    );
                }
                Err(_) => {
                    warn!(
                        "Equity provider {} timed out for {}. Trying next.",
                        provider.name(),
                        symbol
                    );
                }
            }
        }
        None
    }
}
