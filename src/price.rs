//! Quote types and provider seams

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Spot price for one crypto asset, quoted in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoQuote {
    pub price: f64,
    /// 24h percent change; per-id fallback providers only deliver a price.
    pub change_24h: Option<f64>,
}

/// Spot price for one equity or fund symbol in its native currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityQuote {
    pub price: f64,
    pub currency: String,
    pub change_24h: Option<f64>,
}

/// Last-known quotes, layered across refresh cycles: a new cycle's quotes
/// overwrite matching entries, assets with no fresh quote keep their old one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceCache {
    pub crypto: HashMap<String, CryptoQuote>,
    pub equity: HashMap<String, EquityQuote>,
}

impl PriceCache {
    pub fn merge(
        &mut self,
        crypto: HashMap<String, CryptoQuote>,
        equity: HashMap<String, EquityQuote>,
    ) {
        self.crypto.extend(crypto);
        self.equity.extend(equity);
    }
}

/// A source of batched crypto prices. Implementations return every id they
/// recognize; unrecognized ids are simply absent from the map.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_prices(&self, ids: &[String]) -> Result<HashMap<String, CryptoQuote>>;
}

/// A source for one equity/fund quote.
#[async_trait]
pub trait EquityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_quote(&self, symbol: &str) -> Result<EquityQuote>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overwrites_and_keeps_absent() {
        let mut cache = PriceCache::default();
        cache.crypto.insert(
            "bitcoin".to_string(),
            CryptoQuote {
                price: 60000.0,
                change_24h: Some(1.0),
            },
        );
        cache.crypto.insert(
            "ethereum".to_string(),
            CryptoQuote {
                price: 3000.0,
                change_24h: None,
            },
        );

        let mut fresh = HashMap::new();
        fresh.insert(
            "bitcoin".to_string(),
            CryptoQuote {
                price: 61000.0,
                change_24h: Some(2.5),
            },
        );
        cache.merge(fresh, HashMap::new());

        assert_eq!(cache.crypto["bitcoin"].price, 61000.0);
        // Absent from the fresh batch, falls back to last-known.
        assert_eq!(cache.crypto["ethereum"].price, 3000.0);
    }
}
