use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

use crate::price::{CryptoProvider, CryptoQuote};

/// Asset id to exchange ticker, for ids in the batch provider's namespace.
/// Ids without a mapping cannot be queried here and are skipped.
const SYMBOL_MAP: &[(&str, &str)] = &[
    ("bitcoin", "BTC"),
    ("ethereum", "ETH"),
    ("tether", "USDT"),
    ("usd-coin", "USDC"),
    ("dai", "DAI"),
    ("solana", "SOL"),
    ("cardano", "ADA"),
    ("polkadot", "DOT"),
    ("ripple", "XRP"),
    ("dogecoin", "DOGE"),
    ("litecoin", "LTC"),
    ("chainlink", "LINK"),
    ("avalanche-2", "AVAX"),
    ("matic-network", "MATIC"),
];

fn ticker_for(id: &str) -> Option<&'static str> {
    SYMBOL_MAP
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, ticker)| *ticker)
}

/// Per-id fallback price source, used when the batch provider is down.
/// Delivers price only, no 24h change. Calls run in sequence, one per id,
/// and a failing id is dropped from the result rather than failing the batch.
pub struct CryptoCompareProvider {
    base_url: String,
}

impl CryptoCompareProvider {
    pub fn new(base_url: &str) -> Self {
        CryptoCompareProvider {
            base_url: base_url.to_string(),
        }
    }

    async fn fetch_one(&self, client: &reqwest::Client, ticker: &str) -> Result<f64> {
        let url = format!("{}/data/price?fsym={}&tsyms=USD", self.base_url, ticker);
        debug!("Requesting single price from {}", url);

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for URL: {}", e, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for ticker: {}",
                response.status(),
                ticker
            ));
        }

        let data = response.json::<PriceBody>().await?;
        data.usd
            .ok_or_else(|| anyhow!("No USD price for ticker: {}", ticker))
    }
}

#[derive(Debug, Deserialize)]
struct PriceBody {
    #[serde(rename = "USD")]
    usd: Option<f64>,
}

#[async_trait]
impl CryptoProvider for CryptoCompareProvider {
    fn name(&self) -> &'static str {
        "cryptocompare"
    }

    #[instrument(name = "CryptoComparePerId", skip_all, fields(ids = ids.len()))]
    async fn fetch_prices(&self, ids: &[String]) -> Result<HashMap<String, CryptoQuote>> {
        let client = reqwest::Client::builder().user_agent("folio/0.1").build()?;

        let mut quotes = HashMap::new();
        for id in ids {
            let Some(ticker) = ticker_for(id) else {
                debug!("No ticker mapping for id {}, skipping", id);
                continue;
            };
            match self.fetch_one(&client, ticker).await {
                Ok(price) => {
                    quotes.insert(
                        id.clone(),
                        CryptoQuote {
                            price,
                            change_24h: None,
                        },
                    );
                }
                Err(e) => warn!("Fallback price fetch failed for {}: {}", id, e),
            }
        }
        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_per_id_fetch_with_mapping() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/price"))
            .and(query_param("fsym", "BTC"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"USD": 60250.0}"#))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/price"))
            .and(query_param("fsym", "ETH"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"USD": 2990.5}"#))
            .mount(&mock_server)
            .await;

        let provider = CryptoCompareProvider::new(&mock_server.uri());
        let quotes = provider
            .fetch_prices(&["bitcoin".to_string(), "ethereum".to_string()])
            .await
            .unwrap();

        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes["bitcoin"].price, 60250.0);
        assert_eq!(quotes["bitcoin"].change_24h, None);
        assert_eq!(quotes["ethereum"].price, 2990.5);
    }

    #[tokio::test]
    async fn test_partial_failures_are_tolerated() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/price"))
            .and(query_param("fsym", "BTC"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"USD": 60250.0}"#))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data/price"))
            .and(query_param("fsym", "ETH"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let provider = CryptoCompareProvider::new(&mock_server.uri());
        let quotes = provider
            .fetch_prices(&["bitcoin".to_string(), "ethereum".to_string()])
            .await
            .unwrap();

        assert_eq!(quotes.len(), 1);
        assert!(quotes.contains_key("bitcoin"));
        assert!(!quotes.contains_key("ethereum"));
    }

    #[tokio::test]
    async fn test_unmapped_id_is_skipped() {
        let mock_server = MockServer::start().await;

        let provider = CryptoCompareProvider::new(&mock_server.uri());
        let quotes = provider
            .fetch_prices(&["obscure-coin".to_string()])
            .await
            .unwrap();
        assert!(quotes.is_empty());
    }
}
