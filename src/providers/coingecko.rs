use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::price::{CryptoProvider, CryptoQuote};

/// Batched crypto price source. One call resolves price and 24h change for
/// every requested id; ids the API does not recognize are absent from the
/// response and stay absent from the result.
pub struct CoinGeckoProvider {
    base_url: String,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str) -> Self {
        CoinGeckoProvider {
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CoinGeckoEntry {
    usd: Option<f64>,
    #[serde(rename = "usd_24h_change")]
    usd_24h_change: Option<f64>,
}

#[async_trait]
impl CryptoProvider for CoinGeckoProvider {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    #[instrument(name = "CoinGeckoBatch", skip_all, fields(ids = ids.len()))]
    async fn fetch_prices(&self, ids: &[String]) -> Result<HashMap<String, CryptoQuote>> {
        let url = format!(
            "{}/api/v3/simple/price?ids={}&vs_currencies=usd&include_24hr_change=true",
            self.base_url,
            ids.join(",")
        );
        debug!("Requesting crypto prices from {}", url);

        let client = reqwest::Client::builder().user_agent("folio/0.1").build()?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for URL: {}", e, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} from crypto batch provider",
                response.status()
            ));
        }

        let data = response.json::<HashMap<String, CoinGeckoEntry>>().await?;

        let quotes = data
            .into_iter()
            .filter_map(|(id, entry)| {
                entry.usd.map(|price| {
                    (
                        id,
                        CryptoQuote {
                            price,
                            change_24h: entry.usd_24h_change,
                        },
                    )
                })
            })
            .collect();
        Ok(quotes)
    }
}
