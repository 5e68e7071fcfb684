//! USD-to-display-currency conversion rate

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Used whenever the live rate cannot be resolved. The portfolio keeps
/// working with a slightly stale conversion instead of aborting the cycle.
pub const FALLBACK_RATE: f64 = 0.93;

/// Resolves the rate converting 1 USD into the display currency.
/// Implementations absorb every failure; `resolve_rate` never errors.
#[async_trait]
pub trait FxRateProvider: Send + Sync {
    async fn resolve_rate(&self) -> f64;
}

pub struct HttpFxProvider {
    base_url: String,
    currency: String,
}

impl HttpFxProvider {
    pub fn new(base_url: &str, currency: &str) -> Self {
        HttpFxProvider {
            base_url: base_url.to_string(),
            currency: currency.to_string(),
        }
    }

    async fn fetch_rate(&self) -> Result<f64> {
        let url = format!("{}/v6/latest/USD", self.base_url);
        debug!("Requesting fx rates from {}", url);

        let client = reqwest::Client::builder().user_agent("folio/0.1").build()?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for URL: {}", e, url))?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} from fx provider", response.status()));
        }

        let data = response.json::<FxResponse>().await?;
        data.rates
            .get(&self.currency)
            .copied()
            .ok_or_else(|| anyhow!("No rate for currency: {}", self.currency))
    }
}

#[derive(Debug, Deserialize)]
struct FxResponse {
    rates: HashMap<String, f64>,
}

#[async_trait]
impl FxRateProvider for HttpFxProvider {
    async fn resolve_rate(&self) -> f64 {
        match self.fetch_rate().await {
            Ok(rate) => {
                debug!("Resolved fx rate USD->{}: {}", self.currency, rate);
                rate
            }
            Err(e) => {
                warn!(
                    "Fx rate fetch failed, using fallback {}: {}",
                    FALLBACK_RATE, e
                );
                FALLBACK_RATE
            }
        }
    }
}
