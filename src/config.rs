use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CashHolding {
    pub label: String,
    /// Balance in the quote (USD-side) currency.
    pub amount: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoinHolding {
    /// Provider-namespace asset id, e.g. "bitcoin".
    pub id: String,
    pub amount: f64,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityHolding {
    pub symbol: String,
    pub units: f64,
    /// Manual price in USD, used when no live quote resolves.
    #[serde(default)]
    pub price_usd: Option<f64>,
    /// Manual price in the display currency; preferred over `price_usd`.
    #[serde(default)]
    pub price_base: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
}

/// One portfolio line item. Each category carries its own shape; consumers
/// match exhaustively rather than probing optional fields.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Holding {
    Cash(CashHolding),
    Stablecoin(CoinHolding),
    Crypto(CoinHolding),
    Fund(SecurityHolding),
    Equity(SecurityHolding),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderEndpoint {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EquityProxyConfig {
    /// Ordered proxy endpoints, tried in sequence per symbol.
    pub proxies: Vec<String>,
    /// Quote source the proxies wrap.
    pub quote_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub coingecko: Option<ProviderEndpoint>,
    pub cryptocompare: Option<ProviderEndpoint>,
    pub fx: Option<ProviderEndpoint>,
    pub equity: Option<EquityProxyConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            coingecko: Some(ProviderEndpoint {
                base_url: "https://api.coingecko.com".to_string(),
            }),
            cryptocompare: Some(ProviderEndpoint {
                base_url: "https://min-api.cryptocompare.com".to_string(),
            }),
            fx: Some(ProviderEndpoint {
                base_url: "https://open.er-api.com".to_string(),
            }),
            equity: Some(EquityProxyConfig {
                proxies: vec![
                    "https://api.allorigins.win".to_string(),
                    "https://proxy.cors.sh".to_string(),
                ],
                quote_url: "https://finnhub.io/api/v1/quote".to_string(),
            }),
        }
    }
}

fn default_refresh_interval() -> u64 {
    300
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Display currency the portfolio totals are expressed in.
    pub currency: String,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub holdings: Vec<Holding>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "folio", "folio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "folio", "folio")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}

/// Parses a holdings import payload. Malformed input is reported to the
/// caller before any state changes; the engine never half-applies an import.
pub fn parse_holdings(yaml: &str) -> Result<Vec<Holding>> {
    let holdings: Vec<Holding> =
        serde_yaml::from_str(yaml).context("Failed to parse holdings payload")?;

    for holding in &holdings {
        let identifier = match holding {
            Holding::Cash(c) => &c.label,
            Holding::Stablecoin(c) | Holding::Crypto(c) => &c.id,
            Holding::Fund(s) | Holding::Equity(s) => &s.symbol,
        };
        if identifier.trim().is_empty() {
            bail!("Holding with empty identifier in import payload");
        }
    }
    Ok(holdings)
}
