pub mod config;
pub mod fx;
pub mod history;
pub mod log;
pub mod price;
pub mod providers;
pub mod resolver;
pub mod session;
pub mod store;
pub mod ui;
pub mod valuation;

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::fx::{FxRateProvider, HttpFxProvider};
use crate::history::Window;
use crate::price::{CryptoProvider, EquityProvider};
use crate::providers::{CoinGeckoProvider, CryptoCompareProvider, ProxyEquityProvider};
use crate::resolver::PriceResolver;
use crate::session::Session;
use crate::store::{BlobStore, DiskStore, MemoryStore};

pub enum AppCommand {
    Summary,
    Watch,
    Chart(Window),
}

fn open_store() -> Arc<dyn BlobStore> {
    let disk = AppConfig::default_data_path()
        .and_then(|path| DiskStore::open(&path.join("state")));
    match disk {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!("Falling back to in-memory store: {}", e);
            Arc::new(MemoryStore::new())
        }
    }
}

pub fn build_session(config: &AppConfig, store: Arc<dyn BlobStore>) -> Session {
    let providers = &config.providers;

    let mut crypto_chain: Vec<Arc<dyn CryptoProvider>> = Vec::new();
    if let Some(endpoint) = &providers.coingecko {
        crypto_chain.push(Arc::new(CoinGeckoProvider::new(&endpoint.base_url)));
    }
    if let Some(endpoint) = &providers.cryptocompare {
        crypto_chain.push(Arc::new(CryptoCompareProvider::new(&endpoint.base_url)));
    }

    let mut equity_chain: Vec<Arc<dyn EquityProvider>> = Vec::new();
    if let Some(equity) = &providers.equity {
        for proxy in &equity.proxies {
            equity_chain.push(Arc::new(ProxyEquityProvider::new(proxy, &equity.quote_url)));
        }
    }

    let fx: Arc<dyn FxRateProvider> = {
        let base_url = providers
            .fx
            .as_ref()
            .map_or("https://open.er-api.com", |p| p.base_url.as_str());
        Arc::new(HttpFxProvider::new(base_url, &config.currency))
    };

    let resolver = PriceResolver::new(crypto_chain, equity_chain);
    Session::new(
        store,
        resolver,
        fx,
        &config.currency,
        config.holdings.clone(),
    )
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("folio starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let session = build_session(&config, open_store());

    match command {
        AppCommand::Summary => {
            let spinner = ui::new_spinner("Refreshing prices...");
            let valuation = session.refresh().await;
            spinner.finish_and_clear();
            println!("{}", ui::render_valuation(&valuation, &config.currency));
        }
        AppCommand::Watch => {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(
                config.refresh_interval_secs,
            ));
            loop {
                interval.tick().await;
                let valuation = session.refresh().await;
                println!("{}", ui::render_valuation(&valuation, &config.currency));
            }
        }
        AppCommand::Chart(window) => {
            let (points, change) = session.history_window(window).await;
            if points.is_empty() {
                println!("No history recorded yet. Run `folio summary` first.");
            } else {
                println!("{}", ui::render_history(&points, &change, &config.currency));
            }
        }
    }

    Ok(())
}
