//! Refresh-cycle driver and engine state.
//!
//! The session owns the mutable state of the engine: holdings, the merged
//! price cache, and the history series. It is constructed from the persisted
//! blobs at startup and flushes back to the store after every cycle. All
//! mutation happens under one async mutex held for a full cycle, so refreshes
//! serialize (concurrent triggers queue strictly after the in-flight one) and
//! readers never observe a state where only part of a cycle's results have
//! been merged. The last committed valuation lives behind its own lock,
//! written only at commit time, so reading it never waits on a cycle.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{Holding, parse_holdings};
use crate::fx::FxRateProvider;
use crate::history::{History, HistoryPoint, PeriodChange, Window, period_change};
use crate::price::PriceCache;
use crate::resolver::PriceResolver;
use crate::store::{BlobStore, CONFIG_KEY, HISTORY_KEY, PRICE_CACHE_KEY};
use crate::valuation::{Valuation, compute_valuation};

struct SessionState {
    holdings: Vec<Holding>,
    cache: PriceCache,
    history: History,
}

pub struct Session {
    store: Arc<dyn BlobStore>,
    resolver: PriceResolver,
    fx: Arc<dyn FxRateProvider>,
    currency: String,
    state: Mutex<SessionState>,
    last_valuation: std::sync::Mutex<Option<Valuation>>,
}

fn load_blob<T: DeserializeOwned>(store: &dyn BlobStore, key: &str) -> Option<T> {
    match store.get(key) {
        Ok(Some(blob)) => match serde_json::from_slice(&blob) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding unreadable {} blob: {}", key, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!("Store read failed for {}: {}", key, e);
            None
        }
    }
}

impl Session {
    /// Builds the session from the persisted blobs. Imported holdings stored
    /// under the `config` key supersede the ones passed in from the file.
    pub fn new(
        store: Arc<dyn BlobStore>,
        resolver: PriceResolver,
        fx: Arc<dyn FxRateProvider>,
        currency: &str,
        holdings: Vec<Holding>,
    ) -> Self {
        let holdings = load_blob(store.as_ref(), CONFIG_KEY).unwrap_or(holdings);
        let cache = load_blob(store.as_ref(), PRICE_CACHE_KEY).unwrap_or_default();
        let points: Vec<HistoryPoint> = load_blob(store.as_ref(), HISTORY_KEY).unwrap_or_default();

        Session {
            store,
            resolver,
            fx,
            currency: currency.to_string(),
            state: Mutex::new(SessionState {
                holdings,
                cache,
                history: History::new(points),
            }),
            last_valuation: std::sync::Mutex::new(None),
        }
    }

    /// Runs one refresh cycle: fan out the three resolution tasks, join on
    /// all of them, merge quotes over the cache, aggregate, append to
    /// history, and persist. Each task absorbs its own failures, so the
    /// cycle itself never fails; at worst it publishes a valuation computed
    /// from last-known prices.
    pub async fn refresh(&self) -> Valuation {
        let mut state = self.state.lock().await;

        let mut ids: Vec<String> = Vec::new();
        let mut symbols: Vec<String> = Vec::new();
        for holding in &state.holdings {
            match holding {
                Holding::Stablecoin(c) | Holding::Crypto(c) => {
                    if !ids.contains(&c.id) {
                        ids.push(c.id.clone());
                    }
                }
                Holding::Fund(s) | Holding::Equity(s) => {
                    if !symbols.contains(&s.symbol) {
                        symbols.push(s.symbol.clone());
                    }
                }
                Holding::Cash(_) => {}
            }
        }

        let (crypto, equities, fx_rate) = tokio::join!(
            self.resolver.resolve_crypto(&ids),
            self.resolver.resolve_equities(&symbols),
            self.fx.resolve_rate()
        );
        debug!(
            "Cycle resolved {} crypto, {} equity quotes, fx {}",
            crypto.len(),
            equities.len(),
            fx_rate
        );

        state.cache.merge(crypto, equities);

        let now = Utc::now();
        let valuation =
            compute_valuation(&state.holdings, &state.cache, fx_rate, &self.currency, now);
        state.history.append(valuation.to_history_point(), now);

        self.persist(&mut state);
        *self
            .last_valuation
            .lock()
            .expect("valuation lock poisoned") = Some(valuation.clone());
        valuation
    }

    fn persist(&self, state: &mut SessionState) {
        if let Err(e) = self.write_blob(PRICE_CACHE_KEY, &state.cache) {
            warn!("Failed to persist price cache: {}", e);
        }

        if let Err(e) = self.write_blob(HISTORY_KEY, &state.history.points()) {
            // A full store is the trigger for an immediate compaction to
            // shrink the series before one retry; still failing is non-fatal
            // and the in-memory state stays usable for the session.
            warn!("Failed to persist history, compacting and retrying: {}", e);
            state.history.compact(Utc::now());
            if let Err(e) = self.write_blob(HISTORY_KEY, &state.history.points()) {
                warn!("History persist failed after compaction: {}", e);
            }
        }
    }

    fn write_blob<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let blob = serde_json::to_vec(value)?;
        self.store.set(key, &blob)
    }

    /// Snapshot of the last committed valuation. Never contends with an
    /// in-flight cycle; mid-cycle reads see the previous commit.
    pub fn last_valuation(&self) -> Option<Valuation> {
        self.last_valuation
            .lock()
            .expect("valuation lock poisoned")
            .clone()
    }

    /// Replaces the holdings from an import payload. Validation happens
    /// before any state changes; a malformed payload is an error and leaves
    /// the current holdings untouched.
    pub async fn import_holdings(&self, yaml: &str) -> Result<usize> {
        let holdings = parse_holdings(yaml)?;
        let count = holdings.len();

        let mut state = self.state.lock().await;
        state.holdings = holdings;
        if let Err(e) = self.write_blob(CONFIG_KEY, &state.holdings) {
            warn!("Failed to persist imported holdings: {}", e);
        }
        Ok(count)
    }

    pub async fn history_window(&self, window: Window) -> (Vec<HistoryPoint>, PeriodChange) {
        let state = self.state.lock().await;
        let points = state.history.window(window, Utc::now()).to_vec();
        let change = period_change(&points);
        (points, change)
    }
}
