//! Valuation aggregation over the holdings hierarchy.
//!
//! `compute_valuation` is a pure function of its inputs: holdings, the merged
//! price cache, and the fx rate in; a fully computed tree out. No I/O here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::config::Holding;
use crate::history::HistoryPoint;
use crate::price::PriceCache;

/// Positions below this display value are hidden by the presentation layer.
/// Aggregation always includes them; filtering totals would skew the math.
pub const MIN_DISPLAY_VALUE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Liquidity,
    Crypto,
    Investments,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Liquidity, Category::Crypto, Category::Investments];
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Category::Liquidity => "Liquidity",
            Category::Crypto => "Crypto",
            Category::Investments => "Investments",
        };
        write!(f, "{name}")
    }
}

/// One valued line item, in the display currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLine {
    pub label: String,
    pub location: Option<String>,
    pub value: f64,
    pub change_24h: Option<f64>,
}

/// Positions sharing a symbol (same asset held in several locations).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolGroup {
    pub label: String,
    pub value: f64,
    pub change_24h: Option<f64>,
    pub positions: Vec<PositionLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryValuation {
    pub category: Category,
    pub value: f64,
    pub change_24h: Option<f64>,
    pub groups: Vec<SymbolGroup>,
}

impl CategoryValuation {
    /// Groups above the display threshold, for rendering only.
    pub fn displayable_groups(&self) -> impl Iterator<Item = &SymbolGroup> {
        self.groups.iter().filter(|g| g.value >= MIN_DISPLAY_VALUE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Valuation {
    pub computed_at: DateTime<Utc>,
    pub total: f64,
    pub change_24h: Option<f64>,
    /// All three top-level categories, in fixed order.
    pub categories: Vec<CategoryValuation>,
    /// Category totals for proportional display; zero-total categories excluded.
    pub allocation: Vec<(Category, f64)>,
}

impl Valuation {
    pub fn category(&self, category: Category) -> &CategoryValuation {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .expect("all categories are always present")
    }

    pub fn to_history_point(&self) -> HistoryPoint {
        HistoryPoint {
            timestamp: self.computed_at,
            total: self.total,
            liquidity: self.category(Category::Liquidity).value,
            crypto: self.category(Category::Crypto).value,
            investments: self.category(Category::Investments).value,
        }
    }
}

/// Value-weighted percent change. Members with an unknown change are left out
/// of both sums; an empty denominator means "no data", never 0%.
#[derive(Default)]
struct WeightedChange {
    weighted_sum: f64,
    weight: f64,
}

impl WeightedChange {
    fn add(&mut self, value: f64, change: Option<f64>) {
        if let Some(change) = change {
            self.weighted_sum += value * change;
            self.weight += value;
        }
    }

    fn result(&self) -> Option<f64> {
        (self.weight > 0.0).then(|| self.weighted_sum / self.weight)
    }
}

fn position_for(holding: &Holding, cache: &PriceCache, fx_rate: f64, currency: &str) -> (Category, PositionLine) {
    match holding {
        Holding::Cash(c) => (
            Category::Liquidity,
            PositionLine {
                label: c.label.clone(),
                location: None,
                value: c.amount * fx_rate,
                change_24h: None,
            },
        ),
        Holding::Stablecoin(c) => {
            let quote = cache.crypto.get(&c.id);
            // A stablecoin with no quote is worth its peg, not nothing.
            let price = quote.map_or(1.0, |q| q.price);
            (
                Category::Liquidity,
                PositionLine {
                    label: c.id.clone(),
                    location: c.location.clone(),
                    value: c.amount * price * fx_rate,
                    change_24h: quote.and_then(|q| q.change_24h),
                },
            )
        }
        Holding::Crypto(c) => {
            let quote = cache.crypto.get(&c.id);
            let price = quote.map_or(0.0, |q| q.price);
            (
                Category::Crypto,
                PositionLine {
                    label: c.id.clone(),
                    location: c.location.clone(),
                    value: c.amount * price * fx_rate,
                    change_24h: quote.and_then(|q| q.change_24h),
                },
            )
        }
        Holding::Fund(s) | Holding::Equity(s) => {
            let quote = cache.equity.get(&s.symbol);
            let (price, native, change) = match quote {
                Some(q) => (q.price, q.currency.clone(), q.change_24h),
                None => match (s.price_base, s.price_usd) {
                    (Some(p), _) => (p, currency.to_string(), None),
                    (None, Some(p)) => (p, "USD".to_string(), None),
                    (None, None) => (0.0, currency.to_string(), None),
                },
            };
            let rate = if native == currency { 1.0 } else { fx_rate };
            (
                Category::Investments,
                PositionLine {
                    label: s.symbol.clone(),
                    location: s.location.clone(),
                    value: s.units * price * rate,
                    change_24h: change,
                },
            )
        }
    }
}

fn group_positions(positions: Vec<PositionLine>) -> Vec<SymbolGroup> {
    let mut groups: Vec<SymbolGroup> = Vec::new();
    for position in positions {
        match groups.iter_mut().find(|g| g.label == position.label) {
            Some(group) => group.positions.push(position),
            None => groups.push(SymbolGroup {
                label: position.label.clone(),
                value: 0.0,
                change_24h: None,
                positions: vec![position],
            }),
        }
    }

    for group in &mut groups {
        let mut change = WeightedChange::default();
        group.value = group.positions.iter().map(|p| p.value).sum();
        for position in &group.positions {
            change.add(position.value, position.change_24h);
        }
        group.change_24h = change.result();
        // Stable sort keeps insertion order for equal values.
        group
            .positions
            .sort_by(|a, b| b.value.total_cmp(&a.value));
    }
    groups.sort_by(|a, b| b.value.total_cmp(&a.value));
    groups
}

pub fn compute_valuation(
    holdings: &[Holding],
    cache: &PriceCache,
    fx_rate: f64,
    currency: &str,
    now: DateTime<Utc>,
) -> Valuation {
    let mut per_category: Vec<(Category, Vec<PositionLine>)> = Category::ALL
        .iter()
        .map(|c| (*c, Vec::new()))
        .collect();

    for holding in holdings {
        let (category, position) = position_for(holding, cache, fx_rate, currency);
        per_category
            .iter_mut()
            .find(|(c, _)| *c == category)
            .expect("category list covers every variant")
            .1
            .push(position);
    }

    let mut total = 0.0;
    let mut total_change = WeightedChange::default();
    let mut categories = Vec::with_capacity(Category::ALL.len());

    for (category, positions) in per_category {
        let mut change = WeightedChange::default();
        for position in &positions {
            change.add(position.value, position.change_24h);
            total_change.add(position.value, position.change_24h);
        }
        let groups = group_positions(positions);
        let value: f64 = groups.iter().map(|g| g.value).sum();
        total += value;
        categories.push(CategoryValuation {
            category,
            value,
            change_24h: change.result(),
            groups,
        });
    }

    let allocation = categories
        .iter()
        .filter(|c| c.value != 0.0)
        .map(|c| (c.category, c.value))
        .collect();

    Valuation {
        computed_at: now,
        total,
        change_24h: total_change.result(),
        categories,
        allocation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CashHolding, CoinHolding, SecurityHolding};
    use crate::price::{CryptoQuote, EquityQuote};

    fn crypto(id: &str, amount: f64) -> Holding {
        Holding::Crypto(CoinHolding {
            id: id.to_string(),
            amount,
            location: None,
        })
    }

    fn crypto_at(id: &str, amount: f64, location: &str) -> Holding {
        Holding::Crypto(CoinHolding {
            id: id.to_string(),
            amount,
            location: Some(location.to_string()),
        })
    }

    fn quote(price: f64, change: Option<f64>) -> CryptoQuote {
        CryptoQuote {
            price,
            change_24h: change,
        }
    }

    fn cache_with(entries: &[(&str, CryptoQuote)]) -> PriceCache {
        let mut cache = PriceCache::default();
        for (id, q) in entries {
            cache.crypto.insert(id.to_string(), q.clone());
        }
        cache
    }

    #[test]
    fn test_weighted_change() {
        // Values 100 and 50 with +10% / -20% average out to exactly zero.
        let holdings = vec![crypto("a", 100.0), crypto("b", 50.0)];
        let cache = cache_with(&[
            ("a", quote(1.0, Some(10.0))),
            ("b", quote(1.0, Some(-20.0))),
        ]);

        let v = compute_valuation(&holdings, &cache, 1.0, "USD", Utc::now());
        let crypto_cat = v.category(Category::Crypto);
        assert_eq!(crypto_cat.value, 150.0);
        assert!(crypto_cat.change_24h.unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_unknown_change_excluded_from_weighting() {
        let holdings = vec![crypto("a", 100.0), crypto("b", 50.0), crypto("c", 30.0)];
        let cache = cache_with(&[
            ("a", quote(1.0, Some(10.0))),
            ("b", quote(1.0, Some(-20.0))),
            ("c", quote(1.0, None)),
        ]);

        let v = compute_valuation(&holdings, &cache, 1.0, "USD", Utc::now());
        let crypto_cat = v.category(Category::Crypto);
        // The unknown-change member adds value but must not move the change.
        assert_eq!(crypto_cat.value, 180.0);
        assert!(crypto_cat.change_24h.unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_no_known_change_is_no_data() {
        let holdings = vec![crypto("a", 100.0)];
        let cache = cache_with(&[("a", quote(1.0, None))]);

        let v = compute_valuation(&holdings, &cache, 1.0, "USD", Utc::now());
        assert_eq!(v.category(Category::Crypto).change_24h, None);
        assert_eq!(v.change_24h, None);
    }

    #[test]
    fn test_threshold_does_not_alter_aggregation() {
        // 5.0 is below MIN_DISPLAY_VALUE; it is hidden, never excluded.
        let holdings = vec![crypto("a", 100.0), crypto("tiny", 5.0)];
        let cache = cache_with(&[
            ("a", quote(1.0, Some(10.0))),
            ("tiny", quote(1.0, Some(-50.0))),
        ]);

        let v = compute_valuation(&holdings, &cache, 1.0, "USD", Utc::now());
        let crypto_cat = v.category(Category::Crypto);
        assert_eq!(crypto_cat.value, 105.0);
        let expected = (100.0 * 10.0 + 5.0 * -50.0) / 105.0;
        assert!((crypto_cat.change_24h.unwrap() - expected).abs() < 1e-9);

        let displayed: Vec<_> = crypto_cat.displayable_groups().collect();
        assert_eq!(displayed.len(), 1);
        assert_eq!(displayed[0].label, "a");
    }

    #[test]
    fn test_cash_converted_via_fx() {
        let holdings = vec![Holding::Cash(CashHolding {
            label: "Checking".to_string(),
            amount: 1000.0,
        })];
        let v = compute_valuation(&holdings, &PriceCache::default(), 0.9, "EUR", Utc::now());
        assert_eq!(v.category(Category::Liquidity).value, 900.0);
        assert_eq!(v.category(Category::Liquidity).change_24h, None);
    }

    #[test]
    fn test_stablecoin_falls_back_to_peg() {
        let holdings = vec![Holding::Stablecoin(CoinHolding {
            id: "usd-coin".to_string(),
            amount: 500.0,
            location: None,
        })];
        let v = compute_valuation(&holdings, &PriceCache::default(), 1.0, "USD", Utc::now());
        assert_eq!(v.category(Category::Liquidity).value, 500.0);
    }

    #[test]
    fn test_unquoted_crypto_is_zero_valued_but_kept() {
        let holdings = vec![crypto("bitcoin", 0.5)];
        let v = compute_valuation(&holdings, &PriceCache::default(), 1.0, "USD", Utc::now());
        let crypto_cat = v.category(Category::Crypto);
        assert_eq!(crypto_cat.value, 0.0);
        assert_eq!(crypto_cat.groups.len(), 1);
        assert_eq!(crypto_cat.groups[0].label, "bitcoin");
    }

    #[test]
    fn test_security_prefers_live_quote_over_static_price() {
        let holdings = vec![Holding::Equity(SecurityHolding {
            symbol: "AAPL".to_string(),
            units: 10.0,
            price_usd: Some(100.0),
            price_base: None,
            location: None,
        })];
        let mut cache = PriceCache::default();
        cache.equity.insert(
            "AAPL".to_string(),
            EquityQuote {
                price: 210.0,
                currency: "USD".to_string(),
                change_24h: Some(2.0),
            },
        );

        let v = compute_valuation(&holdings, &cache, 0.9, "EUR", Utc::now());
        let inv = v.category(Category::Investments);
        assert_eq!(inv.value, 10.0 * 210.0 * 0.9);
        assert_eq!(inv.change_24h, Some(2.0));
    }

    #[test]
    fn test_static_price_currency_selection() {
        // price_base needs no conversion; price_usd converts through fx.
        let holdings = vec![
            Holding::Fund(SecurityHolding {
                symbol: "VWCE.DE".to_string(),
                units: 10.0,
                price_usd: None,
                price_base: Some(100.0),
                location: None,
            }),
            Holding::Equity(SecurityHolding {
                symbol: "AAPL".to_string(),
                units: 10.0,
                price_usd: Some(100.0),
                price_base: None,
                location: None,
            }),
        ];
        let v = compute_valuation(&holdings, &PriceCache::default(), 0.9, "EUR", Utc::now());
        assert_eq!(v.category(Category::Investments).value, 1000.0 + 900.0);
    }

    #[test]
    fn test_equity_quote_in_display_currency_not_converted() {
        let holdings = vec![Holding::Equity(SecurityHolding {
            symbol: "ASML.AS".to_string(),
            units: 2.0,
            price_usd: None,
            price_base: None,
            location: None,
        })];
        let mut cache = PriceCache::default();
        cache.equity.insert(
            "ASML.AS".to_string(),
            EquityQuote {
                price: 600.0,
                currency: "EUR".to_string(),
                change_24h: None,
            },
        );
        let v = compute_valuation(&holdings, &cache, 0.9, "EUR", Utc::now());
        assert_eq!(v.category(Category::Investments).value, 1200.0);
    }

    #[test]
    fn test_same_symbol_grouped_across_locations() {
        let holdings = vec![
            crypto_at("bitcoin", 0.5, "Ledger"),
            crypto("ethereum", 2.0),
            crypto_at("bitcoin", 0.25, "Exchange"),
        ];
        let cache = cache_with(&[
            ("bitcoin", quote(100.0, Some(1.0))),
            ("ethereum", quote(10.0, Some(2.0))),
        ]);

        let v = compute_valuation(&holdings, &cache, 1.0, "USD", Utc::now());
        let crypto_cat = v.category(Category::Crypto);
        assert_eq!(crypto_cat.groups.len(), 2);
        // Descending by value: bitcoin (75) before ethereum (20).
        assert_eq!(crypto_cat.groups[0].label, "bitcoin");
        assert_eq!(crypto_cat.groups[0].value, 75.0);
        assert_eq!(crypto_cat.groups[0].positions.len(), 2);
        assert_eq!(crypto_cat.groups[0].positions[0].location.as_deref(), Some("Ledger"));
    }

    #[test]
    fn test_tie_ordering_is_insertion_order() {
        let holdings = vec![crypto("first", 1.0), crypto("second", 1.0)];
        let cache = cache_with(&[("first", quote(5.0, None)), ("second", quote(5.0, None))]);

        let v = compute_valuation(&holdings, &cache, 1.0, "USD", Utc::now());
        let labels: Vec<_> = v
            .category(Category::Crypto)
            .groups
            .iter()
            .map(|g| g.label.clone())
            .collect();
        assert_eq!(labels, vec!["first", "second"]);
    }

    #[test]
    fn test_allocation_excludes_zero_categories() {
        let holdings = vec![
            Holding::Cash(CashHolding {
                label: "Checking".to_string(),
                amount: 100.0,
            }),
            crypto("bitcoin", 1.0),
        ];
        let cache = cache_with(&[("bitcoin", quote(300.0, None))]);

        let v = compute_valuation(&holdings, &cache, 1.0, "USD", Utc::now());
        assert_eq!(v.total, 400.0);
        assert_eq!(
            v.allocation,
            vec![(Category::Liquidity, 100.0), (Category::Crypto, 300.0)]
        );
    }

    #[test]
    fn test_history_point_carries_category_totals() {
        let holdings = vec![
            Holding::Cash(CashHolding {
                label: "Checking".to_string(),
                amount: 100.0,
            }),
            crypto("bitcoin", 1.0),
            Holding::Fund(SecurityHolding {
                symbol: "VWCE.DE".to_string(),
                units: 1.0,
                price_usd: None,
                price_base: Some(50.0),
                location: None,
            }),
        ];
        let cache = cache_with(&[("bitcoin", quote(300.0, None))]);

        let v = compute_valuation(&holdings, &cache, 1.0, "USD", Utc::now());
        let point = v.to_history_point();
        assert_eq!(point.total, 450.0);
        assert_eq!(point.liquidity, 100.0);
        assert_eq!(point.crypto, 300.0);
        assert_eq!(point.investments, 50.0);
    }
}
