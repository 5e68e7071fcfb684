pub mod coingecko;
pub mod cryptocompare;
pub mod equity;

pub use coingecko::CoinGeckoProvider;
pub use cryptocompare::CryptoCompareProvider;
pub use equity::ProxyEquityProvider;
