use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::price::{EquityProvider, EquityQuote};

/// Fetches one equity/fund quote through a CORS-style proxy wrapping the
/// market-data source. The proxy may hand the payload back double-encoded
/// (a JSON envelope whose `contents` field is the quote as a string) or
/// pass it through directly; both shapes are accepted.
pub struct ProxyEquityProvider {
    proxy_base: String,
    quote_url: String,
}

impl ProxyEquityProvider {
    pub fn new(proxy_base: &str, quote_url: &str) -> Self {
        ProxyEquityProvider {
            proxy_base: proxy_base.to_string(),
            quote_url: quote_url.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProxyEnvelope {
    contents: String,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    #[serde(alias = "currentPrice")]
    c: f64,
    #[serde(default, alias = "previousClose")]
    pc: Option<f64>,
    #[serde(default, alias = "currencyCode")]
    currency: Option<String>,
}

fn parse_quote(body: &str) -> Result<QuoteBody> {
    if let Ok(envelope) = serde_json::from_str::<ProxyEnvelope>(body) {
        return serde_json::from_str(&envelope.contents)
            .map_err(|e| anyhow!("Unparseable proxied quote body: {}", e));
    }
    serde_json::from_str(body).map_err(|e| anyhow!("Unparseable quote body: {}", e))
}

#[async_trait]
impl EquityProvider for ProxyEquityProvider {
    fn name(&self) -> &'static str {
        "equity-proxy"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<EquityQuote> {
        let target = format!("{}?symbol={}", self.quote_url, symbol);
        let url = format!(
            "{}/get?url={}",
            self.proxy_base,
            urlencoding::encode(&target)
        );
        debug!("Requesting equity quote from {}", url);

        let client = reqwest::Client::builder().user_agent("folio/0.1").build()?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for symbol: {}", e, symbol))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for symbol: {}",
                response.status(),
                symbol
            ));
        }

        let text = response.text().await?;
        let quote = parse_quote(&text)?;

        let change_24h = match quote.pc {
            Some(pc) if pc > 0.0 => Some((quote.c - pc) / pc * 100.0),
            _ => Some(0.0),
        };

        Ok(EquityQuote {
            price: quote.c,
            currency: quote.currency.unwrap_or_else(|| "USD".to_string()),
            change_24h,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_direct_quote_body() {
        let mock_server = MockServer::start().await;
        let target = "https://quotes.example/api?symbol=AAPL";

        Mock::given(method("GET"))
            .and(path("/get"))
            .and(query_param("url", target))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"c": 210.0, "pc": 200.0, "currency": "USD"}"#),
            )
            .mount(&mock_server)
            .await;

        let provider = ProxyEquityProvider::new(&mock_server.uri(), "https://quotes.example/api");
        let quote = provider.fetch_quote("AAPL").await.unwrap();

        assert_eq!(quote.price, 210.0);
        assert_eq!(quote.currency, "USD");
        assert_eq!(quote.change_24h, Some(5.0));
    }

    #[tokio::test]
    async fn test_double_encoded_quote_body() {
        let mock_server = MockServer::start().await;
        let envelope = r#"{"contents": "{\"c\": 98.5, \"pc\": 100.0, \"currency\": \"EUR\"}"}"#;

        Mock::given(method("GET"))
            .and(path("/get"))
            .respond_with(ResponseTemplate::new(200).set_body_string(envelope))
            .mount(&mock_server)
            .await;

        let provider = ProxyEquityProvider::new(&mock_server.uri(), "https://quotes.example/api");
        let quote = provider.fetch_quote("VWCE.DE").await.unwrap();

        assert_eq!(quote.price, 98.5);
        assert_eq!(quote.currency, "EUR");
        assert_eq!(quote.change_24h, Some(-1.5));
    }

    #[tokio::test]
    async fn test_missing_previous_close_means_zero_change() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/get"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"c": 42.0}"#))
            .mount(&mock_server)
            .await;

        let provider = ProxyEquityProvider::new(&mock_server.uri(), "https://quotes.example/api");
        let quote = provider.fetch_quote("XYZ").await.unwrap();

        assert_eq!(quote.price, 42.0);
        assert_eq!(quote.change_24h, Some(0.0));
        assert_eq!(quote.currency, "USD");
    }

    #[tokio::test]
    async fn test_unparseable_body_is_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/get"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>down</html>"))
            .mount(&mock_server)
            .await;

        let provider = ProxyEquityProvider::new(&mock_server.uri(), "https://quotes.example/api");
        assert!(provider.fetch_quote("AAPL").await.is_err());
    }
}
