pub mod http_fetcher;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use crate::app::FetchError;
use crate::config::HttpConfig;

pub use http_fetcher::HttpFetcher;

pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,application/json,*/*;q=0.8";

/// Desktop browser UA for upstreams that serve degraded pages to mobile agents.
pub const DESKTOP_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Skip TLS certificate verification.
    pub insecure: bool,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::Get,
            headers: Vec::new(),
            body: None,
            insecure: false,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, name, value.into());
        self
    }

    pub fn headers(mut self, headers: &[(&str, &str)]) -> Self {
        for (name, value) in headers {
            set_header(&mut self.headers, name, (*value).to_string());
        }
        self
    }

    pub fn insecure(mut self) -> Self {
        self.insecure = true;
        self
    }
}

/// Replace a header case-insensitively, or append it.
fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: String) {
    match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
        Some(slot) => slot.1 = value,
        None => headers.push((name.to_string(), value)),
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `name=value` pairs from every `Set-Cookie`, joined for a `Cookie` header.
    pub fn cookie_header(&self) -> String {
        self.header_values("set-cookie")
            .filter_map(|raw| raw.split(';').next())
            .map(str::trim)
            .filter(|pair| pair.contains('=') && !pair.starts_with('='))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// One HTTP exchange. No caching and no retries at this layer.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// What adapters talk to: a [`Fetcher`] plus the default header set.
#[derive(Clone)]
pub struct Transport {
    fetcher: Arc<dyn Fetcher>,
    defaults: Vec<(String, String)>,
}

impl Transport {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &HttpConfig) -> Self {
        let defaults = vec![
            ("User-Agent".to_string(), config.user_agent.clone()),
            ("Accept".to_string(), DEFAULT_ACCEPT.to_string()),
            ("Accept-Language".to_string(), config.accept_language.clone()),
            ("Cache-Control".to_string(), "no-cache".to_string()),
        ];
        Self { fetcher, defaults }
    }

    /// Send without checking the status. Header overrides win over defaults.
    pub async fn execute_raw(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut merged = self.defaults.clone();
        for (name, value) in request.headers {
            set_header(&mut merged, &name, value);
        }
        let request = FetchRequest {
            headers: merged,
            ..request
        };

        tracing::debug!(url = %request.url, "fetching");
        self.fetcher.fetch(&request).await
    }

    /// Send and require a 2xx status.
    pub async fn execute(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let response = self.execute_raw(request).await?;
        if !response.is_success() {
            return Err(FetchError::Http {
                status: response.status,
            });
        }
        Ok(response)
    }

    pub async fn text(&self, request: FetchRequest) -> Result<String, FetchError> {
        let response = self.execute(request).await?;
        decode_text(response.body)
    }

    pub async fn decoded<T: DeserializeOwned>(&self, request: FetchRequest) -> Result<T, FetchError> {
        let response = self.execute(request).await?;
        serde_json::from_slice(&response.body).map_err(|e| {
            let preview: String = String::from_utf8_lossy(&response.body).chars().take(200).collect();
            tracing::debug!(body = %preview, "JSON decode failed");
            FetchError::decoding(e)
        })
    }

    pub async fn fetch_decoded<T: DeserializeOwned>(
        &self,
        url: Url,
        headers: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        self.decoded(FetchRequest::get(url).headers(headers)).await
    }

    pub async fn fetch_text(&self, url: Url, headers: &[(&str, &str)]) -> Result<String, FetchError> {
        self.text(FetchRequest::get(url).headers(headers)).await
    }
}

fn decode_text(body: Vec<u8>) -> Result<String, FetchError> {
    let text = String::from_utf8(body)
        .map_err(|e| FetchError::Decoding(format!("body is not valid UTF-8: {}", e.utf8_error())))?;
    Ok(match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    })
}


#[cfg(test)]
mod tests {
    use super::mock::MockFetcher;
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Payload {
        value: i64,
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_non_2xx_is_http_error() {
        let transport = MockFetcher::new()
            .route("https://example.com/down", 503, "unavailable")
            .into_transport();
        let err = transport
            .fetch_text(url("https://example.com/down"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 503 }));
    }

    #[tokio::test]
    async fn test_decoded_and_decoding_error() {
        let transport = MockFetcher::new()
            .route("https://example.com/ok", 200, r#"{"value": 7}"#)
            .route("https://example.com/bad", 200, "<html>")
            .into_transport();

        let payload: Payload = transport
            .fetch_decoded(url("https://example.com/ok"), &[])
            .await
            .unwrap();
        assert_eq!(payload.value, 7);

        let err = transport
            .fetch_decoded::<Payload>(url("https://example.com/bad"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decoding(_)));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_decoding_error() {
        let transport = Transport::new(
            Arc::new(BytesFetcher(vec![0xd6, 0xd0, 0xff, 0xfe])),
            &HttpConfig::default(),
        );
        let err = transport
            .fetch_text(url("https://example.com/gbk"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decoding(_)));
    }

    struct BytesFetcher(Vec<u8>);

    #[async_trait]
    impl Fetcher for BytesFetcher {
        async fn fetch(&self, _request: &FetchRequest) -> Result<FetchResponse, FetchError> {
            Ok(FetchResponse {
                status: 200,
                headers: Vec::new(),
                body: self.0.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_bom_is_stripped() {
        let transport = Transport::new(
            Arc::new(BytesFetcher("\u{feff}<rss/>".as_bytes().to_vec())),
            &HttpConfig::default(),
        );
        let text = transport
            .fetch_text(url("https://example.com/feed"), &[])
            .await
            .unwrap();
        assert_eq!(text, "<rss/>");
    }

    #[tokio::test]
    async fn test_header_overrides_replace_defaults() {
        let fetcher = Arc::new(MockFetcher::new().route("https://example.com", 200, "ok"));
        let transport = Transport::new(fetcher.clone(), &HttpConfig::default());
        transport
            .fetch_text(url("https://example.com/x"), &[("user-agent", "custom"), ("Referer", "r")])
            .await
            .unwrap();

        let requests = fetcher.requests.lock().unwrap();
        let headers = &requests[0].headers;
        let agents: Vec<_> = headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
            .collect();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].1, "custom");
        assert!(headers.iter().any(|(k, v)| k == "Referer" && v == "r"));
        assert!(headers.iter().any(|(k, _)| k == "Accept-Language"));
    }

    #[test]
    fn test_cookie_header() {
        let response = FetchResponse {
            status: 200,
            headers: vec![
                ("Set-Cookie".into(), "xq_a_token=abc; path=/; HttpOnly".into()),
                ("set-cookie".into(), "u=42; Domain=.xueqiu.com".into()),
                ("Content-Type".into(), "text/html".into()),
            ],
            body: Vec::new(),
        };
        assert_eq!(response.cookie_header(), "xq_a_token=abc; u=42");
    }
}
