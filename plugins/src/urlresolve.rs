use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;

use fairprice_core::api::UrlResolver;

/// Redirect-following resolver for short retail links. HEAD first, GET as
/// the fallback, matching what the shorteners tolerate.
pub struct HttpUrlResolver {
    http: reqwest::Client,
}

impl HttpUrlResolver {
    pub fn new(timeout_ms: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { http })
    }

    async fn resolve_with(&self, method: Method, url: &str) -> Option<String> {
        match self.http.request(method, url).send().await {
            Ok(response) => Some(response.url().to_string()),
            Err(err) => {
                tracing::debug!(
                    target: "fairprice.store",
                    url,
                    error = %err,
                    "short URL resolution request failed"
                );
                None
            }
        }
    }
}

#[async_trait]
impl UrlResolver for HttpUrlResolver {
    async fn resolve(&self, url: &str) -> Option<String> {
        match self.resolve_with(Method::HEAD, url).await {
            Some(resolved) => Some(resolved),
            None => self.resolve_with(Method::GET, url).await,
        }
    }
}
