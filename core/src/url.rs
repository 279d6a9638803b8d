use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FIRST_URL: Regex = Regex::new(r"(?i)https?://\S+").unwrap();
    static ref SCHEME_HOST: Regex = Regex::new(r"(?i)^[a-z][a-z0-9+.-]*://([^/?#:]+)").unwrap();
}

/// First http(s) URL embedded in arbitrary shared text, if any.
pub fn extract_first_url(value: &str) -> Option<String> {
    FIRST_URL.find(value).map(|m| m.as_str().to_string())
}

/// Lowercased host component, or empty string when the URL is unparseable.
pub fn host_of(url: &str) -> String {
    SCHEME_HOST
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Retailer short-link hosts that hide the canonical product URL behind a
/// redirect (currently the a.co shortener family).
pub fn is_short_retail_host(url: &str) -> bool {
    let host = host_of(url);
    host == "a.co" || host.ends_with(".a.co")
}

/// Redirect-following resolver for short retail links. Returns `None` when
/// resolution fails; callers fall back to the original URL.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Option<String>;
}

/// Resolver that never resolves. For hosts without network access and for
/// tests that submit canonical URLs directly.
pub struct NoopUrlResolver;

#[async_trait]
impl UrlResolver for NoopUrlResolver {
    async fn resolve(&self, _url: &str) -> Option<String> {
        None
    }
}

/// Canonicalize known short retail links, best-effort. Resolution failure
/// falls back silently to the submitted URL.
pub async fn canonicalize_url(resolver: &dyn UrlResolver, input_url: &str) -> String {
    if !is_short_retail_host(input_url) {
        return input_url.to_string();
    }

    match resolver.resolve(input_url).await {
        Some(resolved) if !resolved.trim().is_empty() => {
            if resolved != input_url {
                tracing::info!(
                    target: "fairprice.coordinator",
                    from = %input_url,
                    to = %resolved,
                    "canonicalized short retail URL"
                );
            }
            resolved
        }
        _ => {
            tracing::warn!(
                target: "fairprice.coordinator",
                url = %input_url,
                "failed to canonicalize short retail URL; using original"
            );
            input_url.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn extracts_first_url_from_shared_text() {
        let shared = "Check this out: https://example.com/p/123?ref=share and more text";
        assert_eq!(
            extract_first_url(shared),
            Some("https://example.com/p/123?ref=share".to_string())
        );
        assert_eq!(extract_first_url("no links here"), None);
    }

    #[test]
    fn host_parsing_handles_ports_and_case() {
        assert_eq!(host_of("https://Example.COM/p/1"), "example.com");
        assert_eq!(host_of("https://a.co:443/d/x"), "a.co");
        assert_eq!(host_of("not a url"), "");
    }

    #[test]
    fn short_host_detection_covers_subdomains() {
        assert!(is_short_retail_host("https://a.co/d/01Ral6wt"));
        assert!(is_short_retail_host("https://www.a.co/d/x"));
        assert!(!is_short_retail_host("https://www.amazon.com/dp/B0TEST"));
        assert!(!is_short_retail_host("https://nota.co.uk/x"));
    }

    struct FixedResolver(Option<String>);

    #[async_trait]
    impl UrlResolver for FixedResolver {
        async fn resolve(&self, _url: &str) -> Option<String> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn canonicalize_falls_back_on_resolution_failure() {
        let url = "https://a.co/d/01Ral6wt";
        let out = canonicalize_url(&FixedResolver(None), url).await;
        assert_eq!(out, url);
    }

    #[tokio::test]
    async fn canonicalize_uses_resolved_url() {
        let out = canonicalize_url(
            &FixedResolver(Some("https://www.amazon.com/dp/B0TEST1234".into())),
            "https://a.co/d/01Ral6wt",
        )
        .await;
        assert_eq!(out, "https://www.amazon.com/dp/B0TEST1234");
    }

    #[tokio::test]
    async fn canonicalize_skips_ordinary_urls() {
        let out = canonicalize_url(
            &FixedResolver(Some("https://elsewhere.example".into())),
            "https://example.com/p/123",
        )
        .await;
        assert_eq!(out, "https://example.com/p/123");
    }
}
