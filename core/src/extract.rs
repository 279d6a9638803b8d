use async_trait::async_trait;

/// Result of rendering a product page and scraping a price from it.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionOutput {
    pub price_cents: i64,
    pub tactics: Vec<String>,
    pub debug_extraction_path: Option<String>,
}

impl ExtractionOutput {
    pub fn new(price_cents: i64, tactics: Vec<String>) -> Self {
        Self {
            price_cents,
            tactics,
            debug_extraction_path: None,
        }
    }
}

/// Page-load + price-scrape collaborator. Implementations own their own
/// timeout; a timed-out load surfaces as an ordinary error here. The
/// coordinator never inspects session identity, only success/failure.
#[async_trait]
pub trait Extraction: Send + Sync {
    async fn load_and_extract(&self, url: &str) -> anyhow::Result<ExtractionOutput>;
}
