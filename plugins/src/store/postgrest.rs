use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use fairprice_core::api::{AttemptRecord, RunSummary, StoreError, TelemetryConfig, TelemetryStore};

/// Telemetry store over a PostgREST endpoint. Sessions are anonymous and
/// cached for the process lifetime; error classification feeds the core's
/// retry/fallback policy.
pub struct PostgrestTelemetryStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    summary_table: String,
    attempts_table: String,
    session_token: tokio::sync::Mutex<Option<String>>,
}

impl PostgrestTelemetryStore {
    pub fn new(cfg: &TelemetryConfig) -> anyhow::Result<Self> {
        if cfg.base_url.trim().is_empty() {
            anyhow::bail!("telemetry base_url is not configured");
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            summary_table: cfg.summary_table.clone(),
            attempts_table: cfg.attempts_table.clone(),
            session_token: tokio::sync::Mutex::new(None),
        })
    }

    fn classify_transport(err: reqwest::Error) -> StoreError {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            StoreError::Transient(err.to_string())
        } else {
            StoreError::Fatal(err.to_string())
        }
    }

    fn classify_response(status: StatusCode, body: &str) -> StoreError {
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            return StoreError::Transient(format!("{status}: {body}"));
        }
        // PostgREST reports unknown payload columns as PGRST204.
        if status.is_client_error()
            && (body.contains("PGRST204") || body.to_lowercase().contains("column"))
        {
            return StoreError::SchemaMismatch(format!("{status}: {body}"));
        }
        StoreError::Fatal(format!("{status}: {body}"))
    }

    async fn insert(&self, table: &str, payload: &serde_json::Value) -> Result<(), StoreError> {
        let token = self
            .session_token
            .lock()
            .await
            .clone()
            .ok_or_else(|| StoreError::Fatal("no authenticated session".to_string()))?;

        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&token)
            .header("Prefer", "return=minimal")
            .json(payload)
            .send()
            .await
            .map_err(Self::classify_transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(
            target: "fairprice.store",
            table,
            status = %status,
            body = %body,
            "telemetry insert rejected"
        );
        Err(Self::classify_response(status, &body))
    }
}

#[async_trait]
impl TelemetryStore for PostgrestTelemetryStore {
    async fn ensure_session(&self) -> Result<(), StoreError> {
        let mut token = self.session_token.lock().await;
        if token.is_some() {
            return Ok(());
        }

        let url = format!("{}/auth/v1/signup", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(Self::classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_response(status, &body));
        }

        let body: serde_json::Value = response.json().await.map_err(Self::classify_transport)?;
        let access_token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                StoreError::Fatal("anonymous sign-in response missing access_token".to_string())
            })?;
        *token = Some(access_token.to_string());
        tracing::info!(target: "fairprice.store", "anonymous telemetry session established");
        Ok(())
    }

    async fn insert_summary(&self, row: &RunSummary) -> Result<(), StoreError> {
        let payload =
            serde_json::to_value(row).map_err(|e| StoreError::Fatal(e.to_string()))?;
        self.insert(&self.summary_table, &payload).await
    }

    async fn insert_attempts(&self, rows: &[AttemptRecord]) -> Result<(), StoreError> {
        let payload =
            serde_json::to_value(rows).map_err(|e| StoreError::Fatal(e.to_string()))?;
        self.insert(&self.attempts_table, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use fairprice_core::api::CheckOutcome;

    use super::*;

    fn config(base_url: &str) -> TelemetryConfig {
        TelemetryConfig {
            base_url: base_url.to_string(),
            api_key: "anon-key".to_string(),
            ..TelemetryConfig::default()
        }
    }

    fn summary_row() -> RunSummary {
        RunSummary {
            product_url: "https://example.com/p/1".into(),
            domain: "example.com".into(),
            baseline_price_cents: 1999,
            found_price_cents: 1299,
            strategy_id: None,
            strategy_name: None,
            extraction_successful: true,
            attempted_configs: Some(vec!["wg-test".into()]),
            final_config: Some("wg-test".into()),
            retry_count: 0,
            outcome: Some(CheckOutcome::Success),
            degraded: Some(false),
            baseline_success: Some(true),
            spoof_success: Some(true),
            dirty_baseline_price_cents: None,
            raw_extraction_data: serde_json::json!({}),
            created_at: None,
        }
    }

    #[tokio::test]
    async fn bootstraps_anonymous_session_then_inserts() {
        let mut server = mockito::Server::new_async().await;
        let signup = server
            .mock("POST", "/auth/v1/signup")
            .with_status(200)
            .with_body(r#"{"access_token":"tok-1"}"#)
            .expect(1)
            .create_async()
            .await;
        let insert = server
            .mock("POST", "/rest/v1/price_checks")
            .match_header("authorization", "Bearer tok-1")
            .with_status(201)
            .expect(1)
            .create_async()
            .await;

        let store = PostgrestTelemetryStore::new(&config(&server.url())).unwrap();
        store.ensure_session().await.unwrap();
        // Second call reuses the cached token.
        store.ensure_session().await.unwrap();
        store.insert_summary(&summary_row()).await.unwrap();

        signup.assert_async().await;
        insert.assert_async().await;
    }

    #[tokio::test]
    async fn unknown_column_rejection_classifies_as_schema_mismatch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/signup")
            .with_status(200)
            .with_body(r#"{"access_token":"tok-1"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/price_checks")
            .with_status(400)
            .with_body(r#"{"code":"PGRST204","message":"Could not find the 'outcome' column"}"#)
            .create_async()
            .await;

        let store = PostgrestTelemetryStore::new(&config(&server.url())).unwrap();
        store.ensure_session().await.unwrap();
        let err = store.insert_summary(&summary_row()).await.unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch(_)));
    }

    #[tokio::test]
    async fn server_errors_classify_as_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/signup")
            .with_status(200)
            .with_body(r#"{"access_token":"tok-1"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/price_check_attempts")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let store = PostgrestTelemetryStore::new(&config(&server.url())).unwrap();
        store.ensure_session().await.unwrap();
        let err = store.insert_attempts(&[]).await.unwrap_err();
        assert!(matches!(err, StoreError::Transient(_)));
    }

    #[tokio::test]
    async fn insert_without_session_is_fatal() {
        let server = mockito::Server::new_async().await;
        let store = PostgrestTelemetryStore::new(&config(&server.url())).unwrap();
        let err = store.insert_summary(&summary_row()).await.unwrap_err();
        assert!(matches!(err, StoreError::Fatal(_)));
    }
}
