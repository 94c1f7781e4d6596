//! OpenMRS REST reader
//!
//! Pages through `GET /ws/rest/v1/obs?v=full` using `startIndex`/`limit`,
//! following the server's `next` link. Voided items and items at or before
//! the cursor are dropped client-side. Each page is sorted before it is
//! handed out, so order holds within a page.

use crate::adapters::openmrs::models::{format_openmrs_datetime, RestObservation, RestPage};
use crate::adapters::source::{paged, ObservationSource, ObservationStream, SourceConnector};
use crate::config::OpenMrsRestConfig;
use crate::domain::{EngineError, Result, SourceCursor, SourceError, SourceObservation};
use crate::log_retry_attempt;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, ClientBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Paging position within one stream
#[derive(Debug, Clone, Copy)]
struct RestPosition {
    start_index: usize,
    exhausted: bool,
}

/// Reader over the OpenMRS REST web services
pub struct RestObservationSource {
    base_url: String,
    client: Client,
    config: OpenMrsRestConfig,
}

impl RestObservationSource {
    /// Builds the HTTP client. No request is sent.
    pub fn new(config: OpenMrsRestConfig) -> Result<Self> {
        let mut client_builder = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds.min(30)));

        if !config.tls_verify {
            tracing::warn!("TLS certificate verification disabled for OpenMRS REST source");
            client_builder = client_builder.danger_accept_invalid_certs(true);
        }

        let client = client_builder.build().map_err(|e| {
            EngineError::Configuration(format!("Failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            config,
        })
    }

    fn auth_header_value(&self) -> String {
        let credentials = format!(
            "{}:{}",
            self.config.username,
            self.config.password.expose_secret().as_ref()
        );
        let encoded = general_purpose::STANDARD.encode(credentials.as_bytes());
        format!("Basic {encoded}")
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}/ws/rest/v1/{path}", self.base_url)).map_err(|e| {
            EngineError::Configuration(format!(
                "Invalid OpenMRS base URL '{}': {e}",
                self.base_url
            ))
        })
    }

    fn obs_url(
        &self,
        since: Option<&SourceCursor>,
        start_index: usize,
        limit: usize,
    ) -> Result<Url> {
        let mut url = self.endpoint("obs")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("v", "full")
                .append_pair("limit", &limit.to_string())
                .append_pair("startIndex", &start_index.to_string());
            if let Some(cursor) = since {
                query.append_pair("fromdate", &format_openmrs_datetime(&cursor.recorded_at));
            }
        }
        Ok(url)
    }

    /// Retry a request with exponential backoff
    ///
    /// Only connection failures, timeouts and 5xx answers are retried.
    async fn retry_request<F, T, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, SourceError>>,
    {
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if attempt > retry.max_retries || !is_retryable(&e) {
                        return Err(e.into());
                    }

                    let delay_ms = (retry.initial_delay_ms as f64
                        * retry.backoff_multiplier.powi(attempt as i32 - 1))
                        as u64;
                    let delay_ms = delay_ms.min(retry.max_delay_ms);

                    log_retry_attempt!(attempt, retry.max_retries, e);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    async fn get_json(&self, url: &Url) -> std::result::Result<Value, SourceError> {
        let response = self
            .client
            .get(url.clone())
            .header("Authorization", self.auth_header_value())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout(e.to_string())
                } else {
                    SourceError::ConnectionFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))
    }

    async fn fetch_page(
        &self,
        since: Option<&SourceCursor>,
        position: RestPosition,
        page_size: usize,
    ) -> Result<Option<(Vec<Result<SourceObservation>>, RestPosition)>> {
        if position.exhausted {
            return Ok(None);
        }

        let url = self.obs_url(since, position.start_index, page_size)?;
        tracing::debug!(start_index = position.start_index, "Fetching OpenMRS obs page");

        let body = self.retry_request(|| self.get_json(&url)).await?;
        let page: RestPage<Value> = serde_json::from_value(body)
            .map_err(|e| SourceError::InvalidResponse(format!("Unexpected obs page: {e}")))?;

        let fetched = page.results.len();
        let has_next = page.has_next() && fetched > 0;

        let mut errors = Vec::new();
        let mut observations = Vec::new();
        for item in page.results {
            let observation = match serde_json::from_value::<RestObservation>(item) {
                Ok(observation) => observation,
                Err(e) => {
                    errors.push(Err(EngineError::Validation(format!(
                        "Malformed obs in REST response: {e}"
                    ))));
                    continue;
                }
            };
            if observation.voided {
                continue;
            }
            match observation.into_domain() {
                Ok(observation) if observation.is_after(since) => observations.push(observation),
                Ok(_) => {}
                Err(e) => errors.push(Err(e)),
            }
        }
        observations.sort_by(|a, b| {
            (a.recorded_at, &a.source_id).cmp(&(b.recorded_at, &b.source_id))
        });

        let mut items = errors;
        items.extend(observations.into_iter().map(Ok));

        let next = RestPosition {
            start_index: position.start_index + fetched,
            exhausted: !has_next,
        };
        Ok(Some((items, next)))
    }
}

fn is_retryable(error: &SourceError) -> bool {
    matches!(
        error,
        SourceError::ConnectionFailed(_) | SourceError::Timeout(_) | SourceError::ServerError { .. }
    )
}

fn status_error(status: StatusCode, body: String) -> SourceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SourceError::AuthenticationFailed(
            format!("OpenMRS rejected the credentials ({status})"),
        ),
        s if s.is_server_error() => SourceError::ServerError {
            status: s.as_u16(),
            message: body,
        },
        s => SourceError::ClientError {
            status: s.as_u16(),
            message: body,
        },
    }
}

#[async_trait]
impl ObservationSource for RestObservationSource {
    async fn test_connection(&self) -> Result<()> {
        let url = self.endpoint("session")?;
        let session = self.retry_request(|| self.get_json(&url)).await?;

        if session.get("authenticated").and_then(Value::as_bool) != Some(true) {
            return Err(SourceError::AuthenticationFailed(
                "OpenMRS session is not authenticated".to_string(),
            )
            .into());
        }

        tracing::info!(base_url = %self.base_url, "OpenMRS REST connection test successful");
        Ok(())
    }

    fn observations(
        &self,
        since: Option<SourceCursor>,
        page_size: usize,
    ) -> ObservationStream<'_> {
        let start = RestPosition {
            start_index: 0,
            exhausted: false,
        };
        paged(start, move |position| {
            let since = since.clone();
            async move { self.fetch_page(since.as_ref(), position, page_size).await }
        })
    }

    fn describe(&self) -> String {
        format!("openmrs rest ({})", self.base_url)
    }
}

/// Opens a [`RestObservationSource`] per run
pub struct RestConnector {
    config: OpenMrsRestConfig,
}

impl RestConnector {
    pub fn new(config: OpenMrsRestConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SourceConnector for RestConnector {
    async fn connect(&self) -> Result<Arc<dyn ObservationSource>> {
        Ok(Arc::new(RestObservationSource::new(self.config.clone())?))
    }
}
