//! HTTP client for the hub's query surface

use anyhow::{Context, Result, bail};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::actors::MonitorStats;
use crate::alerts::Alert;
use crate::api::types::{
    AcknowledgeResponse, AlertsResponse, CircuitsResponse, HealthResponse, LatestReadingResponse,
    UsageResponse,
};
use crate::{CircuitReading, Reading};

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    auth_token: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .with_context(|| format!("Failed to request {what}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{what} failed with {status}: {body}");
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        self.send(self.http.get(self.url(path)), what)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to decode {what}"))
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health", "health check").await
    }

    pub async fn latest_reading(&self) -> Result<Option<Reading>> {
        let response: LatestReadingResponse =
            self.get("/readings/latest", "latest reading").await?;
        Ok(response.reading)
    }

    pub async fn circuits(&self) -> Result<Vec<CircuitReading>> {
        let response: CircuitsResponse = self.get("/circuits", "circuit readings").await?;
        Ok(response.circuits)
    }

    pub async fn usage(&self, hours: u32) -> Result<Vec<Reading>> {
        let response: UsageResponse = self
            .get(&format!("/usage?hours={hours}"), "usage history")
            .await?;
        Ok(response.readings)
    }

    pub async fn active_alerts(&self) -> Result<Vec<Alert>> {
        let response: AlertsResponse = self.get("/alerts", "active alerts").await?;
        Ok(response.alerts)
    }

    /// Acknowledge an alert, `Ok(false)` if the hub does not know the id
    pub async fn acknowledge_alert(&self, id: &str) -> Result<bool> {
        let request = self
            .http
            .post(self.url(&format!("/alerts/{id}/acknowledge")));
        let response = self
            .authorized(request)
            .send()
            .await
            .context("Failed to request alert acknowledgement")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("alert acknowledgement failed with {status}: {body}");
        }

        let ack: AcknowledgeResponse = response
            .json()
            .await
            .context("Failed to decode alert acknowledgement")?;
        Ok(ack.acknowledged)
    }

    pub async fn monitor_stats(&self) -> Result<MonitorStats> {
        self.get("/monitor", "monitor status").await
    }
}
