//! HTTP client for the AdGuard Home control API.

use super::types::{Clients, DhcpStatus, QueryLogPage, QueryLogSummary, Stats, Status};
use super::{ApplianceClient, Resource};
use crate::config::ApplianceConfig;
use crate::error::{ExporterError, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Client for a single AdGuard Home instance.
pub struct AdguardClient {
    http: Client,
    url: String,
    username: Option<String>,
    password: Option<String>,
    query_log_limit: u32,
    /// Newest query log timestamp already turned into timing entries.
    query_log_cursor: Mutex<Option<DateTime<FixedOffset>>>,
}

impl AdguardClient {
    /// Create a new client from its configuration.
    pub fn new(config: &ApplianceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("adguard-exporter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExporterError::invalid_config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: config.url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            query_log_limit: config.query_log_limit,
            query_log_cursor: Mutex::new(None),
        })
    }

    /// Fetch and decode one control API resource.
    #[instrument(skip_all, fields(server = %self.url, resource = %resource))]
    async fn get_json<T: DeserializeOwned>(
        &self,
        resource: Resource,
        query: &[(&str, String)],
    ) -> Result<T> {
        let mut request = self.http.get(format!("{}{}", self.url, resource.path()));
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request.send().await.map_err(|e| ExporterError::Request {
            server: self.url.clone(),
            resource,
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExporterError::UnexpectedStatus {
                server: self.url.clone(),
                resource,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| ExporterError::Request {
            server: self.url.clone(),
            resource,
            source: e,
        })?;
        debug!(bytes = body.len(), "Fetched resource");

        serde_json::from_slice(&body).map_err(|e| ExporterError::Decode {
            server: self.url.clone(),
            resource,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ApplianceClient for AdguardClient {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get_stats(&self) -> Result<Stats> {
        self.get_json(Resource::Stats, &[]).await
    }

    async fn get_clients(&self) -> Result<Clients> {
        self.get_json(Resource::Clients, &[]).await
    }

    async fn get_status(&self) -> Result<Status> {
        self.get_json(Resource::Status, &[]).await
    }

    async fn get_dhcp(&self) -> Result<DhcpStatus> {
        self.get_json(Resource::Dhcp, &[]).await
    }

    async fn get_query_log(&self) -> Result<QueryLogSummary> {
        let page: QueryLogPage =
            self.get_json(Resource::QueryLog, &[("limit", self.query_log_limit.to_string())]).await?;

        let mut cursor = self.query_log_cursor.lock().await;
        let (summary, newest) = QueryLogSummary::from_entries(&page.data, *cursor);
        *cursor = newest;
        debug!(
            server = %self.url,
            entries = page.data.len(),
            new_timings = summary.times.len(),
            "Condensed query log"
        );
        Ok(summary)
    }
}
