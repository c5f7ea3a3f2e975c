//! Client for the activity aggregator and the block-list service.
//!
//! The tracker only needs [RemoteApi]. Everything else ([ApiClient]'s inherent methods) is used by
//! the cli.

pub mod http;
pub mod types;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::{
    tracker::session::{Category, CompletedSession},
    utils::time::date_to_key,
};

use http::ResponseExt;
use types::{BlockEntry, CategoryReport, NewBlockEntry, RemoteSession};

pub const DEFAULT_API_BASE: &str = "http://localhost:5000/api";

const SERVICE_NAME: &str = "Activity";

/// Remote calls made on behalf of the tracker. Every call needs a credential; callers without one
/// are offline and must not call at all.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Sends a finished session to the aggregator.
    async fn post_session(&self, token: &str, session: &CompletedSession) -> Result<()>;

    /// Fetches the authoritative block-list.
    async fn fetch_blocked_sites(&self, token: &str) -> Result<Vec<BlockEntry>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionPayload<'a> {
    website: &'a str,
    domain: &'a str,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration: u64,
    category: Category,
}

impl<'a> From<&'a CompletedSession> for SessionPayload<'a> {
    fn from(session: &'a CompletedSession) -> Self {
        Self {
            website: &session.url,
            domain: &session.domain,
            start_time: session.start_time,
            end_time: session.end_time,
            duration: session.duration,
            category: session.category,
        }
    }
}

pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        token: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!("GET {url}");

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .context("Failed to send request to the activity service")?
            .ensure_success(SERVICE_NAME)
            .await?;

        response
            .json()
            .await
            .context("Failed to parse activity service response")
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        token: &str,
        url: &str,
        body: &B,
    ) -> Result<T> {
        debug!("POST {url}");

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .context("Failed to send request to the activity service")?
            .ensure_success(SERVICE_NAME)
            .await?;

        response
            .json()
            .await
            .context("Failed to parse activity service response")
    }

    /// Sessions stored by the aggregator, optionally only the ones of a single day.
    pub async fn sessions(&self, token: &str, date: Option<NaiveDate>) -> Result<Vec<RemoteSession>> {
        let query = date
            .map(|date| vec![("date", date_to_key(date))])
            .unwrap_or_default();
        self.get(token, &self.url("activity"), &query).await
    }

    /// Per-category totals between two days, both inclusive.
    pub async fn report(
        &self,
        token: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CategoryReport>> {
        let query = [("startDate", date_to_key(start)), ("endDate", date_to_key(end))];
        self.get(token, &self.url("activity/report"), &query).await
    }

    pub async fn add_blocked_site(&self, token: &str, entry: &NewBlockEntry) -> Result<BlockEntry> {
        self.post(token, &self.url("blocked-sites"), entry).await
    }

    pub async fn remove_blocked_site(&self, token: &str, id: &str) -> Result<()> {
        let url = self.url(&format!("blocked-sites/{id}"));
        debug!("DELETE {url}");

        self.client
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await
            .context("Failed to send request to the activity service")?
            .ensure_success(SERVICE_NAME)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for ApiClient {
    async fn post_session(&self, token: &str, session: &CompletedSession) -> Result<()> {
        let url = self.url("activity");
        debug!("POST {url}");

        self.client
            .post(&url)
            .bearer_auth(token)
            .json(&SessionPayload::from(session))
            .send()
            .await
            .context("Failed to send request to the activity service")?
            .ensure_success(SERVICE_NAME)
            .await?;
        Ok(())
    }

    async fn fetch_blocked_sites(&self, token: &str) -> Result<Vec<BlockEntry>> {
        self.get(token, &self.url("blocked-sites"), &[]).await
    }
}
