//! Client for the OMDb movie-metadata API.
//!
//! Two endpoints are used: title search (`?s=`) and id lookup (`?i=`). Both
//! hand back the raw JSON body; decoding lives in [`parse`]. There are no
//! retries here.
pub mod parse;

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use thiserror::Error;

use crate::{config::AppConfig, models::MediaType};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("movie API unreachable: {0}")]
    Unreachable(String),

    #[error("movie API returned HTTP {0}")]
    Status(u16),

    #[error("movie API request timed out")]
    Timeout,

    #[error("movie API transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        // The URL carries the API key.
        let e = e.without_url();
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_connect() {
            ApiError::Unreachable(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::Status(status.as_u16())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// The two calls the search coordinator needs from a movie-metadata API.
#[async_trait]
pub trait MovieApi: Send + Sync {
    /// Free-text title search. Returns the raw response body.
    async fn search_by_title(
        &self,
        query: &str,
        media_type: Option<MediaType>,
    ) -> Result<String, ApiError>;

    /// Full record for one external id from a previous search.
    async fn fetch_by_id(&self, id: &str) -> Result<String, ApiError>;
}

pub struct OmdbClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl OmdbClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
        proxy: Option<&str>,
    ) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reelfinder/", env!("CARGO_PKG_VERSION")));

        if let Some(p) = proxy {
            if !p.is_empty() {
                builder = builder.proxy(reqwest::Proxy::all(p).context("invalid proxy URL")?);
            }
        }

        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid OMDb base URL {base_url:?}"))?;

        Ok(Self {
            client: builder.build().context("build HTTP client")?,
            base_url,
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Self::new(
            &config.omdb_base_url,
            config.omdb_api_key.clone(),
            config.request_timeout(),
            config.proxy.as_deref(),
        )
    }

    /// Title-search URL. The query is percent-encoded here.
    pub fn search_url(&self, query: &str, media_type: Option<MediaType>) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("s", query);
            if let Some(t) = media_type {
                pairs.append_pair("type", t.as_str());
            }
            pairs.append_pair("apikey", &self.api_key);
        }
        url
    }

    pub fn detail_url(&self, id: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("i", id)
            .append_pair("plot", "short")
            .append_pair("apikey", &self.api_key);
        url
    }

    async fn get_text(&self, url: Url) -> Result<String, ApiError> {
        tracing::debug!("GET {}", redact(&url));

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        tracing::debug!("OMDb response: {} bytes", body.len());
        Ok(body)
    }
}

#[async_trait]
impl MovieApi for OmdbClient {
    async fn search_by_title(
        &self,
        query: &str,
        media_type: Option<MediaType>,
    ) -> Result<String, ApiError> {
        self.get_text(self.search_url(query, media_type)).await
    }

    async fn fetch_by_id(&self, id: &str) -> Result<String, ApiError> {
        self.get_text(self.detail_url(id)).await
    }
}

/// Render a URL for logging with the API key masked.
fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    {
        let mut out = shown.query_pairs_mut();
        out.clear();
        for (k, v) in url.query_pairs() {
            if k == "apikey" {
                out.append_pair(&k, "REDACTED");
            } else {
                out.append_pair(&k, &v);
            }
        }
    }
    shown.to_string()
}
