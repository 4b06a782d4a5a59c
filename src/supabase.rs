//! Supabase PostgREST client.
//!
//! Thin table/query client over the project's REST endpoint. Queries are
//! expressed with a small builder (`eq`, `ilike`, `gte`, `lte`, `order`,
//! `limit`) that mirrors the PostgREST filter syntax; rows are decoded into
//! typed records at the boundary instead of being passed around as loose
//! JSON.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// HTTP client timeout for PostgREST requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("PostgREST returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Failed to decode row: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Insert returned no rows")]
    EmptyInsert,

    #[error("Invalid URL: {0}")]
    Url(String),
}

/// Client for the Supabase REST (PostgREST) endpoint
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    rest_url: String,
    service_key: String,
}

impl SupabaseClient {
    /// Create a client from the project URL and the service-role key
    pub fn new(base_url: &str, service_key: &str) -> Result<Self, SupabaseError> {
        let cleaned_url = base_url.trim_end_matches('/');

        let parsed = reqwest::Url::parse(cleaned_url)
            .map_err(|e| SupabaseError::Url(format!("Invalid URL '{}': {}", cleaned_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SupabaseError::Url(format!(
                "URL must use http or https scheme, got: {}",
                parsed.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            rest_url: format!("{}/rest/v1", cleaned_url),
            service_key: service_key.to_string(),
        })
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.service_key) {
            headers.insert("apikey", value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.service_key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    /// Start a read query on `table`
    pub fn from(&self, table: &str) -> QueryBuilder<'_> {
        QueryBuilder {
            client: self,
            table: table.to_string(),
            params: Vec::new(),
        }
    }

    /// Insert a single row and return the representation the backend stored
    pub async fn insert<T, R>(&self, table: &str, row: &T) -> Result<R, SupabaseError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.rest_url, table);
        debug!("inserting row into {}", table);

        let response = self
            .http
            .post(&url)
            .headers(self.auth_headers())
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::Status { status, body });
        }

        let mut rows: Vec<R> = response.json().await?;
        if rows.is_empty() {
            return Err(SupabaseError::EmptyInsert);
        }
        Ok(rows.remove(0))
    }

    /// Patch rows matching `filter` and return the updated representations
    pub async fn update<T, R>(
        &self,
        table: &str,
        patch: &T,
        filter: (&str, &str),
    ) -> Result<Vec<R>, SupabaseError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.rest_url, table);
        debug!("updating rows in {} where {}={}", table, filter.0, filter.1);

        let response = self
            .http
            .patch(&url)
            .headers(self.auth_headers())
            .header("Prefer", "return=representation")
            .query(&[(filter.0, format!("eq.{}", filter.1))])
            .json(patch)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::Status { status, body });
        }

        Ok(response.json().await?)
    }
}

/// Read query under construction
pub struct QueryBuilder<'a> {
    client: &'a SupabaseClient,
    table: String,
    params: Vec<(String, String)>,
}

impl<'a> QueryBuilder<'a> {
    pub fn select(mut self, columns: &str) -> Self {
        self.params.push(("select".to_string(), columns.to_string()));
        self
    }

    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.params.push((column.to_string(), format!("eq.{}", value)));
        self
    }

    /// Case-insensitive pattern match; `*` is the PostgREST wildcard
    pub fn ilike(mut self, column: &str, pattern: &str) -> Self {
        self.params
            .push((column.to_string(), format!("ilike.{}", pattern)));
        self
    }

    pub fn gte(mut self, column: &str, value: &str) -> Self {
        self.params
            .push((column.to_string(), format!("gte.{}", value)));
        self
    }

    pub fn lte(mut self, column: &str, value: &str) -> Self {
        self.params
            .push((column.to_string(), format!("lte.{}", value)));
        self
    }

    pub fn order(mut self, column: &str, descending: bool) -> Self {
        let direction = if descending { "desc" } else { "asc" };
        self.params
            .push(("order".to_string(), format!("{}.{}", column, direction)));
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.params.push(("limit".to_string(), count.to_string()));
        self
    }

    /// The accumulated query string parameters (exposed for tests)
    pub fn query_params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Execute the query and decode all rows
    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>, SupabaseError> {
        let url = format!("{}/{}", self.client.rest_url, self.table);
        debug!("querying {} with {} filters", self.table, self.params.len());

        let response = self
            .client
            .http
            .get(&url)
            .headers(self.client.auth_headers())
            .query(&self.params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::Status { status, body });
        }

        Ok(response.json().await?)
    }

    /// Execute the query and decode at most one row
    pub async fn fetch_one<T: DeserializeOwned>(self) -> Result<Option<T>, SupabaseError> {
        let rows: Vec<T> = self.limit(1).fetch().await?;
        Ok(rows.into_iter().next())
    }
}
