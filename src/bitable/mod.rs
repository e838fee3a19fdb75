//! Feishu Bitable client.
//!
//! Covers the three API surfaces a sync pass needs: tenant token exchange,
//! paged record listing, and partial record updates. Every response carries
//! a logical `code` distinct from the HTTP status; a non-zero code on an
//! HTTP 2xx is still a failure.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::error::SyncError;

/// Cap on the listing loop, in case the provider never clears `has_more`.
const LIST_MAX_PAGES: usize = 1000;

/// A tenant access token, fetched once per run and reused for its duration.
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: String,
    pub issued_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            issued_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Short prefix safe to log. The full token never goes to output.
    pub fn preview(&self) -> String {
        let prefix: String = self.value.chars().take(10).collect();
        format!("{prefix}...")
    }
}

/// One row of the remote table, untyped.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    pub record_id: String,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    tenant_access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    has_more: bool,
    page_token: Option<String>,
    #[serde(default)]
    items: Vec<RawRecord>,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    code: i64,
    #[serde(default)]
    msg: String,
}

/// Bitable API client.
pub struct BitableClient {
    app_id: SecretString,
    app_secret: SecretString,
    base_url: String,
    client: Client,
}

impl BitableClient {
    pub fn new(app_id: SecretString, app_secret: SecretString) -> Self {
        Self::with_client(app_id, app_secret, Client::new())
    }

    pub fn with_client(app_id: SecretString, app_secret: SecretString, client: Client) -> Self {
        Self {
            app_id,
            app_secret,
            base_url: "https://open.feishu.cn".to_string(),
            client,
        }
    }

    /// Override API base URL (useful for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Exchange the app credential for a tenant access token.
    ///
    /// Fatal on any failure: nothing downstream can proceed without a token.
    pub async fn tenant_access_token(&self) -> Result<AccessToken, SyncError> {
        let url = self.url("/open-apis/auth/v3/tenant_access_token/internal");
        let body = serde_json::json!({
            "app_id": self.app_id.expose_secret(),
            "app_secret": self.app_secret.expose_secret(),
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Auth(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Auth(format!("http {status}: {body}")));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Auth(format!("invalid response body: {e}")))?;

        if parsed.code != 0 {
            return Err(SyncError::Auth(format!(
                "rejected (code {}): {}",
                parsed.code, parsed.msg
            )));
        }

        let value = parsed
            .tenant_access_token
            .ok_or_else(|| SyncError::Auth("response carried no token".to_string()))?;

        let token = AccessToken::new(value, Utc::now());
        tracing::info!(token = %token.preview(), "obtained tenant access token");
        Ok(token)
    }

    /// List every record of a table, following the continuation cursor until
    /// the provider reports no more pages.
    ///
    /// Any failure aborts the run: a partial listing would silently drop
    /// identifiers.
    pub async fn list_records(
        &self,
        token: &AccessToken,
        app_token: &str,
        table_id: &str,
        page_size: u32,
    ) -> Result<Vec<RawRecord>, SyncError> {
        let url = self.url(&format!(
            "/open-apis/bitable/v1/apps/{app_token}/tables/{table_id}/records"
        ));

        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..LIST_MAX_PAGES {
            let mut request = self
                .client
                .get(&url)
                .bearer_auth(token.value())
                .query(&[("page_size", page_size.to_string())]);
            if let Some(cursor) = &page_token {
                request = request.query(&[("page_token", cursor.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| SyncError::Fetch(format!("request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SyncError::Fetch(format!("http {status}: {body}")));
            }

            let parsed: ListResponse = response
                .json()
                .await
                .map_err(|e| SyncError::Fetch(format!("invalid response body: {e}")))?;

            if parsed.code != 0 {
                return Err(SyncError::Api {
                    code: parsed.code,
                    msg: parsed.msg,
                });
            }

            let data = parsed.data.unwrap_or(ListData {
                has_more: false,
                page_token: None,
                items: Vec::new(),
            });

            tracing::debug!(page, items = data.items.len(), "fetched record page");
            records.extend(data.items);

            if !data.has_more {
                return Ok(records);
            }
            match data.page_token {
                Some(cursor) if !cursor.is_empty() => page_token = Some(cursor),
                // has_more without a cursor would loop on page one forever.
                _ => return Ok(records),
            }
        }

        Err(SyncError::Fetch(format!(
            "listing exceeded {LIST_MAX_PAGES} pages without completing"
        )))
    }

    /// Partially update one record: only the provided fields are touched.
    /// Writing the same values twice yields the same remote state.
    pub async fn update_record(
        &self,
        token: &AccessToken,
        app_token: &str,
        table_id: &str,
        record_id: &str,
        fields: &HashMap<String, Value>,
    ) -> Result<(), SyncError> {
        let url = self.url(&format!(
            "/open-apis/bitable/v1/apps/{app_token}/tables/{table_id}/records/{record_id}"
        ));
        let body = serde_json::json!({ "fields": fields });

        let response = self
            .client
            .put(&url)
            .bearer_auth(token.value())
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Fetch(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Fetch(format!("http {status}: {body}")));
        }

        let parsed: UpdateResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Fetch(format!("invalid response body: {e}")))?;

        if parsed.code != 0 {
            return Err(SyncError::Api {
                code: parsed.code,
                msg: parsed.msg,
            });
        }

        Ok(())
    }
}
