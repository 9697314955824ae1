//! Ledger store on Supabase (PostgREST).
//!
//! The donations table carries a unique constraint on `external_reference`.
//! A record first PATCHes the row filtered by `status=neq.refunded`, then
//! inserts with `on_conflict=external_reference` and
//! `Prefer: resolution=ignore-duplicates`. Concurrent records of one
//! reference collapse into one row, and a refunded row is never rewritten.
//! Status transitions PATCH with `status=eq.<from>` so the database decides
//! which of two racing refunds wins.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use crate::config::{LedgerConfig, SUPABASE_KEY_ENV};
use crate::payments::ledger::{LedgerFilter, LedgerStore, StoreError, StoreResult};
use crate::payments::types::{LedgerEntry, LedgerStatus, NewLedgerRecord, RefundRequest};

const MAX_ERROR_BODY: usize = 512;

/// At most `max` bytes of `text`, cut on a char boundary.
fn truncate_body(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

#[derive(Clone)]
pub struct SupabaseLedgerStore {
    http: Client,
    rest_url: String,
    table: String,
    refund_table: String,
}

impl SupabaseLedgerStore {
    pub fn new(config: &LedgerConfig, service_key: &str) -> StoreResult<Self> {
        let base = url::Url::parse(&config.supabase_url)
            .map_err(|e| StoreError::Unavailable(format!("Invalid Supabase URL '{}': {}", config.supabase_url, e)))?;

        let mut headers = HeaderMap::new();
        let mut apikey = HeaderValue::from_str(service_key)
            .map_err(|_| StoreError::Unavailable("Supabase key is not a valid header value".to_string()))?;
        apikey.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", service_key))
            .map_err(|_| StoreError::Unavailable("Supabase key is not a valid header value".to_string()))?;
        bearer.set_sensitive(true);
        headers.insert("apikey", apikey);
        headers.insert(AUTHORIZATION, bearer);

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            rest_url: format!("{}/rest/v1", base.as_str().trim_end_matches('/')),
            table: config.table.clone(),
            refund_table: config.refund_table.clone(),
        })
    }

    /// Read the service key from `SUPABASE_SERVICE_KEY`.
    pub fn from_env(config: &LedgerConfig) -> StoreResult<Self> {
        let key = std::env::var(SUPABASE_KEY_ENV)
            .map_err(|_| StoreError::Unavailable(format!("Environment variable {} not set", SUPABASE_KEY_ENV)))?;
        Self::new(config, &key)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> StoreResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(StoreError::Backend {
                status: status.as_u16(),
                message: truncate_body(text, MAX_ERROR_BODY),
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn first_row(&self, request: RequestBuilder) -> StoreResult<Option<LedgerEntry>> {
        let rows: Vec<LedgerEntry> = self.send(request).await?;
        Ok(rows.into_iter().next())
    }

    /// Update the row unless it is refunded.
    async fn update_unless_refunded(&self, record: &NewLedgerRecord) -> StoreResult<Option<LedgerEntry>> {
        let request = self
            .http
            .patch(self.table_url(&self.table))
            .query(&[
                ("external_reference", format!("eq.{}", record.external_reference)),
                ("status", "neq.refunded".to_string()),
            ])
            .header("Prefer", "return=representation")
            .json(&json!({
                "payer": record.payer,
                "amount": record.amount,
                "currency": record.currency,
                "status": record.status,
                "method": record.method,
                "network": record.network,
                "updated_at": Utc::now(),
            }));
        self.first_row(request).await
    }

    /// Insert a new row; an existing row with the same reference wins.
    async fn insert_new(&self, record: &NewLedgerRecord) -> StoreResult<Option<LedgerEntry>> {
        // id and created_at are left to column defaults.
        let body = json!([{
            "payer": record.payer,
            "amount": record.amount,
            "currency": record.currency,
            "external_reference": record.external_reference,
            "status": record.status,
            "method": record.method,
            "network": record.network,
            "updated_at": Utc::now(),
        }]);
        let request = self
            .http
            .post(self.table_url(&self.table))
            .query(&[("on_conflict", "external_reference")])
            .header("Prefer", "resolution=ignore-duplicates,return=representation")
            .json(&body);
        self.first_row(request).await
    }
}

impl std::fmt::Debug for SupabaseLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseLedgerStore")
            .field("rest_url", &self.rest_url)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LedgerStore for SupabaseLedgerStore {
    fn backend(&self) -> &'static str {
        "supabase"
    }

    async fn upsert(&self, record: NewLedgerRecord) -> StoreResult<LedgerEntry> {
        if let Some(entry) = self.update_unless_refunded(&record).await? {
            return Ok(entry);
        }
        if let Some(entry) = self.insert_new(&record).await? {
            return Ok(entry);
        }
        // The row appeared between the two calls, or it is refunded.
        if let Some(entry) = self.update_unless_refunded(&record).await? {
            return Ok(entry);
        }
        self.get(&record.external_reference)
            .await?
            .ok_or_else(|| StoreError::NotFound(record.external_reference.clone()))
    }

    async fn get(&self, reference: &str) -> StoreResult<Option<LedgerEntry>> {
        let request = self.http.get(self.table_url(&self.table)).query(&[
            ("external_reference", format!("eq.{}", reference)),
            ("select", "*".to_string()),
            ("limit", "1".to_string()),
        ]);
        let rows: Vec<LedgerEntry> = self.send(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn list(&self, filter: &LedgerFilter) -> StoreResult<Vec<LedgerEntry>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(status) = filter.status {
            query.push(("status", format!("eq.{}", status)));
        }
        if let Some(payer) = &filter.payer {
            query.push(("payer", format!("eq.{}", payer)));
        }
        if let Some(limit) = filter.limit {
            query.push(("limit", limit.to_string()));
        }
        self.send(self.http.get(self.table_url(&self.table)).query(&query)).await
    }

    async fn transition(
        &self,
        reference: &str,
        from: LedgerStatus,
        to: LedgerStatus,
    ) -> StoreResult<Option<LedgerEntry>> {
        let request = self
            .http
            .patch(self.table_url(&self.table))
            .query(&[
                ("external_reference", format!("eq.{}", reference)),
                ("status", format!("eq.{}", from)),
            ])
            .header("Prefer", "return=representation")
            .json(&json!({ "status": to, "updated_at": Utc::now() }));
        if let Some(entry) = self.first_row(request).await? {
            return Ok(Some(entry));
        }
        match self.get(reference).await? {
            Some(_) => Ok(None),
            None => Err(StoreError::NotFound(reference.to_string())),
        }
    }

    async fn insert_refund_request(&self, request: &RefundRequest) -> StoreResult<()> {
        let builder = self
            .http
            .post(self.table_url(&self.refund_table))
            .header("Prefer", "return=minimal")
            .json(request);

        let response = builder
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend {
                status: status.as_u16(),
                message: truncate_body(message, MAX_ERROR_BODY),
            });
        }
        Ok(())
    }

    async fn list_refund_requests(&self) -> StoreResult<Vec<RefundRequest>> {
        let request = self
            .http
            .get(self.table_url(&self.refund_table))
            .query(&[("select", "*"), ("order", "requested_at.desc")]);
        self.send(request).await
    }
}
