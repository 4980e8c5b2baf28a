//! Linode domains API
//!
//! - List Domains: GET `/domains` with `X-Filter: {"domain": "example.com"}`
//! - List Records: GET `/domains/:domain_id/records`
//! - Create Record: POST `/domains/:domain_id/records`
//! - Update Record: PUT `/domains/:domain_id/records/:record_id`
//!
//! The apex is the empty name.

use crate::{ExistingRecord, Found, RECORD_TTL, RecordApi};
use async_trait::async_trait;
use dnsync_core::traits::ClientOptions;
use dnsync_core::{Error, ManagedRecord, Result};
use serde_json::json;
use std::net::IpAddr;

/// Linode API base URL
pub const LINODE_API_BASE: &str = "https://api.linode.com/v4";

const PROVIDER: &str = "linode";

/// Records per page; zones of a dynamic host fit in one page
const PAGE_SIZE: &str = "500";

pub struct LinodeApi {
    /// ⚠️ NEVER log this value
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for LinodeApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinodeApi")
            .field("token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl LinodeApi {
    pub fn new(token: impl Into<String>, options: &ClientOptions) -> Result<Self> {
        Ok(Self {
            token: crate::non_empty("Linode", "API token", token.into())?,
            base_url: LINODE_API_BASE.to_string(),
            client: crate::http_client(options)?,
        })
    }

    /// Point the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, request: reqwest::RequestBuilder, context: &str) -> Result<serde_json::Value> {
        crate::send(PROVIDER, request.bearer_auth(&self.token), context).await
    }

    async fn domain_id(&self, domain: &str) -> Result<String> {
        let filter = json!({ "domain": domain }).to_string();
        let request = self
            .client
            .get(format!("{}/domains", self.base_url))
            .header("X-Filter", filter);
        let body = self.call(request, "domain lookup").await?;

        let entry = body["data"]
            .as_array()
            .and_then(|domains| {
                domains
                    .iter()
                    .find(|d| d["domain"].as_str().is_some_and(|n| n.eq_ignore_ascii_case(domain)))
            })
            .ok_or_else(|| Error::not_found(format!("Domain not found: {}", domain)))?;
        crate::id_of(PROVIDER, &entry["id"])
    }
}

#[async_trait]
impl RecordApi for LinodeApi {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn find(&self, record: &ManagedRecord) -> Result<Found> {
        let domain_id = self.domain_id(&record.domain).await?;

        let request = self
            .client
            .get(format!("{}/domains/{}/records", self.base_url, domain_id))
            .query(&[("page_size", PAGE_SIZE)]);
        let body = self.call(request, "record lookup").await?;

        let name = crate::label(record, "");
        let entry = body["data"].as_array().and_then(|records| {
            records.iter().find(|r| {
                r["type"].as_str() == Some(record.record_type())
                    && r["name"].as_str().is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
        });

        let existing = match entry {
            Some(entry) => Some(ExistingRecord {
                id: crate::id_of(PROVIDER, &entry["id"])?,
                ip: crate::parse_ip(PROVIDER, &entry["target"])?,
            }),
            None => None,
        };

        Ok(Found {
            scope: domain_id,
            existing,
        })
    }

    async fn create(&self, scope: &str, record: &ManagedRecord, ip: IpAddr) -> Result<()> {
        let payload = json!({
            "type": record.record_type(),
            "name": crate::label(record, ""),
            "target": ip.to_string(),
            "ttl_sec": RECORD_TTL,
        });
        let request = self
            .client
            .post(format!("{}/domains/{}/records", self.base_url, scope))
            .json(&payload);
        self.call(request, "record create").await.map(|_| ())
    }

    async fn update(&self, scope: &str, id: &str, _record: &ManagedRecord, ip: IpAddr) -> Result<()> {
        let request = self
            .client
            .put(format!("{}/domains/{}/records/{}", self.base_url, scope, id))
            .json(&json!({ "target": ip.to_string() }));
        self.call(request, "record update").await.map(|_| ())
    }
}
