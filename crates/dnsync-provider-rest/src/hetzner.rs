//! Hetzner DNS API
//!
//! - List Zones: GET `/zones?name=example.com`
//! - List Records: GET `/records?zone_id=:zone_id`
//! - Create Record: POST `/records`
//! - Update Record: PUT `/records/:record_id`
//!
//! Record names are relative to the zone, `@` for the apex.

use crate::{APEX_AT, ExistingRecord, Found, RECORD_TTL, RecordApi};
use async_trait::async_trait;
use dnsync_core::traits::ClientOptions;
use dnsync_core::{Error, ManagedRecord, Result};
use serde_json::json;
use std::net::IpAddr;

/// Hetzner DNS API base URL
pub const HETZNER_API_BASE: &str = "https://dns.hetzner.com/api/v1";

const PROVIDER: &str = "hetzner";
const TOKEN_HEADER: &str = "Auth-API-Token";

pub struct HetznerApi {
    /// ⚠️ NEVER log this value
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HetznerApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HetznerApi")
            .field("token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HetznerApi {
    pub fn new(token: impl Into<String>, options: &ClientOptions) -> Result<Self> {
        Ok(Self {
            token: crate::non_empty("Hetzner", "API token", token.into())?,
            base_url: HETZNER_API_BASE.to_string(),
            client: crate::http_client(options)?,
        })
    }

    /// Point the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, request: reqwest::RequestBuilder, context: &str) -> Result<serde_json::Value> {
        crate::send(PROVIDER, request.header(TOKEN_HEADER, &self.token), context).await
    }

    async fn zone_id(&self, domain: &str) -> Result<String> {
        let request = self
            .client
            .get(format!("{}/zones", self.base_url))
            .query(&[("name", domain)]);
        let body = self.call(request, "zone lookup").await?;

        let zone = body["zones"]
            .as_array()
            .and_then(|zones| zones.first())
            .ok_or_else(|| Error::not_found(format!("Zone not found: {}", domain)))?;
        crate::id_of(PROVIDER, &zone["id"])
    }

    fn payload(zone_id: &str, record: &ManagedRecord, ip: IpAddr) -> serde_json::Value {
        json!({
            "zone_id": zone_id,
            "type": record.record_type(),
            "name": crate::label(record, APEX_AT),
            "value": ip.to_string(),
            "ttl": RECORD_TTL,
        })
    }
}

#[async_trait]
impl RecordApi for HetznerApi {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn find(&self, record: &ManagedRecord) -> Result<Found> {
        let zone_id = self.zone_id(&record.domain).await?;

        let request = self
            .client
            .get(format!("{}/records", self.base_url))
            .query(&[("zone_id", zone_id.as_str())]);
        let body = self.call(request, "record lookup").await?;

        let name = crate::label(record, APEX_AT);
        let entry = body["records"].as_array().and_then(|records| {
            records.iter().find(|r| {
                r["type"].as_str() == Some(record.record_type())
                    && r["name"].as_str().is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
        });

        let existing = match entry {
            Some(entry) => Some(ExistingRecord {
                id: crate::id_of(PROVIDER, &entry["id"])?,
                ip: crate::parse_ip(PROVIDER, &entry["value"])?,
            }),
            None => None,
        };

        Ok(Found {
            scope: zone_id,
            existing,
        })
    }

    async fn create(&self, scope: &str, record: &ManagedRecord, ip: IpAddr) -> Result<()> {
        let request = self
            .client
            .post(format!("{}/records", self.base_url))
            .json(&Self::payload(scope, record, ip));
        self.call(request, "record create").await.map(|_| ())
    }

    async fn update(&self, scope: &str, id: &str, record: &ManagedRecord, ip: IpAddr) -> Result<()> {
        let request = self
            .client
            .put(format!("{}/records/{}", self.base_url, id))
            .json(&Self::payload(scope, record, ip));
        self.call(request, "record update").await.map(|_| ())
    }
}
