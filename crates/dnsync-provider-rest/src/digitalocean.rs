//! DigitalOcean domains API
//!
//! - List Records: GET `/domains/:domain/records?type=A&name=home.example.com`
//! - Create Record: POST `/domains/:domain/records`
//! - Update Record: PATCH `/domains/:domain/records/:record_id`
//!
//! The domain name is the zone handle, so there is no separate zone lookup.

use crate::{APEX_AT, ExistingRecord, Found, RECORD_TTL, RecordApi};
use async_trait::async_trait;
use dnsync_core::traits::ClientOptions;
use dnsync_core::{ManagedRecord, Result};
use serde_json::json;
use std::net::IpAddr;

/// DigitalOcean API base URL
pub const DIGITALOCEAN_API_BASE: &str = "https://api.digitalocean.com/v2";

const PROVIDER: &str = "digitalocean";

pub struct DigitalOceanApi {
    /// ⚠️ NEVER log this value
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for DigitalOceanApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalOceanApi")
            .field("token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl DigitalOceanApi {
    pub fn new(token: impl Into<String>, options: &ClientOptions) -> Result<Self> {
        Ok(Self {
            token: crate::non_empty("DigitalOcean", "API token", token.into())?,
            base_url: DIGITALOCEAN_API_BASE.to_string(),
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

    fn records_url(&self, domain: &str) -> String {
        format!("{}/domains/{}/records", self.base_url, domain)
    }
}

#[async_trait]
impl RecordApi for DigitalOceanApi {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn find(&self, record: &ManagedRecord) -> Result<Found> {
        let fqdn = record.fqdn();
        let request = self
            .client
            .get(self.records_url(&record.domain))
            .query(&[("type", record.record_type()), ("name", fqdn.as_str())]);
        let body = self.call(request, "record lookup").await?;

        let existing = match body["domain_records"].as_array().and_then(|r| r.first()) {
            Some(entry) => Some(ExistingRecord {
                id: crate::id_of(PROVIDER, &entry["id"])?,
                ip: crate::parse_ip(PROVIDER, &entry["data"])?,
            }),
            None => None,
        };

        Ok(Found {
            scope: record.domain.clone(),
            existing,
        })
    }

    async fn create(&self, scope: &str, record: &ManagedRecord, ip: IpAddr) -> Result<()> {
        let payload = json!({
            "type": record.record_type(),
            "name": crate::label(record, APEX_AT),
            "data": ip.to_string(),
            "ttl": RECORD_TTL,
        });
        let request = self.client.post(self.records_url(scope)).json(&payload);
        self.call(request, "record create").await.map(|_| ())
    }

    async fn update(&self, scope: &str, id: &str, record: &ManagedRecord, ip: IpAddr) -> Result<()> {
        let payload = json!({ "type": record.record_type(), "data": ip.to_string() });
        let request = self
            .client
            .patch(format!("{}/{}", self.records_url(scope), id))
            .json(&payload);
        self.call(request, "record update").await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RestProvider;
    use dnsync_core::traits::{ApplyOutcome, DnsProvider};
    use dnsync_core::{AddressFamily, Error};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn office_v6() -> ManagedRecord {
        ManagedRecord::new("example.com", "office", AddressFamily::Ipv6, "do")
    }

    fn provider(server: &MockServer) -> RestProvider<DigitalOceanApi> {
        let options = ClientOptions::default();
        let api = DigitalOceanApi::new("do_secret_token", &options)
            .unwrap()
            .with_base_url(server.uri());
        RestProvider::new(api, &options)
    }

    #[tokio::test]
    async fn test_update_aaaa_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/domains/example.com/records"))
            .and(query_param("type", "AAAA"))
            .and(query_param("name", "office.example.com"))
            .and(header("authorization", "Bearer do_secret_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "domain_records": [{ "id": 3352896, "type": "AAAA", "name": "office", "data": "2001:db8::1" }]
            })))
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path("/domains/example.com/records/3352896"))
            .and(body_partial_json(json!({ "data": "2001:db8::2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "domain_record": {} })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = provider(&server)
            .apply(&office_v6(), "2001:db8::2".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome::Updated {
                previous_ip: Some("2001:db8::1".parse().unwrap())
            }
        );
    }

    #[tokio::test]
    async fn test_unchanged_record_is_not_written() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "domain_records": [{ "id": 1, "type": "AAAA", "name": "office", "data": "2001:db8::2" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = provider(&server)
            .apply(&office_v6(), "2001:db8::2".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_create_when_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "domain_records": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/domains/example.com/records"))
            .and(body_partial_json(json!({ "type": "AAAA", "name": "office", "data": "2001:db8::2" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "domain_record": {} })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        assert_eq!(provider.lookup(&office_v6()).await.unwrap(), None);
        let outcome = provider
            .apply(&office_v6(), "2001:db8::2".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Created);
    }

    #[tokio::test]
    async fn test_unknown_domain_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "id": "not_found" })))
            .mount(&server)
            .await;

        let err = provider(&server).lookup(&office_v6()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
