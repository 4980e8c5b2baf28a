//! OVH API
//!
//! - Server Time: GET `/auth/time` (unsigned)
//! - List Records: GET `/domain/zone/:zone/record?fieldType=A&subDomain=home`
//! - Get Record: GET `/domain/zone/:zone/record/:id`
//! - Create Record: POST `/domain/zone/:zone/record`
//! - Update Record: PUT `/domain/zone/:zone/record/:id`
//! - Apply Zone: POST `/domain/zone/:zone/refresh`
//!
//! Every other call is signed:
//!
//! ```text
//! X-Ovh-Signature: "$1$" + sha1_hex(secret+consumer+METHOD+url+body+timestamp)
//! ```
//!
//! where `+` is a literal plus sign between the parts and `url` includes the
//! query string. The timestamp is the server's, fetched per call.

use crate::{ExistingRecord, Found, RECORD_TTL, RecordApi};
use async_trait::async_trait;
use dnsync_core::traits::ClientOptions;
use dnsync_core::{Error, ManagedRecord, Result};
use reqwest::Method;
use serde_json::{Value, json};
use sha1::{Digest, Sha1};
use std::net::IpAddr;

/// OVH Europe API base URL
pub const OVH_API_BASE: &str = "https://eu.api.ovh.com/1.0";

const PROVIDER: &str = "ovh";

pub struct OvhApi {
    app_key: String,
    /// ⚠️ NEVER log this value
    app_secret: String,
    /// ⚠️ NEVER log this value
    consumer_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OvhApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OvhApi")
            .field("app_key", &self.app_key)
            .field("app_secret", &"<REDACTED>")
            .field("consumer_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Signature of one request
pub(crate) fn signature(
    app_secret: &str,
    consumer_key: &str,
    method: &Method,
    url: &str,
    body: &str,
    timestamp: i64,
) -> String {
    let material = format!(
        "{}+{}+{}+{}+{}+{}",
        app_secret,
        consumer_key,
        method.as_str(),
        url,
        body,
        timestamp
    );
    format!("$1${:x}", Sha1::digest(material.as_bytes()))
}

impl OvhApi {
    pub fn new(
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        consumer_key: impl Into<String>,
        options: &ClientOptions,
    ) -> Result<Self> {
        Ok(Self {
            app_key: crate::non_empty("OVH", "application key", app_key.into())?,
            app_secret: crate::non_empty("OVH", "application secret", app_secret.into())?,
            consumer_key: crate::non_empty("OVH", "consumer key", consumer_key.into())?,
            base_url: OVH_API_BASE.to_string(),
            client: crate::http_client(options)?,
        })
    }

    /// Point the client at a different API root (e.g. ca.api.ovh.com)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn server_time(&self) -> Result<i64> {
        let request = self.client.get(format!("{}/auth/time", self.base_url));
        let body = crate::send(PROVIDER, request, "server time").await?;
        body.as_i64()
            .ok_or_else(|| Error::provider(PROVIDER, "Invalid response format: time is not an integer"))
    }

    /// Send a signed request; `path` is relative to the API root and may carry a query
    async fn call(&self, method: Method, path: &str, body: Option<&Value>, context: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let body = body.map(Value::to_string).unwrap_or_default();
        let timestamp = self.server_time().await?;
        let signature = signature(
            &self.app_secret,
            &self.consumer_key,
            &method,
            &url,
            &body,
            timestamp,
        );

        let mut request = self
            .client
            .request(method, &url)
            .header("X-Ovh-Application", &self.app_key)
            .header("X-Ovh-Consumer", &self.consumer_key)
            .header("X-Ovh-Timestamp", timestamp.to_string())
            .header("X-Ovh-Signature", signature);
        if !body.is_empty() {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }
        crate::send(PROVIDER, request, context).await
    }

    /// Ask OVH to publish pending zone changes
    async fn refresh(&self, zone: &str) -> Result<()> {
        self.call(
            Method::POST,
            &format!("/domain/zone/{}/refresh", zone),
            None,
            "zone refresh",
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl RecordApi for OvhApi {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn find(&self, record: &ManagedRecord) -> Result<Found> {
        let zone = record.domain.clone();
        let list = format!(
            "/domain/zone/{}/record?fieldType={}&subDomain={}",
            zone,
            record.record_type(),
            crate::label(record, "")
        );
        let ids = self.call(Method::GET, &list, None, "record lookup").await?;

        let Some(id) = ids.as_array().and_then(|ids| ids.first()) else {
            return Ok(Found {
                scope: zone,
                existing: None,
            });
        };
        let id = crate::id_of(PROVIDER, id)?;

        let path = format!("/domain/zone/{}/record/{}", zone, id);
        let entry = self.call(Method::GET, &path, None, "record lookup").await?;
        let ip = crate::parse_ip(PROVIDER, &entry["target"])?;

        Ok(Found {
            scope: zone,
            existing: Some(ExistingRecord { id, ip }),
        })
    }

    async fn create(&self, scope: &str, record: &ManagedRecord, ip: IpAddr) -> Result<()> {
        let payload = json!({
            "fieldType": record.record_type(),
            "subDomain": crate::label(record, ""),
            "target": ip.to_string(),
            "ttl": RECORD_TTL,
        });
        let path = format!("/domain/zone/{}/record", scope);
        self.call(Method::POST, &path, Some(&payload), "record create")
            .await?;
        self.refresh(scope).await
    }

    async fn update(&self, scope: &str, id: &str, _record: &ManagedRecord, ip: IpAddr) -> Result<()> {
        let payload = json!({ "target": ip.to_string() });
        let path = format!("/domain/zone/{}/record/{}", scope, id);
        self.call(Method::PUT, &path, Some(&payload), "record update")
            .await?;
        self.refresh(scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RestProvider;
    use dnsync_core::traits::{ApplyOutcome, DnsProvider};
    use dnsync_core::AddressFamily;
    use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NOW: i64 = 1_700_000_000;

    fn home() -> ManagedRecord {
        ManagedRecord::new("example.com", "home", AddressFamily::Ipv4, "ovh")
    }

    fn provider(server: &MockServer) -> RestProvider<OvhApi> {
        let options = ClientOptions::default();
        let api = OvhApi::new("ak", "ovh_app_secret", "ovh_consumer_key", &options)
            .unwrap()
            .with_base_url(server.uri());
        RestProvider::new(api, &options)
    }

    async fn mount_time(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/auth/time"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(NOW)))
            .mount(server)
            .await;
    }

    #[test]
    fn test_signature_format() {
        let signature = signature(
            "as",
            "ck",
            &Method::GET,
            "https://eu.api.ovh.com/1.0/domain/zone/example.com/record?fieldType=A&subDomain=home",
            "",
            NOW,
        );
        assert_eq!(signature, "$1$0fd347e9265b3a38a6d6984f32673391d4d32ba6");
    }

    #[tokio::test]
    async fn test_update_signs_and_refreshes_zone() {
        let server = MockServer::start().await;
        mount_time(&server).await;

        let list_url = format!(
            "{}/domain/zone/example.com/record?fieldType=A&subDomain=home",
            server.uri()
        );
        let expected = signature(
            "ovh_app_secret",
            "ovh_consumer_key",
            &Method::GET,
            &list_url,
            "",
            NOW,
        );
        Mock::given(method("GET"))
            .and(path("/domain/zone/example.com/record"))
            .and(query_param("fieldType", "A"))
            .and(query_param("subDomain", "home"))
            .and(header("X-Ovh-Application", "ak"))
            .and(header("X-Ovh-Timestamp", NOW.to_string().as_str()))
            .and(header("X-Ovh-Signature", expected.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([5123])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/domain/zone/example.com/record/5123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 5123, "fieldType": "A", "subDomain": "home", "target": "203.0.113.4"
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/domain/zone/example.com/record/5123"))
            .and(body_json(json!({ "target": "203.0.113.5" })))
            .and(header_exists("X-Ovh-Signature"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/domain/zone/example.com/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = provider(&server)
            .apply(&home(), "203.0.113.5".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome::Updated {
                previous_ip: Some("203.0.113.4".parse().unwrap())
            }
        );
    }

    #[tokio::test]
    async fn test_create_when_absent() {
        let server = MockServer::start().await;
        mount_time(&server).await;
        Mock::given(method("GET"))
            .and(path("/domain/zone/example.com/record"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/domain/zone/example.com/record"))
            .and(body_json(json!({
                "fieldType": "A", "subDomain": "home", "target": "203.0.113.5", "ttl": RECORD_TTL
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/domain/zone/example.com/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = provider(&server)
            .apply(&home(), "203.0.113.5".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Created);
    }

    #[tokio::test]
    async fn test_invalid_credential_is_authentication_error() {
        let server = MockServer::start().await;
        mount_time(&server).await;
        Mock::given(method("GET"))
            .and(path("/domain/zone/example.com/record"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({ "message": "This credential is not valid" })),
            )
            .mount(&server)
            .await;

        let err = provider(&server).lookup(&home()).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let api = OvhApi::new("ak", "ovh_app_secret", "ovh_consumer_key", &ClientOptions::default())
            .unwrap();
        let debug = format!("{:?}", api);
        assert!(!debug.contains("ovh_app_secret"));
        assert!(!debug.contains("ovh_consumer_key"));
    }
}
