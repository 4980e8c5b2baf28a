// # Cloudflare DNS Provider
//
// Creates and updates A/AAAA records through the Cloudflare API v4.
//
// - ✅ Looks up the published value (usable as the record resolver)
// - ✅ Creates the record when absent, patches its content when different
// - ✅ Status codes mapped to specific errors (401, 403, 404, 409, 429, 5xx)
// - ✅ Dry-run mode performs lookups and logs intended writes
// - ❌ NO retry logic (owned by the reconcile loop)
// - ❌ NO caching of zone or record IDs between calls
// - ❌ NO background tasks
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - Provider fails at construction if the token is empty
//
// ## API Reference
//
// - List Zones: GET `/zones?name=example.com`
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=A&name=home.example.com`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Patch DNS Record: PATCH `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use dnsync_core::traits::{ApplyOutcome, ClientOptions, DnsProvider, DnsProviderFactory};
use dnsync_core::{CredentialField, Error, ManagedRecord, ProviderCredential, ProviderRegistry, Result};
use serde_json::Value;
use std::net::IpAddr;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

const PROVIDER: &str = "cloudflare";

/// "Automatic" TTL in the Cloudflare API
const AUTOMATIC_TTL: u32 = 1;

/// Cloudflare DNS provider
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot: every call resolves the zone and record from
/// scratch.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone lookup, record lookup)
/// - Log the intended POST or PATCH payload
/// - **NOT** modify DNS records, and report `ApplyOutcome::Skipped`
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API root, overridable for tests
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform GET requests but skip writes
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

/// An existing record as returned by the list endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExistingRecord {
    id: String,
    ip: IpAddr,
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `options`: Request timeout and dry-run flag
    ///
    /// # Returns
    ///
    /// - `Err(Error::Config)`: Empty token or HTTP client construction failure
    pub fn new(api_token: impl Into<String>, options: &ClientOptions) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run: options.dry_run,
        })
    }

    /// Point the provider at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether writes are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Send an authenticated request and return the `result` member
    ///
    /// # Parameters
    ///
    /// - `context`: What the request is for, used in error messages
    async fn call(&self, request: reqwest::RequestBuilder, context: &str) -> Result<Value> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::http(format!("{}: HTTP request failed: {}", context, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(map_status(status.as_u16(), context, &error_text));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("{}: failed to parse response: {}", context, e)))?;

        if json["success"].as_bool() == Some(false) {
            return Err(Error::provider(
                PROVIDER,
                format!("{}: {}", context, api_errors(&json)),
            ));
        }

        Ok(json["result"].clone())
    }

    /// Find the zone ID of the record's registered domain
    async fn zone_id(&self, domain: &str) -> Result<String> {
        tracing::debug!("Looking up zone ID for domain: {}", domain);

        let request = self
            .client
            .get(format!("{}/zones", self.base_url))
            .query(&[("name", domain)]);
        let result = self.call(request, "zone lookup").await?;

        let zone = result
            .as_array()
            .and_then(|zones| zones.first())
            .ok_or_else(|| Error::not_found(format!("Zone not found: {}", domain)))?;

        zone["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::provider(PROVIDER, "Invalid response format: zone.id is not a string"))
    }

    /// Find the record of the managed name and type, if it exists
    async fn find_record(
        &self,
        zone_id: &str,
        record: &ManagedRecord,
    ) -> Result<Option<ExistingRecord>> {
        let name = record.fqdn();
        let request = self
            .client
            .get(format!("{}/zones/{}/dns_records", self.base_url, zone_id))
            .query(&[("type", record.record_type()), ("name", name.as_str())]);
        let result = self.call(request, "record lookup").await?;

        let Some(entry) = result.as_array().and_then(|records| records.first()) else {
            return Ok(None);
        };

        let id = entry["id"]
            .as_str()
            .ok_or_else(|| Error::provider(PROVIDER, "Invalid response format: record.id is not a string"))?;
        let content = entry["content"]
            .as_str()
            .ok_or_else(|| Error::provider(PROVIDER, "Invalid response format: content is not a string"))?;
        let ip = content
            .parse()
            .map_err(|e| Error::provider(PROVIDER, format!("Invalid IP in response: {}", e)))?;

        Ok(Some(ExistingRecord {
            id: id.to_string(),
            ip,
        }))
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// Point the record at `ip`
    ///
    /// ```http
    /// GET   /zones?name=example.com
    /// GET   /zones/:zone_id/dns_records?type=A&name=home.example.com
    /// POST  /zones/:zone_id/dns_records              (absent)
    /// PATCH /zones/:zone_id/dns_records/:record_id   (different content)
    /// ```
    async fn apply(&self, record: &ManagedRecord, ip: IpAddr) -> Result<ApplyOutcome> {
        let zone_id = self.zone_id(&record.domain).await?;
        let existing = self.find_record(&zone_id, record).await?;
        let mode = if self.dry_run { "DRY-RUN" } else { "LIVE" };

        match existing {
            Some(existing) if existing.ip == ip => {
                tracing::info!("DNS record already has correct IP: {} -> {}", record, ip);
                Ok(ApplyOutcome::Unchanged)
            }
            Some(existing) => {
                let url = format!(
                    "{}/zones/{}/dns_records/{}",
                    self.base_url, zone_id, existing.id
                );
                let payload = serde_json::json!({ "content": ip.to_string() });

                tracing::info!(
                    "Updating Cloudflare record {}: {} -> {} [mode: {}]",
                    record,
                    existing.ip,
                    ip,
                    mode
                );

                if self.dry_run {
                    tracing::info!("[DRY-RUN] Would send PATCH to {} with payload: {}", url, payload);
                    return Ok(ApplyOutcome::Skipped);
                }
                self.call(self.client.patch(&url).json(&payload), "record update")
                    .await?;

                Ok(ApplyOutcome::Updated {
                    previous_ip: Some(existing.ip),
                })
            }
            None => {
                let url = format!("{}/zones/{}/dns_records", self.base_url, zone_id);
                let payload = serde_json::json!({
                    "type": record.record_type(),
                    "name": record.fqdn(),
                    "content": ip.to_string(),
                    "ttl": AUTOMATIC_TTL,
                    "proxied": false,
                });

                tracing::info!("Creating Cloudflare record {} -> {} [mode: {}]", record, ip, mode);

                if self.dry_run {
                    tracing::info!("[DRY-RUN] Would send POST to {} with payload: {}", url, payload);
                    return Ok(ApplyOutcome::Skipped);
                }
                self.call(self.client.post(&url).json(&payload), "record create")
                    .await?;

                Ok(ApplyOutcome::Created)
            }
        }
    }

    async fn lookup(&self, record: &ManagedRecord) -> Result<Option<IpAddr>> {
        let zone_id = self.zone_id(&record.domain).await?;
        Ok(self.find_record(&zone_id, record).await?.map(|r| r.ip))
    }

    fn supports_lookup(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Map a non-success status to an error
fn map_status(status: u16, context: &str, body: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "{}: invalid API token or insufficient permissions (status {})",
            context, status
        )),
        404 => Error::not_found(format!("{}: not found", context)),
        409 => Error::provider(
            PROVIDER,
            format!("{}: conflict, record changed concurrently (status 409)", context),
        ),
        429 => Error::rate_limited(format!("{}: rate limit exceeded", context)),
        500..=599 => Error::http(format!(
            "{}: Cloudflare server error (transient): {} - {}",
            context, status, body
        )),
        _ => Error::provider(PROVIDER, format!("{}: {} - {}", context, status, body)),
    }
}

/// Join the `errors[].message` entries of an API response
fn api_errors(json: &Value) -> String {
    let messages: Vec<&str> = json["errors"]
        .as_array()
        .map(|errors| errors.iter().filter_map(|e| e["message"].as_str()).collect())
        .unwrap_or_default();

    if messages.is_empty() {
        "request unsuccessful".to_string()
    } else {
        messages.join("; ")
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn required_fields(&self) -> &'static [CredentialField] {
        &[CredentialField::LoginToken]
    }

    fn create(
        &self,
        credential: &ProviderCredential,
        options: &ClientOptions,
    ) -> Result<Box<dyn DnsProvider>> {
        let token = credential.require(CredentialField::LoginToken)?;

        if options.dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }

        Ok(Box::new(CloudflareProvider::new(token, options)?))
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use dnsync_core::ProviderRegistry;
///
/// let mut registry = ProviderRegistry::new();
/// dnsync_provider_cloudflare::register(&mut registry);
/// assert!(registry.has_provider("Cloudflare"));
/// ```
pub fn register(registry: &mut ProviderRegistry) {
    registry.register_provider("Cloudflare", Box::new(CloudflareFactory));
}
