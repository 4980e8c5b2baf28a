// # Record-API DNS Providers
//
// Providers with a real records API: the zone's records can be listed, so
// the provider doubles as the record resolver, and a record is created when
// absent or rewritten when its address differs.
//
// ## Services
//
// | Name         | Auth                          | Credential fields                    |
// |--------------|-------------------------------|--------------------------------------|
// | Hetzner      | `Auth-API-Token` header       | login_token                          |
// | DigitalOcean | bearer token                  | login_token                          |
// | Linode       | bearer token                  | login_token                          |
// | OVH          | signed `X-Ovh-*` headers      | app_key, app_secret, consumer_key    |
//
// Every service goes through the same flow in [`RestProvider`]: find the
// record, compare, then create or update. A service only describes how to
// find, create and update through [`RecordApi`].
//
// - ✅ Dry-run mode performs lookups and logs intended writes
// - ❌ NO retry logic (owned by the reconcile loop)
// - ❌ NO caching of zone or record IDs between calls
//
// ## Security Requirements
//
// - Tokens and secrets NEVER appear in logs or Debug output
// - Providers fail at construction if a secret is empty

mod digitalocean;
mod hetzner;
mod linode;
mod ovh;

pub use digitalocean::DigitalOceanApi;
pub use hetzner::HetznerApi;
pub use linode::LinodeApi;
pub use ovh::OvhApi;

use async_trait::async_trait;
use dnsync_core::traits::{ApplyOutcome, ClientOptions, DnsProvider, DnsProviderFactory};
use dnsync_core::record::ROOT_DOMAIN;
use dnsync_core::{CredentialField, Error, ManagedRecord, ProviderCredential, ProviderRegistry, Result};
use serde_json::Value;
use std::fmt;
use std::net::IpAddr;

/// TTL written on created records, in seconds
pub const RECORD_TTL: u32 = 300;

/// A record as the provider lists it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingRecord {
    /// Provider-side record ID
    pub id: String,
    /// Published address
    pub ip: IpAddr,
}

/// Result of looking a record up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    /// Where the record lives: zone ID, domain ID or zone name
    pub scope: String,
    /// The record, if it exists
    pub existing: Option<ExistingRecord>,
}

/// The calls one service needs
#[async_trait]
pub trait RecordApi: Send + Sync + fmt::Debug {
    /// Provider name used in errors
    fn name(&self) -> &'static str;

    /// Locate the record's zone and the record itself
    async fn find(&self, record: &ManagedRecord) -> Result<Found>;

    /// Create the record in `scope`
    async fn create(&self, scope: &str, record: &ManagedRecord, ip: IpAddr) -> Result<()>;

    /// Point the existing record `id` in `scope` at `ip`
    async fn update(&self, scope: &str, id: &str, record: &ManagedRecord, ip: IpAddr) -> Result<()>;
}

/// A DNS provider over a [`RecordApi`]
#[derive(Debug)]
pub struct RestProvider<A> {
    api: A,
    dry_run: bool,
}

impl<A: RecordApi> RestProvider<A> {
    pub fn new(api: A, options: &ClientOptions) -> Self {
        Self {
            api,
            dry_run: options.dry_run,
        }
    }

    /// Whether writes are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[async_trait]
impl<A: RecordApi> DnsProvider for RestProvider<A> {
    async fn apply(&self, record: &ManagedRecord, ip: IpAddr) -> Result<ApplyOutcome> {
        let found = self.api.find(record).await?;
        let mode = if self.dry_run { "DRY-RUN" } else { "LIVE" };

        match found.existing {
            Some(existing) if existing.ip == ip => {
                tracing::info!("DNS record already has correct IP: {} -> {}", record, ip);
                Ok(ApplyOutcome::Unchanged)
            }
            Some(existing) => {
                tracing::info!(
                    "Updating {} record {}: {} -> {} [mode: {}]",
                    self.api.name(),
                    record,
                    existing.ip,
                    ip,
                    mode
                );
                if self.dry_run {
                    tracing::info!("[DRY-RUN] Would update record {} to {}", existing.id, ip);
                    return Ok(ApplyOutcome::Skipped);
                }
                self.api.update(&found.scope, &existing.id, record, ip).await?;
                Ok(ApplyOutcome::Updated {
                    previous_ip: Some(existing.ip),
                })
            }
            None => {
                tracing::info!(
                    "Creating {} record {} -> {} [mode: {}]",
                    self.api.name(),
                    record,
                    ip,
                    mode
                );
                if self.dry_run {
                    tracing::info!("[DRY-RUN] Would create {} in {}", record, found.scope);
                    return Ok(ApplyOutcome::Skipped);
                }
                self.api.create(&found.scope, record, ip).await?;
                Ok(ApplyOutcome::Created)
            }
        }
    }

    async fn lookup(&self, record: &ManagedRecord) -> Result<Option<IpAddr>> {
        Ok(self.api.find(record).await?.existing.map(|r| r.ip))
    }

    fn supports_lookup(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &'static str {
        self.api.name()
    }
}

/// Build an HTTP client honouring the request timeout
pub(crate) fn http_client(options: &ClientOptions) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(options.timeout)
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// Reject an empty secret at construction
pub(crate) fn non_empty(provider: &str, what: &str, value: String) -> Result<String> {
    if value.is_empty() {
        return Err(Error::config(format!("{} {} cannot be empty", provider, what)));
    }
    Ok(value)
}

/// Send a request and decode its JSON body; an empty body decodes to `Null`
pub(crate) async fn send(
    provider: &'static str,
    request: reqwest::RequestBuilder,
    context: &str,
) -> Result<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::http(format!("{}: HTTP request failed: {}", context, e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::http(format!("{}: failed to read response: {}", context, e)))?;

    if !status.is_success() {
        return Err(map_status(provider, status.as_u16(), context, &body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|e| Error::provider(provider, format!("{}: failed to parse response: {}", context, e)))
}

/// Map a non-success status to an error
pub(crate) fn map_status(provider: &'static str, status: u16, context: &str, body: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "{}: invalid {} credentials or insufficient permissions (status {})",
            context, provider, status
        )),
        404 => Error::not_found(format!("{}: not found", context)),
        429 => Error::rate_limited(format!("{}: rate limit exceeded", context)),
        500..=599 => Error::http(format!(
            "{}: {} server error (transient): {} - {}",
            context, provider, status, body
        )),
        _ => Error::provider(provider, format!("{}: {} - {}", context, status, body)),
    }
}

/// Parse an address field of a listed record
pub(crate) fn parse_ip(provider: &'static str, value: &Value) -> Result<IpAddr> {
    let text = value
        .as_str()
        .ok_or_else(|| Error::provider(provider, "Invalid response format: address is not a string"))?;
    text.trim()
        .parse()
        .map_err(|e| Error::provider(provider, format!("Invalid IP in response: {}", e)))
}

/// Record IDs come back as numbers from some APIs and strings from others
pub(crate) fn id_of(provider: &'static str, value: &Value) -> Result<String> {
    match value {
        Value::String(id) => Ok(id.clone()),
        Value::Number(id) => Ok(id.to_string()),
        _ => Err(Error::provider(provider, "Invalid response format: missing record id")),
    }
}

/// Record label relative to the zone, with `apex` standing for the zone itself
pub(crate) fn label<'a>(record: &'a ManagedRecord, apex: &'a str) -> &'a str {
    if record.is_root() {
        apex
    } else {
        record.subdomain.as_str()
    }
}

/// The services this crate implements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Hetzner,
    DigitalOcean,
    Linode,
    Ovh,
}

impl Service {
    /// Registry name
    pub fn name(self) -> &'static str {
        match self {
            Service::Hetzner => "Hetzner",
            Service::DigitalOcean => "DigitalOcean",
            Service::Linode => "Linode",
            Service::Ovh => "OVH",
        }
    }
}

/// All services, in registration order
pub const SERVICES: [Service; 4] = [
    Service::Hetzner,
    Service::DigitalOcean,
    Service::Linode,
    Service::Ovh,
];

/// Factory for one service
pub struct RestFactory(pub Service);

impl DnsProviderFactory for RestFactory {
    fn required_fields(&self) -> &'static [CredentialField] {
        match self.0 {
            Service::Hetzner | Service::DigitalOcean | Service::Linode => {
                &[CredentialField::LoginToken]
            }
            Service::Ovh => &[
                CredentialField::AppKey,
                CredentialField::AppSecret,
                CredentialField::ConsumerKey,
            ],
        }
    }

    fn create(
        &self,
        credential: &ProviderCredential,
        options: &ClientOptions,
    ) -> Result<Box<dyn DnsProvider>> {
        if options.dry_run {
            tracing::warn!(
                "{} provider running in DRY-RUN mode - no changes will be made",
                self.0.name()
            );
        }

        Ok(match self.0 {
            Service::Hetzner => {
                let token = credential.require(CredentialField::LoginToken)?;
                Box::new(RestProvider::new(HetznerApi::new(token, options)?, options))
            }
            Service::DigitalOcean => {
                let token = credential.require(CredentialField::LoginToken)?;
                Box::new(RestProvider::new(DigitalOceanApi::new(token, options)?, options))
            }
            Service::Linode => {
                let token = credential.require(CredentialField::LoginToken)?;
                Box::new(RestProvider::new(LinodeApi::new(token, options)?, options))
            }
            Service::Ovh => {
                let api = OvhApi::new(
                    credential.require(CredentialField::AppKey)?,
                    credential.require(CredentialField::AppSecret)?,
                    credential.require(CredentialField::ConsumerKey)?,
                    options,
                )?;
                Box::new(RestProvider::new(api, options))
            }
        })
    }
}

/// Register every record-API provider with a registry
///
/// # Example
///
/// ```rust
/// use dnsync_core::ProviderRegistry;
///
/// let mut registry = ProviderRegistry::new();
/// dnsync_provider_rest::register(&mut registry);
/// assert!(registry.has_provider("Hetzner"));
/// assert!(registry.has_provider("ovh"));
/// ```
pub fn register(registry: &mut ProviderRegistry) {
    for service in SERVICES {
        registry.register_provider(service.name(), Box::new(RestFactory(service)));
    }
}

/// Apex spelling shared by Hetzner and DigitalOcean
pub(crate) const APEX_AT: &str = ROOT_DOMAIN;
