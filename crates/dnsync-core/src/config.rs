//! Configuration types for dnsync
//!
//! These are the in-memory structures the engine consumes. Reading them from
//! disk is the daemon's job.

use crate::record::{AddressFamily, ManagedRecord, ProviderCredential, ROOT_DOMAIN};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Default reconciliation interval (seconds)
pub const DEFAULT_INTERVAL_SECS: u64 = 600;

/// Default upper bound for a single network call (seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Longest accepted reconciliation interval (seconds): one year
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Main dnsync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsyncConfig {
    /// Provider credentials keyed by reference name
    pub providers: HashMap<String, ProviderCredential>,

    /// Records to keep in sync
    pub records: Vec<RecordConfig>,

    /// Default detection strategy for records without their own
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Default resolver for records without their own
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Notification sinks
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl DnsyncConfig {
    /// Validate the configuration
    ///
    /// Credential schemas are checked later by the registry, which is the
    /// only place that knows what each provider requires.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.records.is_empty() {
            return Err(crate::Error::config("No records configured"));
        }

        for (name, credential) in &self.providers {
            if credential.provider.trim().is_empty() {
                return Err(crate::Error::config(format!(
                    "Provider entry '{}' does not name a provider",
                    name
                )));
            }
        }

        let mut seen = HashSet::new();
        for record in &self.records {
            record.validate()?;
            if !self.providers.contains_key(&record.provider) {
                return Err(crate::Error::config(format!(
                    "Record {} references unknown provider entry '{}'",
                    record.managed_record(),
                    record.provider
                )));
            }
            let managed = record.managed_record();
            if !seen.insert(managed.identity()) {
                return Err(crate::Error::config(format!(
                    "Record {} is configured more than once",
                    managed
                )));
            }
        }

        self.detection.validate()?;
        self.engine.validate()?;
        self.notify.validate()?;

        Ok(())
    }

    /// Detection settings that apply to `record`
    pub fn detection_for(&self, record: &RecordConfig) -> DetectionConfig {
        if let Some(url) = &record.ip_url {
            let urls = vec![url.clone()];
            return match record.family {
                AddressFamily::Ipv4 => DetectionConfig::Http {
                    ipv4_urls: urls,
                    ipv6_urls: Vec::new(),
                },
                AddressFamily::Ipv6 => DetectionConfig::Http {
                    ipv4_urls: Vec::new(),
                    ipv6_urls: urls,
                },
            };
        }

        if let Some(interface) = &record.interface {
            return DetectionConfig::Interface {
                name: Some(interface.clone()),
            };
        }

        self.detection.clone()
    }

    /// Resolver settings that apply to `record`
    pub fn resolver_for(&self, record: &RecordConfig) -> ResolverConfig {
        record.resolver.clone().unwrap_or_else(|| self.resolver.clone())
    }

    /// Reconciliation interval that applies to `record`
    pub fn interval_for(&self, record: &RecordConfig) -> Duration {
        Duration::from_secs(record.interval_secs.unwrap_or(self.engine.interval_secs))
    }
}

/// One record descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Registered domain (e.g. "example.com")
    pub domain: String,

    /// Host label, `@` for the apex
    #[serde(default = "default_subdomain")]
    pub subdomain: String,

    /// Address family to publish
    pub family: AddressFamily,

    /// Key into [`DnsyncConfig::providers`]
    pub provider: String,

    /// Custom detection URL for this record
    #[serde(default)]
    pub ip_url: Option<String>,

    /// Detect from this local interface instead of over HTTP
    #[serde(default)]
    pub interface: Option<String>,

    /// Resolver override
    #[serde(default)]
    pub resolver: Option<ResolverConfig>,

    /// Interval override (seconds)
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

impl RecordConfig {
    /// Create a record descriptor with defaults for the optional parts
    pub fn new(
        domain: impl Into<String>,
        subdomain: impl Into<String>,
        family: AddressFamily,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            subdomain: subdomain.into(),
            family,
            provider: provider.into(),
            ip_url: None,
            interface: None,
            resolver: None,
            interval_secs: None,
        }
    }

    /// Use a custom detection URL
    pub fn with_ip_url(mut self, url: impl Into<String>) -> Self {
        self.ip_url = Some(url.into());
        self
    }

    /// Override the reconciliation interval
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = Some(secs);
        self
    }

    /// Override the resolver
    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// The immutable record this descriptor manages
    pub fn managed_record(&self) -> ManagedRecord {
        ManagedRecord::new(
            self.domain.trim(),
            self.subdomain.trim(),
            self.family,
            self.provider.clone(),
        )
    }

    fn validate(&self) -> Result<(), crate::Error> {
        validate_domain_name(&self.domain)?;

        let sub = self.subdomain.trim();
        if !sub.is_empty() && sub != ROOT_DOMAIN {
            // A subdomain may span several labels ("a.b") but must itself be a valid name
            validate_domain_name(sub)?;
        }

        if self.interval_secs == Some(0) {
            return Err(crate::Error::config(format!(
                "Record {} has an interval override of 0",
                self.managed_record()
            )));
        }
        if self.interval_secs.is_some_and(|secs| secs > MAX_INTERVAL_SECS) {
            return Err(crate::Error::config(format!(
                "Record {} has an interval override above {} seconds",
                self.managed_record(),
                MAX_INTERVAL_SECS
            )));
        }

        if let Some(url) = &self.ip_url {
            validate_url("ip_url", url)?;
        }

        if self.ip_url.is_some() && self.interface.is_some() {
            return Err(crate::Error::config(format!(
                "Record {} sets both ip_url and interface",
                self.managed_record()
            )));
        }

        Ok(())
    }
}

fn default_subdomain() -> String {
    ROOT_DOMAIN.to_string()
}

/// Detection strategy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectionConfig {
    /// Ask HTTP echo services, in order, until one answers validly
    Http {
        /// IPv4 endpoints (empty = built-in defaults)
        #[serde(default)]
        ipv4_urls: Vec<String>,
        /// IPv6 endpoints (empty = built-in defaults)
        #[serde(default)]
        ipv6_urls: Vec<String>,
    },

    /// Inspect local interfaces
    Interface {
        /// Interface name; `None` uses the outbound route's source address
        #[serde(default)]
        name: Option<String>,
    },

    /// Out-of-tree detector
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl DetectionConfig {
    /// Registry key of the detector type
    pub fn type_name(&self) -> &str {
        match self {
            DetectionConfig::Http { .. } => "http",
            DetectionConfig::Interface { .. } => "interface",
            DetectionConfig::Custom { factory, .. } => factory,
        }
    }

    /// Validate the detection configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            DetectionConfig::Http {
                ipv4_urls,
                ipv6_urls,
            } => {
                for url in ipv4_urls.iter().chain(ipv6_urls) {
                    validate_url("detection URL", url)?;
                }
                Ok(())
            }
            DetectionConfig::Interface { name } => {
                if name.as_deref().is_some_and(|n| n.trim().is_empty()) {
                    return Err(crate::Error::config("Interface name cannot be empty"));
                }
                Ok(())
            }
            DetectionConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom detector factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom detector config cannot be null"));
                }
                Ok(())
            }
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig::Http {
            ipv4_urls: Vec::new(),
            ipv6_urls: Vec::new(),
        }
    }
}

/// How the published value of a record is read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolverConfig {
    /// Provider API when the provider has one, DNS otherwise
    #[default]
    Auto,
    /// The provider's records API
    Provider,
    /// A DNS query for the record
    Dns {
        /// Nameserver address ("1.1.1.1" or "1.1.1.1:53"); `None` = built-in default
        #[serde(default)]
        nameserver: Option<String>,
    },
    /// Skip resolution and compare against the last applied address
    #[serde(rename = "none")]
    Skip,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between reconciliations of a record
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound for each detection, resolution and apply call (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Capacity of the notification channel
    ///
    /// When full, new notifications are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Default interval as a Duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Per-call timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Engine interval must be > 0"));
        }
        if self.interval_secs > MAX_INTERVAL_SECS {
            return Err(crate::Error::config(format!(
                "Engine interval must be at most {} seconds",
                MAX_INTERVAL_SECS
            )));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("Engine timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Notification sinks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Log every notification through tracing
    #[serde(default = "default_log_notifications")]
    pub log: bool,

    /// Post notifications to a webhook
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

impl NotifyConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if let Some(webhook) = &self.webhook {
            validate_url("webhook url", &webhook.url)?;
        }
        Ok(())
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            log: default_log_notifications(),
            webhook: None,
        }
    }
}

fn default_log_notifications() -> bool {
    true
}

/// Webhook sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Endpoint to POST to
    pub url: String,

    /// Body template with `{record}`, `{domain}`, `{subdomain}`, `{family}`,
    /// `{kind}`, `{ip}`, `{detail}`, `{at}` and `{version}` placeholders.
    /// Without a template the notification is sent as JSON.
    #[serde(default)]
    pub body_template: Option<String>,
}

fn validate_url(what: &str, url: &str) -> Result<(), crate::Error> {
    if url.is_empty() {
        return Err(crate::Error::config(format!("{} cannot be empty", what)));
    }
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(crate::Error::config(format!(
            "{} must use HTTP or HTTPS scheme. Got: {}",
            what, url
        )));
    }
    Ok(())
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks: overall length, label length, characters, and no
/// leading or trailing hyphen in a label.
pub fn validate_domain_name(domain: &str) -> Result<(), crate::Error> {
    if domain.is_empty() {
        return Err(crate::Error::config("Domain name cannot be empty"));
    }

    if domain.len() > 253 {
        return Err(crate::Error::config(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    for label in domain.split('.') {
        if label.is_empty() {
            return Err(crate::Error::config(format!(
                "Domain name has empty label: '{}'",
                domain
            )));
        }

        if label.len() > 63 {
            return Err(crate::Error::config(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        // Underscore appears in service labels; wildcard only as a whole label
        if label != "*"
            && !label
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(crate::Error::config(format!(
                "Domain label contains invalid characters. Label: '{}'",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(crate::Error::config(format!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(())
}
