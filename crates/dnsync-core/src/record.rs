//! Managed records, address families and provider credentials

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Subdomain sentinel meaning "the domain itself"
pub const ROOT_DOMAIN: &str = "@";

/// Address family of a managed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// IPv4, published as an A record
    #[serde(alias = "IPV4", alias = "v4")]
    Ipv4,
    /// IPv6, published as an AAAA record
    #[serde(alias = "IPV6", alias = "v6")]
    Ipv6,
}

impl AddressFamily {
    /// DNS record type carrying addresses of this family
    pub fn record_type(self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "A",
            AddressFamily::Ipv6 => "AAAA",
        }
    }

    /// Family of a concrete address
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }

    /// Whether `ip` belongs to this family
    pub fn matches(self, ip: &IpAddr) -> bool {
        Self::of(ip) == self
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => f.write_str("IPv4"),
            AddressFamily::Ipv6 => f.write_str("IPv6"),
        }
    }
}

/// One (domain, subdomain, family, provider) tuple kept in sync with the
/// detected address.
///
/// Built from configuration at startup and never mutated afterwards. Moving a
/// name to another family means configuring a new record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagedRecord {
    /// Registered domain, e.g. "example.com"
    pub domain: String,
    /// Host label below the domain, or [`ROOT_DOMAIN`]
    pub subdomain: String,
    /// Address family
    pub family: AddressFamily,
    /// Key of the credential entry in the configuration's provider map
    pub provider: String,
}

impl ManagedRecord {
    /// Create a managed record
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
        }
    }

    /// Whether this record targets the domain apex
    pub fn is_root(&self) -> bool {
        self.subdomain.is_empty() || self.subdomain == ROOT_DOMAIN
    }

    /// Fully qualified record name, without trailing dot
    pub fn fqdn(&self) -> String {
        if self.is_root() {
            self.domain.clone()
        } else {
            format!("{}.{}", self.subdomain, self.domain)
        }
    }

    /// DNS record type (A or AAAA)
    pub fn record_type(&self) -> &'static str {
        self.family.record_type()
    }

    /// The published record this describes: lowercase name plus family
    ///
    /// Two descriptors with the same identity write the same DNS record,
    /// whatever provider entry they go through.
    pub fn identity(&self) -> (String, AddressFamily) {
        (self.fqdn().to_ascii_lowercase(), self.family)
    }
}

impl fmt::Display for ManagedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.fqdn(), self.record_type())
    }
}

/// A credential field a provider may require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    Username,
    Email,
    Password,
    LoginToken,
    AppKey,
    AppSecret,
    ConsumerKey,
}

impl CredentialField {
    /// Configuration key of the field
    pub fn key(self) -> &'static str {
        match self {
            CredentialField::Username => "username",
            CredentialField::Email => "email",
            CredentialField::Password => "password",
            CredentialField::LoginToken => "login_token",
            CredentialField::AppKey => "app_key",
            CredentialField::AppSecret => "app_secret",
            CredentialField::ConsumerKey => "consumer_key",
        }
    }
}

/// Credentials for one provider account
///
/// Which fields must be present depends on the provider; the registry checks
/// them against the provider's declared schema before building a client.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredential {
    /// Provider name as listed in the registry (e.g. "Cloudflare")
    pub provider: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub login_token: Option<String>,
    #[serde(default)]
    pub app_key: Option<String>,
    #[serde(default)]
    pub app_secret: Option<String>,
    #[serde(default)]
    pub consumer_key: Option<String>,
}

impl ProviderCredential {
    /// Create an empty credential for `provider`
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Self::default()
        }
    }

    /// Set a field, builder style
    pub fn with(mut self, field: CredentialField, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match field {
            CredentialField::Username => self.username = value,
            CredentialField::Email => self.email = value,
            CredentialField::Password => self.password = value,
            CredentialField::LoginToken => self.login_token = value,
            CredentialField::AppKey => self.app_key = value,
            CredentialField::AppSecret => self.app_secret = value,
            CredentialField::ConsumerKey => self.consumer_key = value,
        }
        self
    }

    /// Value of a field, treating empty strings as absent
    pub fn get(&self, field: CredentialField) -> Option<&str> {
        let value = match field {
            CredentialField::Username => &self.username,
            CredentialField::Email => &self.email,
            CredentialField::Password => &self.password,
            CredentialField::LoginToken => &self.login_token,
            CredentialField::AppKey => &self.app_key,
            CredentialField::AppSecret => &self.app_secret,
            CredentialField::ConsumerKey => &self.consumer_key,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }

    /// Value of a field that the provider schema guarantees to be present
    pub fn require(&self, field: CredentialField) -> crate::Result<&str> {
        self.get(field).ok_or_else(|| {
            crate::Error::config(format!(
                "{} credential is missing required field '{}'",
                self.provider,
                field.key()
            ))
        })
    }

    /// Fields from `required` that are absent or empty
    pub fn missing(&self, required: &[CredentialField]) -> Vec<CredentialField> {
        required
            .iter()
            .copied()
            .filter(|field| self.get(*field).is_none())
            .collect()
    }
}

// Secrets never leave the process through Debug output
impl fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<REDACTED>");
        f.debug_struct("ProviderCredential")
            .field("provider", &self.provider)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &redact(&self.password))
            .field("login_token", &redact(&self.login_token))
            .field("app_key", &redact(&self.app_key))
            .field("app_secret", &redact(&self.app_secret))
            .field("consumer_key", &redact(&self.consumer_key))
            .finish()
    }
}
