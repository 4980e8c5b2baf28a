//! Plugin-based registry
//!
//! Providers, detectors and resolvers register factories here at startup, so
//! the daemon selects implementations by name instead of by if-else chains.
//!
//! ## Provider table
//!
//! Each provider entry is a name plus a factory, and the factory declares the
//! credential fields the provider needs. That declaration is the only source
//! of credential validation: the registry checks it once, when the client is
//! built, and a missing field is a configuration error.
//!
//! ```rust,ignore
//! use dnsync_core::registry::ProviderRegistry;
//!
//! let mut registry = ProviderRegistry::new();
//! dnsync_provider_cloudflare::register(&mut registry);
//!
//! let provider = registry.create_provider(&credential, &options)?;
//! ```

use crate::config::{DetectionConfig, ResolverConfig};
use crate::error::{Error, Result};
use crate::record::{CredentialField, ProviderCredential};
use crate::traits::{
    ClientOptions, DnsProvider, DnsProviderFactory, IpDetector, IpDetectorFactory,
    ProviderResolver, RecordResolver, RecordResolverFactory,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry key under which the DNS-lookup resolver registers
pub const DNS_RESOLVER: &str = "dns";

/// Registry of provider, detector and resolver factories
///
/// Built once during startup and read-only afterwards.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Provider factories keyed by lowercase provider name
    providers: HashMap<String, Box<dyn DnsProviderFactory>>,

    /// Detector factories keyed by detection type
    detectors: HashMap<String, Box<dyn IpDetectorFactory>>,

    /// Resolver factories keyed by resolver type
    resolvers: HashMap<String, Box<dyn RecordResolverFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider name (e.g., "Cloudflare", "DuckDNS"), matched case-insensitively
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(
        &mut self,
        name: impl AsRef<str>,
        factory: Box<dyn DnsProviderFactory>,
    ) {
        self.providers
            .insert(name.as_ref().to_ascii_lowercase(), factory);
    }

    /// Register an IP detector factory
    ///
    /// - `name`: Detection type (e.g., "http", "interface")
    pub fn register_detector(&mut self, name: impl Into<String>, factory: Box<dyn IpDetectorFactory>) {
        self.detectors.insert(name.into(), factory);
    }

    /// Register a record resolver factory
    ///
    /// - `name`: Resolver type (e.g., "dns")
    pub fn register_resolver(
        &mut self,
        name: impl Into<String>,
        factory: Box<dyn RecordResolverFactory>,
    ) {
        self.resolvers.insert(name.into(), factory);
    }

    /// Credential fields the named provider requires
    ///
    /// # Returns
    ///
    /// - `Ok(&[CredentialField])`: The provider's schema
    /// - `Err(Error::Config)`: Unknown provider name
    pub fn required_fields(&self, provider: &str) -> Result<&'static [CredentialField]> {
        Ok(self.provider_factory(provider)?.required_fields())
    }

    /// Check a credential against its provider's schema
    pub fn validate_credential(&self, credential: &ProviderCredential) -> Result<()> {
        let required = self.required_fields(&credential.provider)?;
        let missing = credential.missing(required);
        if missing.is_empty() {
            return Ok(());
        }

        let fields: Vec<&str> = missing.iter().map(|f| f.key()).collect();
        Err(Error::config(format!(
            "{} credential is missing required field(s): {}",
            credential.provider,
            fields.join(", ")
        )))
    }

    /// Create a DNS provider client from a credential
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error::Config)`: Unknown provider name or credential not satisfying the schema
    pub fn create_provider(
        &self,
        credential: &ProviderCredential,
        options: &ClientOptions,
    ) -> Result<Box<dyn DnsProvider>> {
        self.validate_credential(credential)?;
        self.provider_factory(&credential.provider)?
            .create(credential, options)
    }

    /// Create an IP detector from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn IpDetector>)`: Created detector
    /// - `Err(Error)`: If the detection type is not registered or creation fails
    pub fn create_detector(&self, config: &DetectionConfig) -> Result<Box<dyn IpDetector>> {
        let detector_type = config.type_name();

        let factory = self.detectors.get(detector_type).ok_or_else(|| {
            Error::config(format!("Unknown detection type: {}", detector_type))
        })?;

        factory.create(config)
    }

    /// Create the resolver for a record served by `provider`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(resolver))`: Resolver to consult every cycle
    /// - `Ok(None)`: Resolution is skipped; the loop compares against its last applied address
    /// - `Err(Error::Config)`: The requested resolver is unavailable
    pub fn create_resolver(
        &self,
        config: &ResolverConfig,
        provider: &Arc<dyn DnsProvider>,
    ) -> Result<Option<Arc<dyn RecordResolver>>> {
        let resolver: Arc<dyn RecordResolver> = match config {
            ResolverConfig::Skip => return Ok(None),
            ResolverConfig::Provider => Arc::new(ProviderResolver::new(Arc::clone(provider))?),
            ResolverConfig::Auto if provider.supports_lookup() => {
                Arc::new(ProviderResolver::new(Arc::clone(provider))?)
            }
            ResolverConfig::Auto => {
                Arc::from(self.dns_resolver(&ResolverConfig::Dns { nameserver: None })?)
            }
            ResolverConfig::Dns { .. } => Arc::from(self.dns_resolver(config)?),
        };
        Ok(Some(resolver))
    }

    fn dns_resolver(&self, config: &ResolverConfig) -> Result<Box<dyn RecordResolver>> {
        let factory = self.resolvers.get(DNS_RESOLVER).ok_or_else(|| {
            Error::config("DNS resolver requested but none is registered")
        })?;
        factory.create(config)
    }

    fn provider_factory(&self, name: &str) -> Result<&dyn DnsProviderFactory> {
        self.providers
            .get(&name.to_ascii_lowercase())
            .map(|f| f.as_ref())
            .ok_or_else(|| Error::config(format!("Unknown provider: {}", name)))
    }

    /// List all registered provider names (lowercase)
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(&name.to_ascii_lowercase())
    }

    /// Check if a detection type is registered
    pub fn has_detector(&self, name: &str) -> bool {
        self.detectors.contains_key(name)
    }

    /// Check if a resolver type is registered
    pub fn has_resolver(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }
}
