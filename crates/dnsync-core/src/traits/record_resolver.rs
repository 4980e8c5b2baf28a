// # Record Resolver Trait
//
// Defines the interface for reading the address a record currently publishes.
//
// ## Implementations
//
// - Provider records API: [`ProviderResolver`] (this module)
// - DNS lookup: `dnsync-resolver-dns` crate

use crate::record::ManagedRecord;
use crate::traits::DnsProvider;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;

/// Trait for record resolver implementations
///
/// A missing record is the normal first-run state and is reported as
/// `Ok(None)`, which sends the loop down the create path. Errors are reserved
/// for transport and auth failures.
#[async_trait]
pub trait RecordResolver: Send + Sync {
    /// Currently published address of `record`, or `None` if it does not exist
    async fn current(&self, record: &ManagedRecord) -> Result<Option<IpAddr>, crate::Error>;

    /// Short name for logging
    fn resolver_name(&self) -> &'static str;
}

/// Helper trait for constructing resolvers from configuration
pub trait RecordResolverFactory: Send + Sync {
    /// Create a resolver
    fn create(
        &self,
        config: &crate::config::ResolverConfig,
    ) -> Result<Box<dyn RecordResolver>, crate::Error>;
}

/// Resolver that asks the record's own provider
///
/// The provider API is authoritative, unlike DNS answers that may be cached or
/// proxied.
pub struct ProviderResolver {
    provider: Arc<dyn DnsProvider>,
}

impl ProviderResolver {
    /// Wrap a provider that supports lookup
    pub fn new(provider: Arc<dyn DnsProvider>) -> crate::Result<Self> {
        if !provider.supports_lookup() {
            return Err(crate::Error::config(format!(
                "provider {} cannot look up records; use the dns resolver instead",
                provider.provider_name()
            )));
        }
        Ok(Self { provider })
    }
}

#[async_trait]
impl RecordResolver for ProviderResolver {
    async fn current(&self, record: &ManagedRecord) -> Result<Option<IpAddr>, crate::Error> {
        self.provider.lookup(record).await
    }

    fn resolver_name(&self) -> &'static str {
        "provider"
    }
}
