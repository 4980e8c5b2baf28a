// # DNS Record Resolver
//
// Reads what a record publishes by querying DNS for its A or AAAA records.
//
// Used for providers without a records API. Answers are never cached here, so
// every cycle sees the current published value (subject to upstream caching
// by the nameserver itself).
//
// ## Nameserver
//
// - Configured: `"1.1.1.1"`, `"1.1.1.1:5353"` or `"[2606:4700:4700::1111]:53"`
// - Default: Cloudflare's public resolvers

use dnsync_core::config::{DEFAULT_TIMEOUT_SECS, ResolverConfig};
use dnsync_core::registry::DNS_RESOLVER;
use dnsync_core::traits::{RecordResolver, RecordResolverFactory};
use dnsync_core::{AddressFamily, Error, ManagedRecord, ProviderRegistry, Result};

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig as HickoryConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

const DNS_PORT: u16 = 53;

/// Resolver backed by DNS queries
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
    nameserver: Option<SocketAddr>,
}

impl DnsResolver {
    /// Create a resolver
    ///
    /// # Parameters
    ///
    /// - `nameserver`: Server to query; `None` uses the public default
    pub fn new(nameserver: Option<SocketAddr>) -> Self {
        Self::with_timeout(nameserver, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a resolver with a custom query timeout
    pub fn with_timeout(nameserver: Option<SocketAddr>, timeout: Duration) -> Self {
        let config = match nameserver {
            Some(addr) => HickoryConfig::from_parts(
                None,
                Vec::new(),
                NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true),
            ),
            None => HickoryConfig::cloudflare(),
        };

        let mut opts = ResolverOpts::default();
        opts.cache_size = 0;
        opts.timeout = timeout;
        opts.attempts = 1;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            nameserver,
        }
    }

    /// The configured nameserver, if any
    pub fn nameserver(&self) -> Option<SocketAddr> {
        self.nameserver
    }
}

#[async_trait::async_trait]
impl RecordResolver for DnsResolver {
    async fn current(&self, record: &ManagedRecord) -> Result<Option<IpAddr>> {
        // Trailing dot keeps search domains out of the query
        let name = format!("{}.", record.fqdn());

        let answer = match record.family {
            AddressFamily::Ipv4 => self
                .resolver
                .ipv4_lookup(name.as_str())
                .await
                .map(|lookup| lookup.iter().next().map(|a| IpAddr::V4(a.0))),
            AddressFamily::Ipv6 => self
                .resolver
                .ipv6_lookup(name.as_str())
                .await
                .map(|lookup| lookup.iter().next().map(|aaaa| IpAddr::V6(aaaa.0))),
        };

        match answer {
            Ok(ip) => {
                tracing::debug!("{} resolves to {:?}", name, ip);
                Ok(ip)
            }
            Err(e) if is_absent(&e) => {
                tracing::debug!("{} has no {} record", name, record.record_type());
                Ok(None)
            }
            Err(e) => Err(Error::resolution(format!(
                "DNS lookup of {} failed: {}",
                name, e
            ))),
        }
    }

    fn resolver_name(&self) -> &'static str {
        DNS_RESOLVER
    }
}

/// NXDOMAIN and NOERROR-without-answers both mean the record does not exist yet
fn is_absent(error: &ResolveError) -> bool {
    matches!(error.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

/// Parse `"ip"` or `"ip:port"`
pub fn parse_nameserver(value: &str) -> Result<SocketAddr> {
    let value = value.trim();
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Ok(addr);
    }
    value
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| Error::config(format!("Invalid nameserver address: {}", value)))
}

/// Factory for creating DNS resolvers
pub struct DnsResolverFactory;

impl RecordResolverFactory for DnsResolverFactory {
    fn create(&self, config: &ResolverConfig) -> Result<Box<dyn RecordResolver>> {
        match config {
            ResolverConfig::Dns { nameserver } => {
                let nameserver = nameserver.as_deref().map(parse_nameserver).transpose()?;
                Ok(Box::new(DnsResolver::new(nameserver)))
            }
            _ => Err(Error::config("Invalid config for DNS resolver")),
        }
    }
}

/// Register the DNS resolver with a registry
pub fn register(registry: &mut ProviderRegistry) {
    registry.register_resolver(DNS_RESOLVER, Box::new(DnsResolverFactory));
}
