// # DNS Provider Trait
//
// Defines the interface for creating and updating address records through a
// provider's API.
//
// ## Implementations
//
// - Cloudflare: `dnsync-provider-cloudflare` crate
// - Update-URL services (dyndns2 family, DuckDNS, Dynv6): `dnsync-provider-dyndns` crate
//
// ## Usage
//
// ```rust,ignore
// use dnsync_core::{AddressFamily, DnsProvider, ManagedRecord};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//     let record = ManagedRecord::new("example.com", "home", AddressFamily::Ipv4, "cf");
//
//     provider.apply(&record, "203.0.113.5".parse()?).await?;
//
//     Ok(())
// }
// ```

use crate::record::{CredentialField, ManagedRecord, ProviderCredential};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Result of an apply operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Record did not exist and was created
    Created,
    /// Record existed and now points at the target address
    Updated {
        /// The previous address, if the provider reported it
        previous_ip: Option<IpAddr>,
    },
    /// Record already had the target address (no-op)
    Unchanged,
    /// Dry run: the write was logged but not sent
    Skipped,
}

/// Trait for DNS provider implementations
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure (the loop handles retry on the next tick)
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads (violates shutdown determinism)
/// - ❌ Implement retry logic or backoff (owned by the reconcile loop)
/// - ❌ Make scheduling decisions or cache state between calls
/// - ❌ Decide whether an update is needed (owned by the reconcile loop)
///
/// Retry policy lives in exactly one place, the panic budget of the loop. A
/// provider that loops internally would hide failures from it.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create or update the record so it points at `ip`
    ///
    /// # Idempotency
    ///
    /// Applying the same address twice must leave the same published state and
    /// must not fail the second time.
    ///
    /// # Returns
    ///
    /// - `Ok(ApplyOutcome)`: What the provider did
    /// - `Err(Error)`: Auth failure, rate limit, rejected request, transport error
    async fn apply(&self, record: &ManagedRecord, ip: IpAddr) -> Result<ApplyOutcome, crate::Error>;

    /// Look up the address currently published for the record
    ///
    /// Only called when [`supports_lookup`](Self::supports_lookup) is true.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(IpAddr))`: The published address
    /// - `Ok(None)`: The record does not exist yet
    /// - `Err(Error)`: Transport or auth failure
    async fn lookup(&self, record: &ManagedRecord) -> Result<Option<IpAddr>, crate::Error> {
        let _ = record;
        Err(crate::Error::unsupported(format!(
            "{} has no record lookup API",
            self.provider_name()
        )))
    }

    /// Whether the provider exposes a records API usable by [`lookup`](Self::lookup)
    fn supports_lookup(&self) -> bool {
        false
    }

    /// Provider name for logging (e.g., "cloudflare", "duckdns")
    fn provider_name(&self) -> &'static str;
}

/// Settings shared by every provider client the process builds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Upper bound for each HTTP request
    pub timeout: Duration,
    /// Perform lookups but skip mutating calls
    pub dry_run: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
            dry_run: false,
        }
    }
}

/// Helper trait for constructing DNS providers from credentials
pub trait DnsProviderFactory: Send + Sync {
    /// Credential fields this provider cannot work without
    fn required_fields(&self) -> &'static [CredentialField];

    /// Create a DnsProvider instance
    ///
    /// Called by the registry only after `credential` has been checked against
    /// [`required_fields`](Self::required_fields).
    fn create(
        &self,
        credential: &ProviderCredential,
        options: &ClientOptions,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
