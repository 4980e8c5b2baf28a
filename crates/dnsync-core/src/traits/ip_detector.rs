// # IP Detector Trait
//
// Defines the interface for finding the current public address of one
// address family.
//
// ## Implementations
//
// - HTTP echo services and custom URLs: `dnsync-ip-http` crate
// - Local interface inspection: `dnsync-ip-local` crate
//
// ## Usage
//
// ```rust,ignore
// use dnsync_core::{AddressFamily, IpDetector};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let detector = /* IpDetector implementation */;
//
//     let ip = detector.detect(AddressFamily::Ipv4).await?;
//     println!("public address: {}", ip);
//
//     Ok(())
// }
// ```

use crate::record::AddressFamily;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// A freshly detected address
///
/// Produced once per reconciliation and dropped after the comparison step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionResult {
    /// Family that was requested
    pub family: AddressFamily,
    /// The detected address, already validated against the family pattern
    pub ip: IpAddr,
    /// When the address was detected
    pub detected_at: DateTime<Utc>,
    /// Which strategy produced it (e.g. "http", "interface")
    pub source_method: &'static str,
}

/// Trait for IP detection strategies
///
/// Strategies are interchangeable: the reconcile loop only sees this trait.
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP requests to detection endpoints
/// - ✅ Inspect local interfaces and sockets
///
/// ## Forbidden Capabilities
/// - ❌ Return an address that failed pattern validation
/// - ❌ Return an address of the other family
/// - ❌ Retry across ticks or cache answers between calls
/// - ❌ Perform DNS updates (use `DnsProvider`)
///
/// A detector either returns a validated address or
/// [`Error::DetectionFailed`](crate::Error::DetectionFailed). There is no
/// best-guess answer.
#[async_trait]
pub trait IpDetector: Send + Sync {
    /// Detect the current address for `family`
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: A syntactically valid address of `family`
    /// - `Err(Error::DetectionFailed)`: Unreachable source, malformed answer
    ///   or pattern mismatch
    async fn detect(&self, family: AddressFamily) -> Result<IpAddr, crate::Error>;

    /// Short name of the strategy, recorded in [`DetectionResult::source_method`]
    fn method(&self) -> &'static str;
}

/// Helper trait for constructing detectors from configuration
pub trait IpDetectorFactory: Send + Sync {
    /// Create a detector
    ///
    /// # Parameters
    ///
    /// - `config`: Detection settings for one record
    fn create(
        &self,
        config: &crate::config::DetectionConfig,
    ) -> Result<Box<dyn IpDetector>, crate::Error>;
}
