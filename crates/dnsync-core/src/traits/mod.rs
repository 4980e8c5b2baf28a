//! Core traits for dnsync
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpDetector`]: Find the current public address of a family
//! - [`RecordResolver`]: Read the address a record currently publishes
//! - [`DnsProvider`]: Create or update records via provider APIs
//! - [`Notifier`]: Deliver engine notifications

pub mod ip_detector;
pub mod record_resolver;
pub mod dns_provider;
pub mod notifier;

pub use ip_detector::{DetectionResult, IpDetector, IpDetectorFactory};
pub use record_resolver::{ProviderResolver, RecordResolver, RecordResolverFactory};
pub use dns_provider::{ApplyOutcome, ClientOptions, DnsProvider, DnsProviderFactory};
pub use notifier::Notifier;
