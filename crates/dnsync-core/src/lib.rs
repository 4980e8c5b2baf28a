// # dnsync-core
//
// Core library for keeping DNS records pointed at a host's current address.
//
// ## Architecture Overview
//
// - **IpDetector**: Trait for finding the host's current public address
// - **RecordResolver**: Trait for reading what a record currently publishes
// - **DnsProvider**: Trait for writing a record through a provider API
// - **Notifier**: Trait for forwarding reconcile notifications
// - **Reconciler**: Periodic detect → resolve → compare → apply loop
// - **ProviderRegistry**: Name-keyed factories for providers, detectors and resolvers
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Plugin-Based**: Implementations register by name, no hard-coded if-else
// 3. **Library-First**: All core functionality can be used as a library
// 4. **Converging**: Every cycle compares desired and published state, so a
//    missed or failed cycle is repaired by the next one

pub mod budget;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod pattern;
pub mod record;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use budget::{BudgetState, PANIC_MAX, PanicBudget};
pub use clock::{Clock, RuntimeInfo, SystemClock};
pub use config::{DetectionConfig, DnsyncConfig, EngineConfig, RecordConfig, ResolverConfig};
pub use engine::{CycleOutcome, Notification, NotificationKind, Reconciler, RecordState, RecordTask, Stage};
pub use error::{Error, Result};
pub use record::{AddressFamily, CredentialField, ManagedRecord, ProviderCredential};
pub use registry::ProviderRegistry;
pub use traits::{ApplyOutcome, DnsProvider, IpDetector, Notifier, RecordResolver};
