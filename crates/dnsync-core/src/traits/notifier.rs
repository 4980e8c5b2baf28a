// # Notifier Trait
//
// Delivery side of engine notifications. The engine only pushes
// `Notification`s into a bounded channel; notifiers receive them from the
// dispatcher in `dnsync-notify` and decide how to deliver them.

use crate::engine::Notification;
use async_trait::async_trait;

/// Trait for notification sinks (log, webhook, ...)
///
/// Delivery failures are the notifier's problem: they are logged by the
/// dispatcher and never fed back into reconciliation.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification
    async fn notify(&self, notification: &Notification) -> Result<(), crate::Error>;

    /// Short name for logging
    fn notifier_name(&self) -> &'static str;
}
