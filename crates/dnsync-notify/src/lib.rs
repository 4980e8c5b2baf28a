// # Notification Sinks
//
// Receives the reconciler's notifications and delivers them.
//
// ## Sinks
//
// - **LogNotifier**: one structured log line per notification
// - **WebhookNotifier**: HTTP POST, either the notification as JSON or a
//   rendered text template
//
// ## Dispatcher
//
// [`forward`] drains the notification channel and hands every notification to
// every sink in order. A failing sink is logged and skipped; it never blocks
// the others or feeds back into reconciliation.

use async_trait::async_trait;
use dnsync_core::config::{DEFAULT_TIMEOUT_SECS, NotifyConfig, WebhookConfig};
use dnsync_core::traits::Notifier;
use dnsync_core::{Clock, Error, Notification, NotificationKind, Result, RuntimeInfo};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sink that writes notifications to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let record = &notification.record;
        match &notification.kind {
            NotificationKind::Created { ip } => {
                tracing::info!(record = %record, %ip, "record created");
            }
            NotificationKind::Updated { previous_ip, ip } => {
                tracing::info!(record = %record, ?previous_ip, %ip, "record updated");
            }
            NotificationKind::Failed {
                stage,
                consecutive_failures,
            } => {
                tracing::warn!(
                    record = %record,
                    %stage,
                    consecutive_failures,
                    detail = %notification.detail,
                    "reconciliation failed"
                );
            }
            NotificationKind::RepeatedFailure {
                stage,
                consecutive_failures,
            } => {
                tracing::error!(
                    record = %record,
                    %stage,
                    consecutive_failures,
                    detail = %notification.detail,
                    "reconciliation still failing"
                );
            }
            NotificationKind::BudgetTripped {
                consecutive_failures,
            } => {
                tracing::error!(record = %record, consecutive_failures, "failure budget tripped");
            }
            NotificationKind::BudgetReset => {
                tracing::info!(record = %record, "failure budget reset");
            }
        }
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "log"
    }
}

/// JSON body sent when no template is configured
#[derive(Serialize)]
struct WebhookPayload<'a> {
    #[serde(flatten)]
    notification: &'a Notification,
    version: &'a str,
    uptime_secs: i64,
}

/// Sink that POSTs notifications to an HTTP endpoint
pub struct WebhookNotifier {
    url: String,
    body_template: Option<String>,
    runtime: RuntimeInfo,
    clock: Arc<dyn Clock>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a webhook sink
    ///
    /// # Parameters
    ///
    /// - `config`: Endpoint and optional body template
    /// - `runtime`: Version and start time reported in every payload
    /// - `clock`: Used to compute uptime
    pub fn new(config: &WebhookConfig, runtime: RuntimeInfo, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: config.url.clone(),
            body_template: config.body_template.clone(),
            runtime,
            clock,
            client,
        })
    }

    /// Body for `notification`: rendered template or JSON
    fn body(&self, notification: &Notification) -> Result<(String, &'static str)> {
        match &self.body_template {
            Some(template) => Ok((
                render(template, notification, &self.runtime),
                "text/plain; charset=utf-8",
            )),
            None => {
                let payload = WebhookPayload {
                    notification,
                    version: &self.runtime.version,
                    uptime_secs: self.runtime.uptime_secs(self.clock.as_ref()),
                };
                Ok((serde_json::to_string(&payload)?, "application/json"))
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let (body, content_type) = self.body(notification)?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::http(format!("Webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http(format!("Webhook returned {}", status)));
        }
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "webhook"
    }
}

/// Fill the `{placeholder}`s of a webhook template
pub fn render(template: &str, notification: &Notification, runtime: &RuntimeInfo) -> String {
    let record = &notification.record;
    let ip = notification
        .kind
        .ip()
        .map(|ip| ip.to_string())
        .unwrap_or_default();

    template
        .replace("{record}", &record.fqdn())
        .replace("{domain}", &record.domain)
        .replace("{subdomain}", &record.subdomain)
        .replace("{family}", &record.family.to_string())
        .replace("{kind}", notification.kind.name())
        .replace("{ip}", &ip)
        .replace("{detail}", &notification.detail)
        .replace("{at}", &notification.at.to_rfc3339())
        .replace("{version}", &runtime.version)
}

/// Build the sinks described by `config`
pub fn from_config(
    config: &NotifyConfig,
    runtime: &RuntimeInfo,
    clock: Arc<dyn Clock>,
) -> Result<Vec<Arc<dyn Notifier>>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();
    if config.log {
        notifiers.push(Arc::new(LogNotifier));
    }
    if let Some(webhook) = &config.webhook {
        notifiers.push(Arc::new(WebhookNotifier::new(webhook, runtime.clone(), clock)?));
    }
    Ok(notifiers)
}

/// Deliver notifications until the channel closes
///
/// Returns the number of notifications received.
pub async fn forward(
    mut rx: mpsc::Receiver<Notification>,
    notifiers: Vec<Arc<dyn Notifier>>,
) -> usize {
    let mut received = 0;
    while let Some(notification) = rx.recv().await {
        received += 1;
        for notifier in &notifiers {
            if let Err(e) = notifier.notify(&notification).await {
                tracing::warn!(
                    "{} notifier failed for {}: {}",
                    notifier.notifier_name(),
                    notification.record,
                    e
                );
            }
        }
    }
    tracing::debug!("Notification channel closed after {} notification(s)", received);
    received
}
