// # dnsyncd - dnsync daemon
//
// Thin integration layer: reads its settings from the environment, loads the
// JSON record configuration, registers the built-in plugins and runs the
// reconciler until SIGTERM or SIGINT. Reconciliation logic lives in
// dnsync-core.
//
// ## Environment
//
// - `DNSYNC_CONFIG`: Path to the JSON configuration file (required)
// - `DNSYNC_LOG_LEVEL`: trace, debug, info, warn or error (default: info)
// - `DNSYNC_MODE`: `dry-run` performs lookups but never writes records
// - `DNSYNC_INTERVAL_SECS`: Overrides `engine.interval_secs` from the file
//
// ## Example
//
// ```bash
// export DNSYNC_CONFIG=/etc/dnsync/config.json
// export DNSYNC_LOG_LEVEL=debug
//
// dnsyncd
// ```

use anyhow::{Context, Result};
use dnsync_core::traits::ClientOptions;
use dnsync_core::{
    DetectionConfig, DnsProvider, DnsyncConfig, IpDetector, ProviderRegistry, Reconciler,
    RecordTask, RuntimeInfo, SystemClock,
};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DnsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DnsyncExitCode> for ExitCode {
    fn from(code: DnsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Settings taken from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    config_path: PathBuf,
    log_level: Level,
    dry_run: bool,
    interval_override: Option<u64>,
}

impl Settings {
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config_path = lookup("DNSYNC_CONFIG")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
            .context("DNSYNC_CONFIG is required. Set it via: export DNSYNC_CONFIG=/etc/dnsync/config.json")?;

        let dry_run = match lookup("DNSYNC_MODE").as_deref().map(str::trim) {
            None | Some("") | Some("live") => false,
            Some("dry-run") => true,
            Some(other) => anyhow::bail!(
                "DNSYNC_MODE '{}' is not supported. Supported modes: live, dry-run",
                other
            ),
        };

        let interval_override = match lookup("DNSYNC_INTERVAL_SECS") {
            None => None,
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("DNSYNC_INTERVAL_SECS '{}' is not a number", raw))?;
                if secs == 0 {
                    anyhow::bail!("DNSYNC_INTERVAL_SECS must be greater than 0");
                }
                Some(secs)
            }
        };

        Ok(Self {
            config_path,
            log_level: parse_log_level(lookup("DNSYNC_LOG_LEVEL").as_deref()),
            dry_run,
            interval_override,
        })
    }
}

/// Unknown or missing levels fall back to info
fn parse_log_level(value: Option<&str>) -> Level {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("trace") => Level::TRACE,
        Some("debug") => Level::DEBUG,
        Some("warn") => Level::WARN,
        Some("error") => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Read, override and validate the configuration file
fn load_config(path: &Path, interval_override: Option<u64>) -> Result<DnsyncConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut config: DnsyncConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    if let Some(secs) = interval_override {
        config.engine.interval_secs = secs;
    }

    config.validate()?;
    Ok(config)
}

/// Registry with every plugin compiled into this binary
fn build_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    dnsync_provider_cloudflare::register(&mut registry);

    #[cfg(feature = "dyndns")]
    dnsync_provider_dyndns::register(&mut registry);

    #[cfg(feature = "rest")]
    dnsync_provider_rest::register(&mut registry);

    #[cfg(feature = "local")]
    dnsync_ip_local::register(&mut registry);

    #[cfg(feature = "http")]
    dnsync_ip_http::register(&mut registry);

    #[cfg(feature = "dns")]
    dnsync_resolver_dns::register(&mut registry);

    registry
}

/// Wire one task per configured record
///
/// Records sharing a provider entry share one client, and records with the
/// same detection settings share one detector.
fn build_tasks(
    config: &DnsyncConfig,
    registry: &ProviderRegistry,
    options: &ClientOptions,
) -> dnsync_core::Result<Vec<RecordTask>> {
    let mut providers: HashMap<&str, Arc<dyn DnsProvider>> = HashMap::new();
    let mut detectors: Vec<(DetectionConfig, Arc<dyn IpDetector>)> = Vec::new();
    let mut tasks = Vec::with_capacity(config.records.len());

    for record_config in &config.records {
        let record = record_config.managed_record();

        let provider = match providers.get(record_config.provider.as_str()) {
            Some(provider) => Arc::clone(provider),
            None => {
                let credential = config.providers.get(&record_config.provider).ok_or_else(|| {
                    dnsync_core::Error::config(format!(
                        "Record {} references unknown provider entry '{}'",
                        record, record_config.provider
                    ))
                })?;
                let provider: Arc<dyn DnsProvider> =
                    Arc::from(registry.create_provider(credential, options)?);
                providers.insert(record_config.provider.as_str(), Arc::clone(&provider));
                provider
            }
        };

        let detection = config.detection_for(record_config);
        let detector = match detectors.iter().find(|(known, _)| *known == detection) {
            Some((_, detector)) => Arc::clone(detector),
            None => {
                let detector: Arc<dyn IpDetector> = Arc::from(registry.create_detector(&detection)?);
                detectors.push((detection, Arc::clone(&detector)));
                detector
            }
        };

        let resolver = registry.create_resolver(&config.resolver_for(record_config), &provider)?;
        let interval = config.interval_for(record_config);

        info!(
            "Managing {} via {} (detection: {}, resolver: {}, every {:?})",
            record,
            provider.provider_name(),
            detector.method(),
            resolver.as_ref().map_or("none", |r| r.resolver_name()),
            interval
        );

        tasks.push(RecordTask::new(record, detector, resolver, provider).with_interval(interval));
    }

    Ok(tasks)
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DnsyncExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DnsyncExitCode::ConfigError.into();
    }

    info!("Starting dnsyncd {}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&settings.config_path, settings.interval_override) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return DnsyncExitCode::ConfigError.into();
        }
    };

    info!(
        "Configuration loaded: {} record(s), {} provider entr{}",
        config.records.len(),
        config.providers.len(),
        if config.providers.len() == 1 { "y" } else { "ies" }
    );
    if settings.dry_run {
        info!("Dry-run mode: records will not be modified");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DnsyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config, settings.dry_run)).into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(config: DnsyncConfig, dry_run: bool) -> DnsyncExitCode {
    let registry = build_registry();
    let options = ClientOptions {
        timeout: config.engine.timeout(),
        dry_run,
    };

    let tasks = match build_tasks(&config, &registry, &options) {
        Ok(tasks) => tasks,
        Err(e) => {
            error!("Configuration error: {}", e);
            return DnsyncExitCode::ConfigError;
        }
    };

    let clock = Arc::new(SystemClock);
    let (reconciler, notifications) = match Reconciler::new(tasks, &config.engine, clock.clone()) {
        Ok(built) => built,
        Err(e) => {
            error!("Configuration error: {}", e);
            return DnsyncExitCode::ConfigError;
        }
    };

    let runtime = RuntimeInfo::new(env!("CARGO_PKG_VERSION"), clock.as_ref());
    let notifiers = match dnsync_notify::from_config(&config.notify, &runtime, clock) {
        Ok(notifiers) => notifiers,
        Err(e) => {
            error!("Configuration error: {}", e);
            return DnsyncExitCode::ConfigError;
        }
    };
    let forwarder = tokio::spawn(dnsync_notify::forward(notifications, notifiers));

    let shutdown = match shutdown_signal() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            error!("Daemon error: {:#}", e);
            return DnsyncExitCode::RuntimeError;
        }
    };

    let result = reconciler.run_with_shutdown(shutdown).await;

    // Dropping the last reconciler handle closes the notification channel
    drop(reconciler);
    if let Err(e) = forwarder.await {
        error!("Notification forwarder aborted: {}", e);
    }

    match result {
        Ok(()) => {
            info!("Shutdown complete");
            DnsyncExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Daemon error: {}", e);
            DnsyncExitCode::RuntimeError
        }
    }
}

/// Resolves on SIGTERM or SIGINT
///
/// Handlers are installed before this returns so a signal arriving during
/// startup is not lost.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()> + Send> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    Ok(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!("Received shutdown signal: {}", name);
    })
}

/// Resolves on CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()> + Send> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal: CTRL-C"),
            Err(e) => error!("Failed to wait for CTRL-C: {}", e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lookup_from<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
        }
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const CONFIG: &str = r#"{
        "providers": {
            "cf": { "provider": "Cloudflare", "login_token": "cf-test-token" },
            "he": { "provider": "HE", "password": "he-secret" }
        },
        "records": [
            { "domain": "example.com", "subdomain": "home", "family": "ipv4", "provider": "cf" },
            { "domain": "example.com", "subdomain": "www", "family": "ipv4", "provider": "cf" },
            { "domain": "example.net", "family": "ipv6", "provider": "he", "interval_secs": 60 }
        ]
    }"#;

    #[test]
    fn test_exit_codes() {
        assert_eq!(DnsyncExitCode::CleanShutdown as u8, 0);
        assert_eq!(DnsyncExitCode::ConfigError as u8, 1);
        assert_eq!(DnsyncExitCode::RuntimeError as u8, 2);
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level(Some("debug")), Level::DEBUG);
        assert_eq!(parse_log_level(Some("WARN")), Level::WARN);
        assert_eq!(parse_log_level(Some("verbose")), Level::INFO);
        assert_eq!(parse_log_level(None), Level::INFO);
    }

    #[test]
    fn test_settings_require_config_path() {
        let err = Settings::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("DNSYNC_CONFIG"));
    }

    #[test]
    fn test_settings_from_environment() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("DNSYNC_CONFIG", "/etc/dnsync/config.json"),
            ("DNSYNC_LOG_LEVEL", "trace"),
            ("DNSYNC_MODE", "dry-run"),
            ("DNSYNC_INTERVAL_SECS", "120"),
        ]))
        .unwrap();

        assert_eq!(settings.config_path, PathBuf::from("/etc/dnsync/config.json"));
        assert_eq!(settings.log_level, Level::TRACE);
        assert!(settings.dry_run);
        assert_eq!(settings.interval_override, Some(120));
    }

    #[test]
    fn test_settings_reject_bad_values() {
        assert!(Settings::from_lookup(lookup_from(&[
            ("DNSYNC_CONFIG", "/tmp/c.json"),
            ("DNSYNC_MODE", "yolo"),
        ]))
        .is_err());
        assert!(Settings::from_lookup(lookup_from(&[
            ("DNSYNC_CONFIG", "/tmp/c.json"),
            ("DNSYNC_INTERVAL_SECS", "soon"),
        ]))
        .is_err());
        assert!(Settings::from_lookup(lookup_from(&[
            ("DNSYNC_CONFIG", "/tmp/c.json"),
            ("DNSYNC_INTERVAL_SECS", "0"),
        ]))
        .is_err());
    }

    #[test]
    fn test_load_config_applies_interval_override() {
        let file = write_config(CONFIG);

        let config = load_config(file.path(), None).unwrap();
        assert_eq!(config.engine.interval_secs, 600);

        let config = load_config(file.path(), Some(90)).unwrap();
        assert_eq!(config.engine.interval_secs, 90);
        assert_eq!(config.interval_for(&config.records[0]).as_secs(), 90);
        // Per-record intervals still win
        assert_eq!(config.interval_for(&config.records[2]).as_secs(), 60);
    }

    #[test]
    fn test_load_config_errors() {
        assert!(load_config(Path::new("/nonexistent/dnsync.json"), None).is_err());

        let file = write_config("{ not json");
        assert!(load_config(file.path(), None).is_err());

        let file = write_config(r#"{ "providers": {}, "records": [] }"#);
        let err = load_config(file.path(), None).unwrap_err();
        assert!(err.to_string().contains("No records"));
    }

    #[tokio::test]
    async fn test_build_tasks_from_config() {
        let file = write_config(CONFIG);
        let config = load_config(file.path(), None).unwrap();
        let registry = build_registry();

        let tasks = build_tasks(&config, &registry, &ClientOptions::default()).unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].record().fqdn(), "home.example.com");
        assert_eq!(tasks[2].record().fqdn(), "example.net");
        assert_eq!(tasks[2].record().record_type(), "AAAA");
    }

    #[tokio::test]
    async fn test_build_tasks_rejects_incomplete_credentials() {
        let file = write_config(
            r#"{
                "providers": { "he": { "provider": "HE" } },
                "records": [ { "domain": "example.net", "family": "ipv4", "provider": "he" } ]
            }"#,
        );
        let config = load_config(file.path(), None).unwrap();

        let err = build_tasks(&config, &build_registry(), &ClientOptions::default()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_registry_knows_every_default_provider() {
        let registry = build_registry();
        for name in [
            "Cloudflare", "HE", "Dynu", "NoIP", "Google", "Strato", "LoopiaSE", "Infomaniak",
            "DuckDNS", "Dynv6", "Hetzner", "DigitalOcean", "Linode", "OVH",
        ] {
            assert!(registry.has_provider(name), "{} is not registered", name);
        }
        assert!(!registry.has_provider("DNSPod"));
    }
}
