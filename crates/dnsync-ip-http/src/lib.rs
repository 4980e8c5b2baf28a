// # HTTP IP Detector
//
// Finds the host's public address by asking HTTP echo services.
//
// ## Architecture
//
// Each family has an ordered list of endpoints. They are tried in order and
// the first one that answers with a valid address of the requested family
// wins. An endpoint may answer with the bare address or wrap it in text or
// HTML; the first address-shaped token is taken either way.
//
// Without configured endpoints the detector uses:
// - IPv4: https://api.ipify.org
// - IPv6: https://api6.ipify.org

use dnsync_core::config::{DEFAULT_TIMEOUT_SECS, DetectionConfig};
use dnsync_core::pattern;
use dnsync_core::traits::{IpDetector, IpDetectorFactory};
use dnsync_core::{AddressFamily, Error, ProviderRegistry, Result};

use std::net::IpAddr;
use std::time::Duration;

/// Default IPv4 echo service
pub const DEFAULT_IPV4_URL: &str = "https://api.ipify.org";

/// Default IPv6 echo service
pub const DEFAULT_IPV6_URL: &str = "https://api6.ipify.org";

/// Detector backed by HTTP echo services
pub struct HttpDetector {
    ipv4_urls: Vec<String>,
    ipv6_urls: Vec<String>,
    client: reqwest::Client,
}

impl HttpDetector {
    /// Create a detector
    ///
    /// # Parameters
    ///
    /// - `ipv4_urls`: Endpoints for IPv4, in order (empty = default)
    /// - `ipv6_urls`: Endpoints for IPv6, in order (empty = default)
    pub fn new(ipv4_urls: Vec<String>, ipv6_urls: Vec<String>) -> Result<Self> {
        Self::with_timeout(
            ipv4_urls,
            ipv6_urls,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Create a detector with a custom per-request timeout
    pub fn with_timeout(
        ipv4_urls: Vec<String>,
        ipv6_urls: Vec<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            ipv4_urls: or_default(ipv4_urls, DEFAULT_IPV4_URL),
            ipv6_urls: or_default(ipv6_urls, DEFAULT_IPV6_URL),
            client,
        })
    }

    /// Endpoints used for `family`, in try order
    pub fn urls(&self, family: AddressFamily) -> &[String] {
        match family {
            AddressFamily::Ipv4 => &self.ipv4_urls,
            AddressFamily::Ipv6 => &self.ipv6_urls,
        }
    }

    /// Ask one endpoint
    async fn fetch(&self, url: &str, family: AddressFamily) -> Result<IpAddr> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http(format!("HTTP error: {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read response: {}", e)))?;

        pattern::parse(family, &body)
            .or_else(|| pattern::extract(family, &body))
            .ok_or_else(|| Error::detection(format!("No valid {} address in response", family)))
    }
}

fn or_default(urls: Vec<String>, default: &str) -> Vec<String> {
    if urls.is_empty() {
        vec![default.to_string()]
    } else {
        urls
    }
}

#[async_trait::async_trait]
impl IpDetector for HttpDetector {
    async fn detect(&self, family: AddressFamily) -> Result<IpAddr> {
        let urls = self.urls(family);
        let mut last_error = None;

        for url in urls {
            match self.fetch(url, family).await {
                Ok(ip) => {
                    tracing::debug!("{} answered {}", url, ip);
                    return Ok(ip);
                }
                Err(e) => {
                    tracing::warn!("Detection endpoint {} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(Error::detection(format!(
            "All {} {} endpoint(s) failed; last error: {}",
            urls.len(),
            family,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn method(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP detectors
pub struct HttpDetectorFactory;

impl IpDetectorFactory for HttpDetectorFactory {
    fn create(&self, config: &DetectionConfig) -> Result<Box<dyn IpDetector>> {
        match config {
            DetectionConfig::Http {
                ipv4_urls,
                ipv6_urls,
            } => Ok(Box::new(HttpDetector::new(
                ipv4_urls.clone(),
                ipv6_urls.clone(),
            )?)),
            _ => Err(Error::config("Invalid config for HTTP detector")),
        }
    }
}

/// Register the HTTP detector with a registry
pub fn register(registry: &mut ProviderRegistry) {
    registry.register_detector("http", Box::new(HttpDetectorFactory));
}
