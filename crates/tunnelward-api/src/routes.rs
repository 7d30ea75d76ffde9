// ── Computed route sources ──
//
// Some route sets are not configured literally: Office 365 "Optimize"
// endpoints are excluded from the tunnel, and configured hostnames are
// resolved into include routes. Both are fetched on demand; caching and
// last-known-good fallback live in the core crate.

use std::net::IpAddr;

use hickory_resolver::Resolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::Error;

const OFFICE365_ENDPOINTS: &str = "https://endpoints.office.com/endpoints/worldwide";

pub trait RouteSources: Send + Sync {
    /// CIDR strings for the Office 365 endpoints that should bypass the
    /// tunnel.
    fn office365_exclusions(&self) -> Result<Vec<String>, Error>;

    /// Resolve a hostname to the addresses it currently points at.
    fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, Error>;
}

#[derive(Debug, Deserialize)]
struct EndpointSet {
    category: Option<String>,
    #[serde(default)]
    ips: Vec<String>,
}

/// Live route sources: the public endpoints web service and the system
/// resolver. Both calls block.
pub struct SystemRouteSources {
    http: reqwest::blocking::Client,
    resolver: Resolver,
    endpoints_url: String,
}

impl SystemRouteSources {
    pub fn new() -> Result<Self, Error> {
        let resolver = Resolver::new(ResolverConfig::default(), ResolverOpts::default())?;
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Fetch {
                source_name: "office365",
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            resolver,
            endpoints_url: OFFICE365_ENDPOINTS.to_owned(),
        })
    }

    /// Point the Office 365 fetch somewhere else (sovereign clouds).
    pub fn with_endpoints_url(mut self, url: impl Into<String>) -> Self {
        self.endpoints_url = url.into();
        self
    }
}

impl RouteSources for SystemRouteSources {
    fn office365_exclusions(&self) -> Result<Vec<String>, Error> {
        let fetch_err = |e: reqwest::Error| Error::Fetch {
            source_name: "office365",
            message: e.to_string(),
        };
        let sets: Vec<EndpointSet> = self
            .http
            .get(&self.endpoints_url)
            .query(&[("clientrequestid", Uuid::new_v4().to_string())])
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(fetch_err)?
            .json()
            .map_err(fetch_err)?;

        let ips: Vec<String> = sets
            .into_iter()
            .filter(|s| s.category.as_deref() == Some("Optimize"))
            .flat_map(|s| s.ips)
            .collect();
        debug!(count = ips.len(), "fetched office365 optimize endpoints");
        Ok(ips)
    }

    fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, Error> {
        let lookup = self.resolver.lookup_ip(host).map_err(|e| Error::Fetch {
            source_name: "dns",
            message: format!("{host}: {e}"),
        })?;
        Ok(lookup.iter().collect())
    }
}
