// ── Computed route sets ──
//
// Office 365 exclusions and DNS-resolved include routes are fetched on
// every generation. The last successful result per source is kept, and a
// failed fetch falls back to it with a warning.

use std::net::IpAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};
use tunnelward_api::RouteSources;

use crate::model::Route;

const OFFICE365_KEY: &str = "office365";

pub struct RouteCache {
    sources: Arc<dyn RouteSources>,
    last_good: DashMap<String, Vec<Route>>,
}

impl RouteCache {
    pub fn new(sources: Arc<dyn RouteSources>) -> Self {
        Self {
            sources,
            last_good: DashMap::new(),
        }
    }

    /// Office 365 "Optimize" endpoints as exclusion routes.
    pub fn office365(&self, warnings: &mut Vec<String>) -> Vec<Route> {
        let fetched = self.sources.office365_exclusions().map(|cidrs| {
            cidrs
                .iter()
                .filter_map(|c| match Route::parse_cidr(c) {
                    Ok(r) => Some(r.excluded().with_comment("Office 365")),
                    Err(e) => {
                        debug!(cidr = %c, error = %e, "skipping office365 endpoint");
                        None
                    }
                })
                .collect()
        });
        self.settle(OFFICE365_KEY, fetched, warnings)
    }

    /// Host routes for every address `host` currently resolves to.
    pub fn resolve(&self, host: &str, warnings: &mut Vec<String>) -> Vec<Route> {
        let fetched = self.sources.resolve(host).map(|addrs| {
            addrs
                .into_iter()
                .map(|a: IpAddr| {
                    let prefix = if a.is_ipv4() { 32 } else { 128 };
                    Route::new(a, prefix).with_comment(host)
                })
                .collect()
        });
        self.settle(&format!("dns:{host}"), fetched, warnings)
    }

    fn settle(
        &self,
        key: &str,
        fetched: Result<Vec<Route>, tunnelward_api::Error>,
        warnings: &mut Vec<String>,
    ) -> Vec<Route> {
        match fetched {
            Ok(routes) => {
                self.last_good.insert(key.to_owned(), routes.clone());
                routes
            }
            Err(e) => {
                warn!(source = key, error = %e, "route fetch failed");
                match self.last_good.get(key) {
                    Some(cached) => {
                        warnings.push(format!(
                            "{key}: fetch failed ({e}); using {} cached routes",
                            cached.len()
                        ));
                        cached.clone()
                    }
                    None => {
                        warnings.push(format!("{key}: fetch failed ({e}); no cached routes"));
                        Vec::new()
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tunnelward_api::MemoryHost;

    #[test]
    fn failed_fetch_falls_back_to_last_good() {
        let host = Arc::new(MemoryHost::new());
        host.edit(|s| s.office365 = Some(vec!["13.107.6.152/31".into(), "garbage".into()]));
        let cache = RouteCache::new(host.clone());

        let mut warnings = Vec::new();
        let routes = cache.office365(&mut warnings);
        assert_eq!(routes.len(), 1);
        assert!(routes[0].exclusion);
        assert!(warnings.is_empty());

        host.edit(|s| s.office365 = None);
        let again = cache.office365(&mut warnings);
        assert_eq!(again, routes);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("cached"));
    }

    #[test]
    fn unresolvable_host_without_cache_yields_nothing() {
        let host = Arc::new(MemoryHost::new());
        let cache = RouteCache::new(host.clone());
        let mut warnings = Vec::new();
        assert!(cache.resolve("intranet.corp", &mut warnings).is_empty());
        assert!(warnings[0].contains("no cached routes"));

        host.edit(|s| {
            s.dns
                .insert("intranet.corp".into(), vec!["10.1.1.1".parse().unwrap()]);
        });
        let routes = cache.resolve("intranet.corp", &mut warnings);
        assert_eq!(routes[0].to_string(), "10.1.1.1/32");
    }
}
