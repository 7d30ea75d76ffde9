// ── Tunnel-negotiation service restart ──
//
// Auto-trigger registration only takes effect after the negotiation service
// restarts. A restart tears down every active session, so a request stays
// pending (sticky) until nothing but the device tunnel is connected. The
// flag is cleared exactly when the restart is issued. The restart itself
// runs as a background task; failures are logged and delivered on a
// single-consumer channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tunnelward_api::ServiceControl;

/// A restart that failed after being issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartFailure {
    pub service: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

pub struct RestartCoordinator {
    services: Arc<dyn ServiceControl>,
    requested: AtomicBool,
    failure_tx: mpsc::UnboundedSender<RestartFailure>,
    failure_rx: Mutex<Option<mpsc::UnboundedReceiver<RestartFailure>>>,
}

impl RestartCoordinator {
    pub fn new(services: Arc<dyn ServiceControl>) -> Self {
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        Self {
            services,
            requested: AtomicBool::new(false),
            failure_tx,
            failure_rx: Mutex::new(Some(failure_rx)),
        }
    }

    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::AcqRel) {
            debug!("service restart requested");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Take the failure receiver. Only the first caller gets it.
    pub fn take_failures(&self) -> Option<mpsc::UnboundedReceiver<RestartFailure>> {
        self.failure_rx.lock().take()
    }

    /// Issue a pending restart if `active` holds nothing besides
    /// `device_tunnel`. Returns whether a restart was issued.
    ///
    /// Inside a tokio runtime the restart runs on the blocking pool and
    /// this returns immediately. Outside one it runs inline.
    pub fn maybe_restart(
        &self,
        service: &str,
        active: &[String],
        device_tunnel: Option<&str>,
    ) -> bool {
        if !self.is_requested() {
            return false;
        }
        let blocking: Vec<&String> = active
            .iter()
            .filter(|name| !device_tunnel.is_some_and(|d| d.eq_ignore_ascii_case(name)))
            .collect();
        if !blocking.is_empty() {
            debug!(?blocking, "service restart deferred while connections are active");
            return false;
        }
        if !self.requested.swap(false, Ordering::AcqRel) {
            // Another caller issued it first.
            return false;
        }

        info!(service, "restarting service");
        let services = Arc::clone(&self.services);
        let failures = self.failure_tx.clone();
        let service = service.to_owned();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let name = service.clone();
                    let result = tokio::task::spawn_blocking(move || services.restart(&name)).await;
                    match result {
                        Ok(Ok(())) => info!(service = %service, "service restarted"),
                        Ok(Err(e)) => report(&failures, service, e.to_string()),
                        Err(e) => report(&failures, service, e.to_string()),
                    }
                });
            }
            Err(_) => {
                if let Err(e) = services.restart(&service) {
                    report(&failures, service, e.to_string());
                }
            }
        }
        true
    }
}

fn report(failures: &mpsc::UnboundedSender<RestartFailure>, service: String, message: String) {
    warn!(service = %service, error = %message, "service restart failed");
    // A dropped receiver only means nobody is listening.
    let _ = failures.send(RestartFailure {
        service,
        message,
        at: Utc::now(),
    });
}

impl std::fmt::Debug for RestartCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartCoordinator")
            .field("requested", &self.is_requested())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tunnelward_api::{Error, MemoryHost};

    struct FailingService;

    impl ServiceControl for FailingService {
        fn restart(&self, service: &str) -> Result<(), Error> {
            Err(Error::Os {
                code: 1058,
                message: format!("{service} is disabled"),
            })
        }
    }

    #[test]
    fn deferred_while_other_connections_are_active() {
        let memory = Arc::new(MemoryHost::new());
        let restart = RestartCoordinator::new(memory.clone());
        restart.request();

        let active = vec!["Device".to_owned(), "Corp".to_owned()];
        assert!(!restart.maybe_restart("RasMan", &active, Some("Device")));
        assert!(restart.is_requested());
        assert!(memory.snapshot().restarts.is_empty());

        assert!(restart.maybe_restart("RasMan", &active[..1], Some("device")));
        assert!(!restart.is_requested());
        assert_eq!(memory.snapshot().restarts, vec!["RasMan"]);

        // Issued once; a second pass has nothing to do.
        assert!(!restart.maybe_restart("RasMan", &[], None));
        assert_eq!(memory.snapshot().restarts.len(), 1);
    }

    #[test]
    fn nothing_happens_without_a_request() {
        let memory = Arc::new(MemoryHost::new());
        let restart = RestartCoordinator::new(memory.clone());
        assert!(!restart.maybe_restart("RasMan", &[], None));
        assert!(memory.calls().is_empty());
    }

    #[tokio::test]
    async fn failures_arrive_on_the_channel() {
        let restart = RestartCoordinator::new(Arc::new(FailingService));
        let mut failures = restart.take_failures().unwrap();
        assert!(restart.take_failures().is_none());

        restart.request();
        assert!(restart.maybe_restart("RasMan", &[], None));
        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.service, "RasMan");
        assert!(failure.message.contains("disabled"));
    }
}
