use crate::error::Error;

/// Control over OS services the engine depends on.
pub trait ServiceControl: Send + Sync {
    /// Restart the named service and wait for it to report running.
    fn restart(&self, service: &str) -> Result<(), Error>;
}
