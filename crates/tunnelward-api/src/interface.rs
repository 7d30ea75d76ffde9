use crate::error::Error;

/// Network-interface control for the tunnel adapter.
pub trait InterfaceControl: Send + Sync {
    /// Current MTU of the named interface, or `None` if the interface is
    /// not present (tunnel never connected on this boot).
    fn read_mtu(&self, interface: &str) -> Result<Option<u32>, Error>;

    /// Apply an MTU both to the live interface and to its persisted
    /// configuration.
    fn apply_mtu(&self, interface: &str, mtu: u32) -> Result<(), Error>;
}
