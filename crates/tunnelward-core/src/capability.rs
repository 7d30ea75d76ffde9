use serde::{Deserialize, Serialize};

/// First OS build accepting inbound traffic-filter direction.
pub const INBOUND_FILTER_BUILD: u32 = 19041;
/// First OS build honoring the UI-lock button flags.
pub const UI_LOCK_BUILD: u32 = 18362;

/// What the host OS can accept in a profile document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCapability {
    pub build: u32,
}

impl Default for HostCapability {
    fn default() -> Self {
        Self { build: 19045 }
    }
}

impl HostCapability {
    pub fn new(build: u32) -> Self {
        Self { build }
    }

    pub fn supports_inbound_filters(self) -> bool {
        self.build >= INBOUND_FILTER_BUILD
    }

    pub fn supports_ui_lock(self) -> bool {
        self.build >= UI_LOCK_BUILD
    }
}
