//! Device connectivity

use std::sync::atomic::{AtomicBool, Ordering};

/// Read access to the device network state
pub trait NetworkStatus: Send + Sync {
    /// Whether the device currently has connectivity
    fn is_online(&self) -> bool;

    /// Whether the active connection is an unmetered wifi link
    fn is_wifi(&self) -> bool;

    /// Whether data usage should be limited (online but not on wifi)
    fn is_network_access_limited(&self) -> bool {
        self.is_online() && !self.is_wifi()
    }
}

/// Network state held in atomics, updated by the platform layer
#[derive(Debug)]
pub struct SharedNetworkStatus {
    online: AtomicBool,
    wifi: AtomicBool,
}

impl SharedNetworkStatus {
    pub fn new(online: bool, wifi: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            wifi: AtomicBool::new(wifi),
        }
    }

    /// Record a connectivity change. Returns the previous online value.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst)
    }

    pub fn set_wifi(&self, wifi: bool) {
        self.wifi.store(wifi, Ordering::SeqCst);
    }
}

impl NetworkStatus for SharedNetworkStatus {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn is_wifi(&self) -> bool {
        self.is_online() && self.wifi.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wifi_requires_connectivity() {
        let network = SharedNetworkStatus::new(true, true);
        assert!(network.is_wifi());
        assert!(!network.is_network_access_limited());

        assert!(network.set_online(false));
        assert!(!network.is_wifi());
        assert!(!network.is_network_access_limited());
    }

    #[test]
    fn test_limited_access_on_mobile_data() {
        let network = SharedNetworkStatus::new(true, false);
        assert!(network.is_network_access_limited());
    }
}
