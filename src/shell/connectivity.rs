// Connectivity notice
//
// Tracks the banner shown for the device connectivity: "offline" while there
// is no connection and a short-lived "back online" notice after reconnecting.

/// Banner shown for the current connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityNotice {
    /// Nothing to show
    Online,
    Offline,
    /// Connection came back, shown for a while
    Reconnected,
}

/// Connectivity banner state. Every change bumps a generation so a delayed
/// expiry of an old "back online" notice doesn't clear a newer one.
#[derive(Debug, Clone)]
pub struct ConnectivityTracker {
    notice: ConnectivityNotice,
    generation: u64,
}

impl ConnectivityTracker {
    pub fn new(online: bool) -> Self {
        Self {
            notice: if online {
                ConnectivityNotice::Online
            } else {
                ConnectivityNotice::Offline
            },
            generation: 0,
        }
    }

    pub fn notice(&self) -> ConnectivityNotice {
        self.notice
    }

    /// Apply a connectivity change. Returns the generation to expire later
    /// when a "back online" notice was raised.
    pub fn on_change(&mut self, online: bool) -> Option<u64> {
        let was_offline = self.notice == ConnectivityNotice::Offline;

        match (online, was_offline) {
            (true, true) => {
                self.generation += 1;
                self.notice = ConnectivityNotice::Reconnected;
                Some(self.generation)
            }
            (true, false) => None,
            (false, _) => {
                self.generation += 1;
                self.notice = ConnectivityNotice::Offline;
                None
            }
        }
    }

    /// Drop the "back online" notice raised at `generation`
    pub fn expire(&mut self, generation: u64) -> bool {
        if self.generation != generation || self.notice != ConnectivityNotice::Reconnected {
            return false;
        }
        self.notice = ConnectivityNotice::Online;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnected_notice_expires() {
        let mut tracker = ConnectivityTracker::new(false);
        assert_eq!(tracker.notice(), ConnectivityNotice::Offline);

        let generation = tracker.on_change(true).unwrap();
        assert_eq!(tracker.notice(), ConnectivityNotice::Reconnected);

        assert!(tracker.expire(generation));
        assert_eq!(tracker.notice(), ConnectivityNotice::Online);
    }

    #[test]
    fn test_online_without_previous_offline() {
        let mut tracker = ConnectivityTracker::new(true);
        assert_eq!(tracker.on_change(true), None);
        assert_eq!(tracker.notice(), ConnectivityNotice::Online);
    }

    #[test]
    fn test_stale_expiry_ignored() {
        let mut tracker = ConnectivityTracker::new(false);
        let first = tracker.on_change(true).unwrap();

        tracker.on_change(false);
        let second = tracker.on_change(true).unwrap();

        assert!(!tracker.expire(first));
        assert_eq!(tracker.notice(), ConnectivityNotice::Reconnected);
        assert!(tracker.expire(second));
    }

    #[test]
    fn test_going_offline_clears_notice() {
        let mut tracker = ConnectivityTracker::new(false);
        let generation = tracker.on_change(true).unwrap();
        tracker.on_change(false);

        assert!(!tracker.expire(generation));
        assert_eq!(tracker.notice(), ConnectivityNotice::Offline);
    }
}
