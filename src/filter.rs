//! Blacklist membership test and sliding-window rate limiter (spec §4.2).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-client-IP sliding window of admitted request timestamps, plus the
/// fixed host-substring blacklist.
pub struct Filter {
    blacklist: Vec<String>,
    rate_limit_count: usize,
    rate_limit_period: Duration,
    windows: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Filter {
    pub fn new(blacklist: Vec<String>, rate_limit_count: usize, rate_limit_period: Duration) -> Self {
        Self {
            blacklist,
            rate_limit_count,
            rate_limit_period,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// True iff any blacklist entry is a substring of `host`. Empty host is
    /// never blocked.
    pub fn is_blocked(&self, host: &str) -> bool {
        if host.is_empty() {
            return false;
        }
        self.blacklist.iter().any(|domain| host.contains(domain.as_str()))
    }

    /// Sliding-window rate check for `client_ip`: prune timestamps older
    /// than the window, deny (without recording) if the remainder is
    /// already at the limit, else record `now` and admit.
    pub fn is_rate_limited(&self, client_ip: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();
        let entry = windows.entry(client_ip.to_string()).or_default();

        entry.retain(|&t| now.duration_since(t) < self.rate_limit_period);

        if entry.len() >= self.rate_limit_count {
            return true;
        }

        entry.push(now);
        false
    }
}
