//! Counters, active-connection gauge, recent-event ring and HTML dashboard
//! (spec §4.4).

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Local;

const RING_CAPACITY: usize = 20;
const URL_TRUNCATE: usize = 60;

/// One row in the "Recent Activity" table.
#[derive(Debug, Clone)]
struct RecentEvent {
    time: String,
    ip: String,
    method: String,
    url: String,
    status: u16,
    result: String,
}

struct Counters {
    total_requests: u64,
    cache_hits: u64,
    cache_misses: u64,
    blocked: u64,
    rate_limited: u64,
    active_conns: i64,
    logs: VecDeque<RecentEvent>,
}

/// Process-wide counters, gauge and recent-event ring, guarded by a single
/// lock (spec §5: "single lock around all reads and writes").
pub struct Stats {
    start: Instant,
    rate_limit_count: usize,
    rate_limit_period: Duration,
    inner: Mutex<Counters>,
}

impl Stats {
    pub fn new(rate_limit_count: usize, rate_limit_period: Duration) -> Self {
        Self {
            start: Instant::now(),
            rate_limit_count,
            rate_limit_period,
            inner: Mutex::new(Counters {
                total_requests: 0,
                cache_hits: 0,
                cache_misses: 0,
                blocked: 0,
                rate_limited: 0,
                active_conns: 0,
                logs: VecDeque::with_capacity(RING_CAPACITY),
            }),
        }
    }

    pub fn record_req(&self) {
        self.inner.lock().unwrap().total_requests += 1;
    }

    pub fn record_hit(&self) {
        self.inner.lock().unwrap().cache_hits += 1;
    }

    pub fn record_miss(&self) {
        self.inner.lock().unwrap().cache_misses += 1;
    }

    pub fn record_block(&self) {
        self.inner.lock().unwrap().blocked += 1;
    }

    pub fn record_limit(&self) {
        self.inner.lock().unwrap().rate_limited += 1;
    }

    /// Adds `delta` to the active-connection gauge (typically ±1).
    pub fn update_conns(&self, delta: i64) {
        self.inner.lock().unwrap().active_conns += delta;
    }

    pub fn active_conns(&self) -> i64 {
        self.inner.lock().unwrap().active_conns
    }

    /// Prepends a recent-activity row, truncating `url` to 60 characters and
    /// trimming the ring to at most 20 entries (newest first).
    pub fn add_log(&self, ip: &str, method: &str, url: &str, status: u16, result: &str) {
        let time = Local::now().format("%H:%M:%S").to_string();
        let truncated: String = url.chars().take(URL_TRUNCATE).collect();

        let mut inner = self.inner.lock().unwrap();
        inner.logs.push_front(RecentEvent {
            time,
            ip: ip.to_string(),
            method: method.to_string(),
            url: truncated,
            status,
            result: result.to_string(),
        });
        while inner.logs.len() > RING_CAPACITY {
            inner.logs.pop_back();
        }
    }

    /// Renders the dashboard. Holds the lock for the entire snapshot so the
    /// counters and the ring it prints are mutually consistent.
    pub fn generate_html(&self) -> String {
        let uptime_secs = self.start.elapsed().as_secs();
        let inner = self.inner.lock().unwrap();

        let total_ops = inner.cache_hits + inner.cache_misses;
        let ratio = if total_ops > 0 {
            (inner.cache_hits as f64 / total_ops as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        let mut rows = String::new();
        for event in &inner.logs {
            let color = match event.status {
                200 => "green",
                304 => "blue",
                _ => "red",
            };
            let _ = write!(
                rows,
                r#"
                <tr style="border-bottom: 1px solid #eee;">
                    <td style="padding:8px;">{time}</td>
                    <td style="padding:8px;">{ip}</td>
                    <td style="padding:8px;"><b>{method}</b></td>
                    <td style="padding:8px; font-family:monospace;">{url}</td>
                    <td style="padding:8px; color:{color}; font-weight:bold;">{status}</td>
                    <td style="padding:8px;">{result}</td>
                </tr>"#,
                time = event.time,
                ip = event.ip,
                method = event.method,
                url = event.url,
                color = color,
                status = event.status,
                result = event.result,
            );
        }

        format!(
            r#"
            <!DOCTYPE html>
            <html>
            <head>
                <title>Proxy Dashboard</title>
                <meta http-equiv="refresh" content="5">
                <style>
                    body {{ font-family: sans-serif; background: #f4f7f6; padding: 20px; }}
                    .card {{ background: white; padding: 20px; border-radius: 8px; box-shadow: 0 2px 5px rgba(0,0,0,0.05); margin-bottom: 20px; }}
                    .grid {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(150px, 1fr)); gap: 15px; }}
                    .stat-box {{ text-align: center; padding: 15px; background: #f8f9fa; border-radius: 5px; border: 1px solid #e9ecef; }}
                    .stat-val {{ font-size: 24px; font-weight: bold; color: #333; }}
                    .stat-label {{ color: #666; font-size: 14px; }}
                    table {{ width: 100%; border-collapse: collapse; background: white; }}
                    th {{ text-align: left; padding: 10px; background: #343a40; color: white; }}
                </style>
            </head>
            <body>
                <div class="card">
                    <h2 style="margin-top:0;">🚀 Proxy Server Monitor</h2>
                    <div class="grid">
                        <div class="stat-box"><div class="stat-val">{uptime}</div><div class="stat-label">Uptime</div></div>
                        <div class="stat-box"><div class="stat-val">{total_requests}</div><div class="stat-label">Total Requests</div></div>
                        <div class="stat-box"><div class="stat-val">{active_conns}</div><div class="stat-label">Active Threads</div></div>
                        <div class="stat-box"><div class="stat-val" style="color:green">{cache_hits}</div><div class="stat-label">Cache Hits</div></div>
                        <div class="stat-box"><div class="stat-val" style="color:orange">{cache_misses}</div><div class="stat-label">Cache Misses</div></div>
                        <div class="stat-box"><div class="stat-val" style="color:red">{blocked}</div><div class="stat-label">Blocked</div></div>
                    </div>
                    <p style="text-align:center; color:#888; margin-bottom:0;">Cache Efficiency: {ratio}% | Rate Limit: {rl_count}/{rl_period}s</p>
                </div>

                <div class="card">
                    <h3>Recent Activity</h3>
                    <table>
                        <thead><tr><th>Time</th><th>IP</th><th>Method</th><th>URL</th><th>Status</th><th>Result</th></tr></thead>
                        <tbody>{rows}</tbody>
                    </table>
                </div>
            </body>
            </html>
            "#,
            uptime = format_uptime(uptime_secs),
            total_requests = inner.total_requests,
            active_conns = inner.active_conns,
            cache_hits = inner.cache_hits,
            cache_misses = inner.cache_misses,
            blocked = inner.blocked,
            ratio = ratio,
            rl_count = self.rate_limit_count,
            rl_period = self.rate_limit_period.as_secs(),
            rows = rows,
        )
    }
}

fn format_uptime(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{hours}:{minutes:02}:{secs:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_independently() {
        let stats = Stats::new(50, Duration::from_secs(60));
        stats.record_req();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_block();
        stats.record_limit();

        let html = stats.generate_html();
        assert!(html.contains("Total Requests"));
        assert!(html.contains("Cache Hits"));
        assert!(html.contains("Active Threads"));
    }

    #[test]
    fn active_conns_gauge_tracks_delta() {
        let stats = Stats::new(50, Duration::from_secs(60));
        stats.update_conns(1);
        stats.update_conns(1);
        assert_eq!(stats.active_conns(), 2);
        stats.update_conns(-1);
        assert_eq!(stats.active_conns(), 1);
    }

    #[test]
    fn ring_buffer_caps_at_twenty_newest_first() {
        let stats = Stats::new(50, Duration::from_secs(60));
        for i in 0..25 {
            stats.add_log("1.1.1.1", "GET", &format!("/p{i}"), 200, "CACHE_MISS");
        }
        let inner = stats.inner.lock().unwrap();
        assert_eq!(inner.logs.len(), 20);
        assert_eq!(inner.logs.front().unwrap().url, "/p24");
    }

    #[test]
    fn url_is_truncated_to_sixty_chars() {
        let stats = Stats::new(50, Duration::from_secs(60));
        let long_url = "x".repeat(200);
        stats.add_log("1.1.1.1", "GET", &long_url, 200, "CACHE_MISS");
        let inner = stats.inner.lock().unwrap();
        assert_eq!(inner.logs.front().unwrap().url.len(), 60);
    }

    #[test]
    fn cache_efficiency_rounds_to_one_decimal() {
        let stats = Stats::new(50, Duration::from_secs(60));
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        let html = stats.generate_html();
        assert!(html.contains("66.7%"));
    }

    #[test]
    fn cache_efficiency_is_zero_with_no_traffic() {
        let stats = Stats::new(50, Duration::from_secs(60));
        let html = stats.generate_html();
        assert!(html.contains("Cache Efficiency: 0%"));
    }
}
