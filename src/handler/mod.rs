//! The connection handler — one per accepted client socket (spec §4.3).
//!
//! Orchestrates [`crate::filter::Filter`], [`crate::cache::Cache`],
//! [`crate::stats::Stats`] and [`crate::logger::Logger`] around a single
//! client connection: parse, classify, rate-limit/blacklist gate, then one
//! of {stats page, CONNECT tunnel, cached hit, full forward}. Every exit
//! path decrements the active-connection gauge and closes the client
//! socket; nothing here ever panics or propagates an error past [`run`].

mod parse;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::config::Config;
use crate::filter::Filter;
use crate::logger::Logger;
use crate::stats::Stats;

use parse::{extract_host_port, parse_headers, parse_request_line};

const TUNNEL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const ORIGIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared, non-owning handles every handler needs. Cloned (cheaply, via the
/// inner `Arc`s) once per accepted connection.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub cache: Arc<Cache>,
    pub filter: Arc<Filter>,
    pub stats: Arc<Stats>,
    pub logger: Arc<Logger>,
}

/// Drives one client connection end to end. Never returns an error: every
/// failure is already logged and responded to by the time this returns.
pub async fn run(services: Services, mut stream: TcpStream, client_addr: SocketAddr) {
    services.stats.update_conns(1);
    let client_ip = client_addr.ip().to_string();

    handle(&services, &mut stream, &client_ip).await;

    services.stats.update_conns(-1);
}

async fn handle(services: &Services, stream: &mut TcpStream, client_ip: &str) {
    let mut buf = vec![0u8; services.config.buffer_size];

    let read = match timeout(services.config.socket_timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            debug!(%e, "initial read failed");
            return;
        }
        Err(_) => {
            debug!("initial read timed out");
            return;
        }
    };
    if read == 0 {
        return;
    }
    let raw = &buf[..read];

    let Some(line) = parse_request_line(raw) else {
        debug!("malformed request line, abandoning connection");
        return;
    };
    let method = line.method;
    let target = line.target;

    if target.contains("proxy-stats") {
        serve_stats_page(services, stream).await;
        return;
    }

    services.stats.record_req();

    let (host, port) = extract_host_port(raw, &target, &method);

    if services.filter.is_rate_limited(client_ip) {
        send_plaintext(stream, 429, "Too Many Requests").await;
        services.logger.log(client_ip, &method, &target, 429, "RATE_LIMIT");
        services.stats.record_limit();
        services.stats.add_log(client_ip, &method, &target, 429, "RATE_LIMIT");
        return;
    }

    if services.filter.is_blocked(&host) {
        send_plaintext(stream, 403, "Forbidden").await;
        services.logger.log(client_ip, &method, &target, 403, "BLOCKED");
        services.stats.record_block();
        services.stats.add_log(client_ip, &method, &target, 403, "BLOCKED");
        return;
    }

    if method.eq_ignore_ascii_case("CONNECT") {
        tunnel(services, stream, client_ip, &method, &host, port).await;
        return;
    }

    forward(services, stream, client_ip, &method, &target, &host, port, raw).await;
}

async fn serve_stats_page(services: &Services, stream: &mut TcpStream) {
    let html = services.stats.generate_html();
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        html.len(),
        html
    );
    let _ = stream.write_all(response.as_bytes()).await;
}

async fn send_plaintext(stream: &mut TcpStream, status: u16, reason: &str) {
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n{reason}"
    );
    let _ = stream.write_all(response.as_bytes()).await;
}

async fn connect_origin(host: &str, port: u16) -> std::io::Result<TcpStream> {
    let addr = format!("{host}:{port}");
    match timeout(ORIGIN_CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(result) => result,
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "origin connect timed out",
        )),
    }
}

/// CONNECT tunnel (spec §4.3, "CONNECT tunnel"). A remote-connect failure is
/// swallowed silently, matching the reference implementation's bare
/// `except: pass` (SPEC_FULL.md, Addition E.5) — the client simply gets no
/// response and the connection closes.
async fn tunnel(
    services: &Services,
    client: &mut TcpStream,
    client_ip: &str,
    method: &str,
    host: &str,
    port: u16,
) {
    let mut remote = match connect_origin(host, port).await {
        Ok(remote) => remote,
        Err(e) => {
            warn!(%host, port, %e, "tunnel origin connect failed");
            return;
        }
    };

    if client
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await
        .is_err()
    {
        return;
    }

    services.logger.log(client_ip, method, host, 200, "TUNNEL_OK");
    services.stats.add_log(client_ip, method, host, 200, "TUNNEL_OK");

    pump(client, &mut remote).await;
}

/// Bidirectional opaque byte pump with a 60s mutual-inactivity timeout
/// (spec §4.3, §5).
async fn pump(client: &mut TcpStream, remote: &mut TcpStream) {
    let mut client_buf = [0u8; 8192];
    let mut remote_buf = [0u8; 8192];

    loop {
        tokio::select! {
            result = timeout(TUNNEL_IDLE_TIMEOUT, client.read(&mut client_buf)) => {
                match result {
                    Ok(Ok(0)) | Ok(Err(_)) | Err(_) => return,
                    Ok(Ok(n)) => {
                        if remote.write_all(&client_buf[..n]).await.is_err() {
                            return;
                        }
                    }
                }
            }
            result = timeout(TUNNEL_IDLE_TIMEOUT, remote.read(&mut remote_buf)) => {
                match result {
                    Ok(Ok(0)) | Ok(Err(_)) | Err(_) => return,
                    Ok(Ok(n)) => {
                        if client.write_all(&remote_buf[..n]).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// HTTP forward with cache (spec §4.3, "HTTP forward with cache").
#[allow(clippy::too_many_arguments)]
async fn forward(
    services: &Services,
    client: &mut TcpStream,
    client_ip: &str,
    method: &str,
    url: &str,
    host: &str,
    port: u16,
    raw_request: &[u8],
) {
    if services.config.cache_enabled {
        if let Some(entry) = services.cache.get(url) {
            if is_fresh(&entry, host, port, url, services.config.buffer_size).await {
                let _ = client.write_all(&entry.body).await;
                services.logger.log(client_ip, method, url, 200, "CACHE_HIT");
                services.stats.record_hit();
                services.stats.add_log(client_ip, method, url, 304, "CACHE_HIT");
                return;
            }
            services.logger.log(client_ip, method, url, 200, "CACHE_EXPIRED");
        }
    }

    let mut remote = match connect_origin(host, port).await {
        Ok(remote) => remote,
        Err(e) => {
            let message = e.to_string();
            send_plaintext(client, 502, &message).await;
            return;
        }
    };

    if let Err(e) = remote.write_all(raw_request).await {
        send_plaintext(client, 502, &e.to_string()).await;
        return;
    }

    let mut accumulated = Vec::new();
    let mut chunk = vec![0u8; services.config.buffer_size];
    loop {
        let n = match remote.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                send_plaintext(client, 502, &e.to_string()).await;
                return;
            }
        };
        accumulated.extend_from_slice(&chunk[..n]);
        if client.write_all(&chunk[..n]).await.is_err() {
            return;
        }
    }

    if services.config.cache_enabled {
        let headers = parse_headers(&accumulated);
        services.cache.save(url.to_string(), accumulated, headers);
    }

    services.logger.log(client_ip, method, url, 200, "CACHE_MISS");
    services.stats.record_miss();
    services.stats.add_log(client_ip, method, url, 200, "CACHE_MISS");
}

/// Conditional revalidation (spec §4.3.1). Any failure — missing
/// validators, connect failure, timeout — is treated as "not fresh"; it
/// never propagates as an error.
async fn is_fresh(
    entry: &crate::cache::CacheEntry,
    host: &str,
    port: u16,
    url: &str,
    buffer_size: usize,
) -> bool {
    let etag = entry.headers.get("ETag");
    let last_modified = entry.headers.get("Last-Modified");
    if etag.is_none() && last_modified.is_none() {
        return false;
    }

    let path = strip_origin_prefix(url, host);

    let mut request = format!("HEAD {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n");
    if let Some(etag) = etag {
        request.push_str(&format!("If-None-Match: {etag}\r\n"));
    }
    if let Some(last_modified) = last_modified {
        request.push_str(&format!("If-Modified-Since: {last_modified}\r\n"));
    }
    request.push_str("\r\n");

    let result: std::io::Result<bool> = async {
        let mut remote = connect_origin(host, port).await?;
        remote.write_all(request.as_bytes()).await?;
        let mut buf = vec![0u8; buffer_size];
        let n = remote.read(&mut buf).await?;
        Ok(contains(&buf[..n], b"304 Not Modified"))
    }
    .await;

    result.unwrap_or(false)
}

fn strip_origin_prefix<'a>(url: &'a str, host: &str) -> &'a str {
    let prefix = format!("http://{host}");
    url.strip_prefix(prefix.as_str()).unwrap_or(url)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
