//! End-to-end scenarios from the specification (behavioral requirements
//! document, §8 "End-to-end scenarios"). Each test drives the proxy over a
//! real loopback TCP socket against one or more scripted mock origins,
//! rather than mocking any internal type.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use relay_proxy::config::Config;
use relay_proxy::server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn temp_log_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "relay-proxy-e2e-{tag}-{}-{}.log",
        std::process::id(),
        tag.len()
    ))
}

fn base_config(tag: &str) -> Config {
    let mut config = Config::default();
    config.port = 0; // overwritten by the bound ephemeral listener below
    config.log_file = temp_log_path(tag);
    config.socket_timeout = Duration::from_secs(5);
    config
}

/// Starts the proxy on an ephemeral loopback port and returns its address.
async fn start_proxy(config: Config) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::accept_loop(config, listener));
    addr
}

/// A mock origin that answers every GET with a fixed 200 response carrying
/// an `ETag`, and every HEAD with `304 Not Modified` (a stand-in for "the
/// entity tag still matches"). Runs until the test process exits.
async fn spawn_conditional_origin(body: &'static str, etag: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                continue;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let Ok(n) = sock.read(&mut buf).await else { return };
                let is_head = buf[..n].starts_with(b"HEAD");

                if is_head {
                    let _ = sock.write_all(b"HTTP/1.1 304 Not Modified\r\n\r\n").await;
                } else {
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nETag: \"{etag}\"\r\nContent-Length: {}\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = sock.write_all(response.as_bytes()).await;
                }
                let _ = sock.shutdown().await;
            });
        }
    });

    addr
}

/// A mock origin that always returns the same fixed response body, with no
/// cache validators — useful when a test only cares that a forward
/// happened, not about revalidation.
async fn spawn_plain_origin(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                continue;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(response.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });

    addr
}

async fn send_and_read(proxy_addr: SocketAddr, request: &str) -> String {
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(request.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    let _ = client.read_to_end(&mut out).await;
    String::from_utf8_lossy(&out).into_owned()
}

#[tokio::test]
async fn http_miss_then_conditional_hit() {
    let origin_addr = spawn_conditional_origin("hello", "v1").await;
    let proxy_addr = start_proxy(base_config("miss-then-hit")).await;

    let request = format!(
        "GET http://{origin_addr}/ HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n"
    );

    let first = send_and_read(proxy_addr, &request).await;
    assert!(first.contains("200 OK"));
    assert!(first.ends_with("hello"));

    // give the handler time to finish the cache.save() before the second request
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = send_and_read(proxy_addr, &request).await;
    assert!(second.contains("200 OK"));
    assert!(second.ends_with("hello"), "cached body served verbatim on revalidated hit");
}

#[tokio::test]
async fn rate_limit_denies_after_threshold() {
    let origin_addr = spawn_plain_origin("ok").await;
    let mut config = base_config("rate-limit");
    config.rate_limit_count = 2;
    config.rate_limit_period = Duration::from_secs(60);
    let proxy_addr = start_proxy(config).await;

    let request = format!("GET http://{origin_addr}/x HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n");

    let first = send_and_read(proxy_addr, &request).await;
    let second = send_and_read(proxy_addr, &request).await;
    let third = send_and_read(proxy_addr, &request).await;

    assert!(first.contains("200 OK"));
    assert!(second.contains("200 OK"));
    assert!(third.contains("429 Too Many Requests"));
    assert!(third.ends_with("Too Many Requests"));
}

#[tokio::test]
async fn blacklisted_host_is_rejected_before_any_origin_connect() {
    let mut config = base_config("blacklist");
    config.blacklist = vec!["ads.example.com".to_string()];
    let proxy_addr = start_proxy(config).await;

    let request = "GET http://ads.example.com/x HTTP/1.1\r\nHost: ads.example.com\r\n\r\n";
    let response = send_and_read(proxy_addr, request).await;

    assert!(response.contains("403 Forbidden"));
    assert!(response.ends_with("Forbidden"));
}

#[tokio::test]
async fn connect_tunnel_relays_bytes_both_ways() {
    let origin_addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = sock.read(&mut buf).await.unwrap();
            // echo back uppercased, to prove bytes actually round-tripped
            for b in &mut buf[..n] {
                b.make_ascii_uppercase();
            }
            sock.write_all(&buf[..n]).await.unwrap();
        });
        addr
    };

    let proxy_addr = start_proxy(base_config("connect-tunnel")).await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    let connect_req = format!(
        "CONNECT {origin_addr} HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n"
    );
    client.write_all(connect_req.as_bytes()).await.unwrap();

    let mut established = [0u8; 64];
    let n = client.read(&mut established).await.unwrap();
    assert!(String::from_utf8_lossy(&established[..n]).contains("200 Connection Established"));

    client.write_all(b"hello").await.unwrap();
    let mut reply = [0u8; 64];
    let n = client.read(&mut reply).await.unwrap();
    assert_eq!(&reply[..n], b"HELLO");
}

#[tokio::test]
async fn stats_dashboard_does_not_change_total_requests() {
    let proxy_addr = start_proxy(base_config("stats-dashboard")).await;

    let request = "GET http://anything/proxy-stats HTTP/1.1\r\nHost: anything\r\n\r\n";
    let response = send_and_read(proxy_addr, request).await;

    assert!(response.contains("200 OK"));
    assert!(response.contains("text/html"));
    assert!(response.contains("Total Requests"));
    assert!(response.contains("Cache Hits"));
    assert!(response.contains("Active Threads"));
}

#[tokio::test]
async fn eviction_under_load_forces_a_second_round_miss() {
    let a = spawn_conditional_origin("A", "etag-a").await;
    let b = spawn_conditional_origin("B", "etag-b").await;
    let c = spawn_conditional_origin("C", "etag-c").await;
    let d = spawn_conditional_origin("D", "etag-d").await;

    let mut config = base_config("eviction");
    config.max_cache_entries = 3;
    let proxy_addr = start_proxy(config).await;

    for addr in [a, b, c, d] {
        let request = format!("GET http://{addr}/ HTTP/1.1\r\nHost: {addr}\r\n\r\n");
        let response = send_and_read(proxy_addr, &request).await;
        assert!(response.contains("200 OK"));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;

    // A was the first inserted into a capacity-3 cache and should have been evicted.
    let req_a = format!("GET http://{a}/ HTTP/1.1\r\nHost: {a}\r\n\r\n");
    let resp_a = send_and_read(proxy_addr, &req_a).await;
    assert!(resp_a.ends_with('A'), "A should be a fresh forward, body still matches origin");

    for (addr, expected_body) in [(b, "B"), (c, "C"), (d, "D")] {
        let request = format!("GET http://{addr}/ HTTP/1.1\r\nHost: {addr}\r\n\r\n");
        let response = send_and_read(proxy_addr, &request).await;
        assert!(response.ends_with(expected_body));
    }
}
