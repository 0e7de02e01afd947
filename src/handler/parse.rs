//! Byte-level parsing helpers used by the connection handler (spec §4.3,
//! §4.3.2). Kept free of any I/O so they can be exercised directly in unit
//! tests.

use std::collections::HashMap;

use memchr::memchr;

/// The decoded first line of a request: method, target and version tokens.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
    #[allow(dead_code)]
    pub version: String,
}

/// Locates the first newline, decodes everything before it as UTF-8 with
/// lossy replacement, and splits on single spaces into exactly three
/// tokens. Returns `None` for anything else (spec §4.3: "if this split
/// fails the connection is abandoned").
pub fn parse_request_line(buf: &[u8]) -> Option<RequestLine> {
    let newline = memchr(b'\n', buf)?;
    let line = String::from_utf8_lossy(&buf[..newline]);
    let line = line.trim_end_matches('\r').trim();

    let mut parts = line.split(' ');
    let method = parts.next()?;
    let target = parts.next()?;
    let version = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    Some(RequestLine {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
    })
}

/// Extracts `(host, port)` from the raw request bytes and the request
/// target, following spec §4.3's fallback chain: `Host:` header first, then
/// the target's authority, then the path prefix. An explicit `:port`
/// suffix always wins; otherwise the default is 443 for `CONNECT` and 80
/// otherwise.
pub fn extract_host_port(raw: &[u8], target: &str, method: &str) -> (String, u16) {
    let decoded = String::from_utf8_lossy(raw);
    let mut host = None;
    for line in decoded.split("\r\n") {
        if let Some(rest) = strip_prefix_ci(line, "host:") {
            host = Some(rest.trim().to_string());
            break;
        }
    }

    let mut host = host.unwrap_or_else(|| fallback_host(target));
    let mut port = 80;

    if let Some(idx) = host.rfind(':') {
        let (h, p) = host.split_at(idx);
        let p = &p[1..];
        if let Ok(parsed) = p.parse::<u16>() {
            port = parsed;
            host = h.to_string();
        }
        // parse failure: leave port at 80 and host untouched, matching the
        // original's `if ":" in host` branch, which never falls through to
        // the CONNECT default below (SPEC_FULL.md Addition E.3).
    } else if method.eq_ignore_ascii_case("CONNECT") {
        port = 443;
    }

    (host, port)
}

fn fallback_host(target: &str) -> String {
    if let Some(after_scheme) = target.split("://").nth(1) {
        after_scheme.split('/').next().unwrap_or("").to_string()
    } else {
        target.split('/').next().unwrap_or("").to_string()
    }
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() < prefix.len() {
        return None;
    }
    if line.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes()) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// Parses headers out of a complete response buffer (spec §4.3.2): take the
/// bytes before the first `\r\n\r\n`, decode lossily, split on `\r\n`, skip
/// the status line, split each remaining line on the first `": "`.
pub fn parse_headers(data: &[u8]) -> HashMap<String, String> {
    let mut headers = HashMap::new();

    let head_end = match find_double_crlf(data) {
        Some(idx) => idx,
        None => return headers,
    };

    let head = String::from_utf8_lossy(&data[..head_end]);
    let mut lines = head.split("\r\n");
    lines.next(); // status line

    for line in lines {
        if let Some(idx) = line.find(": ") {
            let (k, v) = line.split_at(idx);
            headers.insert(k.to_string(), v[2..].to_string());
        }
    }

    headers
}

fn find_double_crlf(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}
