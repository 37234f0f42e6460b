//! HTTP GET request payloads.

use crate::types::HttpHeader;

pub const REQUEST_LINE: &str = "GET / HTTP/1.1";

/// Header block shared by every request of a run: request line, `Host`, extra
/// headers and the terminating blank line.
///
/// A `Host` header supplied by the user replaces the default one built from
/// `target`.
pub fn request_head(target: &str, headers: &[HttpHeader]) -> String {
    let mut head = String::with_capacity(64);
    head.push_str(REQUEST_LINE);
    head.push_str("\r\n");

    if !headers.iter().any(|h| h.name.eq_ignore_ascii_case("host")) {
        head.push_str("Host: ");
        head.push_str(target);
        head.push_str("\r\n");
    }
    for header in headers {
        head.push_str(&header.to_string());
        head.push_str("\r\n");
    }

    head.push_str("\r\n");
    head
}

/// Full request with `timestamp` as the trailing body line.
pub fn request(head: &str, timestamp: &str) -> String {
    let mut request = String::with_capacity(head.len() + timestamp.len());
    request.push_str(head);
    request.push_str(timestamp);
    request
}

/// Whether `payload` starts like an HTTP request.
pub fn looks_like_request(payload: &str) -> bool {
    const METHODS: [&str; 5] = ["GET ", "POST ", "PUT ", "DELETE ", "HEAD "];
    METHODS.iter().any(|m| payload.contains(m)) && payload.contains("HTTP")
}
