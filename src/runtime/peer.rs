//! Endpoint pretty-printing for log lines.

use std::net::SocketAddr;

/// Render an endpoint as `ip:port`, bracketing IPv6 addresses.
///
/// Pure function returning a fresh string per call; used only for
/// operator-facing diagnostics.
pub fn name_port(addr: &SocketAddr) -> String {
    match addr {
        SocketAddr::V4(v4) => format!("{}:{}", v4.ip(), v4.port()),
        SocketAddr::V6(v6) => format!("[{}]:{}", v6.ip(), v6.port()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v4_name_port() {
        let addr: SocketAddr = "192.0.2.1:7002".parse().unwrap();
        assert_eq!(name_port(&addr), "192.0.2.1:7002");
    }

    #[test]
    fn test_v6_name_port_is_bracketed() {
        let addr: SocketAddr = "[2001:db8::1]:7002".parse().unwrap();
        assert_eq!(name_port(&addr), "[2001:db8::1]:7002");
    }
}
