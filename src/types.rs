// src/types.rs

use std::fmt;
use std::str::FromStr;

/// `host:port` pair the supervised server binds to.
///
/// Parsing follows the usual split-host-port rules: the port is everything
/// after the last colon, and IPv6 hosts must be bracketed (`[::1]:8080`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamAddr {
    host: String,
    port: u16,
}

impl UpstreamAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for UpstreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for UpstreamAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("address {s:?} is not host:port: missing port"))?;

        let host = match host.strip_prefix('[') {
            Some(rest) => rest
                .strip_suffix(']')
                .ok_or_else(|| format!("address {s:?} has an unterminated '['"))?,
            None if host.contains(':') => {
                return Err(format!("address {s:?} is not host:port: too many colons"));
            }
            None => host,
        };

        let port: u16 = port
            .parse()
            .map_err(|e| format!("address {s:?} has an invalid port {port:?}: {e}"))?;

        Ok(Self::new(host, port))
    }
}
