use std::{
    io,
    net::{IpAddr, Ipv6Addr},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Where and how the client delivers.
///
/// ```ron
/// client: (
///     servers: ["10.0.0.5", "10.0.0.6:6280"],
///     port: 628,
///     shuffle: true,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Servers tried in order, each `host` or `host:port`.
    #[serde(default = "defaults::servers")]
    pub servers: Vec<String>,

    /// Port for servers given without one.
    ///
    /// Default: 628
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Try servers in a random order.
    #[serde(default)]
    pub shuffle: bool,

    /// Most bytes read from a server's reply.
    ///
    /// Default: 1000
    #[serde(default = "defaults::max_response")]
    pub max_response: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: defaults::servers(),
            port: defaults::port(),
            shuffle: false,
            max_response: defaults::max_response(),
        }
    }
}

impl ClientConfig {
    /// Servers listed one per line, the qmail `control/qmqpservers`
    /// convention. Blank lines and `#` comments are skipped. A missing file
    /// leaves the default server list.
    ///
    /// # Errors
    ///
    /// If the file exists but cannot be read.
    pub fn from_control_file(path: &Path) -> io::Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err),
        };

        let servers: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(ToString::to_string)
            .collect();

        Ok(Self {
            servers: if servers.is_empty() {
                defaults::servers()
            } else {
                servers
            },
            ..Self::default()
        })
    }
}

/// A server entry resolved to a host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    /// Read `host`, `host:port`, a bare IPv6 address, or `[v6]:port`.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidServer`] for an empty host or a bad port.
    pub fn parse(server: &str, default_port: u16) -> Result<Self, ClientError> {
        let server = server.trim();
        let invalid = || ClientError::InvalidServer(server.to_string());

        if server.parse::<Ipv6Addr>().is_ok() {
            return Ok(Self {
                host: server.to_string(),
                port: default_port,
            });
        }

        let (host, port) = if let Some(bracketed) = server.strip_prefix('[') {
            let (host, rest) = bracketed.split_once(']').ok_or_else(invalid)?;
            match rest.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if rest.is_empty() => (host, None),
                None => return Err(invalid()),
            }
        } else {
            match server.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (server, None),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }

        let port = match port {
            Some(port) => port.parse().map_err(|_| invalid())?,
            None => default_port,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => write!(f, "[{}]:{}", self.host, self.port),
            _ => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

mod defaults {
    pub fn servers() -> Vec<String> {
        vec![String::from("127.0.0.1")]
    }

    pub const fn port() -> u16 {
        628
    }

    pub const fn max_response() -> usize {
        1000
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let config: ClientConfig = ron::from_str("()").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.servers, vec!["127.0.0.1"]);
        assert_eq!(config.port, 628);
        assert!(!config.shuffle);
        assert_eq!(config.max_response, 1000);
    }

    #[test]
    fn test_target_parsing() {
        let target = Target::parse("mx.example.com", 628).unwrap();
        assert_eq!(target.to_string(), "mx.example.com:628");

        let target = Target::parse("10.0.0.5:6280", 628).unwrap();
        assert_eq!((target.host.as_str(), target.port), ("10.0.0.5", 6280));

        assert_eq!(Target::parse("::1", 628).unwrap().to_string(), "[::1]:628");
        assert_eq!(Target::parse("[::1]:630", 628).unwrap().port, 630);

        for bad in ["", ":628", "host:port", "[::1", "[::1]x", "host:99999"] {
            assert!(
                matches!(Target::parse(bad, 628), Err(ClientError::InvalidServer(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    fn test_control_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qmqpservers");

        assert_eq!(
            ClientConfig::from_control_file(&path).unwrap().servers,
            vec!["127.0.0.1"]
        );

        std::fs::write(&path, "# primary\n10.0.0.5\n\n10.0.0.6:6280\n").unwrap();
        assert_eq!(
            ClientConfig::from_control_file(&path).unwrap().servers,
            vec!["10.0.0.5", "10.0.0.6:6280"]
        );
    }
}
