//! Endpoint descriptors and the scheme table

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::{Host, Url};

use crate::error::{ExportError, Result};

/// The transports a Graphite endpoint can be reached over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plaintext line protocol over a persistent TCP connection
    Tcp,
    /// Plaintext line protocol over UDP datagrams
    Udp,
    /// Length-prefixed pickle frames over TCP
    Pickled,
}

impl Scheme {
    /// Every recognized scheme, in the order they are documented
    pub const ALL: [Scheme; 3] = [Scheme::Tcp, Scheme::Udp, Scheme::Pickled];

    /// The URI scheme token for this transport
    pub fn token(self) -> &'static str {
        match self {
            Scheme::Tcp => "net.tcp",
            Scheme::Udp => "net.udp",
            Scheme::Pickled => "net.pickled",
        }
    }

    /// Port used when the URI does not name one
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Tcp | Scheme::Udp => 2003,
            Scheme::Pickled => 2004,
        }
    }

    /// All recognized scheme tokens
    pub fn tokens() -> Vec<&'static str> {
        Self::ALL.iter().map(|s| s.token()).collect()
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Scheme {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|scheme| scheme.token().eq_ignore_ascii_case(s))
            .ok_or_else(|| ExportError::unknown_scheme(s))
    }
}

/// A remote host and port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    host: String,
    port: u16,
}

impl Target {
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

    /// Address tuple suitable for tokio's `ToSocketAddrs`
    pub fn socket_addr(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// A parsed `scheme://host:port` endpoint together with its export interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    scheme: Scheme,
    target: Target,
    interval: Duration,
}

impl EndpointDescriptor {
    /// Build a descriptor from already separated parts
    pub fn new(
        scheme: Scheme,
        host: impl Into<String>,
        port: u16,
        interval: Duration,
    ) -> Result<Self> {
        let host = host.into();
        if host.is_empty() {
            return Err(ExportError::invalid_endpoint(
                format!("{}://:{}", scheme, port),
                "host must not be empty",
            ));
        }
        if port == 0 {
            return Err(ExportError::invalid_endpoint(
                format!("{}://{}:0", scheme, host),
                "port must be between 1 and 65535",
            ));
        }
        if interval.is_zero() {
            return Err(ExportError::ConfigurationInvalid(
                "export interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            scheme,
            target: Target::new(host, port),
            interval,
        })
    }

    /// Parse a `scheme://host[:port]` string
    ///
    /// The scheme is matched case-insensitively against the three recognized
    /// tokens. A missing port falls back to the scheme's conventional port.
    pub fn parse(uri: &str, interval: Duration) -> Result<Self> {
        let url = Url::parse(uri.trim())
            .map_err(|e| ExportError::invalid_endpoint(uri, e.to_string()))?;

        let scheme: Scheme = url.scheme().parse()?;

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(ExportError::invalid_endpoint(uri, "missing host")),
        };

        let port = url.port().unwrap_or_else(|| scheme.default_port());

        Self::new(scheme, host, port, interval)
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        self.target.host()
    }

    pub fn port(&self) -> u16 {
        self.target.port()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.target)
    }
}
