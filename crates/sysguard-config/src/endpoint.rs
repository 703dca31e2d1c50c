use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Where the monitoring daemon for a host is reached.
///
/// Plain host names select the process transport: the daemon is started
/// locally, or through the configured remote shell for other machines.
/// `host:port` and `tcp://host:port` select the socket transport. A URL whose
/// scheme is a shell name (`ssh://host`, `rsh://host`) forces the process
/// transport through that shell.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum HostEndpoint {
    /// Daemon reached through a spawned process.
    Process {
        /// Host name the daemon reports for.
        host: String,
        /// Remote execution shell overriding the configured default.
        shell: Option<String>,
    },
    /// Daemon listening on a TCP port.
    Tcp {
        /// Host name or address.
        host: String,
        /// Listening port.
        port: u16,
    },
}

impl HostEndpoint {
    /// Builds a process endpoint using the default shell.
    #[must_use]
    pub fn process(host: impl Into<String>) -> Self {
        Self::Process {
            host: host.into(),
            shell: None,
        }
    }

    /// Builds a TCP endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Host name used as the connection key.
    #[must_use]
    pub fn host(&self) -> &str {
        match self {
            Self::Process { host, .. } | Self::Tcp { host, .. } => host,
        }
    }

    /// Port of a TCP endpoint.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        match self {
            Self::Process { .. } => None,
            Self::Tcp { port, .. } => Some(*port),
        }
    }
}

impl fmt::Display for HostEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process {
                host,
                shell: Some(shell),
            } => write!(formatter, "{shell}://{host}"),
            Self::Process { host, shell: None } => formatter.write_str(host),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for HostEndpoint {
    type Err = HostEndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(HostEndpointParseError::Empty);
        }

        if trimmed.contains("://") {
            return parse_url(trimmed);
        }

        match trimmed.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.contains(':') => {
                let port = port
                    .parse()
                    .map_err(|_| HostEndpointParseError::InvalidPort(input.to_owned()))?;
                Ok(Self::tcp(host, port))
            }
            _ => Ok(Self::process(trimmed)),
        }
    }
}

fn parse_url(input: &str) -> Result<HostEndpoint, HostEndpointParseError> {
    let url = Url::parse(input)?;
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| HostEndpointParseError::MissingHost(input.to_owned()))?;
    match url.scheme() {
        "tcp" => {
            let port = url
                .port()
                .ok_or_else(|| HostEndpointParseError::MissingPort(input.to_owned()))?;
            Ok(HostEndpoint::tcp(host, port))
        }
        shell => Ok(HostEndpoint::Process {
            host: host.to_owned(),
            shell: Some(shell.to_owned()),
        }),
    }
}

/// Errors raised while parsing a [`HostEndpoint`].
#[derive(Debug, Error)]
pub enum HostEndpointParseError {
    /// Nothing was supplied.
    #[error("host endpoint is empty")]
    Empty,
    /// The URL form carried no host.
    #[error("missing host in '{0}'")]
    MissingHost(String),
    /// A `tcp://` URL carried no port.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// The `host:port` form carried a non-numeric port.
    #[error("invalid TCP port in '{0}'")]
    InvalidPort(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
