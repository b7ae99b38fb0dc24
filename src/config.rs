//! Client configuration and endpoint uris.
//!
//! A local endpoint is a `unix:` uri naming the service socket:
//!
//! ```text
//! unix:/run/podman/io.podman
//! unix:///run/podman/io.podman
//! unix:@podman            (Linux abstract namespace)
//! ```
//!
//! A remote endpoint adds an `ssh://user@host[:port]/path` uri naming the
//! socket on the remote host; the local `unix:` uri then names the socket
//! the ssh tunnel binds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::error::{PodmanError, Result};
use crate::varlink::{SocketAddress, DEFAULT_TIMEOUT_SECS};

/// Socket of the system service, as installed by the podman systemd unit.
pub const DEFAULT_URI: &str = "unix:/run/podman/io.podman";

/// Interface implemented by the service.
pub const DEFAULT_INTERFACE: &str = "io.podman";

/// Environment variable overriding the local uri.
pub const ADDRESS_ENV: &str = "PODMAN_VARLINK_ADDRESS";

const REMOTE_FORMAT: &str = "expected format \"ssh://user@hostname[:port]/path_to_socket\"";

/// Settings for a [`Client`](crate::Client).
///
/// # Example
///
/// ```ignore
/// let config = ClientConfig::new("unix:/tmp/podman.sock")
///     .remote("ssh://user@host/run/podman/io.podman")
///     .identity_file("~/.ssh/id_rsa")
///     .timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub uri: String,
    pub interface: String,
    pub remote_uri: Option<String>,
    pub identity_file: Option<PathBuf>,
    /// Skip host key verification for the ssh tunnel.
    pub ignore_hosts: bool,
    pub known_hosts: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_URI)
    }
}

impl ClientConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            interface: DEFAULT_INTERFACE.to_string(),
            remote_uri: None,
            identity_file: None,
            ignore_hosts: false,
            known_hosts: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Configuration from the environment.
    ///
    /// Resolution order for the uri:
    /// 1. `$PODMAN_VARLINK_ADDRESS`
    /// 2. `unix:/run/podman/io.podman`
    pub fn from_env() -> Self {
        match std::env::var(ADDRESS_ENV) {
            Ok(uri) if !uri.trim().is_empty() => Self::new(uri.trim()),
            _ => Self::default(),
        }
    }

    /// Configuration for the per-user service of rootless podman,
    /// `$XDG_RUNTIME_DIR/podman/io.podman`.
    pub fn rootless() -> Self {
        match dirs::runtime_dir() {
            Some(dir) => Self::new(format!("unix:{}", dir.join("podman/io.podman").display())),
            None => Self::default(),
        }
    }

    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    pub fn remote(mut self, remote_uri: impl Into<String>) -> Self {
        self.remote_uri = Some(remote_uri.into());
        self
    }

    pub fn identity_file(mut self, path: impl AsRef<Path>) -> Self {
        self.identity_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn ignore_hosts(mut self, ignore: bool) -> Self {
        self.ignore_hosts = ignore;
        self
    }

    pub fn known_hosts(mut self, path: impl AsRef<Path>) -> Self {
        self.known_hosts = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate the configuration and resolve where to connect.
    pub fn endpoint(&self) -> Result<Endpoint> {
        if self.interface.trim().is_empty() {
            return Err(PodmanError::InvalidArgument(
                "interface is required and cannot be empty".to_string(),
            ));
        }

        let socket = parse_unix_uri(&self.uri)?;

        let Some(remote_uri) = &self.remote_uri else {
            return Ok(Endpoint::Local(socket));
        };

        let SocketAddress::Path(local) = socket else {
            return Err(PodmanError::InvalidUri {
                uri: self.uri.clone(),
                reason: "a tunnel needs a filesystem socket path, not an abstract name"
                    .to_string(),
            });
        };

        let remote = parse_ssh_uri(remote_uri)?;
        Ok(Endpoint::Remote(RemoteEndpoint {
            local,
            identity_file: self.identity_file.as_deref().map(expand_home),
            ignore_hosts: self.ignore_hosts,
            known_hosts: self.known_hosts.as_deref().map(expand_home),
            ..remote
        }))
    }
}

/// Where the client connects.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// Service socket on this host.
    Local(SocketAddress),
    /// Service socket reached through an ssh tunnel.
    Remote(RemoteEndpoint),
}

impl Endpoint {
    /// Socket the client connects to: the service itself or the tunnel's
    /// local end.
    pub fn socket(&self) -> SocketAddress {
        match self {
            Endpoint::Local(socket) => socket.clone(),
            Endpoint::Remote(remote) => SocketAddress::Path(remote.local.clone()),
        }
    }
}

/// Parameters of an ssh tunnel to a remote service socket.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEndpoint {
    /// Socket path bound on this host.
    pub local: PathBuf,
    /// Socket path on the remote host.
    pub remote_path: String,
    pub username: String,
    pub hostname: String,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    pub ignore_hosts: bool,
    pub known_hosts: Option<PathBuf>,
}

impl RemoteEndpoint {
    /// `user@host` destination for ssh.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }
}

/// Parse a `unix:` uri into a socket address.
pub fn parse_unix_uri(uri: &str) -> Result<SocketAddress> {
    let invalid = |reason: &str| PodmanError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };

    let rest = uri
        .strip_prefix("unix:")
        .ok_or_else(|| invalid("expected format \"unix:/path_to_socket\""))?;

    // `unix:///path` and `unix:/path` name the same socket; `;key=value`
    // suffixes carry listener options and are ignored here
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let path = rest.split(';').next().unwrap_or_default();

    if path.is_empty() || path == "@" {
        return Err(invalid(
            "path is required for uri, expected format \"unix:/path_to_socket\"",
        ));
    }

    Ok(SocketAddress::parse(path))
}

/// Parse an `ssh://user@host[:port]/path` uri. The local socket and ssh
/// options are left empty.
fn parse_ssh_uri(uri: &str) -> Result<RemoteEndpoint> {
    let required = |what: &str| PodmanError::InvalidUri {
        uri: uri.to_string(),
        reason: format!("{} is required, {}", what, REMOTE_FORMAT),
    };

    let url = Url::parse(uri).map_err(|e| PodmanError::InvalidUri {
        uri: uri.to_string(),
        reason: format!("{}, {}", e, REMOTE_FORMAT),
    })?;

    if url.scheme() != "ssh" {
        return Err(PodmanError::InvalidUri {
            uri: uri.to_string(),
            reason: format!("unsupported scheme '{}', {}", url.scheme(), REMOTE_FORMAT),
        });
    }

    if url.username().is_empty() {
        return Err(required("username"));
    }
    let hostname = url.host_str().filter(|h| !h.is_empty()).ok_or_else(|| required("hostname"))?;
    if url.path().is_empty() || url.path() == "/" {
        return Err(required("path"));
    }

    Ok(RemoteEndpoint {
        local: PathBuf::new(),
        remote_path: url.path().to_string(),
        username: url.username().to_string(),
        hostname: hostname.to_string(),
        port: url.port(),
        identity_file: None,
        ignore_hosts: false,
        known_hosts: None,
    })
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
