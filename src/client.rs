//! Client facade for the Podman service.
//!
//! `Client` validates a [`ClientConfig`], owns the ssh tunnel for remote
//! endpoints, and hands out short-lived [`Connection`]s. Every collection
//! operation opens its own connection and drops it when done, so a failed
//! call never leaves a socket behind.

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::api::{Containers, Images, Pods, System, Volumes};
use crate::config::{ClientConfig, Endpoint};
use crate::error::{PodmanError, Result};
use crate::tunnel::Tunnel;
use crate::varlink::{Connection, SocketAddress};

/// Handle on a Podman varlink service.
///
/// # Example
///
/// ```ignore
/// use podman_varlink::{Client, ClientConfig};
///
/// let client = Client::connect(ClientConfig::from_env()).await?;
/// for image in client.images().list().await? {
///     println!("{} {:?}", image.short_id(), image.repo_tags);
/// }
/// client.close().await;
/// ```
pub struct Client {
    config: ClientConfig,
    endpoint: Endpoint,
    socket: SocketAddress,
    /// Running tunnel for remote endpoints.
    tunnel: Mutex<Option<Tunnel>>,
}

impl Client {
    /// Build a client without contacting the service.
    ///
    /// Remote endpoints get their tunnel on the first [`open`](Self::open).
    pub fn new(config: ClientConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let socket = endpoint.socket();
        Ok(Self {
            config,
            endpoint,
            socket,
            tunnel: Mutex::new(None),
        })
    }

    /// Build a client and check that the service answers.
    ///
    /// # Errors
    ///
    /// Returns the configuration error for a bad uri, `PodmanError::Tunnel`
    /// if ssh fails, and `PodmanError::Connection` if the service does not
    /// answer `GetVersion`.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let client = Self::new(config)?;

        match client.system().ping().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(PodmanError::Protocol(
                    "GetVersion reply has no version".to_string(),
                ))
            }
            Err(PodmanError::Connection { address, source }) => {
                return Err(PodmanError::Connection {
                    address,
                    source: std::io::Error::new(
                        source.kind(),
                        format!("{}. Is podman socket or service running?", source),
                    ),
                });
            }
            Err(e) => return Err(e),
        }

        info!(address = %client.socket.display(), "Connected to podman service");
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Request timeout applied to every connection.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Open a connection bound to the configured interface.
    ///
    /// For remote endpoints the ssh tunnel is started first, or restarted if
    /// ssh has exited since the last call.
    pub async fn open(&self) -> Result<Connection> {
        if let Endpoint::Remote(remote) = &self.endpoint {
            let mut tunnel = self.tunnel.lock().await;
            let alive = tunnel.as_mut().map(Tunnel::is_alive).unwrap_or(false);
            if !alive {
                if tunnel.is_some() {
                    debug!(destination = %remote.destination(), "SSH tunnel exited, restarting");
                }
                *tunnel = Some(Tunnel::bore(remote, self.config.timeout).await?);
            }
        }

        Connection::open(&self.socket, &self.config.interface, self.config.timeout).await
    }

    pub fn system(&self) -> System<'_> {
        System::new(self)
    }

    pub fn images(&self) -> Images<'_> {
        Images::new(self)
    }

    pub fn containers(&self) -> Containers<'_> {
        Containers::new(self)
    }

    pub fn pods(&self) -> Pods<'_> {
        Pods::new(self)
    }

    pub fn volumes(&self) -> Volumes<'_> {
        Volumes::new(self)
    }

    /// Stop the ssh tunnel, if any. Connections already open keep working
    /// until the tunnel socket goes away.
    pub async fn close(&self) {
        if let Some(mut tunnel) = self.tunnel.lock().await.take() {
            tunnel.close().await;
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint)
            .field("interface", &self.config.interface)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}
