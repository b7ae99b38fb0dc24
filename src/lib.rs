//! Podman varlink client library.
//!
//! This library manages containers, images, pods and volumes by calling the
//! `io.podman` varlink interface of a Podman service:
//!
//! - `varlink` - wire framing, transports and connections
//! - `client` - configuration-driven facade handing out connections
//! - `api` - collections of io.podman operations
//! - `models` - typed replies of the service
//! - `tunnel` - ssh forwarding for remote services
//!
//! # Example
//!
//! ```ignore
//! use podman_varlink::{Client, ClientConfig};
//!
//! let client = Client::connect(ClientConfig::from_env()).await?;
//! let version = client.system().version().await?;
//! for container in client.containers().list().await? {
//!     println!("{} {}", container.short_id(), container.status);
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod models;
pub mod tunnel;
pub mod varlink;

pub use client::Client;
pub use config::{ClientConfig, Endpoint, RemoteEndpoint};
pub use error::{ErrorKind, PodmanError, Result};
pub use format::{datetime_format, datetime_parse};
