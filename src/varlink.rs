//! Varlink transport and RPC dispatch.
//!
//! This module speaks the varlink protocol to the Podman service over Unix
//! domain sockets.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐         Unix Socket          ┌─────────────────────┐
//! │   Client        │  ◄──────────────────────────►│  podman varlink     │
//! │   (Connection)  │   JSON messages + NUL byte   │  service (io.podman)│
//! └─────────────────┘                              └─────────────────────┘
//! ```
//!
//! # Protocol
//!
//! Each message is a JSON object terminated by a zero byte:
//!
//! ```text
//! {"method":"io.podman.GetContainer","parameters":{"id":"abc123"}}\0
//! {"error":"io.podman.ContainerNotFound","parameters":{"id":"abc123","reason":"..."}}\0
//! ```

mod connection;
mod framing;
mod message;
mod transport;

pub use connection::{Connection, Replies, DEFAULT_TIMEOUT_SECS};
pub use framing::{read_message, write_message, MAX_MESSAGE_SIZE};
pub use message::{Reply, Request};
pub use transport::{SocketAddress, Transport, UnixTransport};
