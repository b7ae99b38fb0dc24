//! Varlink connection bound to one interface.
//!
//! `Connection` turns method calls into varlink requests, applies the request
//! timeout, and decodes replies into parameter maps or typed
//! [`PodmanError`]s.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{PodmanError, Result};
use crate::varlink::message::{Reply, Request};
use crate::varlink::transport::{SocketAddress, Transport, UnixTransport};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Open connection to a varlink service.
///
/// A connection is either OPEN or CLOSED. Closing is one-way and idempotent;
/// calls on a closed connection fail with `PodmanError::ConnectionClosed`.
/// Dropping the connection closes it.
///
/// Calls borrow the connection mutably, so at most one request is in flight
/// at a time. Open one connection per concurrent caller.
///
/// # Example
///
/// ```ignore
/// use podman_varlink::varlink::{Connection, SocketAddress};
/// use serde_json::json;
///
/// let address = SocketAddress::parse("/run/podman/io.podman");
/// let mut conn = Connection::open(&address, "io.podman", timeout).await?;
/// let version = conn.call("GetVersion", json!({})).await?;
/// conn.close();
/// ```
pub struct Connection {
    /// `None` once closed.
    transport: Option<Box<dyn Transport>>,
    interface: String,
    address: String,
    /// Request timeout duration.
    timeout: Duration,
}

impl Connection {
    /// Connect to the service socket at `address`.
    pub async fn open(address: &SocketAddress, interface: &str, timeout: Duration) -> Result<Self> {
        let transport = UnixTransport::connect(address).await?;
        let conn = Self::from_transport(Box::new(transport), interface, timeout);
        debug!(address = %conn.address, interface = %conn.interface, "Opened varlink connection");
        Ok(conn)
    }

    /// Build a connection over an arbitrary transport.
    pub fn from_transport(
        transport: Box<dyn Transport>,
        interface: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let address = transport.address().to_string();
        Self {
            transport: Some(transport),
            interface: interface.into(),
            address,
            timeout,
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the request timeout duration.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    /// Close the connection. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!(address = %self.address, interface = %self.interface, "Closed varlink connection");
        }
    }

    /// Call `method` on the bound interface and wait for its reply.
    ///
    /// `method` is the short name (`ListImages`); the interface prefix is
    /// added here. `params` must be a JSON object (or null for no
    /// parameters).
    ///
    /// # Errors
    ///
    /// - `PodmanError::ConnectionClosed` if the connection was closed
    /// - `PodmanError::Timeout` if no reply arrives in time; the connection
    ///   is closed since a late reply would desynchronize the stream
    /// - `PodmanError::Io`/`Protocol` on transport failure; the connection
    ///   is closed
    /// - the mapped daemon error if the service replied with an error
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Map<String, Value>> {
        let request = Request::new(self.qualified(method), params);
        let reply = self.exchange(&request).await?;
        decode_reply(reply)
    }

    /// Call `method` and deserialize the reply parameters into `T`.
    pub async fn call_as<T: DeserializeOwned>(&mut self, method: &str, params: Value) -> Result<T> {
        let reply = self.call(method, params).await?;
        Ok(serde_json::from_value(Value::Object(reply))?)
    }

    /// Call `method` without waiting for a reply.
    pub async fn call_oneway(&mut self, method: &str, params: Value) -> Result<()> {
        let request = Request::new(self.qualified(method), params).with_oneway();
        debug!(method = %request.method, "varlink oneway call");

        let transport = self.transport.as_mut().ok_or(PodmanError::ConnectionClosed)?;
        let result = timeout(self.timeout, transport.send(&request)).await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.close();
                Err(e)
            }
            Err(_) => {
                self.close();
                Err(PodmanError::Timeout(self.timeout))
            }
        }
    }

    /// Call `method` with the `more` flag and stream its replies.
    ///
    /// Continuation replies are awaited without a timeout; close or drop the
    /// connection to abandon the stream.
    pub async fn call_more(&mut self, method: &str, params: Value) -> Result<Replies<'_>> {
        self.send_more(method, params).await?;
        Ok(Replies {
            conn: self,
            done: false,
        })
    }

    /// Send a `more` request without borrowing the connection for the
    /// replies. Pair with [`receive_more`](Self::receive_more).
    pub async fn send_more(&mut self, method: &str, params: Value) -> Result<()> {
        let request = Request::new(self.qualified(method), params).with_more();
        debug!(method = %request.method, "varlink streaming call");

        let transport = self.transport.as_mut().ok_or(PodmanError::ConnectionClosed)?;
        let result = transport.send(&request).await;
        if result.is_err() {
            self.close();
        }
        result
    }

    /// Wait, without a timeout, for the next reply of a streaming call.
    ///
    /// Returns the decoded parameters and whether more replies follow.
    /// Transport failures close the connection.
    pub async fn receive_more(&mut self) -> Result<(Map<String, Value>, bool)> {
        let transport = self.transport.as_mut().ok_or(PodmanError::ConnectionClosed)?;
        let result = transport.receive().await;

        match result {
            Ok(reply) => {
                let continues = reply.continues && reply.error.is_none();
                Ok((decode_reply(reply)?, continues))
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    fn qualified(&self, method: &str) -> String {
        format!("{}.{}", self.interface, method)
    }

    /// Send a request and receive its first reply, bounded by the timeout.
    async fn exchange(&mut self, request: &Request) -> Result<Reply> {
        debug!(method = %request.method, "varlink call");

        let transport = self.transport.as_mut().ok_or(PodmanError::ConnectionClosed)?;

        // Apply timeout to the entire send/receive operation
        let result = timeout(self.timeout, async {
            transport.send(request).await?;
            transport.receive().await
        })
        .await;

        match result {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                self.close();
                Err(e)
            }
            Err(_) => {
                debug!(method = %request.method, timeout = ?self.timeout, "varlink call timed out");
                self.close();
                Err(PodmanError::Timeout(self.timeout))
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Turn a reply into its parameters or the mapped daemon error.
fn decode_reply(reply: Reply) -> Result<Map<String, Value>> {
    match reply.error {
        Some(name) => Err(PodmanError::from_reply(&name, reply.parameters)),
        None => Ok(reply.parameters.unwrap_or_default()),
    }
}

/// Replies of a streaming (`more`) call.
pub struct Replies<'a> {
    conn: &'a mut Connection,
    done: bool,
}

impl Replies<'_> {
    /// Wait for the next reply. Returns `None` after the final reply or an
    /// error.
    pub async fn next(&mut self) -> Option<Result<Map<String, Value>>> {
        if self.done {
            return None;
        }

        match self.conn.receive_more().await {
            Ok((parameters, continues)) => {
                self.done = !continues;
                Some(Ok(parameters))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    /// Drain the stream into a vector, stopping at the first error.
    pub async fn collect(mut self) -> Result<Vec<Map<String, Value>>> {
        let mut replies = Vec::new();
        while let Some(reply) = self.next().await {
            replies.push(reply?);
        }
        Ok(replies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    // Mock Transport
    struct MockTransport {
        requests: Arc<Mutex<Vec<Request>>>,
        replies: VecDeque<Reply>,
    }

    impl MockTransport {
        fn new(replies: Vec<Reply>) -> (Self, Arc<Mutex<Vec<Request>>>) {
            let requests = Arc::new(Mutex::new(Vec::new()));
            let transport = Self {
                requests: Arc::clone(&requests),
                replies: replies.into(),
            };
            (transport, requests)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, request: &Request) -> Result<()> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(())
        }

        async fn receive(&mut self) -> Result<Reply> {
            self.replies.pop_front().ok_or_else(|| {
                PodmanError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by daemon",
                ))
            })
        }

        fn address(&self) -> &str {
            "unix:mock"
        }
    }

    // Transport whose daemon never answers
    struct SilentTransport;

    #[async_trait]
    impl Transport for SilentTransport {
        async fn send(&mut self, _request: &Request) -> Result<()> {
            Ok(())
        }

        async fn receive(&mut self) -> Result<Reply> {
            std::future::pending().await
        }

        fn address(&self) -> &str {
            "unix:silent"
        }
    }

    fn mock_connection(replies: Vec<Reply>) -> (Connection, Arc<Mutex<Vec<Request>>>) {
        let (transport, requests) = MockTransport::new(replies);
        let conn = Connection::from_transport(
            Box::new(transport),
            "io.podman",
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        );
        (conn, requests)
    }

    #[tokio::test]
    async fn test_call_qualifies_method_and_decodes_success() {
        let (mut conn, requests) =
            mock_connection(vec![Reply::success(json!({"image": "abc123"}))]);

        let result = conn
            .call("TagImage", json!({"name": "abc123", "tagged": "alpine:fubar"}))
            .await
            .expect("Call failed");

        assert_eq!(result.get("image"), Some(&json!("abc123")));

        let sent = requests.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, "io.podman.TagImage");
        assert_eq!(
            Value::Object(sent[0].parameters.clone().unwrap()),
            json!({"name": "abc123", "tagged": "alpine:fubar"})
        );
    }

    #[tokio::test]
    async fn test_error_reply_maps_to_typed_error_and_keeps_connection() {
        let (mut conn, _) = mock_connection(vec![
            Reply::failure("io.podman.ContainerNotFound", json!({"id": "abc123"})),
            Reply::success(json!({"version": "1.9.3"})),
        ]);

        let err = conn.call("GetContainer", json!({"id": "abc123"})).await.unwrap_err();
        assert!(
            matches!(err, PodmanError::ContainerNotFound { ref id, .. } if id == "abc123"),
            "Expected ContainerNotFound, got {:?}",
            err
        );
        assert!(!conn.is_closed(), "daemon errors must not close the connection");

        let version = conn.call("GetVersion", json!({})).await.expect("Call failed");
        assert_eq!(version.get("version"), Some(&json!("1.9.3")));
    }

    #[tokio::test]
    async fn test_close_twice_is_noop() {
        let (mut conn, _) = mock_connection(vec![]);

        conn.close();
        assert!(conn.is_closed());
        conn.close();
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_call_after_close_fails() {
        let (mut conn, requests) = mock_connection(vec![Reply::success(json!({}))]);
        conn.close();

        let err = conn.call("GetVersion", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Closed);
        assert!(requests.lock().unwrap().is_empty(), "nothing may be sent after close");
    }

    #[tokio::test]
    async fn test_timeout_closes_connection() {
        let mut conn = Connection::from_transport(
            Box::new(SilentTransport),
            "io.podman",
            Duration::from_millis(50),
        );

        let err = conn.call("GetVersion", json!({})).await.unwrap_err();
        assert!(matches!(err, PodmanError::Timeout(d) if d == Duration::from_millis(50)));
        assert!(conn.is_closed());

        let err = conn.call("GetVersion", json!({})).await.unwrap_err();
        assert!(matches!(err, PodmanError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_hangup_closes_connection() {
        let (mut conn, _) = mock_connection(vec![]);

        let err = conn.call("GetVersion", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_call_as_deserializes() {
        #[derive(serde::Deserialize)]
        struct Exists {
            exists: i64,
        }

        let (mut conn, _) = mock_connection(vec![Reply::success(json!({"exists": 0}))]);
        let reply: Exists = conn
            .call_as("ImageExists", json!({"name": "alpine"}))
            .await
            .expect("Call failed");

        assert_eq!(reply.exists, 0);
    }

    #[tokio::test]
    async fn test_call_more_streams_until_final_reply() {
        let mut first = Reply::success(json!({"log": {"msg": "one"}}));
        first.continues = true;
        let mut second = Reply::success(json!({"log": {"msg": "two"}}));
        second.continues = true;
        let last = Reply::success(json!({"log": {"msg": "three"}}));

        let (mut conn, requests) = mock_connection(vec![first, second, last]);

        let replies = conn
            .call_more("GetContainersLogs", json!({"names": ["web"], "follow": true}))
            .await
            .expect("Call failed")
            .collect()
            .await
            .expect("Stream failed");

        let messages: Vec<_> = replies.iter().map(|r| r["log"]["msg"].clone()).collect();
        assert_eq!(messages, vec![json!("one"), json!("two"), json!("three")]);
        assert!(requests.lock().unwrap()[0].more);
    }

    #[tokio::test]
    async fn test_call_more_stops_at_error() {
        let mut first = Reply::success(json!({"log": {"msg": "one"}}));
        first.continues = true;
        let failure = Reply::failure("io.podman.ErrorOccurred", json!({"reason": "gone"}));

        let (mut conn, _) = mock_connection(vec![first, failure]);
        let mut replies = conn.call_more("GetEvents", json!({})).await.expect("Call failed");

        assert!(replies.next().await.unwrap().is_ok());
        let err = replies.next().await.unwrap().unwrap_err();
        assert!(matches!(err, PodmanError::ErrorOccurred { ref reason } if reason == "gone"));
        assert!(replies.next().await.is_none());
    }

    #[tokio::test]
    async fn test_oneway_sends_flag() {
        let (mut conn, requests) = mock_connection(vec![]);

        conn.call_oneway("AttachControl", json!({"name": "web"}))
            .await
            .expect("Call failed");

        let sent = requests.lock().unwrap();
        assert!(sent[0].oneway);
        assert_eq!(sent[0].method, "io.podman.AttachControl");
    }
}
