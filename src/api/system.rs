use serde_json::json;

use super::{call, call_field, Subscription};
use crate::client::Client;
use crate::error::Result;
use crate::models::{Event, Info, Version};

/// Service-wide operations.
pub struct System<'a> {
    client: &'a Client,
}

impl<'a> System<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Service version, with this library's version in `client_version`.
    pub async fn version(&self) -> Result<Version> {
        let reply = call(self.client, "GetVersion", json!({})).await?;
        let mut version: Version = serde_json::from_value(reply.into())?;
        version.client_version = env!("CARGO_PKG_VERSION").to_string();
        Ok(version)
    }

    pub async fn info(&self) -> Result<Info> {
        call_field(self.client, "GetInfo", json!({}), "info").await
    }

    /// Whether the service answers `GetVersion` with a version.
    pub async fn ping(&self) -> Result<bool> {
        let reply = call(self.client, "GetVersion", json!({})).await?;
        Ok(reply.contains_key("version"))
    }

    /// Ask the service to send the file at `path`; returns its length.
    pub async fn receive_file(&self, path: &str, delete: bool) -> Result<i64> {
        call_field(
            self.client,
            "ReceiveFile",
            json!({"path": path, "delete": delete}),
            "len",
        )
        .await
    }

    /// Stream service events matching `filter` (`key=value` entries).
    ///
    /// Without `until` the stream stays open for new events.
    pub async fn events(
        &self,
        filter: &[String],
        since: Option<&str>,
        until: Option<&str>,
    ) -> Result<Subscription<Event>> {
        let params = json!({
            "filter": filter,
            "since": since.unwrap_or_default(),
            "until": until.unwrap_or_default(),
        });
        Subscription::start(self.client, "GetEvents", params, "events").await
    }
}
