//! Collections of io.podman operations.
//!
//! Each collection borrows the [`Client`] and maps one method to one daemon
//! call on a fresh connection. Replies are decoded into the types in
//! [`crate::models`]; daemon ordering is passed through unchanged.

mod containers;
mod images;
mod pods;
mod system;
mod volumes;

pub use containers::{CommitOptions, Containers, LogsOptions, DEFAULT_STOP_TIMEOUT};
pub use images::{Images, PushOptions, DEFAULT_SEARCH_LIMIT};
pub use pods::Pods;
pub use system::System;
pub use volumes::{VolumePrune, VolumeRemoval, Volumes};

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::client::Client;
use crate::error::{PodmanError, Result};
use crate::format::fold_keys;
use crate::varlink::Connection;

/// Call `method` on a fresh connection and return the reply parameters.
async fn call(client: &Client, method: &str, params: Value) -> Result<Map<String, Value>> {
    let mut conn = client.open().await?;
    conn.call(method, params).await
}

/// Call `method` on a fresh connection and decode one reply field.
async fn call_field<T: DeserializeOwned>(
    client: &Client,
    method: &str,
    params: Value,
    field: &str,
) -> Result<T> {
    let reply = call(client, method, params).await?;
    take_field(reply, field)
}

/// Call `method` on a fresh connection and decode a list field. A missing
/// or null list is empty.
async fn call_list<T: DeserializeOwned>(
    client: &Client,
    method: &str,
    params: Value,
    field: &str,
) -> Result<Vec<T>> {
    let mut reply = call(client, method, params).await?;
    take_list(&mut reply, field)
}

/// Remove `field` from a reply and decode it.
fn take_field<T: DeserializeOwned>(mut reply: Map<String, Value>, field: &str) -> Result<T> {
    let value = reply
        .remove(field)
        .ok_or_else(|| PodmanError::Protocol(format!("reply is missing '{}'", field)))?;
    Ok(serde_json::from_value(value)?)
}

fn take_list<T: DeserializeOwned>(reply: &mut Map<String, Value>, field: &str) -> Result<Vec<T>> {
    match reply.remove(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => Ok(serde_json::from_value(value)?),
    }
}

/// Decode an inspect document delivered as a JSON string, folding keys to
/// lowercase.
fn parse_document(text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text)?;
    Ok(fold_keys(value))
}

/// Replies of a streaming call, decoded from one field of each reply.
///
/// Owns its connection; dropping the subscription closes it and abandons
/// the stream.
pub struct Subscription<T> {
    conn: Connection,
    field: &'static str,
    done: bool,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Subscription<T> {
    async fn start(client: &Client, method: &str, params: Value, field: &'static str) -> Result<Self> {
        let mut conn = client.open().await?;
        conn.send_more(method, params).await?;
        Ok(Self {
            conn,
            field,
            done: false,
            _item: PhantomData,
        })
    }

    /// Wait for the next item. Returns `None` once the service ends the
    /// stream or after an error.
    pub async fn next(&mut self) -> Option<Result<T>> {
        if self.done {
            return None;
        }

        let item = match self.conn.receive_more().await {
            Ok((reply, continues)) => {
                self.done = !continues;
                take_field(reply, self.field)
            }
            Err(e) => Err(e),
        };
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }

    /// Drain the stream, stopping at the first error.
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(items)
    }

    /// Stop the stream and close its connection.
    pub fn close(mut self) {
        self.conn.close();
    }
}
