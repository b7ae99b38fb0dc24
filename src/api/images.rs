use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::debug;

use super::{call_field, call_list, parse_document, take_field};
use crate::client::Client;
use crate::error::Result;
use crate::models::{
    Container, ContainerCreate, Image, ImageHistory, ImageSearchFilter, ImageSearchResult,
    MoreResponse,
};

/// Default result limit of [`Images::search`].
pub const DEFAULT_SEARCH_LIMIT: i64 = 25;

/// Options of [`Images::push`].
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    pub compress: bool,
    /// Manifest type (`oci`, `v2s1`, `v2s2`); empty keeps the source format.
    pub format: String,
    pub remove_signatures: bool,
    pub sign_by: String,
}

/// Operations on the local image store.
pub struct Images<'a> {
    client: &'a Client,
}

impl<'a> Images<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<Image>> {
        call_list(self.client, "ListImages", json!({}), "images").await
    }

    pub async fn get(&self, id: &str) -> Result<Image> {
        call_field(self.client, "GetImage", json!({"id": id}), "image").await
    }

    /// Full image configuration with keys folded to lowercase.
    pub async fn inspect(&self, name: &str) -> Result<Value> {
        let text: String =
            call_field(self.client, "InspectImage", json!({"name": name}), "image").await?;
        parse_document(&text)
    }

    pub async fn history(&self, name: &str) -> Result<Vec<ImageHistory>> {
        call_list(self.client, "HistoryImage", json!({"name": name}), "history").await
    }

    /// Add `tagged` to the image; returns the image id.
    pub async fn tag(&self, name: &str, tagged: &str) -> Result<String> {
        call_field(
            self.client,
            "TagImage",
            json!({"name": name, "tagged": tagged}),
            "image",
        )
        .await
    }

    /// Delete the image; `force` also removes containers using it.
    pub async fn remove(&self, name: &str, force: bool) -> Result<String> {
        call_field(
            self.client,
            "RemoveImage",
            json!({"name": name, "force": force}),
            "image",
        )
        .await
    }

    /// Write the image to `destination` (e.g. `oci-archive:/tmp/alpine.tar`).
    pub async fn export(
        &self,
        name: &str,
        destination: &str,
        compress: bool,
        tags: &[String],
    ) -> Result<String> {
        call_field(
            self.client,
            "ExportImage",
            json!({
                "name": name,
                "destination": destination,
                "compress": compress,
                "tags": tags,
            }),
            "image",
        )
        .await
    }

    /// Copy the image to `tag` in a registry; returns the image id.
    pub async fn push(&self, name: &str, tag: &str, options: &PushOptions) -> Result<String> {
        let reply: MoreResponse = call_field(
            self.client,
            "PushImage",
            json!({
                "name": name,
                "tag": tag,
                "compress": options.compress,
                "format": options.format,
                "removeSignatures": options.remove_signatures,
                "signBy": options.sign_by,
            }),
            "reply",
        )
        .await?;
        Ok(reply.id)
    }

    /// Copy an image from a registry into the store; returns its id.
    pub async fn pull(&self, name: &str) -> Result<String> {
        let reply: MoreResponse =
            call_field(self.client, "PullImage", json!({"name": name}), "reply").await?;
        Ok(reply.id)
    }

    /// Read an image tarball from `source` into the store as `reference`.
    pub async fn import_image(
        &self,
        source: &str,
        reference: &str,
        message: &str,
        changes: &[String],
        delete: bool,
    ) -> Result<String> {
        call_field(
            self.client,
            "ImportImage",
            json!({
                "source": source,
                "reference": reference,
                "message": message,
                "changes": changes,
                "delete": delete,
            }),
            "image",
        )
        .await
    }

    /// Search registries for `query`.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<i64>,
        filter: &ImageSearchFilter,
    ) -> Result<Vec<ImageSearchResult>> {
        call_list(
            self.client,
            "SearchImages",
            json!({
                "query": query,
                "limit": limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
                "filter": filter,
            }),
            "results",
        )
        .await
    }

    /// Delete images not used by any container; returns their ids.
    pub async fn delete_unused(&self) -> Result<Vec<String>> {
        call_list(self.client, "DeleteUnusedImages", json!({}), "images").await
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        let code: i64 =
            call_field(self.client, "ImageExists", json!({"name": name}), "exists").await?;
        Ok(code == 0)
    }

    /// Create a container from image `id`, taking the command, environment
    /// and labels from the image configuration.
    ///
    /// Fields already set in `overrides` win over the image defaults.
    pub async fn create_container(&self, id: &str, overrides: ContainerCreate) -> Result<Container> {
        let details = self.inspect(id).await?;
        let create = container_config(id, &details, overrides);
        debug!(image = %id, args = ?create.args, "Creating container from image");

        let mut conn = self.client.open().await?;
        let reply = conn
            .call("CreateContainer", json!({"create": create}))
            .await?;
        let container_id: String = take_field(reply, "container")?;

        let reply = conn.call("GetContainer", json!({"id": container_id})).await?;
        take_field(reply, "container")
    }
}

/// Split `KEY=value` entries on the first `=`.
fn split_env(entries: &[String]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (entry.clone(), String::new()),
        })
        .collect()
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Creation parameters for a container of image `id` described by the
/// folded inspect document `details`.
fn container_config(id: &str, details: &Value, mut create: ContainerCreate) -> ContainerCreate {
    let config = &details["config"];

    let image = create.image.take().unwrap_or_else(|| {
        string_list(&details["repotags"])
            .into_iter()
            .next()
            .unwrap_or_else(|| id.to_string())
    });
    let command = create
        .command
        .take()
        .unwrap_or_else(|| string_list(&config["cmd"]));

    if create.env.is_none() {
        create.env = Some(split_env(&string_list(&config["env"])));
    }
    if create.labels.is_none() {
        create.labels = serde_json::from_value(details["labels"].clone()).ok();
    }
    if create.network.is_none() {
        create.network = Some("bridge".to_string());
    }

    create.args = std::iter::once(image.clone())
        .chain(command.iter().cloned())
        .collect();
    create.image = Some(image);
    create.command = Some(command);
    create
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn details() -> Value {
        json!({
            "id": "3fd9065eaf02",
            "repotags": ["docker.io/library/alpine:latest"],
            "labels": {"maintainer": "alpine"},
            "config": {
                "cmd": ["/bin/sh", "-c", "echo hi"],
                "env": ["PATH=/usr/bin:/bin", "OPTS=a=b", "EMPTY"]
            }
        })
    }

    #[test]
    fn test_split_env_on_first_equals() {
        let env = split_env(&["OPTS=a=b".to_string(), "EMPTY".to_string()]);

        assert_eq!(env.get("OPTS").map(String::as_str), Some("a=b"));
        assert_eq!(env.get("EMPTY").map(String::as_str), Some(""));
    }

    #[test]
    fn test_container_config_from_image_defaults() {
        let create = container_config("3fd9065eaf02", &details(), ContainerCreate::default());

        assert_eq!(
            create.args,
            vec!["docker.io/library/alpine:latest", "/bin/sh", "-c", "echo hi"]
        );
        assert_eq!(create.image.as_deref(), Some("docker.io/library/alpine:latest"));
        assert_eq!(create.network.as_deref(), Some("bridge"));

        let env = create.env.unwrap();
        assert_eq!(env.get("PATH").map(String::as_str), Some("/usr/bin:/bin"));
        assert_eq!(env.get("OPTS").map(String::as_str), Some("a=b"));
        assert_eq!(
            create.labels.unwrap().get("maintainer").map(String::as_str),
            Some("alpine")
        );
    }

    #[test]
    fn test_container_config_overrides_win() {
        let overrides = ContainerCreate {
            name: Some("web".to_string()),
            command: Some(vec!["sleep".to_string(), "1h".to_string()]),
            ..Default::default()
        };

        let create = container_config("3fd9065eaf02", &details(), overrides);

        assert_eq!(create.name.as_deref(), Some("web"));
        assert_eq!(create.args, vec!["docker.io/library/alpine:latest", "sleep", "1h"]);
    }

    #[test]
    fn test_container_config_untagged_image_uses_id() {
        let details = json!({"id": "3fd9065eaf02", "config": {}});
        let create = container_config("3fd9065eaf02", &details, ContainerCreate::default());

        assert_eq!(create.args, vec!["3fd9065eaf02"]);
        assert_eq!(create.env, Some(HashMap::new()));
    }
}
