use std::collections::HashMap;

use serde_json::{json, Value};

use super::{call, call_field, call_list, parse_document, take_field, Subscription};
use crate::client::Client;
use crate::error::{PodmanError, Result};
use crate::models::{
    Container, ContainerChanges, ContainerCreate, ContainerStats, LogLine, MoreResponse, Runlabel,
};
use crate::varlink::Connection;

/// Seconds the service waits for a graceful stop before killing.
pub const DEFAULT_STOP_TIMEOUT: i64 = 25;

/// Options of [`Containers::logs_follow`].
#[derive(Debug, Clone)]
pub struct LogsOptions {
    pub follow: bool,
    /// Only the most recently created container.
    pub latest: bool,
    /// Only lines after this timestamp or relative duration (`10m`).
    pub since: String,
    /// Number of lines from the end; `None` for all.
    pub tail: Option<i64>,
    pub timestamps: bool,
}

impl Default for LogsOptions {
    fn default() -> Self {
        Self {
            follow: true,
            latest: false,
            since: String::new(),
            tail: None,
            timestamps: true,
        }
    }
}

/// Options of [`Containers::commit`].
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Dockerfile-style changes, e.g. `CMD=/bin/sh` or `LABEL=key=value`.
    pub changes: Vec<String>,
    /// Defaults to `$USER`.
    pub author: Option<String>,
    pub message: String,
    /// Leave the container running during the commit.
    pub no_pause: bool,
    /// `oci` or `docker`; empty for the service default.
    pub manifest_type: String,
}

/// Operations on containers.
pub struct Containers<'a> {
    client: &'a Client,
}

impl<'a> Containers<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<Container>> {
        call_list(self.client, "ListContainers", json!({}), "containers").await
    }

    pub async fn get(&self, id: &str) -> Result<Container> {
        call_field(self.client, "GetContainer", json!({"id": id}), "container").await
    }

    /// Containers whose status is one of `statuses` (`running`, `exited`...).
    pub async fn get_by_status(&self, statuses: &[&str]) -> Result<Vec<Container>> {
        call_list(
            self.client,
            "GetContainersByStatus",
            json!({"status": statuses}),
            "containers",
        )
        .await
    }

    /// Ids of all containers, the latest one, or those named in `args`.
    pub async fn get_by_context(&self, all: bool, latest: bool, args: &[String]) -> Result<Vec<String>> {
        call_list(
            self.client,
            "GetContainersByContext",
            json!({"all": all, "latest": latest, "args": args}),
            "containers",
        )
        .await
    }

    /// Full container configuration with keys folded to lowercase.
    pub async fn inspect(&self, name: &str) -> Result<Value> {
        let text: String =
            call_field(self.client, "InspectContainer", json!({"name": name}), "container").await?;
        parse_document(&text)
    }

    /// `ps` output lines for processes in the container.
    pub async fn processes(&self, name: &str, opts: &[String]) -> Result<Vec<String>> {
        call_list(
            self.client,
            "ListContainerProcesses",
            json!({"name": name, "opts": opts}),
            "container",
        )
        .await
    }

    pub async fn changes(&self, name: &str) -> Result<ContainerChanges> {
        call_field(self.client, "ListContainerChanges", json!({"name": name}), "container").await
    }

    /// Stored log lines of one container.
    pub async fn logs(&self, name: &str) -> Result<Vec<String>> {
        call_list(self.client, "GetContainerLogs", json!({"name": name}), "container").await
    }

    /// Stream log lines of several containers.
    pub async fn logs_follow(&self, names: &[String], options: &LogsOptions) -> Result<Subscription<LogLine>> {
        let params = json!({
            "names": names,
            "follow": options.follow,
            "latest": options.latest,
            "since": options.since,
            "tail": options.tail.unwrap_or(-1),
            "timestamps": options.timestamps,
        });
        Subscription::start(self.client, "GetContainersLogs", params, "log").await
    }

    pub async fn stats(&self, name: &str) -> Result<ContainerStats> {
        call_field(self.client, "GetContainerStats", json!({"name": name}), "container").await
    }

    /// Fresh stats computed against a previous sample.
    pub async fn stats_with_history(&self, previous: &ContainerStats) -> Result<ContainerStats> {
        call_field(
            self.client,
            "GetContainerStatsWithHistory",
            json!({"previousStats": previous}),
            "container",
        )
        .await
    }

    /// Create a container; returns the new container.
    pub async fn create(&self, create: &ContainerCreate) -> Result<Container> {
        if create.args.is_empty() {
            return Err(PodmanError::InvalidArgument(
                "args must name at least the image".to_string(),
            ));
        }

        let mut conn = self.client.open().await?;
        let reply = conn.call("CreateContainer", json!({"create": create})).await?;
        let id: String = take_field(reply, "container")?;
        refresh(&mut conn, &id).await
    }

    /// Prepare the container without starting it; returns its id.
    pub async fn init(&self, name: &str) -> Result<String> {
        call_field(self.client, "InitContainer", json!({"name": name}), "container").await
    }

    pub async fn start(&self, name: &str) -> Result<Container> {
        self.act_and_refresh("StartContainer", json!({"name": name})).await
    }

    /// Stop the container, killing it after `timeout` seconds.
    pub async fn stop(&self, name: &str, timeout: Option<i64>) -> Result<Container> {
        let timeout = timeout.unwrap_or(DEFAULT_STOP_TIMEOUT);
        self.act_and_refresh("StopContainer", json!({"name": name, "timeout": timeout}))
            .await
    }

    pub async fn restart(&self, name: &str, timeout: Option<i64>) -> Result<Container> {
        let timeout = timeout.unwrap_or(DEFAULT_STOP_TIMEOUT);
        self.act_and_refresh("RestartContainer", json!({"name": name, "timeout": timeout}))
            .await
    }

    /// Send `signal` to the container's main process.
    pub async fn kill(&self, name: &str, signal: i64) -> Result<Container> {
        self.act_and_refresh("KillContainer", json!({"name": name, "signal": signal}))
            .await
    }

    pub async fn pause(&self, name: &str) -> Result<Container> {
        self.act_and_refresh("PauseContainer", json!({"name": name})).await
    }

    pub async fn unpause(&self, name: &str) -> Result<Container> {
        self.act_and_refresh("UnpauseContainer", json!({"name": name})).await
    }

    /// Block until the container exits, polling every `interval` ms; returns
    /// the exit code.
    ///
    /// The request timeout still applies.
    pub async fn wait(&self, name: &str, interval: i64) -> Result<i64> {
        call_field(
            self.client,
            "WaitContainer",
            json!({"name": name, "interval": interval}),
            "exitcode",
        )
        .await
    }

    /// Remove the container; returns its id.
    pub async fn remove(&self, name: &str, force: bool, remove_volumes: bool) -> Result<String> {
        call_field(
            self.client,
            "RemoveContainer",
            json!({"name": name, "force": force, "removeVolumes": remove_volumes}),
            "container",
        )
        .await
    }

    /// Remove every stopped container; returns their ids.
    pub async fn delete_stopped(&self) -> Result<Vec<String>> {
        call_list(self.client, "DeleteStoppedContainers", json!({}), "containers").await
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        let code: i64 =
            call_field(self.client, "ContainerExists", json!({"name": name}), "exists").await?;
        Ok(code == 0)
    }

    /// Write the container filesystem as a tarball at `path` on the service
    /// host; returns the tarball path.
    pub async fn export(&self, name: &str, path: &str) -> Result<String> {
        call_field(
            self.client,
            "ExportContainer",
            json!({"name": name, "path": path}),
            "tarfile",
        )
        .await
    }

    /// Create image `image_name` from the container; returns the image id.
    ///
    /// # Errors
    ///
    /// Returns `PodmanError::InvalidArgument` for a `LABEL=` change that is
    /// not `LABEL=key=value`.
    pub async fn commit(&self, name: &str, image_name: &str, options: &CommitOptions) -> Result<String> {
        validate_changes(&options.changes)?;

        let author = match &options.author {
            Some(author) => author.clone(),
            None => std::env::var("USER").unwrap_or_default(),
        };

        let reply: MoreResponse = call_field(
            self.client,
            "Commit",
            json!({
                "name": name,
                "image_name": image_name,
                "changes": options.changes,
                "author": author,
                "message": options.message,
                "pause": !options.no_pause,
                "manifestType": options.manifest_type,
            }),
            "reply",
        )
        .await?;
        Ok(reply.id)
    }

    /// Mount the container filesystem; returns the mount point.
    pub async fn mount(&self, name: &str) -> Result<String> {
        call_field(self.client, "MountContainer", json!({"name": name}), "path").await
    }

    pub async fn unmount(&self, name: &str, force: bool) -> Result<()> {
        call(self.client, "UnmountContainer", json!({"name": name, "force": force})).await?;
        Ok(())
    }

    /// Mount points of mounted containers, keyed by container id.
    pub async fn list_mounts(&self) -> Result<HashMap<String, String>> {
        let mut reply = call(self.client, "ListContainerMounts", json!({})).await?;
        match reply.remove("mounts") {
            None | Some(Value::Null) => Ok(HashMap::new()),
            Some(value) => Ok(serde_json::from_value(value)?),
        }
    }

    /// Run the container's healthcheck; returns the health status.
    pub async fn health_check_run(&self, name: &str) -> Result<String> {
        call_field(
            self.client,
            "HealthCheckRun",
            json!({"nameOrID": name}),
            "healthCheckStatus",
        )
        .await
    }

    /// Prepare the service for a remote console attach to the container.
    pub async fn attach_control(&self, name: &str) -> Result<()> {
        call(self.client, "AttachControl", json!({"name": name})).await?;
        Ok(())
    }

    /// Run the command stored in an image label.
    pub async fn run_label(&self, runlabel: &Runlabel) -> Result<()> {
        call(self.client, "ContainerRunlabel", json!({"runlabel": runlabel})).await?;
        Ok(())
    }

    pub async fn checkpoint(
        &self,
        name: &str,
        keep: bool,
        leave_running: bool,
        tcp_established: bool,
    ) -> Result<String> {
        call_field(
            self.client,
            "ContainerCheckpoint",
            json!({
                "name": name,
                "keep": keep,
                "leaveRunning": leave_running,
                "tcpEstablished": tcp_established,
            }),
            "id",
        )
        .await
    }

    pub async fn restore(&self, name: &str, keep: bool, tcp_established: bool) -> Result<String> {
        call_field(
            self.client,
            "ContainerRestore",
            json!({"name": name, "keep": keep, "tcpEstablished": tcp_established}),
            "id",
        )
        .await
    }

    /// Container configuration document.
    pub async fn config(&self, name: &str) -> Result<Value> {
        self.document("ContainerConfig", json!({"name": name})).await
    }

    /// Inspect document; `size` adds filesystem sizes.
    pub async fn inspect_data(&self, name: &str, size: bool) -> Result<Value> {
        self.document("ContainerInspectData", json!({"name": name, "size": size}))
            .await
    }

    pub async fn state_data(&self, name: &str) -> Result<Value> {
        self.document("ContainerStateData", json!({"name": name})).await
    }

    /// Named artifact stored with the container (e.g. `create-config`).
    pub async fn artifacts(&self, name: &str, artifact_name: &str) -> Result<Value> {
        self.document(
            "ContainerArtifacts",
            json!({"name": name, "artifactName": artifact_name}),
        )
        .await
    }

    async fn document(&self, method: &str, params: Value) -> Result<Value> {
        let text: String = call_field(self.client, method, params, "config").await?;
        parse_document(&text)
    }

    /// Run a state-changing method, then read the container back on the
    /// same connection.
    async fn act_and_refresh(&self, method: &str, params: Value) -> Result<Container> {
        let mut conn = self.client.open().await?;
        let reply = conn.call(method, params).await?;
        let id: String = take_field(reply, "container")?;
        refresh(&mut conn, &id).await
    }
}

async fn refresh(conn: &mut Connection, id: &str) -> Result<Container> {
    let reply = conn.call("GetContainer", json!({"id": id})).await?;
    take_field(reply, "container")
}

/// `LABEL=` changes must carry both a key and a value.
fn validate_changes(changes: &[String]) -> Result<()> {
    for change in changes {
        if change.starts_with("LABEL=") && change.matches('=').count() < 2 {
            return Err(PodmanError::InvalidArgument(format!(
                "LABEL should have the format: LABEL=label=value, not {}",
                change
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_changes() {
        let ok = [
            "CMD=/usr/bin/zsh".to_string(),
            "LABEL=unittest=test_commit".to_string(),
            "ENV=TEST=1".to_string(),
        ];
        assert!(validate_changes(&ok).is_ok());

        let err = validate_changes(&["LABEL=unittest".to_string()]).unwrap_err();
        assert!(matches!(err, PodmanError::InvalidArgument(ref msg) if msg.contains("LABEL=unittest")));
    }

    #[test]
    fn test_logs_options_default_follows() {
        let options = LogsOptions::default();
        assert!(options.follow);
        assert!(options.timestamps);
        assert_eq!(options.tail, None);
    }
}
