//! Data models for the io.podman varlink interface.
//!
//! Field names follow the interface description verbatim (hence the mix of
//! `camelCase` and all-lowercase names). Fields the daemon reports beyond the
//! ones modeled here are kept in each struct's `extra` map, so a decoded
//! entity re-serializes to the mapping the daemon sent.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::format::{datetime_parse, human_size, short_id};

/// Treat an explicit `null` like a missing field.
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Images
// =============================================================================

/// Image in the local store, as listed by `ListImages`/`GetImage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default, deserialize_with = "null_default")]
    pub digests: Vec<String>,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub repo_tags: Vec<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub repo_digests: Vec<String>,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub virtual_size: i64,
    #[serde(default)]
    pub containers: i64,
    #[serde(default, deserialize_with = "null_default")]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub is_parent: bool,
    #[serde(default)]
    pub top_layer: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Image {
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    pub fn created_at(&self) -> Option<DateTime<FixedOffset>> {
        datetime_parse(&self.created)
    }

    pub fn size_display(&self) -> String {
        human_size(self.size)
    }

    /// Whether any repo tag equals `reference`.
    pub fn has_tag(&self, reference: &str) -> bool {
        self.repo_tags.iter().any(|t| t == reference)
    }
}

/// One layer of `HistoryImage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageHistory {
    pub id: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, deserialize_with = "null_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub comment: String,
}

/// Result of `SearchImages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSearchResult {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_official: bool,
    #[serde(default)]
    pub is_automated: bool,
    #[serde(default)]
    pub registry: String,
    pub name: String,
    #[serde(default)]
    pub star_count: i64,
}

/// Constraints for `SearchImages`. Unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSearchFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_official: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_automated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub star_count: Option<i64>,
}

/// Progress reply of long-running image operations (`PullImage`,
/// `PushImage`, `Commit`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoreResponse {
    #[serde(default, deserialize_with = "null_default")]
    pub logs: Vec<String>,
    #[serde(default)]
    pub id: String,
}

// =============================================================================
// Containers
// =============================================================================

/// Container as listed by `ListContainers`/`GetContainer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub imageid: String,
    #[serde(default, deserialize_with = "null_default")]
    pub command: Vec<String>,
    #[serde(default)]
    pub createdat: String,
    #[serde(default)]
    pub runningfor: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "null_default")]
    pub ports: Vec<ContainerPortMapping>,
    #[serde(default)]
    pub rootfssize: i64,
    #[serde(default)]
    pub rwsize: i64,
    #[serde(default)]
    pub names: String,
    #[serde(default, deserialize_with = "null_default")]
    pub labels: HashMap<String, String>,
    #[serde(default, deserialize_with = "null_default")]
    pub mounts: Vec<ContainerMount>,
    #[serde(default)]
    pub containerrunning: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<ContainerNamespaces>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Container {
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    /// Running according to either the flag or the status text.
    pub fn is_running(&self) -> bool {
        self.containerrunning || self.status.eq_ignore_ascii_case("running")
    }

    pub fn created_at(&self) -> Option<DateTime<FixedOffset>> {
        datetime_parse(&self.createdat)
    }

    pub fn rootfs_size_display(&self) -> String {
        human_size(self.rootfssize)
    }

    /// Command line joined with spaces.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerPortMapping {
    #[serde(default)]
    pub host_port: String,
    #[serde(default)]
    pub host_ip: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub container_port: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerMount {
    #[serde(default)]
    pub destination: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, deserialize_with = "null_default")]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerNamespaces {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub uts: String,
    #[serde(default)]
    pub pidns: String,
    #[serde(default)]
    pub pid: String,
    #[serde(default)]
    pub cgroup: String,
    #[serde(default)]
    pub net: String,
    #[serde(default)]
    pub mnt: String,
    #[serde(default)]
    pub ipc: String,
}

/// Filesystem changes reported by `ListContainerChanges`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerChanges {
    #[serde(default, deserialize_with = "null_default")]
    pub changed: Vec<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub added: Vec<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub deleted: Vec<String>,
}

/// Resource usage sample of one container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStats {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub cpu_nano: i64,
    #[serde(default)]
    pub system_nano: i64,
    #[serde(default)]
    pub mem_usage: i64,
    #[serde(default)]
    pub mem_limit: i64,
    #[serde(default)]
    pub mem_perc: f64,
    #[serde(default)]
    pub net_input: i64,
    #[serde(default)]
    pub net_output: i64,
    #[serde(default)]
    pub block_output: i64,
    #[serde(default)]
    pub block_input: i64,
    #[serde(default)]
    pub pids: i64,
}

impl ContainerStats {
    /// Memory usage as `used / limit`.
    pub fn mem_display(&self) -> String {
        format!("{} / {}", human_size(self.mem_usage), human_size(self.mem_limit))
    }
}

/// One line of `GetContainersLogs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    #[serde(default)]
    pub device: String,
    #[serde(default, rename = "parseLogType")]
    pub parse_log_type: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub cid: String,
}

/// Parameters of `CreateContainer`.
///
/// Unset options are not sent, leaving the daemon defaults in place. Options
/// not modeled here can be passed through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerCreate {
    /// Image followed by the command and its arguments.
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tty: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interactive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parameters of `ContainerRunlabel`: run the command stored in an image
/// label such as `INSTALL` or `RUN`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runlabel {
    pub image: String,
    pub label: String,
    /// Container name substituted into the label command.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub authfile: String,
    /// Print the command instead of running it.
    #[serde(default)]
    pub display: bool,
    /// Pull the image if it is missing.
    #[serde(default)]
    pub pull: bool,
    #[serde(default)]
    pub signature_policy_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_verify: Option<bool>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub opts: HashMap<String, String>,
}

// =============================================================================
// Pods
// =============================================================================

/// Pod as listed by `ListPods`/`GetPod`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub createdat: String,
    #[serde(default)]
    pub cgroup: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "null_default")]
    pub labels: HashMap<String, String>,
    /// Reported as a decimal string.
    #[serde(default)]
    pub numberofcontainers: String,
    #[serde(default, deserialize_with = "null_default")]
    pub containersinfo: Vec<PodContainerInfo>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Pod {
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }

    /// Pod status compares case-insensitively (`Running` vs `running`).
    pub fn is_running(&self) -> bool {
        self.status.eq_ignore_ascii_case("running")
    }

    pub fn container_count(&self) -> usize {
        self.numberofcontainers
            .trim()
            .parse()
            .unwrap_or(self.containersinfo.len())
    }

    pub fn created_at(&self) -> Option<DateTime<FixedOffset>> {
        datetime_parse(&self.createdat)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodContainerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
}

/// Parameters of `CreatePod`. Unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodCreate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cgroup_parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infra: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infra_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infra_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<Vec<String>>,
}

/// Kubernetes YAML produced by `GenerateKube`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KubePodService {
    #[serde(default)]
    pub pod: String,
    #[serde(default)]
    pub service: String,
}

// =============================================================================
// Volumes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub mount_point: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default, deserialize_with = "null_default")]
    pub options: HashMap<String, String>,
    #[serde(default)]
    pub scope: String,
}

/// Parameters of `VolumeCreate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeCreate {
    #[serde(default)]
    pub volume_name: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// Parameters of `VolumeRemove`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeRemove {
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub force: bool,
}

// =============================================================================
// System
// =============================================================================

/// Reply of `GetVersion`, plus the version of this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub version: String,
    #[serde(default)]
    pub go_version: String,
    #[serde(default)]
    pub git_commit: String,
    #[serde(default)]
    pub built: i64,
    #[serde(default)]
    pub os_arch: String,
    #[serde(default)]
    pub remote_api_version: i64,
    /// Filled in by the client, not the daemon.
    #[serde(default)]
    pub client_version: String,
}

/// Reply of `GetInfo`. Sections are kept as loosely typed documents since
/// their contents vary across daemon versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub host: Value,
    #[serde(default)]
    pub registries: Value,
    #[serde(default)]
    pub insecure_registries: Value,
    #[serde(default)]
    pub store: Value,
    #[serde(default)]
    pub podman: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of `GetEvents`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub time: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pod_fixture() -> Value {
        json!({
            "cgroup": "machine.slice",
            "containersinfo": [
                {
                    "id": "1840835294cf076a822e4e12ba4152411f131bd869e7f6a4e8b16df9b0ea5c7f",
                    "name": "1840835294cf-infra",
                    "status": "running"
                },
                {
                    "id": "49a5cce72093a5ca47c6de86f10ad7bb36391e2d89cef765f807e460865a0ec6",
                    "name": "upbeat_murdock",
                    "status": "running"
                }
            ],
            "createdat": "2018-12-07 13:10:15.014139258 -0600 CST",
            "id": "135d71b9495f7c3967f536edad57750bfdb569336cd107d8aabab45565ffcfb6",
            "labels": {},
            "name": "foobar",
            "numberofcontainers": "2",
            "status": "Running"
        })
    }

    #[test]
    fn test_pod_deserialize() {
        let pod: Pod = serde_json::from_value(pod_fixture()).unwrap();

        assert_eq!(pod.name, "foobar");
        assert_eq!(pod.short_id(), "135d71b9495f");
        assert_eq!(pod.container_count(), 2);
        assert_eq!(pod.containersinfo[1].name, "upbeat_murdock");
        assert!(pod.is_running(), "status compares case-insensitively");
        assert!(pod.created_at().is_some());
    }

    #[test]
    fn test_pod_roundtrips_to_fixture() {
        let pod: Pod = serde_json::from_value(pod_fixture()).unwrap();
        assert_eq!(serde_json::to_value(&pod).unwrap(), pod_fixture());
    }

    #[test]
    fn test_image_keeps_unknown_fields() {
        let image: Image = serde_json::from_value(json!({
            "id": "3fd9065eaf02",
            "repoTags": ["docker.io/library/alpine:latest"],
            "size": 5_577_006,
            "labels": null,
            "history": ["added by a newer daemon"]
        }))
        .unwrap();

        assert!(image.has_tag("docker.io/library/alpine:latest"));
        assert!(image.labels.is_empty(), "null labels decode as empty");
        assert_eq!(image.size_display(), "5.58 MB");
        assert_eq!(image.extra.get("history"), Some(&json!(["added by a newer daemon"])));
    }

    #[test]
    fn test_container_running_flags() {
        let mut container: Container = serde_json::from_value(json!({
            "id": "49a5cce72093a5ca47c6de86f10ad7bb36391e2d89cef765f807e460865a0ec6",
            "status": "exited",
            "containerrunning": false,
            "command": ["sleep", "1h"],
            "mounts": [{"destination": "/data", "type": "bind", "source": "/srv", "options": null}]
        }))
        .unwrap();

        assert!(!container.is_running());
        assert_eq!(container.command_line(), "sleep 1h");
        assert_eq!(container.mounts[0].kind, "bind");

        container.status = "Running".to_string();
        assert!(container.is_running());
    }

    #[test]
    fn test_pod_create_omits_unset_fields() {
        let create = PodCreate {
            name: Some("web".to_string()),
            cgroup_parent: Some("machine.slice".to_string()),
            infra: Some(false),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(&create).unwrap(),
            json!({"name": "web", "cgroupParent": "machine.slice", "infra": false})
        );
    }

    #[test]
    fn test_container_create_passes_extra_options() {
        let mut create = ContainerCreate {
            args: vec!["alpine".to_string(), "sleep".to_string(), "1h".to_string()],
            ..Default::default()
        };
        create.extra.insert("memory".to_string(), json!("256m"));

        assert_eq!(
            serde_json::to_value(&create).unwrap(),
            json!({"args": ["alpine", "sleep", "1h"], "memory": "256m"})
        );
    }

    #[test]
    fn test_runlabel_wire_names() {
        let runlabel = Runlabel {
            image: "fedora/cockpit".to_string(),
            label: "INSTALL".to_string(),
            pull: true,
            ..Default::default()
        };

        let value = serde_json::to_value(&runlabel).unwrap();
        assert_eq!(value["image"], json!("fedora/cockpit"));
        assert_eq!(value["signaturePolicyPath"], json!(""));
        assert_eq!(value["extraArgs"], json!([]));
        assert!(value.get("tlsVerify").is_none(), "unset tlsVerify is not sent");
    }

    #[test]
    fn test_event_type_field() {
        let event: Event = serde_json::from_value(json!({
            "id": "abc", "type": "container", "status": "start", "time": "2019-06-10T17:19:43Z"
        }))
        .unwrap();

        assert_eq!(event.kind, "container");
        assert_eq!(event.status, "start");
    }
}
