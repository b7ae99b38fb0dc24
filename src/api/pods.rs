use serde_json::{json, Value};

use super::{call_field, call_list, parse_document, take_field};
use crate::client::Client;
use crate::error::Result;
use crate::models::{ContainerStats, KubePodService, Pod, PodCreate};
use crate::varlink::Connection;

/// Operations on pods.
pub struct Pods<'a> {
    client: &'a Client,
}

impl<'a> Pods<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<Vec<Pod>> {
        call_list(self.client, "ListPods", json!({}), "pods").await
    }

    pub async fn get(&self, name: &str) -> Result<Pod> {
        call_field(self.client, "GetPod", json!({"name": name}), "pod").await
    }

    /// Create an empty pod; returns the new pod.
    pub async fn create(&self, create: &PodCreate) -> Result<Pod> {
        let mut conn = self.client.open().await?;
        let reply = conn.call("CreatePod", json!({"create": create})).await?;
        let id: String = take_field(reply, "pod")?;
        refresh(&mut conn, &id).await
    }

    /// Pod configuration and state with keys folded to lowercase. `id` is
    /// lifted from `config.id`.
    pub async fn inspect(&self, name: &str) -> Result<Value> {
        let text: String = call_field(self.client, "InspectPod", json!({"name": name}), "pod").await?;
        let mut doc = parse_document(&text)?;

        let id = doc["config"]["id"].clone();
        if let Value::Object(map) = &mut doc {
            map.insert("id".to_string(), id);
        }
        Ok(doc)
    }

    pub async fn start(&self, name: &str) -> Result<Pod> {
        self.act_and_refresh("StartPod", json!({"name": name})).await
    }

    /// Stop every container, killing them after `timeout` seconds; `None`
    /// uses each container's own stop timeout.
    pub async fn stop(&self, name: &str, timeout: Option<i64>) -> Result<Pod> {
        let timeout = timeout.unwrap_or(-1);
        self.act_and_refresh("StopPod", json!({"name": name, "timeout": timeout}))
            .await
    }

    pub async fn restart(&self, name: &str) -> Result<Pod> {
        self.act_and_refresh("RestartPod", json!({"name": name})).await
    }

    /// Send `signal` to every container in the pod.
    pub async fn kill(&self, name: &str, signal: i64) -> Result<Pod> {
        self.act_and_refresh("KillPod", json!({"name": name, "signal": signal}))
            .await
    }

    pub async fn pause(&self, name: &str) -> Result<Pod> {
        self.act_and_refresh("PausePod", json!({"name": name})).await
    }

    pub async fn unpause(&self, name: &str) -> Result<Pod> {
        self.act_and_refresh("UnpausePod", json!({"name": name})).await
    }

    /// Remove the pod; `force` stops running containers first. Returns the
    /// pod id.
    pub async fn remove(&self, name: &str, force: bool) -> Result<String> {
        call_field(
            self.client,
            "RemovePod",
            json!({"name": name, "force": force}),
            "pod",
        )
        .await
    }

    /// `ps`-style lines for processes in the pod's containers.
    pub async fn top(&self, name: &str, latest: bool, descriptors: &[String]) -> Result<Vec<String>> {
        call_list(
            self.client,
            "TopPod",
            json!({"pod": name, "latest": latest, "descriptors": descriptors}),
            "stats",
        )
        .await
    }

    /// Stats of every container in the pod.
    pub async fn stats(&self, name: &str) -> Result<Vec<ContainerStats>> {
        call_list(self.client, "GetPodStats", json!({"name": name}), "containers").await
    }

    /// Ids of pods whose status is one of `statuses`.
    pub async fn get_by_status(&self, statuses: &[&str]) -> Result<Vec<String>> {
        call_list(
            self.client,
            "GetPodsByStatus",
            json!({"statuses": statuses}),
            "pods",
        )
        .await
    }

    /// Ids of all pods, the latest one, or those named in `args`.
    pub async fn get_by_context(&self, all: bool, latest: bool, args: &[String]) -> Result<Vec<String>> {
        call_list(
            self.client,
            "GetPodsByContext",
            json!({"all": all, "latest": latest, "args": args}),
            "pods",
        )
        .await
    }

    /// Kubernetes YAML for the pod, plus a service when `service` is set.
    pub async fn generate_kube(&self, name: &str, service: bool) -> Result<KubePodService> {
        call_field(
            self.client,
            "GenerateKube",
            json!({"name": name, "service": service}),
            "pod",
        )
        .await
    }

    /// Pod state document.
    pub async fn state_data(&self, name: &str) -> Result<Value> {
        let text: String =
            call_field(self.client, "PodStateData", json!({"name": name}), "config").await?;
        parse_document(&text)
    }

    async fn act_and_refresh(&self, method: &str, params: Value) -> Result<Pod> {
        let mut conn = self.client.open().await?;
        let reply = conn.call(method, params).await?;
        let id: String = take_field(reply, "pod")?;
        refresh(&mut conn, &id).await
    }
}

async fn refresh(conn: &mut Connection, name: &str) -> Result<Pod> {
    let reply = conn.call("GetPod", json!({"name": name})).await?;
    take_field(reply, "pod")
}

