use std::collections::HashMap;

use serde_json::{json, Value};

use super::{call, call_field, call_list, take_list};
use crate::client::Client;
use crate::error::Result;
use crate::models::{Volume, VolumeCreate, VolumeRemove};

/// Outcome of [`Volumes::remove`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeRemoval {
    pub successes: Vec<String>,
    /// Error message per volume that could not be removed.
    pub failures: HashMap<String, String>,
}

/// Outcome of [`Volumes::prune`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumePrune {
    pub pruned: Vec<String>,
    pub errors: Vec<String>,
}

/// Operations on volumes.
pub struct Volumes<'a> {
    client: &'a Client,
}

impl<'a> Volumes<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Create a volume; returns its name.
    pub async fn create(&self, options: &VolumeCreate) -> Result<String> {
        call_field(
            self.client,
            "VolumeCreate",
            json!({"options": options}),
            "volumeName",
        )
        .await
    }

    pub async fn remove(&self, options: &VolumeRemove) -> Result<VolumeRemoval> {
        let mut reply = call(self.client, "VolumeRemove", json!({"options": options})).await?;

        let failures = match reply.remove("failures") {
            None | Some(Value::Null) => HashMap::new(),
            Some(value) => serde_json::from_value(value)?,
        };
        Ok(VolumeRemoval {
            successes: take_list(&mut reply, "successes")?,
            failures,
        })
    }

    /// Volumes named in `args`, or every volume when `all` is set.
    pub async fn list(&self, args: &[String], all: bool) -> Result<Vec<Volume>> {
        call_list(
            self.client,
            "GetVolumes",
            json!({"args": args, "all": all}),
            "volumes",
        )
        .await
    }

    /// Remove volumes not used by any container.
    pub async fn prune(&self) -> Result<VolumePrune> {
        let mut reply = call(self.client, "VolumesPrune", json!({})).await?;
        Ok(VolumePrune {
            pruned: take_list(&mut reply, "prunedNames")?,
            errors: take_list(&mut reply, "prunedErrors")?,
        })
    }
}
