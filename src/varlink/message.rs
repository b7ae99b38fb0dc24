//! Varlink request and reply messages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Varlink call sent to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Fully-qualified method name, e.g. `io.podman.ListImages`.
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
    /// Ask the service for a stream of replies.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub more: bool,
    /// Ask the service not to reply at all.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub oneway: bool,
    /// Hand the connection over to a method-specific protocol after the
    /// reply. Wire-only: no client operation sets it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub upgrade: bool,
}

impl Request {
    /// Build a request. `parameters` must be a JSON object or null.
    pub fn new(method: impl Into<String>, parameters: Value) -> Self {
        let parameters = match parameters {
            Value::Object(map) if !map.is_empty() => Some(map),
            _ => None,
        };

        Self {
            method: method.into(),
            parameters,
            more: false,
            oneway: false,
            upgrade: false,
        }
    }

    pub fn with_more(mut self) -> Self {
        self.more = true;
        self
    }

    pub fn with_oneway(mut self) -> Self {
        self.oneway = true;
        self
    }
}

/// Varlink reply from the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
    /// More replies follow for the same call.
    #[serde(default)]
    pub continues: bool,
    /// Fully-qualified error name when the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    /// Successful reply carrying `parameters`.
    pub fn success(parameters: Value) -> Self {
        let parameters = match parameters {
            Value::Object(map) => Some(map),
            _ => None,
        };
        Self {
            parameters,
            continues: false,
            error: None,
        }
    }

    /// Error reply named `error` carrying `parameters`.
    pub fn failure(error: impl Into<String>, parameters: Value) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::success(parameters)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_omits_unset_fields() {
        let request = Request::new("io.podman.ListImages", json!({}));
        let encoded = serde_json::to_string(&request).unwrap();

        assert_eq!(encoded, r#"{"method":"io.podman.ListImages"}"#);
    }

    #[test]
    fn test_request_with_parameters_and_more() {
        let request =
            Request::new("io.podman.GetContainersLogs", json!({"names": ["web"]})).with_more();
        let encoded: Value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            encoded,
            json!({
                "method": "io.podman.GetContainersLogs",
                "parameters": {"names": ["web"]},
                "more": true
            })
        );
    }

    #[test]
    fn test_request_decodes_upgrade_flag() {
        let request: Request =
            serde_json::from_str(r#"{"method":"io.podman.AttachControl","upgrade":true}"#).unwrap();

        assert!(request.upgrade);
        assert!(!request.more);
        assert!(request.parameters.is_none());
    }

    #[test]
    fn test_reply_decodes_error() {
        let reply: Reply = serde_json::from_str(
            r#"{"error":"io.podman.ImageNotFound","parameters":{"id":"alpine","reason":"no such image"}}"#,
        )
        .unwrap();

        assert_eq!(reply.error.as_deref(), Some("io.podman.ImageNotFound"));
        assert!(!reply.continues);
        assert_eq!(
            reply.parameters.unwrap().get("id"),
            Some(&json!("alpine"))
        );
    }

    #[test]
    fn test_reply_without_parameters() {
        let reply: Reply = serde_json::from_str(r#"{"continues":true}"#).unwrap();

        assert!(reply.continues);
        assert!(reply.parameters.is_none());
        assert!(reply.error.is_none());
    }
}
