//! Gateway wire types.
//!
//! These mirror the JSON bodies exchanged with the OpenFaaS gateway; field
//! names follow the gateway's camelCase convention.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A request to deploy (or update) a function.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeployment {
    /// Name of the function; also the suffix of the orchestrator job id.
    pub service: String,

    /// Container image to run.
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    /// Process executed by the watchdog inside the container, injected into
    /// the environment as `fprocess`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_process: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_vars: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    /// Names of secrets to surface under `/var/openfaas/secrets/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Vec<String>>,

    /// Base64 `user:pass` credentials for a private registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_auth: Option<String>,

    /// Placement constraints of the form `attribute operator value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<FunctionResources>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
}

/// A deployed function as reported back to the gateway.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub name: String,
    pub image: String,
    pub invocation_count: u64,
    pub replicas: u64,
    pub available_replicas: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleServiceRequest {
    pub service_name: String,
    pub replicas: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFunctionRequest {
    pub function_name: String,
}

/// Body of a secret create/update/delete request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRequest {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub orchestration: String,
    pub version: ProviderVersion,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderVersion {
    pub release: String,
    pub sha: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_decodes_gateway_fields() {
        let body = r#"{
            "service": "hello",
            "image": "img:1",
            "envProcess": "./handler",
            "envVars": {"db": "postgres://db"},
            "registryAuth": "dXNlcjpwYXNz",
            "constraints": ["datacenter == dc2"],
            "limits": {"memory": "256", "cpu": "200"}
        }"#;

        let req: FunctionDeployment = serde_json::from_str(body).unwrap();
        assert_eq!(req.service, "hello");
        assert_eq!(req.env_process.as_deref(), Some("./handler"));
        assert_eq!(req.registry_auth.as_deref(), Some("dXNlcjpwYXNz"));
        assert_eq!(
            req.limits,
            Some(FunctionResources {
                memory: Some("256".to_string()),
                cpu: Some("200".to_string()),
            })
        );
    }

    #[test]
    fn function_serialises_camel_case() {
        let f = Function {
            name: "hello".to_string(),
            replicas: 2,
            available_replicas: 1,
            ..Function::default()
        };
        let json = serde_json::to_string(&f).unwrap();
        assert!(json.contains("\"availableReplicas\":1"));
        assert!(json.contains("\"invocationCount\":0"));
    }
}
