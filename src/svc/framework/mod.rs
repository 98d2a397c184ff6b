//! # Framework module
//!
//! This module provide the structures of the module host contract, the
//! generator request handed to the module and the response it answers with,
//! alongside helpers shared by every generator

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::EnvVar;
use rand::Rng;
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Constants

pub const KUBERNETES_RESOURCE: &str = "Kubernetes";
pub const TERRAFORM_RESOURCE: &str = "Terraform";

/// characters allowed in generated passwords
const PASSWORD_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz\
ABCDEFGHIJKLMNOPQRSTUVWXYZ\
0123456789_";

// -----------------------------------------------------------------------------
// WorkloadKind enum

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub enum WorkloadKind {
    #[serde(rename = "Service")]
    Service,
    #[serde(rename = "Job")]
    Job,
}

// -----------------------------------------------------------------------------
// Workload structure

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct Workload {
    #[serde(rename = "type")]
    pub kind: WorkloadKind,
    #[serde(rename = "service", default, skip_serializing_if = "Option::is_none")]
    pub service: Option<serde_json::Value>,
    #[serde(rename = "job", default, skip_serializing_if = "Option::is_none")]
    pub job: Option<serde_json::Value>,
}

// -----------------------------------------------------------------------------
// GeneratorRequest structure

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct GeneratorRequest {
    #[serde(rename = "project")]
    pub project: String,
    #[serde(rename = "stack")]
    pub stack: String,
    #[serde(rename = "app")]
    pub app: String,
    #[serde(rename = "workload", default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<Workload>,
    #[serde(rename = "devConfig", default, skip_serializing_if = "Option::is_none")]
    pub dev_config: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(
        rename = "platformConfig",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub platform_config: Option<serde_json::Map<String, serde_json::Value>>,
}

impl GeneratorRequest {
    /// returns the name identifying the application across projects and
    /// stacks, used as prefix for every generated resource
    pub fn unique_app_name(&self) -> String {
        format!("{}-{}-{}", self.project, self.stack, self.app)
    }

    /// returns the namespace the generated resources belong to, the project
    /// owns one namespace and all of its stacks live in it
    pub fn namespace(&self) -> String {
        self.project.to_owned()
    }

    /// returns the accessory configuration, the developer configuration
    /// overrides the platform one field by field
    pub fn merged_config(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut merged = self.platform_config.to_owned().unwrap_or_default();

        if let Some(dev) = &self.dev_config {
            for (key, value) in dev {
                merged.insert(key.to_owned(), value.to_owned());
            }
        }

        merged
    }
}

// -----------------------------------------------------------------------------
// Resource structure

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct Resource {
    #[serde(rename = "id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "attributes")]
    pub attributes: serde_json::Value,
    #[serde(rename = "dependsOn", default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    #[serde(rename = "extensions", default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, serde_json::Value>>,
}

impl Resource {
    /// returns a resource describing the given kubernetes object
    pub fn kubernetes<T>(
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
        obj: &T,
    ) -> Result<Self, serde_json::Error>
    where
        T: Serialize,
    {
        Ok(Self {
            id: kubernetes_resource_id(api_version, kind, namespace, name),
            kind: KUBERNETES_RESOURCE.to_string(),
            attributes: serde_json::to_value(obj)?,
            depends_on: None,
            extensions: Some(BTreeMap::from([
                (
                    "apiVersion".to_string(),
                    serde_json::Value::String(api_version.to_string()),
                ),
                (
                    "kind".to_string(),
                    serde_json::Value::String(kind.to_string()),
                ),
            ])),
        })
    }

    /// returns a resource describing the given terraform object
    pub fn terraform(
        provider: &Provider,
        meta: serde_json::Value,
        resource_type: &str,
        name: &str,
        attributes: serde_json::Value,
    ) -> Self {
        Self {
            id: terraform_resource_id(provider, resource_type, name),
            kind: TERRAFORM_RESOURCE.to_string(),
            attributes,
            depends_on: None,
            extensions: Some(BTreeMap::from([
                (
                    "provider".to_string(),
                    serde_json::Value::String(provider.source.to_owned()),
                ),
                ("providerMeta".to_string(), meta),
                (
                    "resourceType".to_string(),
                    serde_json::Value::String(resource_type.to_string()),
                ),
            ])),
        }
    }

    /// record an explicit apply ordering between this resource and the given
    /// ones
    pub fn depends_on(mut self, ids: Vec<String>) -> Self {
        self.depends_on = Some(ids);
        self
    }
}

// -----------------------------------------------------------------------------
// Patcher structure

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
pub struct Patcher {
    #[serde(rename = "environments")]
    pub environments: Vec<EnvVar>,
}

// -----------------------------------------------------------------------------
// GeneratorResponse structure

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct GeneratorResponse {
    #[serde(rename = "resources")]
    pub resources: Vec<Resource>,
    #[serde(rename = "patcher", default, skip_serializing_if = "Option::is_none")]
    pub patcher: Option<Patcher>,
}

// -----------------------------------------------------------------------------
// ProviderError enum

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("failed to parse provider source '{0}', expect '<registry>/<namespace>/<name>/<version>'")]
    Source(String),
}

// -----------------------------------------------------------------------------
// Provider structure

/// a terraform provider descriptor parsed from its pinned source,
/// e.g. `registry.terraform.io/hashicorp/aws/5.0.1`
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Provider {
    pub source: String,
    pub namespace: String,
    pub name: String,
    pub version: String,
}

impl TryFrom<&str> for Provider {
    type Error = ProviderError;

    fn try_from(source: &str) -> Result<Self, Self::Error> {
        let parts: Vec<&str> = source.split('/').collect();
        let [_, namespace, name, version] = parts[..] else {
            return Err(ProviderError::Source(source.to_string()));
        };

        if namespace.is_empty() || name.is_empty() || version.is_empty() {
            return Err(ProviderError::Source(source.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

/// returns the identifier of a kubernetes resource within a response
pub fn kubernetes_resource_id(
    api_version: &str,
    kind: &str,
    namespace: &str,
    name: &str,
) -> String {
    format!("{}:{}:{}:{}", api_version, kind, namespace, name)
}

/// returns the identifier of a terraform resource within a response
pub fn terraform_resource_id(provider: &Provider, resource_type: &str, name: &str) -> String {
    format!(
        "{}:{}:{}:{}",
        provider.namespace, provider.name, resource_type, name
    )
}

/// returns a placeholder referencing an attribute of another resource, the
/// host resolves it before applying
pub fn resource_ref(id: &str, attribute: &str) -> String {
    format!("$resource.{}.{}", id, attribute)
}

/// returns a random password made of alphanumeric characters and underscores
pub fn random_password(length: usize) -> String {
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..PASSWORD_CHARSET.len());
            PASSWORD_CHARSET[idx] as char
        })
        .collect()
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kubernetes_resource_id_is_colon_separated() {
        assert_eq!(
            kubernetes_resource_id("apps/v1", "Deployment", "test-project", "test-app-db-local"),
            "apps/v1:Deployment:test-project:test-app-db-local"
        );
    }

    #[test]
    fn provider_parses_pinned_source() {
        let provider = Provider::try_from("registry.terraform.io/hashicorp/aws/5.0.1").unwrap();

        assert_eq!(provider.namespace, "hashicorp");
        assert_eq!(provider.name, "aws");
        assert_eq!(provider.version, "5.0.1");
        assert_eq!(
            terraform_resource_id(&provider, "aws_db_instance", "test-database"),
            "hashicorp:aws:aws_db_instance:test-database"
        );
    }

    #[test]
    fn provider_rejects_truncated_source() {
        assert!(Provider::try_from("registry.terraform.io/hashicorp/aws").is_err());
        assert!(Provider::try_from("").is_err());
    }

    #[test]
    fn merged_config_prefers_developer_values() {
        let request = GeneratorRequest {
            project: "test-project".to_string(),
            stack: "test-stack".to_string(),
            app: "test-app".to_string(),
            workload: None,
            dev_config: Some(
                serde_json::json!({"version": "8.0"})
                    .as_object()
                    .unwrap()
                    .to_owned(),
            ),
            platform_config: Some(
                serde_json::json!({"version": "5.7", "size": 20})
                    .as_object()
                    .unwrap()
                    .to_owned(),
            ),
        };

        let merged = request.merged_config();
        assert_eq!(merged.get("version"), Some(&serde_json::json!("8.0")));
        assert_eq!(merged.get("size"), Some(&serde_json::json!(20)));
    }

    #[test]
    fn random_password_sticks_to_charset() {
        let password = random_password(16);

        assert_eq!(password.len(), 16);
        assert!(password
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'_'));
    }

    #[test]
    fn resource_ref_is_resolvable() {
        assert_eq!(
            resource_ref("hashicorp:random:random_password:test-database", "result"),
            "$resource.hashicorp:random:random_password:test-database.result"
        );
    }
}
