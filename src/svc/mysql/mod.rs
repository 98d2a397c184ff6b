//! # MySql accessory module
//!
//! This module provide the mysql accessory configuration, its validation and
//! the dispatch between the locally hosted and the managed cloud renderers

use std::net::Ipv4Addr;

use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, Secret, SecretKeySelector};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::svc::{
    cfg::Configuration,
    framework::{GeneratorRequest, GeneratorResponse, Patcher, ProviderError, Resource},
};

pub mod alicloud;
pub mod aws;
pub mod local;

// -----------------------------------------------------------------------------
// Constants

pub const DB_ENGINE: &str = "mysql";
pub const DB_PORT: i32 = 3306;

pub const DEFAULT_VERSION: &str = "8.0";
pub const DEFAULT_SIZE: i64 = 10;
pub const DEFAULT_USERNAME: &str = "root";
pub const DEFAULT_CATEGORY: &str = "Basic";
pub const DEFAULT_SECURITY_IPS: &[&str] = &["0.0.0.0/0"];

/// maximum length of a database name, bounded so every derived resource name
/// stays within the kubernetes 63 characters limit
pub const MAX_DATABASE_NAME_LEN: usize = 26;

/// RFC1918 private address blocks
const PRIVATE_BLOCKS: &[(Ipv4Addr, u8)] = &[
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
];

// -----------------------------------------------------------------------------
// DatabaseType enum

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub enum DatabaseType {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "cloud")]
    Cloud,
}

// -----------------------------------------------------------------------------
// CloudProvider enum

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub enum CloudProvider {
    #[serde(rename = "aws")]
    Aws,
    #[serde(rename = "alicloud")]
    AliCloud,
}

// -----------------------------------------------------------------------------
// MySql structure

#[derive(JsonSchema, Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct MySql {
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    #[serde(rename = "version", default = "default_version")]
    pub version: String,
    #[serde(rename = "size", default = "default_size")]
    pub size: i64,
    #[serde(rename = "databaseName", default)]
    pub database_name: String,
    #[serde(rename = "username", default = "default_username")]
    pub username: String,
    #[serde(rename = "category", default = "default_category")]
    pub category: String,
    #[serde(rename = "securityIPs", default = "default_security_ips")]
    pub security_ips: Vec<String>,
    #[serde(rename = "privateRouting", default = "default_private_routing")]
    pub private_routing: bool,
    #[serde(rename = "subnetID", default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(
        rename = "instanceType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub instance_type: Option<String>,
    #[serde(rename = "cloud", default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CloudProvider>,
    #[serde(rename = "region", default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_size() -> i64 {
    DEFAULT_SIZE
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_security_ips() -> Vec<String> {
    DEFAULT_SECURITY_IPS
        .iter()
        .map(|ip| ip.to_string())
        .collect()
}

fn default_private_routing() -> bool {
    true
}

// -----------------------------------------------------------------------------
// ValidationError enum

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("failed to validate database name '{0}', expect at most {MAX_DATABASE_NAME_LEN} lowercase alphanumeric characters or dashes, starting with a letter")]
    DatabaseName(String),
    #[error("failed to validate size '{0}', expect a strictly positive amount of GiB")]
    Size(i64),
    #[error("failed to validate username, expect a non empty value")]
    Username,
    #[error("failed to validate security ip '{0}', expect an ipv4 address or cidr block")]
    SecurityIp(String),
    #[error("failed to validate cloud configuration, expect a provider for 'cloud' databases")]
    MissingCloudProvider,
    #[error("failed to validate cloud configuration, expect a region for 'cloud' databases")]
    MissingRegion,
    #[error("failed to validate cloud configuration, expect an instance type for 'cloud' databases")]
    MissingInstanceType,
}

// -----------------------------------------------------------------------------
// GeneratorError enum

#[derive(thiserror::Error, Debug)]
pub enum GeneratorError {
    #[error("failed to deserialize mysql accessory configuration, {0}")]
    Deserialize(serde_json::Error),
    #[error("failed to validate mysql accessory configuration, {0}")]
    Validation(ValidationError),
    #[error("failed to serialize generated resource, {0}")]
    Serialize(serde_json::Error),
    #[error("failed to parse terraform provider, {0}")]
    Provider(ProviderError),
}

impl From<ValidationError> for GeneratorError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<ProviderError> for GeneratorError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

// -----------------------------------------------------------------------------
// MySql implementation

impl MySql {
    /// build the accessory configuration from the request, merging the
    /// platform and developer configurations, filling contextual defaults and
    /// validating the result
    pub fn try_new(request: &GeneratorRequest) -> Result<Self, GeneratorError> {
        let merged = request.merged_config();
        let mut mysql: Self = serde_json::from_value(serde_json::Value::Object(merged))
            .map_err(GeneratorError::Deserialize)?;

        if mysql.database_name.is_empty() {
            mysql.database_name = normalize_name(&request.app);
        }

        mysql.validate()?;
        Ok(mysql)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !valid_database_name(&self.database_name) {
            return Err(ValidationError::DatabaseName(self.database_name.to_owned()));
        }

        if self.size <= 0 {
            return Err(ValidationError::Size(self.size));
        }

        if self.username.is_empty() {
            return Err(ValidationError::Username);
        }

        for ip in &self.security_ips {
            parse_cidr(ip).ok_or_else(|| ValidationError::SecurityIp(ip.to_owned()))?;
        }

        if self.db_type == DatabaseType::Cloud {
            if self.cloud.is_none() {
                return Err(ValidationError::MissingCloudProvider);
            }

            if self.region.is_none() {
                return Err(ValidationError::MissingRegion);
            }

            if self.instance_type.is_none() {
                return Err(ValidationError::MissingInstanceType);
            }
        }

        Ok(())
    }

    /// render the deployment artifacts of the database instance
    pub fn generate(
        &self,
        request: &GeneratorRequest,
        config: &Configuration,
    ) -> Result<GeneratorResponse, GeneratorError> {
        self.validate()?;

        match self.db_type {
            DatabaseType::Local => local::generate(self, request, config),
            DatabaseType::Cloud => match self.cloud {
                Some(CloudProvider::Aws) => aws::generate(self, request, config),
                Some(CloudProvider::AliCloud) => alicloud::generate(self, request, config),
                None => Err(ValidationError::MissingCloudProvider.into()),
            },
        }
    }

    /// returns the name of the credentials secret handed over to the
    /// application workload
    pub fn credentials_secret_name(&self, request: &GeneratorRequest) -> String {
        format!("{}-{}-db", request.app, self.database_name)
    }

    /// returns the credentials secret and the patcher wiring it into the
    /// application workload containers
    pub fn credentials(
        &self,
        request: &GeneratorRequest,
        host_address: &str,
        password: &str,
    ) -> Result<(Resource, Patcher), GeneratorError> {
        let name = self.credentials_secret_name(request);
        let namespace = request.namespace();

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some(namespace.to_owned()),
                labels: Some(labels(&name, &request.app)),
                ..Default::default()
            },
            string_data: Some(BTreeMap::from([
                ("hostAddress".to_string(), host_address.to_string()),
                ("username".to_string(), self.username.to_owned()),
                ("password".to_string(), password.to_string()),
            ])),
            ..Default::default()
        };

        let resource = Resource::kubernetes("v1", "Secret", &namespace, &name, &secret)
            .map_err(GeneratorError::Serialize)?;

        let patcher = Patcher {
            environments: vec![
                secret_env(&self.env_name("DB_HOST"), &name, "hostAddress"),
                secret_env(&self.env_name("DB_USERNAME"), &name, "username"),
                secret_env(&self.env_name("DB_PASSWORD"), &name, "password"),
            ],
        };

        Ok((resource, patcher))
    }

    fn env_name(&self, prefix: &str) -> String {
        format!(
            "{}_{}",
            prefix,
            self.database_name.to_uppercase().replace('-', "_")
        )
    }
}

// -----------------------------------------------------------------------------
// Helpers functions

/// returns an environment variable sourced from a key of the given secret
pub fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: Some(secret.to_string()),
                key: key.to_string(),
                optional: Some(false),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// returns the labels shared by every generated kubernetes resource
pub fn labels(name: &str, app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), name.to_string()),
        (
            "app.kubernetes.io/component".to_string(),
            "database".to_string(),
        ),
        ("app.kubernetes.io/part-of".to_string(), app.to_string()),
        (
            "app.kubernetes.io/managed-by".to_string(),
            env!("CARGO_PKG_NAME").to_string(),
        ),
    ])
}

/// turn an application name into a name usable for a database and the
/// kubernetes resources derived from it
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace('_', "-")
}

fn valid_database_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_DATABASE_NAME_LEN {
        return false;
    }

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    first.is_ascii_lowercase()
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// parse an ipv4 address or cidr block into its network address and prefix
/// length
pub fn parse_cidr(value: &str) -> Option<(Ipv4Addr, u8)> {
    match value.split_once('/') {
        Some((addr, prefix)) => {
            let addr: Ipv4Addr = addr.parse().ok()?;
            let prefix: u8 = prefix.parse().ok()?;

            (prefix <= 32).then_some((addr, prefix))
        }
        None => value.parse().ok().map(|addr| (addr, 32)),
    }
}

/// returns whether the allow-list opens the instance to addresses outside of
/// the RFC1918 private ranges
pub fn is_public_accessible(security_ips: &[String]) -> bool {
    security_ips
        .iter()
        .filter_map(|ip| parse_cidr(ip))
        .any(|(addr, prefix)| {
            !PRIVATE_BLOCKS
                .iter()
                .any(|(block, block_prefix)| contains(*block, *block_prefix, addr, prefix))
        })
}

/// returns whether the `(addr, prefix)` network is contained in the
/// `(block, block_prefix)` one
fn contains(block: Ipv4Addr, block_prefix: u8, addr: Ipv4Addr, prefix: u8) -> bool {
    if prefix < block_prefix {
        return false;
    }

    let mask = if block_prefix == 0 {
        0
    } else {
        u32::MAX << (32 - block_prefix)
    };

    u32::from(block) & mask == u32::from(addr) & mask
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svc::framework::{Workload, WorkloadKind};

    pub fn test_request() -> GeneratorRequest {
        GeneratorRequest {
            project: "test-project".to_string(),
            stack: "test-stack".to_string(),
            app: "test-app".to_string(),
            workload: Some(Workload {
                kind: WorkloadKind::Service,
                service: None,
                job: None,
            }),
            dev_config: None,
            platform_config: None,
        }
    }

    pub fn test_mysql() -> MySql {
        MySql {
            db_type: DatabaseType::Local,
            version: DEFAULT_VERSION.to_string(),
            size: DEFAULT_SIZE,
            database_name: "test-database".to_string(),
            username: DEFAULT_USERNAME.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            security_ips: default_security_ips(),
            private_routing: true,
            subnet_id: None,
            instance_type: None,
            cloud: None,
            region: None,
        }
    }

    #[test]
    fn try_new_fills_defaults() {
        let mut request = test_request();
        request.dev_config = Some(
            serde_json::json!({"type": "local"})
                .as_object()
                .unwrap()
                .to_owned(),
        );

        let mysql = MySql::try_new(&request).unwrap();

        assert_eq!(mysql.db_type, DatabaseType::Local);
        assert_eq!(mysql.version, "8.0");
        assert_eq!(mysql.size, 10);
        assert_eq!(mysql.database_name, "test-app");
        assert_eq!(mysql.username, "root");
        assert_eq!(mysql.category, "Basic");
        assert_eq!(mysql.security_ips, vec!["0.0.0.0/0".to_string()]);
        assert!(mysql.private_routing);
    }

    #[test]
    fn try_new_normalizes_the_application_name() {
        let mut request = test_request();
        request.app = "Test_App".to_string();
        request.dev_config = Some(
            serde_json::json!({"type": "local"})
                .as_object()
                .unwrap()
                .to_owned(),
        );

        let mysql = MySql::try_new(&request).unwrap();

        assert_eq!(mysql.database_name, "test-app");
    }

    #[test]
    fn try_new_merges_platform_and_developer_configurations() {
        let mut request = test_request();
        request.platform_config = Some(
            serde_json::json!({"type": "local", "version": "5.7", "size": 20})
                .as_object()
                .unwrap()
                .to_owned(),
        );
        request.dev_config = Some(
            serde_json::json!({"version": "8.0"})
                .as_object()
                .unwrap()
                .to_owned(),
        );

        let mysql = MySql::try_new(&request).unwrap();

        assert_eq!(mysql.version, "8.0");
        assert_eq!(mysql.size, 20);
    }

    #[test]
    fn validate_rejects_bad_database_names() {
        let mut mysql = test_mysql();

        for name in ["", "-dash-first", "UpperCase", "x".repeat(27).as_str()] {
            mysql.database_name = name.to_string();
            assert!(
                matches!(mysql.validate(), Err(ValidationError::DatabaseName(_))),
                "'{}' should be rejected",
                name
            );
        }
    }

    #[test]
    fn validate_rejects_non_positive_size() {
        let mut mysql = test_mysql();
        mysql.size = 0;

        assert!(matches!(mysql.validate(), Err(ValidationError::Size(0))));
    }

    #[test]
    fn validate_rejects_empty_usernames() {
        let mut mysql = test_mysql();
        mysql.username = String::new();

        assert!(matches!(mysql.validate(), Err(ValidationError::Username)));
    }

    #[test]
    fn validate_rejects_malformed_security_ips() {
        let mut mysql = test_mysql();
        mysql.security_ips = vec!["10.0.0.0/33".to_string()];

        assert!(matches!(
            mysql.validate(),
            Err(ValidationError::SecurityIp(_))
        ));

        mysql.security_ips = vec!["not-an-ip".to_string()];
        assert!(matches!(
            mysql.validate(),
            Err(ValidationError::SecurityIp(_))
        ));
    }

    #[test]
    fn validate_requires_cloud_fields() {
        let mut mysql = test_mysql();
        mysql.db_type = DatabaseType::Cloud;

        assert!(matches!(
            mysql.validate(),
            Err(ValidationError::MissingCloudProvider)
        ));

        mysql.cloud = Some(CloudProvider::Aws);
        assert!(matches!(
            mysql.validate(),
            Err(ValidationError::MissingRegion)
        ));

        mysql.region = Some("us-east-1".to_string());
        assert!(matches!(
            mysql.validate(),
            Err(ValidationError::MissingInstanceType)
        ));

        mysql.instance_type = Some("db.t3.micro".to_string());
        assert!(mysql.validate().is_ok());
    }

    #[test]
    fn parse_cidr_accepts_plain_addresses() {
        assert_eq!(
            parse_cidr("192.168.1.1"),
            Some((Ipv4Addr::new(192, 168, 1, 1), 32))
        );
        assert_eq!(
            parse_cidr("10.0.0.0/8"),
            Some((Ipv4Addr::new(10, 0, 0, 0), 8))
        );
        assert_eq!(parse_cidr("10.0.0.0/40"), None);
    }

    #[test]
    fn public_accessibility_follows_private_ranges() {
        let private = vec!["10.1.2.0/24".to_string(), "192.168.0.0/16".to_string()];
        assert!(!is_public_accessible(&private));

        let world = vec!["0.0.0.0/0".to_string()];
        assert!(is_public_accessible(&world));

        let single = vec!["8.8.8.8".to_string()];
        assert!(is_public_accessible(&single));
    }

    #[test]
    fn credentials_wire_the_secret_into_the_workload() {
        let request = test_request();
        let mysql = test_mysql();

        let (resource, patcher) = mysql
            .credentials(&request, "test.svc.cluster.local", "123456")
            .unwrap();

        assert_eq!(
            resource.id,
            "v1:Secret:test-project:test-app-test-database-db"
        );
        assert_eq!(
            resource.attributes["metadata"]["labels"]["app.kubernetes.io/name"],
            serde_json::json!("test-app-test-database-db")
        );
        assert_eq!(
            resource.attributes["metadata"]["labels"]["app.kubernetes.io/part-of"],
            serde_json::json!("test-app")
        );
        assert_eq!(patcher.environments.len(), 3);
        assert_eq!(patcher.environments[0].name, "DB_HOST_TEST_DATABASE");

        let source = patcher.environments[2].value_from.as_ref().unwrap();
        let key_ref = source.secret_key_ref.as_ref().unwrap();
        assert_eq!(key_ref.name, Some("test-app-test-database-db".to_string()));
        assert_eq!(key_ref.key, "password");
    }
}
