//! # Alicloud database module
//!
//! This module renders the terraform resources describing a managed mysql
//! instance on alibaba cloud, its account, the optional public connection
//! and the credentials secret for the workload

use serde_json::json;
use tracing::debug;

use crate::svc::{
    cfg::Configuration,
    framework::{self, GeneratorRequest, GeneratorResponse, Provider, Resource},
    mysql::{is_public_accessible, GeneratorError, MySql, DB_PORT},
};

// -----------------------------------------------------------------------------
// Constants

const RANDOM_PASSWORD_LENGTH: i64 = 16;
const PASSWORD_SPECIAL_CHARS: &str = "_";

/// engine name expected by the alicloud rds api
const ALICLOUD_ENGINE: &str = "MySQL";

// -----------------------------------------------------------------------------
// generate function

/// render the terraform resources of a managed alicloud database instance,
/// the credentials secret and the patcher wiring it into the application
pub fn generate(
    mysql: &MySql,
    request: &GeneratorRequest,
    config: &Configuration,
) -> Result<GeneratorResponse, GeneratorError> {
    let alicloud = Provider::try_from(config.terraform.alicloud.as_str())?;
    let random = Provider::try_from(config.terraform.random.as_str())?;

    let meta = json!({ "region": mysql.region });

    debug!(
        region = ?mysql.region,
        database = %mysql.database_name,
        "render alicloud mysql resources"
    );

    let password = random_password(mysql, &random);
    let instance = db_instance(mysql, request, &alicloud, &meta);
    let account = rds_account(mysql, &alicloud, &meta, &password, &instance);

    // a dedicated connection endpoint only exists when the allow-list opens
    // the instance to public addresses and private routing is turned off
    let connection = (!mysql.private_routing && is_public_accessible(&mysql.security_ips))
        .then(|| db_connection(mysql, request, &alicloud, &meta, &instance));

    let host_address = match &connection {
        Some(connection) => framework::resource_ref(&connection.id, "connection_string"),
        None => framework::resource_ref(&instance.id, "connection_string"),
    };
    let password_ref = framework::resource_ref(&password.id, "result");
    let (credentials, patcher) = mysql.credentials(request, &host_address, &password_ref)?;

    let mut resources = vec![password, instance, account];
    if let Some(connection) = connection {
        resources.push(connection);
    }
    resources.push(credentials);

    Ok(GeneratorResponse {
        resources,
        patcher: Some(patcher),
    })
}

// -----------------------------------------------------------------------------
// random password function

fn random_password(mysql: &MySql, random: &Provider) -> Resource {
    Resource::terraform(
        random,
        json!({}),
        "random_password",
        &mysql.database_name,
        json!({
            "length": RANDOM_PASSWORD_LENGTH,
            "special": true,
            "override_special": PASSWORD_SPECIAL_CHARS,
        }),
    )
}

// -----------------------------------------------------------------------------
// db instance function

/// returns the managed database instance, storage and network policy applied
fn db_instance(
    mysql: &MySql,
    request: &GeneratorRequest,
    alicloud: &Provider,
    meta: &serde_json::Value,
) -> Resource {
    let mut attributes = json!({
        "category": mysql.category,
        "engine": ALICLOUD_ENGINE,
        "engine_version": mysql.version,
        "instance_type": mysql.instance_type,
        "instance_storage": mysql.size,
        "instance_name": format!("{}-{}", request.unique_app_name(), mysql.database_name),
        "security_ips": mysql.security_ips,
    });

    if let Some(subnet) = &mysql.subnet_id {
        attributes["vswitch_id"] = json!(subnet);
    }

    Resource::terraform(
        alicloud,
        meta.to_owned(),
        "alicloud_db_instance",
        &mysql.database_name,
        attributes,
    )
}

// -----------------------------------------------------------------------------
// rds account function

/// returns the database account bound to the instance, its password lives in
/// the provider state only
fn rds_account(
    mysql: &MySql,
    alicloud: &Provider,
    meta: &serde_json::Value,
    password: &Resource,
    instance: &Resource,
) -> Resource {
    Resource::terraform(
        alicloud,
        meta.to_owned(),
        "alicloud_rds_account",
        &mysql.database_name,
        json!({
            "account_name": mysql.username,
            "account_password": framework::resource_ref(&password.id, "result"),
            "account_type": "Super",
            "db_instance_id": framework::resource_ref(&instance.id, "id"),
        }),
    )
    .depends_on(vec![password.id.to_owned(), instance.id.to_owned()])
}

// -----------------------------------------------------------------------------
// db connection function

/// returns the public connection endpoint of the instance
fn db_connection(
    mysql: &MySql,
    request: &GeneratorRequest,
    alicloud: &Provider,
    meta: &serde_json::Value,
    instance: &Resource,
) -> Resource {
    Resource::terraform(
        alicloud,
        meta.to_owned(),
        "alicloud_db_connection",
        &mysql.database_name,
        json!({
            "instance_id": framework::resource_ref(&instance.id, "id"),
            "connection_prefix": format!("{}-public", request.app),
            "port": DB_PORT.to_string(),
        }),
    )
    .depends_on(vec![instance.id.to_owned()])
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svc::mysql::{
        tests::{test_mysql, test_request},
        CloudProvider, DatabaseType,
    };

    fn test_cloud_mysql() -> MySql {
        let mut mysql = test_mysql();
        mysql.db_type = DatabaseType::Cloud;
        mysql.cloud = Some(CloudProvider::AliCloud);
        mysql.region = Some("cn-hangzhou".to_string());
        mysql.instance_type = Some("mysql.n2.serverless.1c".to_string());
        mysql
    }

    #[test]
    fn generate_routes_privately_by_default() {
        let request = test_request();
        let mysql = test_cloud_mysql();
        let config = Configuration::default();

        let response = generate(&mysql, &request, &config).unwrap();

        // no public connection endpoint, the patcher points at the instance
        assert_eq!(response.resources.len(), 4);
        let credentials = response.resources.last().unwrap();
        assert_eq!(
            credentials.attributes["stringData"]["hostAddress"],
            serde_json::json!(
                "$resource.aliyun:alicloud:alicloud_db_instance:test-database.connection_string"
            )
        );
    }

    #[test]
    fn generate_adds_a_connection_for_public_instances() {
        let request = test_request();
        let mut mysql = test_cloud_mysql();
        mysql.private_routing = false;
        let config = Configuration::default();

        let response = generate(&mysql, &request, &config).unwrap();

        assert_eq!(response.resources.len(), 5);
        let connection = &response.resources[3];
        assert_eq!(
            connection.id,
            "aliyun:alicloud:alicloud_db_connection:test-database"
        );

        let credentials = response.resources.last().unwrap();
        assert_eq!(
            credentials.attributes["stringData"]["hostAddress"],
            serde_json::json!(
                "$resource.aliyun:alicloud:alicloud_db_connection:test-database.connection_string"
            )
        );
    }

    #[test]
    fn db_instance_carries_the_allow_list_and_subnet() {
        let request = test_request();
        let mut mysql = test_cloud_mysql();
        mysql.security_ips = vec!["10.0.0.0/8".to_string()];
        mysql.subnet_id = Some("vsw-test".to_string());
        let config = Configuration::default();

        let response = generate(&mysql, &request, &config).unwrap();
        let instance = &response.resources[1];

        assert_eq!(
            instance.attributes["security_ips"],
            serde_json::json!(["10.0.0.0/8"])
        );
        assert_eq!(instance.attributes["vswitch_id"], serde_json::json!("vsw-test"));
        assert_eq!(instance.attributes["category"], serde_json::json!("Basic"));
    }
}
