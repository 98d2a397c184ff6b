//! # Aws database module
//!
//! This module renders the terraform resources describing a managed mysql
//! instance on aws, the security group restricting its access, the random
//! password backing its account and the credentials secret for the workload

use serde_json::json;
use tracing::debug;

use crate::svc::{
    cfg::Configuration,
    framework::{self, GeneratorRequest, GeneratorResponse, Provider, Resource},
    mysql::{is_public_accessible, GeneratorError, MySql, DB_ENGINE, DB_PORT},
};

// -----------------------------------------------------------------------------
// Constants

const RANDOM_PASSWORD_LENGTH: i64 = 16;
const PASSWORD_SPECIAL_CHARS: &str = "!#$%&*()-_=+[]{}<>:?";

// -----------------------------------------------------------------------------
// generate function

/// render the terraform resources of a managed aws database instance, the
/// credentials secret and the patcher wiring it into the application
pub fn generate(
    mysql: &MySql,
    request: &GeneratorRequest,
    config: &Configuration,
) -> Result<GeneratorResponse, GeneratorError> {
    let aws = Provider::try_from(config.terraform.aws.as_str())?;
    let random = Provider::try_from(config.terraform.random.as_str())?;

    // validated upstream, cloud configurations always carry a region
    let meta = json!({ "region": mysql.region });

    debug!(
        region = ?mysql.region,
        database = %mysql.database_name,
        "render aws mysql resources"
    );

    let password = random_password(mysql, &random);
    let security_group = security_group(mysql, &aws, &meta);
    let instance = db_instance(mysql, request, &aws, &meta, &password, &security_group);

    let host_address = framework::resource_ref(&instance.id, "address");
    let password_ref = framework::resource_ref(&password.id, "result");
    let (credentials, patcher) = mysql.credentials(request, &host_address, &password_ref)?;

    Ok(GeneratorResponse {
        resources: vec![password, security_group, instance, credentials],
        patcher: Some(patcher),
    })
}

// -----------------------------------------------------------------------------
// random password function

/// returns the terraform resource generating the account password, the value
/// only ever exists in the provider state
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
// security group function

/// returns the security group opening the mysql port to the allow-listed
/// blocks only
fn security_group(mysql: &MySql, aws: &Provider, meta: &serde_json::Value) -> Resource {
    Resource::terraform(
        aws,
        meta.to_owned(),
        "aws_security_group",
        &mysql.database_name,
        json!({
            "ingress": [{
                "cidr_blocks": mysql.security_ips,
                "protocol": "tcp",
                "from_port": DB_PORT,
                "to_port": DB_PORT,
            }],
            "egress": [{
                "cidr_blocks": ["0.0.0.0/0"],
                "protocol": "-1",
                "from_port": 0,
                "to_port": 0,
            }],
        }),
    )
}

// -----------------------------------------------------------------------------
// db instance function

/// returns the managed database instance itself
fn db_instance(
    mysql: &MySql,
    request: &GeneratorRequest,
    aws: &Provider,
    meta: &serde_json::Value,
    password: &Resource,
    security_group: &Resource,
) -> Resource {
    let mut attributes = json!({
        "allocated_storage": mysql.size,
        "engine": DB_ENGINE,
        "engine_version": mysql.version,
        "identifier": format!("{}-{}", request.unique_app_name(), mysql.database_name),
        "instance_class": mysql.instance_type,
        "username": mysql.username,
        "password": framework::resource_ref(&password.id, "result"),
        "publicly_accessible": is_public_accessible(&mysql.security_ips),
        "skip_final_snapshot": true,
        "vpc_security_group_ids": [framework::resource_ref(&security_group.id, "id")],
    });

    if let Some(subnet) = &mysql.subnet_id {
        attributes["db_subnet_group_name"] = json!(subnet);
    }

    Resource::terraform(
        aws,
        meta.to_owned(),
        "aws_db_instance",
        &mysql.database_name,
        attributes,
    )
    .depends_on(vec![password.id.to_owned(), security_group.id.to_owned()])
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svc::{
        framework::TERRAFORM_RESOURCE,
        mysql::{
            tests::{test_mysql, test_request},
            CloudProvider, DatabaseType,
        },
    };

    fn test_cloud_mysql() -> MySql {
        let mut mysql = test_mysql();
        mysql.db_type = DatabaseType::Cloud;
        mysql.cloud = Some(CloudProvider::Aws);
        mysql.region = Some("us-east-1".to_string());
        mysql.instance_type = Some("db.t3.micro".to_string());
        mysql
    }

    #[test]
    fn generate_renders_terraform_resources_and_a_secret() {
        let request = test_request();
        let mysql = test_cloud_mysql();
        let config = Configuration::default();

        let response = generate(&mysql, &request, &config).unwrap();

        assert_eq!(response.resources.len(), 4);
        assert_eq!(
            response
                .resources
                .iter()
                .filter(|r| r.kind == TERRAFORM_RESOURCE)
                .count(),
            3
        );

        let instance = &response.resources[2];
        assert_eq!(
            instance.id,
            "hashicorp:aws:aws_db_instance:test-database"
        );
        assert_eq!(
            instance.attributes["engine_version"],
            serde_json::json!("8.0")
        );
        // the default allow-list opens the instance to the world
        assert_eq!(
            instance.attributes["publicly_accessible"],
            serde_json::json!(true)
        );
    }

    #[test]
    fn db_instance_keeps_private_allow_lists_private() {
        let request = test_request();
        let mut mysql = test_cloud_mysql();
        mysql.security_ips = vec!["10.0.0.0/8".to_string()];
        let config = Configuration::default();

        let response = generate(&mysql, &request, &config).unwrap();
        let instance = &response.resources[2];

        assert_eq!(
            instance.attributes["publicly_accessible"],
            serde_json::json!(false)
        );
        assert_eq!(
            instance.attributes["vpc_security_group_ids"][0],
            serde_json::json!("$resource.hashicorp:aws:aws_security_group:test-database.id")
        );
    }

    #[test]
    fn db_instance_joins_the_configured_subnet_group() {
        let request = test_request();
        let mut mysql = test_cloud_mysql();
        mysql.subnet_id = Some("db-subnet-test".to_string());
        let config = Configuration::default();

        let response = generate(&mysql, &request, &config).unwrap();
        let instance = &response.resources[2];

        assert_eq!(
            instance.attributes["db_subnet_group_name"],
            serde_json::json!("db-subnet-test")
        );
    }

    #[test]
    fn credentials_reference_the_provider_state() {
        let request = test_request();
        let mysql = test_cloud_mysql();
        let config = Configuration::default();

        let response = generate(&mysql, &request, &config).unwrap();
        let credentials = &response.resources[3];

        assert_eq!(
            credentials.attributes["stringData"]["hostAddress"],
            serde_json::json!("$resource.hashicorp:aws:aws_db_instance:test-database.address")
        );
        assert_eq!(
            credentials.attributes["stringData"]["password"],
            serde_json::json!("$resource.hashicorp:random:random_password:test-database.result")
        );
    }
}
