//! # Local database module
//!
//! This module renders the deployment artifacts of a mysql instance hosted
//! next to the application workload, a credentials secret, an instance
//! secret, a deployment, a persistent volume claim and a service

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Probe, ResourceRequirements,
    Secret, Service, ServicePort, ServiceSpec, TCPSocketAction, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::debug;

use crate::svc::{
    cfg::Configuration,
    framework::{self, GeneratorRequest, GeneratorResponse, Resource},
    mysql::{secret_env, GeneratorError, MySql, DB_PORT},
};

// -----------------------------------------------------------------------------
// Constants

const DATA_VOLUME: &str = "data";
const DATA_PATH: &str = "/var/lib/mysql";
const CONTAINER_NAME: &str = "mysql";

// -----------------------------------------------------------------------------
// generate function

/// render the five resources describing a locally hosted database instance
/// and the patcher wiring its credentials into the application
pub fn generate(
    mysql: &MySql,
    request: &GeneratorRequest,
    config: &Configuration,
) -> Result<GeneratorResponse, GeneratorError> {
    let namespace = request.namespace();
    let password = framework::random_password(config.generator.password_length);
    let host_address = format!(
        "{}.{}.svc.cluster.local",
        service_name(mysql, request),
        namespace
    );

    debug!(
        namespace = %namespace,
        database = %mysql.database_name,
        "render local mysql resources"
    );

    let (credentials, patcher) = mysql.credentials(request, &host_address, &password)?;

    let resources = vec![
        credentials,
        secret(mysql, request, &password)?,
        deployment(mysql, request, config)?,
        persistent_volume_claim(mysql, request)?,
        service(mysql, request)?,
    ];

    Ok(GeneratorResponse {
        resources,
        patcher: Some(patcher),
    })
}

// -----------------------------------------------------------------------------
// Naming helpers

fn instance_name(mysql: &MySql, request: &GeneratorRequest) -> String {
    format!("{}-{}-local", request.app, mysql.database_name)
}

pub fn secret_name(mysql: &MySql, request: &GeneratorRequest) -> String {
    format!("{}-secret", instance_name(mysql, request))
}

pub fn pvc_name(mysql: &MySql, request: &GeneratorRequest) -> String {
    format!("{}-pvc", instance_name(mysql, request))
}

pub fn service_name(mysql: &MySql, request: &GeneratorRequest) -> String {
    format!("{}-service", instance_name(mysql, request))
}

fn labels(mysql: &MySql, request: &GeneratorRequest) -> BTreeMap<String, String> {
    super::labels(&instance_name(mysql, request), &request.app)
}

// -----------------------------------------------------------------------------
// secret function

/// returns the secret holding the password of the database instance itself
pub fn secret(
    mysql: &MySql,
    request: &GeneratorRequest,
    password: &str,
) -> Result<Resource, GeneratorError> {
    let name = secret_name(mysql, request);
    let namespace = request.namespace();

    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(namespace.to_owned()),
            labels: Some(labels(mysql, request)),
            ..Default::default()
        },
        string_data: Some(BTreeMap::from([(
            "password".to_string(),
            password.to_string(),
        )])),
        ..Default::default()
    };

    Resource::kubernetes("v1", "Secret", &namespace, &name, &secret)
        .map_err(GeneratorError::Serialize)
}

// -----------------------------------------------------------------------------
// deployment function

/// returns the deployment running the database instance
pub fn deployment(
    mysql: &MySql,
    request: &GeneratorRequest,
    config: &Configuration,
) -> Result<Resource, GeneratorError> {
    let name = instance_name(mysql, request);
    let namespace = request.namespace();
    let labels = labels(mysql, request);

    let deployment = Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(namespace.to_owned()),
            labels: Some(labels.to_owned()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.to_owned()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(pod_spec(mysql, request, config)),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    Resource::kubernetes("apps/v1", "Deployment", &namespace, &name, &deployment)
        .map_err(GeneratorError::Serialize)
}

/// returns the pod specification of the database instance, a single mysql
/// container backed by the persistent volume claim
pub fn pod_spec(mysql: &MySql, request: &GeneratorRequest, config: &Configuration) -> PodSpec {
    PodSpec {
        containers: vec![Container {
            name: CONTAINER_NAME.to_string(),
            image: Some(format!(
                "{}/mysql:{}",
                config.generator.registry, mysql.version
            )),
            env: Some(env(mysql, request)),
            ports: Some(vec![ContainerPort {
                container_port: DB_PORT,
                name: Some("mysql".to_string()),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            liveness_probe: Some(tcp_probe(30, 10)),
            readiness_probe: Some(tcp_probe(5, 5)),
            volume_mounts: Some(vec![VolumeMount {
                name: DATA_VOLUME.to_string(),
                mount_path: DATA_PATH.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }],
        volumes: Some(vec![Volume {
            name: DATA_VOLUME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: pvc_name(mysql, request),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// returns the environment of the mysql container, the password always comes
/// from the instance secret, never inlined in the pod specification
fn env(mysql: &MySql, request: &GeneratorRequest) -> Vec<EnvVar> {
    let secret = secret_name(mysql, request);

    let mut env = if mysql.username == super::DEFAULT_USERNAME {
        vec![secret_env("MYSQL_ROOT_PASSWORD", &secret, "password")]
    } else {
        vec![
            EnvVar {
                name: "MYSQL_USER".to_string(),
                value: Some(mysql.username.to_owned()),
                ..Default::default()
            },
            secret_env("MYSQL_PASSWORD", &secret, "password"),
            EnvVar {
                name: "MYSQL_RANDOM_ROOT_PASSWORD".to_string(),
                value: Some("yes".to_string()),
                ..Default::default()
            },
        ]
    };

    env.push(EnvVar {
        name: "MYSQL_DATABASE".to_string(),
        value: Some(mysql.database_name.to_owned()),
        ..Default::default()
    });

    env
}

fn tcp_probe(initial_delay: i32, period: i32) -> Probe {
    Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(DB_PORT),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(period),
        ..Default::default()
    }
}

// -----------------------------------------------------------------------------
// persistent volume claim function

/// returns the claim backing the data directory of the database instance
pub fn persistent_volume_claim(
    mysql: &MySql,
    request: &GeneratorRequest,
) -> Result<Resource, GeneratorError> {
    let name = pvc_name(mysql, request);
    let namespace = request.namespace();

    let pvc = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(namespace.to_owned()),
            labels: Some(labels(mysql, request)),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(format!("{}Gi", mysql.size)),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    Resource::kubernetes("v1", "PersistentVolumeClaim", &namespace, &name, &pvc)
        .map_err(GeneratorError::Serialize)
}

// -----------------------------------------------------------------------------
// service function

/// returns the service exposing the database instance inside the cluster
pub fn service(mysql: &MySql, request: &GeneratorRequest) -> Result<Resource, GeneratorError> {
    let name = service_name(mysql, request);
    let namespace = request.namespace();

    let service = Service {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(namespace.to_owned()),
            labels: Some(labels(mysql, request)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels(mysql, request)),
            ports: Some(vec![ServicePort {
                port: DB_PORT,
                target_port: Some(IntOrString::Int(DB_PORT)),
                name: Some("mysql".to_string()),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    Resource::kubernetes("v1", "Service", &namespace, &name, &service)
        .map_err(GeneratorError::Serialize)
}

// -----------------------------------------------------------------------------
// Tests
