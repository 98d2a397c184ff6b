//! # Configuration module
//!
//! This module provide utilities and helpers to interact with the
//! configuration

use std::{convert::TryFrom, path::PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Constants

pub const DEFAULT_REGISTRY: &str = "docker.io/library";
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;

pub const DEFAULT_AWS_PROVIDER: &str = "registry.terraform.io/hashicorp/aws/5.0.1";
pub const DEFAULT_ALICLOUD_PROVIDER: &str = "registry.terraform.io/aliyun/alicloud/1.209.1";
pub const DEFAULT_RANDOM_PROVIDER: &str = "registry.terraform.io/hashicorp/random/3.5.1";

// -----------------------------------------------------------------------------
// Generator structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Generator {
    #[serde(rename = "registry")]
    pub registry: String,
    #[serde(rename = "password_length")]
    pub password_length: usize,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            registry: DEFAULT_REGISTRY.to_string(),
            password_length: DEFAULT_PASSWORD_LENGTH,
        }
    }
}

// -----------------------------------------------------------------------------
// Terraform structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Terraform {
    #[serde(rename = "aws")]
    pub aws: String,
    #[serde(rename = "alicloud")]
    pub alicloud: String,
    #[serde(rename = "random")]
    pub random: String,
}

impl Default for Terraform {
    fn default() -> Self {
        Self {
            aws: DEFAULT_AWS_PROVIDER.to_string(),
            alicloud: DEFAULT_ALICLOUD_PROVIDER.to_string(),
            random: DEFAULT_RANDOM_PROVIDER.to_string(),
        }
    }
}

// -----------------------------------------------------------------------------
// ConfigurationError enum

#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("failed to load file '{0:?}', {1}")]
    File(PathBuf, ConfigError),
    #[error("failed to load configuration, {0}")]
    Cast(ConfigError),
    #[error("failed to set default for key '{0}', {1}")]
    Default(String, ConfigError),
    #[error("failed to set environment source, {0}")]
    Environment(ConfigError),
    #[error("failed to build configuration, {0}")]
    Build(ConfigError),
}

// -----------------------------------------------------------------------------
// Configuration structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Configuration {
    #[serde(rename = "generator", default)]
    pub generator: Generator,
    #[serde(rename = "terraform", default)]
    pub terraform: Terraform,
}

impl TryFrom<PathBuf> for Configuration {
    type Error = ConfigurationError;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        defaults()?
            .add_source(
                Environment::with_prefix(&env!("CARGO_PKG_NAME").replace('-', "_")).separator("__"),
            )
            .add_source(File::from(path.to_owned()).required(true))
            .build()
            .map_err(|err| ConfigurationError::File(path, err))?
            .try_deserialize()
            .map_err(ConfigurationError::Cast)
    }
}

impl Configuration {
    pub fn try_default() -> Result<Self, ConfigurationError> {
        let mut builder = defaults()?.add_source(
            Environment::with_prefix(&env!("CARGO_PKG_NAME").replace('-', "_")).separator("__"),
        );

        for path in [
            PathBuf::from(format!("/etc/{}/config", env!("CARGO_PKG_NAME"))),
            PathBuf::from(format!(
                "{}/.config/{}/config",
                env!("HOME"),
                env!("CARGO_PKG_NAME")
            )),
            PathBuf::from("config"),
        ] {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder
            .build()
            .map_err(ConfigurationError::Build)?
            .try_deserialize()
            .map_err(ConfigurationError::Cast)
    }
}

// -----------------------------------------------------------------------------
// defaults function

fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigurationError> {
    Config::builder()
        .set_default("generator.registry", DEFAULT_REGISTRY)
        .map_err(|err| ConfigurationError::Default("generator.registry".into(), err))?
        .set_default("generator.password_length", DEFAULT_PASSWORD_LENGTH as i64)
        .map_err(|err| ConfigurationError::Default("generator.password_length".into(), err))?
        .set_default("terraform.aws", DEFAULT_AWS_PROVIDER)
        .map_err(|err| ConfigurationError::Default("terraform.aws".into(), err))?
        .set_default("terraform.alicloud", DEFAULT_ALICLOUD_PROVIDER)
        .map_err(|err| ConfigurationError::Default("terraform.alicloud".into(), err))?
        .set_default("terraform.random", DEFAULT_RANDOM_PROVIDER)
        .map_err(|err| ConfigurationError::Default("terraform.random".into(), err))
}

// -----------------------------------------------------------------------------
// Tests
