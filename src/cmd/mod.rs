//! # Command module
//!
//! This module provide command line interface structures and helpers

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use clap::{Parser, Subcommand};

use crate::svc::cfg::Configuration;

pub mod configmap;
pub mod generate;
pub mod schema;

// -----------------------------------------------------------------------------
// Executor trait

#[async_trait]
pub trait Executor {
    type Error;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error>;
}

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to execute command '{0}', {1}")]
    Execution(String, Arc<Error>),
    #[error("failed to execute generate command, {0}")]
    Generate(generate::GenerateError),
    #[error("failed to execute schema command, {0}")]
    Schema(schema::SchemaError),
    #[error("failed to execute configmap command, {0}")]
    ConfigMap(configmap::ConfigMapError),
}

// -----------------------------------------------------------------------------
// Command enum

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Render the deployment artifacts for a generator request
    #[clap(name = "generate", aliases = &["g"])]
    Generate(generate::Generate),
    /// Interact with the accessory configuration schema
    #[clap(name = "schema", subcommand, aliases = &["s"])]
    Schema(schema::Schema),
    /// Interact with the module configuration
    #[clap(name = "configmap", subcommand, aliases = &["cm"])]
    ConfigMap(configmap::ConfigMap),
}

#[async_trait]
impl Executor for Command {
    type Error = Error;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error> {
        match self {
            Self::Generate(cmd) => cmd
                .execute(config)
                .await
                .map_err(Error::Generate)
                .map_err(|err| Error::Execution("generate".into(), Arc::new(err))),
            Self::Schema(cmd) => cmd
                .execute(config)
                .await
                .map_err(Error::Schema)
                .map_err(|err| Error::Execution("schema".into(), Arc::new(err))),
            Self::ConfigMap(cmd) => cmd
                .execute(config)
                .await
                .map_err(Error::ConfigMap)
                .map_err(|err| Error::Execution("configmap".into(), Arc::new(err))),
        }
    }
}

// -----------------------------------------------------------------------------
// Args struct

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Args {
    /// Increase log verbosity
    #[clap(short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbosity: u8,
    /// Specify location of configuration
    #[clap(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    /// Check if configuration is healthy
    #[clap(short = 't', long = "check", global = true)]
    pub check: bool,
    #[clap(subcommand)]
    pub command: Option<Command>,
}
