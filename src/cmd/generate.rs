//! # Generate module
//!
//! This module provides the generate command line interface function
//! implementation, the entrypoint the module host drives

use std::{
    io::{self, Read},
    path::PathBuf,
    str::FromStr,
    sync::Arc,
};

use async_trait::async_trait;
use clap::Parser;
use tracing::info;

use crate::{
    cmd::Executor,
    svc::{
        cfg::Configuration,
        framework::GeneratorRequest,
        mysql::{GeneratorError, MySql},
    },
};

// -----------------------------------------------------------------------------
// Output enum

#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub enum Output {
    #[default]
    Yaml,
    Json,
}

impl FromStr for Output {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yaml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "failed to parse '{}', available options are 'yaml' or 'json'",
                s
            )),
        }
    }
}

// -----------------------------------------------------------------------------
// GenerateError enum

#[derive(thiserror::Error, Debug)]
pub enum GenerateError {
    #[error("failed to read request from '{0:?}', {1}")]
    Read(PathBuf, io::Error),
    #[error("failed to read request from standard input, {0}")]
    Stdin(io::Error),
    #[error("failed to deserialize generator request, {0}")]
    Deserialize(serde_yaml::Error),
    #[error("failed to render resources, {0}")]
    Generator(GeneratorError),
    #[error("failed to serialize generator response to yaml, {0}")]
    SerializeYaml(serde_yaml::Error),
    #[error("failed to serialize generator response to json, {0}")]
    SerializeJson(serde_json::Error),
}

// -----------------------------------------------------------------------------
// Generate struct

#[derive(Parser, Clone, Debug)]
pub struct Generate {
    /// Path to the generator request, read from standard input when omitted
    #[clap(short = 'r', long = "request")]
    pub request: Option<PathBuf>,
    /// Format of the generator response
    #[clap(short = 'o', long = "output", default_value = "yaml")]
    pub output: Output,
}

#[async_trait]
impl Executor for Generate {
    type Error = GenerateError;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error> {
        generate(config, &self.request, &self.output).await
    }
}

// -----------------------------------------------------------------------------
// generate function

pub async fn generate(
    config: Arc<Configuration>,
    request: &Option<PathBuf>,
    output: &Output,
) -> Result<(), GenerateError> {
    let buf = match request {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|err| GenerateError::Read(path.to_owned(), err))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(GenerateError::Stdin)?;
            buf
        }
    };

    let request: GeneratorRequest =
        serde_yaml::from_str(&buf).map_err(GenerateError::Deserialize)?;

    info!(
        project = %request.project,
        stack = %request.stack,
        app = %request.app,
        "render mysql accessory resources"
    );

    let mysql = MySql::try_new(&request).map_err(GenerateError::Generator)?;
    let response = mysql
        .generate(&request, &config)
        .map_err(GenerateError::Generator)?;

    let rendered = match output {
        Output::Yaml => serde_yaml::to_string(&response).map_err(GenerateError::SerializeYaml)?,
        Output::Json => {
            serde_json::to_string_pretty(&response).map_err(GenerateError::SerializeJson)?
        }
    };

    println!("{}", rendered);
    Ok(())
}
