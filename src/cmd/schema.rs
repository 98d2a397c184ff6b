//! # Schema module
//!
//! This module provides the schema command line interface function
//! implementation, exposing the accessory configuration contract

use std::sync::Arc;

use async_trait::async_trait;
use clap::Subcommand;
use schemars::schema_for;

use crate::{cmd::Executor, svc::cfg::Configuration, svc::mysql::MySql};

// -----------------------------------------------------------------------------
// SchemaError enum

#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    #[error("failed to serialize accessory configuration schema, {0}")]
    Serialize(serde_json::Error),
}

// -----------------------------------------------------------------------------
// Schema enum

#[derive(Subcommand, Clone, Debug)]
pub enum Schema {
    /// View the json schema of the mysql accessory configuration
    #[clap(name = "view", aliases = &["v"])]
    View,
}

#[async_trait]
impl Executor for Schema {
    type Error = SchemaError;

    async fn execute(&self, config: Arc<Configuration>) -> Result<(), Self::Error> {
        match self {
            Self::View => view(config).await,
        }
    }
}

// -----------------------------------------------------------------------------
// view function

pub async fn view(_config: Arc<Configuration>) -> Result<(), SchemaError> {
    let schema = schema_for!(MySql);

    println!(
        "{}",
        serde_json::to_string_pretty(&schema).map_err(SchemaError::Serialize)?
    );
    Ok(())
}
