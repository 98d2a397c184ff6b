//! # Services module
//!
//! This module provide the host framework contract, the mysql accessory
//! generators and helpers to interact with the configuration
pub mod cfg;
pub mod framework;
pub mod mysql;
