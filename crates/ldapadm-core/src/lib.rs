//! # ldapadm-core
//!
//! Core types shared by the ldapadm directory administration tool.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy for directory operations
//! - [`config`] - Typed tool configuration, item type descriptors and connection settings

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{
    AttributeValues, AuthMode, ConnectionSettings, Credentials, ItemType, ItemTypeConfig,
    OptionValue, ToolConfig, DEFAULT_CONFIG_PATH, DEFAULT_MEMBER_ATTRIBUTE,
};
pub use error::{Error, Result};
