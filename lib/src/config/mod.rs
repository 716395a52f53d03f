//! Configuration module for support generation.
//!
//! This module provides the user-facing parameter record for the tree
//! support engine together with its error type. Values are stored in the
//! units a user would type (millimetres and degrees); the engine derives
//! its working quantities from them in `support::tree_support_settings`.

mod tree_support_config;

pub use tree_support_config::{ConfigError, ConfigResult, TreeSupportConfig};
