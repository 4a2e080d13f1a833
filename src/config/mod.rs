//! Configuration management
//!
//! Handles connection descriptors and checkpoint options.

pub mod connections;
pub mod settings;

pub use connections::{ConnectionConfig, SslMode};
pub use settings::{CheckpointOptions, load_options, load_options_from};
