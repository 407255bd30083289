//! CLI module for yasai-gate
//!
//! Provides the operator command-line interface with:
//!
//! - Human and JSON output formats
//! - Configuration file support
//! - A scripted rewarded ad for exercising the unlock flow
//!
//! ## Usage
//!
//! ```bash
//! # Lock state of one item
//! yasai-gate status だいこん
//!
//! # Run the unlock flow with an ad that is closed early
//! yasai-gate unlock だいこん --simulate dismiss
//!
//! # Ordered catalog, JSON for scripting
//! yasai-gate catalog items.json --sort month --desc --json | jq '.rows[0]'
//!
//! # Configuration management
//! yasai-gate config --list
//! yasai-gate config --set unlock.lockable_items=だいこん,いちご
//! ```
//!
//! ## Module Structure
//!
//! - `commands`: CLI command definitions using clap
//! - `output`: Output formatters for different formats
//! - `config`: Configuration file handling

pub mod commands;
pub mod config;
pub mod output;

// Re-exports for convenience
pub use commands::{Cli, CliOutputFormat, CliSortKey, Commands, SimulatedAd};
pub use config::{
    AdsConfig, ConfigError, DisplayConfig, EntitlementConfig, GateConfig, OutputConfig,
    StorageConfig, UnlockConfig,
};
pub use output::{create_formatter, OutputFormat, OutputFormatter};
