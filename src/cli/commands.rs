//! CLI command definitions for yasai-gate
//!
//! Defines all CLI commands and arguments using clap derive macros.
//!
//! ## Commands
//!
//! - `status` - Show lock state and remaining time for an item
//! - `unlock` - Run the rewarded-ad unlock flow with a simulated ad
//! - `grant` - Unlock an item directly, without an ad
//! - `sweep` - Remove expired unlocks
//! - `catalog` - Print the ordered catalog with lock state
//! - `entitlement` - Show or set the cached subscription flag
//! - `config` - Show or modify configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::catalog::{SortKey, SortOrder, SortSpec};

// =============================================================================
// Main CLI
// =============================================================================

/// yasai-gate - Ad-gated unlocks for the vegetable price catalog
#[derive(Parser, Debug)]
#[command(name = "yasai-gate")]
#[command(about = "Ad-gated unlocks for the vegetable price catalog", long_about = None)]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Override the data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Keep all state in memory for this run
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// Output as JSON (shorthand for --format json)
    #[arg(long, global = true)]
    pub json: bool,
}

impl Cli {
    /// Output format from flags, falling back to the configured default
    pub fn output_format(&self, configured: &str) -> super::output::OutputFormat {
        if self.json {
            return super::output::OutputFormat::Json;
        }
        match self.format {
            Some(format) => format.into(),
            None => configured.parse().unwrap_or_default(),
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show lock state and remaining unlock time for an item
    Status {
        /// Item id
        item: String,
    },

    /// Watch a (simulated) rewarded ad to unlock an item
    Unlock {
        /// Item id
        item: String,

        /// How the simulated ad ends
        #[arg(long, value_enum, default_value = "reward")]
        simulate: SimulatedAd,
    },

    /// Unlock an item directly, bypassing the ad
    Grant {
        /// Item id
        item: String,

        /// Unlock window in seconds (defaults to the configured duration)
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Remove every expired unlock
    Sweep,

    /// Print the ordered catalog with lock state
    Catalog {
        /// JSON file with a list of catalog items
        items: PathBuf,

        /// Sort key
        #[arg(short, long, value_enum, default_value = "name")]
        sort: CliSortKey,

        /// Sort descending
        #[arg(long)]
        desc: bool,
    },

    /// Show or set the cached subscription flag
    Entitlement {
        /// Record a purchase (true) or cancellation (false)
        #[arg(long)]
        set: Option<bool>,
    },

    /// Show or modify configuration
    Config {
        /// Get a configuration value (e.g., unlock.duration_secs)
        #[arg(long)]
        get: Option<String>,

        /// Set a configuration value (e.g., unlock.lockable_items=だいこん,いちご)
        #[arg(long)]
        set: Option<String>,

        /// List all configuration values
        #[arg(long)]
        list: bool,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,

        /// Show configuration file path
        #[arg(long)]
        path: bool,
    },
}

/// Scripted outcome for `unlock --simulate`
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SimulatedAd {
    /// Reward earned, then closed
    Reward,
    /// Closed before the reward
    Dismiss,
    /// Failed while showing
    Error,
}

/// Catalog sort key (CLI compatible)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CliSortKey {
    /// 50音順 by display name
    #[default]
    Name,
    /// Change versus last month
    Month,
    /// Change versus last year
    Year,
}

impl CliSortKey {
    pub fn spec(self, desc: bool) -> SortSpec {
        let key = match self {
            CliSortKey::Name => SortKey::Name,
            CliSortKey::Month => SortKey::LastMonthRate,
            CliSortKey::Year => SortKey::LastYearRate,
        };
        let order = if desc {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };
        SortSpec::new(key, order)
    }
}

/// Output format (CLI compatible)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CliOutputFormat {
    #[default]
    Human,
    Json,
}

impl From<CliOutputFormat> for super::output::OutputFormat {
    fn from(f: CliOutputFormat) -> Self {
        match f {
            CliOutputFormat::Human => super::output::OutputFormat::Human,
            CliOutputFormat::Json => super::output::OutputFormat::Json,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
