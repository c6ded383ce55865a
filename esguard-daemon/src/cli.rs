//! CLI argument definitions for esguard-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use esguard_core::config::EsguardConfig;

/// Rule-driven Elasticsearch polling detector.
///
/// Polls the configured indices for documents matching each detection rule
/// and writes normalized events to stdout, one per line.
#[derive(Parser, Debug)]
#[command(name = "esguard-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to esguard.toml configuration file.
    #[arg(short, long, default_value = "/etc/esguard/esguard.toml")]
    pub config: PathBuf,

    /// Override the rule file path (takes precedence over the config file).
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and rule file, then exit without polling.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply command-line overrides on top of file and environment values.
    pub fn apply_overrides(&self, config: &mut EsguardConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(rules) = &self.rules {
            config.detector.rules_path = rules.display().to_string();
        }
    }
}
