//! Command-line interface

pub mod commands;
pub mod output;

use crate::core::config::PipelineConfiguration;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use commands::{RunCommand, StatusCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Routes voice notes and documents through model-driven steps
#[derive(Debug, Parser, Clone)]
#[command(name = "voxchain")]
#[command(version)]
#[command(about = "Route notes through transcription and LLM steps", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the pipeline configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Vault root all step paths are relative to
    #[arg(long, global = true)]
    pub vault: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Process the next file (or every file with --all)
    Run(RunCommand),

    /// Validate the pipeline configuration
    Validate(ValidateCommand),

    /// Show pending files per entry point
    Status(StatusCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    /// Load the configuration and work out the vault root
    ///
    /// `--config` wins; otherwise the vault's `voxchain.yaml`, then the user
    /// config directory. The vault is `--vault`, else the file's `vault`
    /// key, else the current directory.
    pub fn load_configuration(&self) -> Result<(PipelineConfiguration, PathBuf)> {
        let vault_hint = self.vault.clone().unwrap_or_else(|| PathBuf::from("."));
        let path = match &self.config {
            Some(path) => path.clone(),
            None => {
                let candidates = PipelineConfiguration::default_locations(&vault_hint);
                candidates.iter().find(|p| p.is_file()).cloned().ok_or_else(|| {
                    let looked: Vec<String> =
                        candidates.iter().map(|p| p.display().to_string()).collect();
                    anyhow!("No configuration found (looked in {})", looked.join(", "))
                })?
            }
        };

        let config = PipelineConfiguration::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        let vault = self
            .vault
            .clone()
            .or_else(|| config.vault.clone())
            .unwrap_or(vault_hint);
        Ok((config, vault))
    }
}
