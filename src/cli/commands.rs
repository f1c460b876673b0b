//! CLI command definitions

use clap::Args;

/// Process files waiting at entry-point steps
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Keep processing until no eligible file is left
    #[arg(long)]
    pub all: bool,

    /// Stop after this many files (with --all)
    #[arg(long, requires = "all")]
    pub max_files: Option<usize>,
}

/// Validate the pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show entry points and the files waiting at each
#[derive(Debug, Args, Clone)]
pub struct StatusCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
