use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use voxchain::{
    agent::ModelRegistry,
    cli::{
        commands::{RunCommand, StatusCommand, ValidateCommand},
        output::*,
        Cli, Command,
    },
    core::{state::ExecutionState, validation, PipelineConfiguration},
    execution::{ExecutionEvent, FileDiscovery, PipelineExecutor},
    storage::{FileStore, LocalFileStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli).await?,
        Command::Validate(cmd) => validate_pipeline(cmd, &cli)?,
        Command::Status(cmd) => show_status(cmd, &cli).await?,
    }

    Ok(())
}

async fn run_pipeline(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    let (config, vault) = cli.load_configuration()?;
    println!(
        "{} Loaded {} step(s) for vault {}",
        INFO,
        style(config.steps.len()).cyan(),
        style(vault.display()).bold()
    );

    let models = ModelRegistry::from_config(&config).context("Failed to set up model clients")?;
    let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(&vault));
    let engine = PipelineExecutor::new(config, store, models, ExecutionState::shared());

    if !engine.validation().is_valid {
        for line in format_validation(engine.validation()) {
            println!("{}", line);
        }
        std::process::exit(1);
    }

    // Set up event handler for console output
    let spinner = create_spinner();
    let progress = spinner.clone();
    engine.add_event_handler(move |event| {
        if let ExecutionEvent::StepStarted { step_id, path, .. } = &event {
            progress.set_message(format!("{} {}", step_id, path));
        }
        progress.println(format_execution_event(&event));
    });

    let started = Instant::now();
    let limit = if cmd.all { cmd.max_files } else { Some(1) };
    let outcomes = match engine.process_batch(limit).await {
        Ok(outcomes) => outcomes,
        Err(e) => {
            spinner.finish_and_clear();
            error!("{}", e);
            return Err(e.into());
        }
    };
    spinner.finish_and_clear();

    if outcomes.is_empty() {
        println!("{} No files waiting at any entry point", INFO);
    }
    let mut failed_sources = Vec::new();
    for outcome in outcomes.iter().filter(|o| !o.is_success()) {
        for failure in outcome.failures() {
            println!(
                "  {} {} {}",
                format_step_status(failure.status),
                failure.step_id,
                style(&failure.input_path).dim()
            );
        }
        failed_sources.push(outcome.source.path.clone());
    }
    let processed = outcomes.len();

    let stats = engine.stats();
    println!(
        "\n{} Processed {} file(s) in {} ({} section(s) parsed, {} routed)",
        INFO,
        style(processed).cyan(),
        format_duration(started.elapsed()),
        stats.sections_parsed,
        stats.routed_sections
    );

    if failed_sources.is_empty() {
        if processed > 0 {
            println!("{} All chains completed {}", CHECK, style("successfully").green());
        }
    } else {
        println!("{} {} file(s) {}:", CROSS, failed_sources.len(), style("failed").red());
        failed_sources.sort();
        for path in failed_sources {
            println!("  {}", path);
        }
        std::process::exit(1);
    }

    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand, cli: &Cli) -> Result<()> {
    if !cmd.json {
        println!("{} Validating pipeline...", INFO);
    }

    let (config, _) = match cli.load_configuration() {
        Ok(loaded) => loaded,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    };
    let result = validation::validate(&config);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in format_validation(&result) {
            println!("{}", line);
        }
        println!("  Steps: {}", style(config.steps.len()).cyan());
        println!("  Models: {}", style(config.models.len()).cyan());
    }

    if !result.is_valid {
        std::process::exit(1);
    }
    Ok(())
}

async fn show_status(cmd: &StatusCommand, cli: &Cli) -> Result<()> {
    let (config, vault) = cli.load_configuration()?;
    let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(&vault));
    let discovery = FileDiscovery::new(store);
    let entry_points = validation::entry_points(&config.steps);

    let mut pending = Vec::new();
    for step_id in &entry_points {
        let files = discovery.list_pending(&config, step_id).await?;
        pending.push((step_id.clone(), files));
    }

    if cmd.json {
        let data: Vec<_> = pending
            .iter()
            .map(|(step, files)| json!({ "step": step, "pending": files }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&json!({ "entry_points": data }))?);
        return Ok(());
    }

    print_status(&config, &pending);
    Ok(())
}

fn print_status(config: &PipelineConfiguration, pending: &[(String, Vec<String>)]) {
    if pending.is_empty() {
        println!("{} No entry points configured", WARN);
        return;
    }
    println!("{} Entry points:", INFO);
    for (step_id, files) in pending {
        let input = config.step(step_id).map(|s| s.input_pattern.as_str()).unwrap_or("");
        println!(
            "  {} ({}) - {} pending",
            style(step_id).bold(),
            style(input).dim(),
            style(files.len()).cyan()
        );
        for file in files {
            println!("    {}", file);
        }
    }
}
