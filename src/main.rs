//! docker-converge CLI entrypoint.
//!
//! This is the main entrypoint for the docker-converge command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use docker_converge::adapter::{SnapshotAdapter, generate_holder_id};
use docker_converge::cli::{Cli, Commands, OutputFormat, OutputFormatter, StateCommands};
use docker_converge::config::{ConfigParser, ConfigValidator, ManifestConfig, find_config_file};
use docker_converge::error::{ConvergeError, Result};
use docker_converge::model::ResourceKind;
use docker_converge::planner::PlanExecutor;
use docker_converge::reconciler::Reconciler;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` wins over `--verbose` when set.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);
    let config = cli.config.as_ref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force).map(|()| ExitCode::SUCCESS),
        Commands::Validate { warnings } => cmd_validate(config, warnings, &formatter),
        Commands::Plan { detailed } => cmd_plan(config, detailed, &formatter).await,
        Commands::Apply { yes, continue_on_error } => {
            cmd_apply(config, yes, continue_on_error, cli.output, &formatter).await
        }
        Commands::Drift => cmd_drift(config, &formatter).await,
        Commands::Policies { kind } => cmd_policies(kind.as_deref(), &formatter),
        Commands::State { command } => cmd_state(config, command, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing new project in: {}", path.display());

    let config_path = path.join("converge.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Manifest already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/converge.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", ".converge/"]
            .into_iter()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new().append(true).open(&gitignore_path)?;
            writeln!(file, "\n# docker-converge")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, ".env\n.converge/\n")?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Edit converge.yaml with your resources");
    eprintln!("  2. Run 'docker-converge validate' to check the manifest");
    eprintln!("  3. Run 'docker-converge plan' to see what would change");
    eprintln!("  4. Run 'docker-converge apply' to converge the backend");

    Ok(())
}

/// Validate the manifest.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool, formatter: &OutputFormatter) -> Result<ExitCode> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating manifest: {}", config_file.display());

    let manifest = load_manifest(&config_file)?;
    let result = ConfigValidator::new().check(&manifest);

    eprintln!("{}", formatter.format_validation(&manifest, &result, show_warnings));

    Ok(if result.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Show the reconcile plan.
async fn cmd_plan(config_path: Option<&PathBuf>, detailed: bool, formatter: &OutputFormatter) -> Result<ExitCode> {
    let (manifest, adapter) = load_manifest_and_adapter(config_path)?;

    let plan = Reconciler::new(&adapter).plan_manifest(&manifest).await?;
    eprintln!("{}", formatter.format_plan(&plan, detailed));

    Ok(ExitCode::SUCCESS)
}

/// Apply the reconcile plan.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    continue_on_error: bool,
    output: OutputFormat,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    if !auto_approve && output == OutputFormat::Json {
        return Err(ConvergeError::internal("JSON output requires --yes for apply"));
    }

    let (manifest, adapter) = load_manifest_and_adapter(config_path)?;

    // Planning and execution both happen under the lock.
    let lock = adapter.acquire_lock(&generate_holder_id()).await?;
    debug!("Acquired snapshot lock {}", lock.lock_id);

    let result = apply_locked(&adapter, &manifest, auto_approve, continue_on_error, formatter).await;

    if let Err(e) = adapter.release_lock(&lock.lock_id).await {
        warn!("Failed to release snapshot lock {}: {e}", lock.lock_id);
    }
    result
}

/// Plans, confirms and executes while the caller holds the snapshot lock.
async fn apply_locked(
    adapter: &SnapshotAdapter,
    manifest: &ManifestConfig,
    auto_approve: bool,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let plan = Reconciler::new(adapter).plan_manifest(manifest).await?;
    if plan.is_empty() {
        eprintln!("No changes to apply.");
        return Ok(ExitCode::SUCCESS);
    }

    eprintln!("{}", formatter.format_plan(&plan, false));

    if !auto_approve {
        eprint!("Do you want to apply this plan? [y/N]: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Apply cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let report = PlanExecutor::new(adapter, manifest)
        .with_continue_on_error(continue_on_error)
        .execute(&plan)
        .await?;
    eprintln!("{}", formatter.format_execution(&report));

    Ok(if report.all_successful() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Check for drift.
async fn cmd_drift(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<ExitCode> {
    let (manifest, adapter) = load_manifest_and_adapter(config_path)?;

    let report = Reconciler::new(&adapter).check_drift(&manifest).await?;
    eprintln!("{}", formatter.format_drift(&report));

    // Drift is reported through the exit status for scripting.
    Ok(if report.is_converged() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

/// Show policy tables.
fn cmd_policies(kind: Option<&str>, formatter: &OutputFormatter) -> Result<ExitCode> {
    let kinds: Vec<ResourceKind> = match kind {
        Some(name) => vec![ResourceKind::from_name(name).ok_or_else(|| {
            ConvergeError::internal(format!(
                "Unknown resource kind '{name}'; expected one of container, service, network, volume"
            ))
        })?],
        None => ResourceKind::ALL.to_vec(),
    };

    let tables = kinds
        .into_iter()
        .map(ResourceKind::policy_table)
        .collect::<Result<Vec<_>>>()?;
    eprintln!("{}", formatter.format_policies(&tables));

    Ok(ExitCode::SUCCESS)
}

/// Snapshot management commands.
async fn cmd_state(config_path: Option<&PathBuf>, command: StateCommands, formatter: &OutputFormatter) -> Result<ExitCode> {
    let (_manifest, adapter) = load_manifest_and_adapter(config_path)?;

    match command {
        StateCommands::Show => {
            let snapshot = adapter.load().await?;
            let lock = adapter.get_lock_info().await?;
            eprintln!("{}", formatter.format_snapshot(&snapshot, lock.as_ref()));
        }
        StateCommands::Lock { holder } => {
            let holder = holder.unwrap_or_else(generate_holder_id);
            let lock = adapter.acquire_lock(&holder).await?;
            eprintln!("{}", formatter.format_lock(&lock));
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                adapter.force_unlock().await?;
                eprintln!("Snapshot forcefully unlocked.");
            } else if let Some(id) = lock_id {
                adapter.release_lock(&id).await?;
                eprintln!("Snapshot unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the manifest path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads `.env` next to the manifest, then the manifest with environment overrides.
fn load_manifest(config_file: &Path) -> Result<ManifestConfig> {
    let parser = ConfigParser::new().with_base_path(manifest_dir(config_file));
    parser.load_dotenv()?;
    parser.load_with_env(config_file)
}

/// Loads and validates the manifest and opens its snapshot backend.
fn load_manifest_and_adapter(config_path: Option<&PathBuf>) -> Result<(ManifestConfig, SnapshotAdapter)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading manifest from: {}", config_file.display());

    let manifest = load_manifest(&config_file)?;
    ConfigValidator::new().validate(&manifest)?;

    let snapshot = Path::new(&manifest.backend.snapshot);
    let snapshot_path = if snapshot.is_absolute() {
        snapshot.to_path_buf()
    } else {
        manifest_dir(&config_file).join(snapshot)
    };
    debug!("Using snapshot: {}", snapshot_path.display());

    let adapter = SnapshotAdapter::new(snapshot_path).with_api_version(manifest.api_version()?);
    Ok((manifest, adapter))
}

/// Directory containing the manifest.
fn manifest_dir(config_file: &Path) -> &Path {
    config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}
