use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tabula_core::{DialectKind, MigrationManager, MigrationState, MigrationStatus};
use tabula_db::{scaffold, MigrationSource, TabulaConfig, DEFAULT_CONFIG_FILE};
use tabula_sqlite::SqliteStorage;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "tabula")]
#[command(about = "Schema migrations and table inspection for tabula projects")]
#[command(version)]
struct Cli {
    /// Project configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Database location, overriding the configuration.
    #[arg(long, global = true)]
    database: Option<String>,
    /// Log filter used when RUST_LOG is unset (e.g. debug, tabula_core=trace).
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply, revert and inspect migrations.
    Migrate(MigrateArgs),
    /// List the tables in the database.
    Tables,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    #[command(subcommand)]
    operation: MigrateOperation,
}

#[derive(Debug, Subcommand)]
enum MigrateOperation {
    /// Register scripts from the migrations directory and apply pending ones.
    Up,
    /// Revert the most recently applied migrations.
    Down(MigrateDownArgs),
    /// Show applied and pending migrations.
    Status(MigrateStatusArgs),
    /// Write an empty up/down script pair.
    Create(MigrateCreateArgs),
}

#[derive(Debug, Args)]
struct MigrateDownArgs {
    /// Number of migrations to revert.
    #[arg(long, default_value_t = 1)]
    steps: usize,
}

#[derive(Debug, Args)]
struct MigrateStatusArgs {
    /// Print the status as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct MigrateCreateArgs {
    /// Migration name; normalized to lower_snake_case.
    name: String,
}

/// One line of `migrate status --json`.
#[derive(Debug, Serialize)]
struct StatusEntry<'a> {
    name: &'a str,
    description: &'a str,
    state: MigrationState,
    applied_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    ledger_table: &'a str,
    applied: usize,
    pending: usize,
    migrations: Vec<StatusEntry<'a>>,
}

fn main() {
    let cli = Cli::parse();

    let result = load_config(&cli).and_then(|config| {
        init_tracing(cli.log_level.as_deref().unwrap_or(&config.log_level));
        debug!(config = %cli.config.display(), dialect = %config.dialect, "configuration loaded");
        match cli.command {
            Command::Migrate(args) => run_migrate(&config, args),
            Command::Tables => run_tables(&config),
        }
    });

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn load_config(cli: &Cli) -> Result<TabulaConfig, String> {
    let mut config = TabulaConfig::load_or_default(&cli.config)
        .map_err(|e| format!("failed to load config '{}': {e}", cli.config.display()))?;
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Opens the configured database; only SQLite has an executable backend.
fn open_storage(config: &TabulaConfig) -> Result<SqliteStorage, String> {
    match config.dialect_kind().map_err(|e| e.to_string())? {
        DialectKind::Sqlite => SqliteStorage::open(&config.database)
            .map_err(|e| format!("failed to open database '{}': {e}", config.database)),
        other => Err(format!(
            "dialect '{other}' is not supported for execution; only sqlite databases can be opened"
        )),
    }
}

fn migration_manager<'s>(
    storage: &'s SqliteStorage,
    config: &TabulaConfig,
) -> Result<MigrationManager<'s>, String> {
    storage
        .migrations(&config.ledger_table)
        .map_err(|e| format!("invalid ledger table: {e}"))
}

/// Registers on-disk scripts with the ledger. A missing directory is
/// treated as holding no scripts.
fn sync_scripts(config: &TabulaConfig, manager: &MigrationManager<'_>) -> Result<usize, String> {
    if !config.migrations_dir.is_dir() {
        debug!(dir = %config.migrations_dir.display(), "no migrations directory");
        return Ok(0);
    }
    let source = MigrationSource::from_dir(&config.migrations_dir).map_err(|e| {
        format!(
            "failed to read migrations from '{}': {e}",
            config.migrations_dir.display()
        )
    })?;
    source
        .sync(manager)
        .map(|registered| registered.len())
        .map_err(|e| format!("failed to register migrations: {e}"))
}

fn run_migrate(config: &TabulaConfig, args: MigrateArgs) -> Result<(), String> {
    match args.operation {
        MigrateOperation::Up => run_migrate_up(config),
        MigrateOperation::Down(a) => run_migrate_down(config, a),
        MigrateOperation::Status(a) => run_migrate_status(config, a),
        MigrateOperation::Create(a) => run_migrate_create(config, a),
    }
}

fn run_migrate_up(config: &TabulaConfig) -> Result<(), String> {
    let storage = open_storage(config)?;
    let manager = migration_manager(&storage, config)?;
    sync_scripts(config, &manager)?;

    let applied = manager
        .migrate_up()
        .map_err(|e| format!("migration up failed: {e}"))?;
    if applied.is_empty() {
        println!("Nothing to migrate.");
        return Ok(());
    }
    println!("Applied {} migration(s):", applied.len());
    for name in &applied {
        println!("  {name}");
    }
    Ok(())
}

fn run_migrate_down(config: &TabulaConfig, args: MigrateDownArgs) -> Result<(), String> {
    if args.steps == 0 {
        return Err("--steps must be at least 1".to_string());
    }
    let storage = open_storage(config)?;
    let manager = migration_manager(&storage, config)?;

    let applied = manager
        .applied()
        .map_err(|e| format!("failed to read ledger: {e}"))?;
    if applied.is_empty() {
        println!("Nothing to revert.");
        return Ok(());
    }
    let steps = args.steps.min(applied.len());
    let reverted = manager
        .rollback(steps)
        .map_err(|e| format!("migration down failed: {e}"))?;
    println!("Reverted {} migration(s):", reverted.len());
    for migration in &reverted {
        println!("  {}", migration.name);
    }
    Ok(())
}

fn run_migrate_status(config: &TabulaConfig, args: MigrateStatusArgs) -> Result<(), String> {
    let storage = open_storage(config)?;
    let manager = migration_manager(&storage, config)?;
    sync_scripts(config, &manager)?;
    let status = manager
        .status()
        .map_err(|e| format!("failed to get migration status: {e}"))?;

    if args.json {
        let report = status_report(&config.ledger_table, &status);
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("JSON serialization failed: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    println!("Migration Status ({}):", config.ledger_table);
    println!("  Applied: {}", status.applied);
    println!("  Pending: {}", status.pending);
    for migration in &status.migrations {
        match migration.applied_at {
            Some(at) => println!("  [applied {}] {}", at.format("%Y-%m-%d %H:%M:%S"), migration.name),
            None => println!("  [pending] {}", migration.name),
        }
    }
    Ok(())
}

fn run_migrate_create(config: &TabulaConfig, args: MigrateCreateArgs) -> Result<(), String> {
    let name = scaffold(&config.migrations_dir, &args.name, Utc::now())
        .map_err(|e| format!("failed to create migration: {e}"))?;
    info!(migration = %name, "scaffolded migration");
    let dir = config.migrations_dir.display();
    println!("Created {dir}/{name}.up.sql");
    println!("Created {dir}/{name}.down.sql");
    Ok(())
}

fn run_tables(config: &TabulaConfig) -> Result<(), String> {
    let storage = open_storage(config)?;
    let tables = storage
        .session()
        .list_tables()
        .map_err(|e| format!("failed to list tables: {e}"))?;
    for table in &tables {
        println!("{table}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn status_report<'a>(ledger_table: &'a str, status: &'a MigrationStatus) -> StatusReport<'a> {
    StatusReport {
        ledger_table,
        applied: status.applied,
        pending: status.pending,
        migrations: status
            .migrations
            .iter()
            .map(|m| StatusEntry {
                name: &m.name,
                description: &m.description,
                state: m.state(),
                applied_at: m.applied_at,
            })
            .collect(),
    }
}
