use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use ironward_lib::backup::{self, RestoreMode, RestorePreview};
use ironward_lib::db::health::{DbHealthReport, DbHealthStatus};
use ironward_lib::model::Actor;
use ironward_lib::{logging, recovery};
use ironward_lib::{AppConfig, AppState, CollectionName};

const EXIT_OK: i32 = 0;
const EXIT_NEEDS_CONFIRMATION: i32 = 2;
const EXIT_UNHEALTHY: i32 = 3;

#[derive(Debug, Parser)]
#[command(name = "ironward", about = "Ironward records store maintenance", version)]
struct Cli {
    /// Also write JSON logs to a daily file under `<data_dir>/logs`.
    #[arg(long, global = true)]
    log_file: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database inspection commands.
    #[command(subcommand)]
    Db(DbCommand),
    /// Create and list snapshot files.
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Replace the stored collections with a snapshot file.
    Restore {
        file: PathBuf,
        /// Apply the restore. Without it only the preview is printed.
        #[arg(long)]
        yes: bool,
        /// Union by id with the current data instead of replacing it.
        #[arg(long)]
        merge: bool,
    },
    /// Empty every collection, keeping only the seed admin account.
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Read or overwrite a collection's raw JSON.
    #[command(subcommand)]
    Console(ConsoleCommand),
    /// Audit log inspection.
    #[command(subcommand)]
    Audit(AuditCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Run the SQLite and collection health checks and report their status.
    Status {
        /// Emit the raw JSON health report instead of the table view.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum BackupCommand {
    /// Write a snapshot of every collection to the backup directory.
    Create {
        /// Emit a machine-readable JSON object with the backup entry details.
        #[arg(long)]
        json: bool,
    },
    /// List snapshot files, newest first.
    List,
}

#[derive(Debug, Subcommand)]
enum ConsoleCommand {
    /// Print a collection as pretty JSON.
    Show {
        collection: String,
        #[arg(long)]
        passphrase: String,
    },
    /// Replace a collection with the JSON array in `file` (`-` for stdin).
    Set {
        collection: String,
        file: PathBuf,
        #[arg(long)]
        passphrase: String,
    },
}

#[derive(Debug, Subcommand)]
enum AuditCommand {
    /// Print the most recent audit entries.
    Tail {
        #[arg(short = 'n', long = "lines", default_value_t = 20)]
        n: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let log_guard = if cli.log_file {
        match logging::init_with_file(&config) {
            Ok(guard) => Some(guard),
            Err(err) => {
                ironward_lib::init_logging(&config.log_filter);
                tracing::warn!(target: "ironward", event = "log_file_unavailable", error = %err);
                None
            }
        }
    } else {
        ironward_lib::init_logging(&config.log_filter);
        None
    };
    recovery::install_panic_hook();

    let code = match run(cli.command, config) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            1
        }
    };
    drop(log_guard);
    process::exit(code);
}

fn run(command: Commands, config: AppConfig) -> Result<i32> {
    let runtime = Runtime::new().context("start async runtime")?;
    runtime.block_on(async move {
        let state = AppState::open(config).context("open data store")?;
        let result = handle(command, &state).await;
        state.close().await;
        result
    })
}

async fn handle(command: Commands, state: &AppState) -> Result<i32> {
    match command {
        Commands::Db(DbCommand::Status { json }) => handle_db_status(state, json).await,
        Commands::Backup(BackupCommand::Create { json }) => handle_backup_create(state, json).await,
        Commands::Backup(BackupCommand::List) => handle_backup_list(state).await,
        Commands::Restore { file, yes, merge } => handle_restore(state, &file, yes, merge).await,
        Commands::Reset { yes } => handle_reset(state, yes).await,
        Commands::Console(command) => handle_console(state, command).await,
        Commands::Audit(AuditCommand::Tail { n }) => handle_audit_tail(state, n).await,
    }
}

async fn handle_db_status(state: &AppState, json: bool) -> Result<i32> {
    let report = recovery::check_health(state)
        .await
        .context("run database health checks")?;

    if json {
        let json = serde_json::to_string_pretty(&report).context("serialize health report")?;
        println!("{json}");
    } else {
        print_report_table(&report);
    }

    Ok(match report.status {
        DbHealthStatus::Ok => EXIT_OK,
        DbHealthStatus::Error => EXIT_UNHEALTHY,
    })
}

async fn handle_backup_create(state: &AppState, json: bool) -> Result<i32> {
    let entry = backup::write_snapshot_file(&state.store, &state.config)
        .await
        .context("create backup")?;
    if json {
        let serialized = serde_json::to_string(&entry).context("serialize backup entry")?;
        println!("{serialized}");
    } else {
        println!("Backup stored at {}", entry.path);
    }
    Ok(EXIT_OK)
}

async fn handle_backup_list(state: &AppState) -> Result<i32> {
    let entries = backup::list_snapshot_files(&state.config.backup_dir())
        .await
        .context("list backups")?;
    if entries.is_empty() {
        println!("No backups in {}", state.config.backup_dir().display());
        return Ok(EXIT_OK);
    }
    println!("{:<32} {:<26} {:>12}", "File", "Created", "Bytes");
    for entry in entries {
        println!(
            "{:<32} {:<26} {:>12}",
            entry.file_name, entry.created_at, entry.size_bytes
        );
    }
    Ok(EXIT_OK)
}

async fn handle_restore(state: &AppState, file: &Path, yes: bool, merge: bool) -> Result<i32> {
    let snapshot = backup::read_snapshot_file(file)
        .await
        .with_context(|| format!("read snapshot {}", file.display()))?;
    let pending = backup::prepare_restore(snapshot);
    print_preview(pending.preview());

    if !yes {
        eprintln!("Restore not applied. Re-run with --yes to overwrite the current data.");
        return Ok(EXIT_NEEDS_CONFIRMATION);
    }

    let mode = if merge {
        RestoreMode::Merge
    } else {
        RestoreMode::Replace
    };
    let _guard = state.begin_maintenance()?;
    let report = backup::restore(&state.store, pending.confirm(), mode)
        .await
        .context("apply restore")?;
    let written: usize = report.written.iter().map(|(_, count)| count).sum();
    println!(
        "Restore complete ({:?}): {} collections, {} records.",
        report.mode,
        report.written.len(),
        written
    );
    Ok(EXIT_OK)
}

async fn handle_reset(state: &AppState, yes: bool) -> Result<i32> {
    if !yes {
        eprintln!("Reset not applied. Re-run with --yes to erase every collection.");
        return Ok(EXIT_NEEDS_CONFIRMATION);
    }
    let _guard = state.begin_maintenance()?;
    backup::reset_system(&state.store)
        .await
        .context("reset system")?;
    println!("System reset. Only the seed admin account remains.");
    Ok(EXIT_OK)
}

async fn handle_console(state: &AppState, command: ConsoleCommand) -> Result<i32> {
    match command {
        ConsoleCommand::Show {
            collection,
            passphrase,
        } => {
            let name = parse_collection(&collection)?;
            let console = state.console(&passphrase)?;
            println!("{}", console.read_raw(name).await?);
        }
        ConsoleCommand::Set {
            collection,
            file,
            passphrase,
        } => {
            let name = parse_collection(&collection)?;
            let console = state.console(&passphrase)?;
            let text = read_input(&file)?;
            let report = console
                .update_raw_text(name, &text, &Actor::system())
                .await?;
            if let Some(warning) = report.warning() {
                eprintln!("Warning: {warning}");
            }
            println!("Replaced {} with {} records.", report.collection, report.records);
        }
    }
    Ok(EXIT_OK)
}

async fn handle_audit_tail(state: &AppState, n: usize) -> Result<i32> {
    let entries = state.audit.tail(n).await.context("read audit log")?;
    for entry in entries {
        println!(
            "{:<29} {:<7} {:<16} {}",
            entry.timestamp,
            entry.action.as_str(),
            entry.user_name,
            entry.target
        );
    }
    Ok(EXIT_OK)
}

fn parse_collection(value: &str) -> Result<CollectionName> {
    Ok(value.parse::<CollectionName>()?)
}

fn read_input(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        return std::io::read_to_string(std::io::stdin()).context("read stdin");
    }
    std::fs::read_to_string(file).with_context(|| format!("read {}", file.display()))
}

fn print_preview(preview: &RestorePreview) {
    println!("Snapshot version : {}", preview.version);
    println!("Created at       : {}", preview.created_at);
    for (name, count) in &preview.counts {
        println!("  {:<12} {:>6}", name.as_str(), count);
    }
    if !preview.missing.is_empty() {
        let missing: Vec<&str> = preview.missing.iter().map(|name| name.as_str()).collect();
        println!("Not in snapshot  : {}", missing.join(", "));
    }
}

fn print_report_table(report: &DbHealthReport) {
    println!("Database health report");
    println!("Status       : {}", status_label(&report.status));
    println!("App version  : {}", report.app_version);
    println!("Generated at : {}", report.generated_at);

    println!("\nChecks:");
    println!(
        "{:<20} {:<7} {:>13}  Details",
        "Check", "Passed", "Duration (ms)"
    );
    for check in &report.checks {
        let passed = if check.passed { "yes" } else { "no" };
        let details = check
            .details
            .as_deref()
            .map(|value| value.replace('\n', " "))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<7} {:>13}  {}",
            check.name, passed, check.duration_ms, details
        );
    }

    let corrupt: Vec<_> = report.corrupt_collections().collect();
    if corrupt.is_empty() {
        println!("\nCorrupt collections: none");
    } else {
        println!("\nCorrupt collections:");
        for collection in corrupt {
            println!("  {}", collection.name.as_str());
        }
    }
}

fn status_label(status: &DbHealthStatus) -> &'static str {
    match status {
        DbHealthStatus::Ok => "ok",
        DbHealthStatus::Error => "error",
    }
}
