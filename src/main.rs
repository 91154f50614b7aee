use anyhow::Result;
use clap::{Parser, Subcommand};

use audit_trail::cli::{handle_history_command, handle_row_command};
use audit_trail::config::{paths::AuditPaths, settings::Settings};
use audit_trail::storage::Database;

#[derive(Parser)]
#[command(
    name = "audit-trail",
    version,
    about = "Change-history engine with actor attribution and field-level diffs",
    long_about = "audit-trail records every insert, update and delete on audited tables \
                  together with the acting user, and renders the history as field-level \
                  diffs for administrators."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit history (read endpoint)
    #[command(subcommand, alias = "log")]
    History(audit_trail::cli::HistoryCommands),

    /// Domain row writes
    #[command(subcommand)]
    Row(audit_trail::cli::RowCommands),

    /// Initialize the data directory and default settings
    Init,

    /// Show current configuration and paths
    Config,
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    // Initialize paths and settings
    let paths = AuditPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;

    match cli.command {
        Some(Commands::History(cmd)) => {
            let db = Database::open(paths, settings)?;
            handle_history_command(&db, cmd)?;
        }
        Some(Commands::Row(cmd)) => {
            let db = Database::open(paths, settings)?;
            handle_row_command(&db, cmd)?;
        }
        Some(Commands::Init) => {
            println!("Initializing audit-trail at: {}", paths.base_dir().display());
            paths.ensure_directories()?;
            settings.save(&paths)?;
            println!("Initialization complete!");
            println!();
            println!("Identity table: {}", settings.identity_table);
            println!("Run 'audit-trail history list' to see recorded events.");
        }
        Some(Commands::Config) => {
            println!("audit-trail Configuration");
            println!("=========================");
            println!("Base directory: {}", paths.base_dir().display());
            println!("Settings file:  {}", paths.settings_file().display());
            println!("Data directory: {}", paths.data_dir().display());
            println!("Event log:      {}", paths.event_log().display());
            println!(
                "Initialized:    {}",
                if paths.is_initialized() { "yes" } else { "no (run 'audit-trail init')" }
            );
            println!();
            println!("Settings:");
            println!("  Identity table:   {}", settings.identity_table);
            println!("  Audited tables:   {}", settings.audit.audited_tables.join(", "));
            println!(
                "  Actor join:       {}",
                if settings.has_actor_relationship() {
                    "declared"
                } else {
                    "missing (fallback lookup)"
                }
            );
            for relationship in &settings.relationships {
                println!("  Relationship:     {}", relationship);
            }
            println!(
                "  Page size:        {} (max {})",
                settings.pagination.effective_default_limit(),
                settings.pagination.effective_max_limit()
            );
        }
        None => {
            println!("audit-trail - change history with field-level diffs");
            println!();
            println!("Run 'audit-trail --help' for usage information.");
        }
    }

    Ok(())
}

/// Log to stderr so stdout stays parseable
fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("AUDIT_TRAIL_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("audit_trail=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
