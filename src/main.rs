// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use momo_ledger::{
    get_person_transactions, get_transaction_stats, import_messages, load_messages, open_database,
    person_summary, verify_count, Classifier, Config, Ingestor, RecordBuilder, StoragePolicy,
};

/// Mobile-money SMS ledger
#[derive(Parser)]
#[command(name = "momo-ledger")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// SQLite database (overrides MOMO_DATABASE_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract transactions from an SMS export (XML, CSV or JSON) into the database
    Import {
        file: PathBuf,

        /// Skip records the database rejects instead of stopping
        #[arg(long)]
        keep_going: bool,

        /// Extra classification rules (overrides MOMO_RULES_PATH)
        #[arg(long)]
        rules: Option<PathBuf>,
    },

    /// Count and total per transaction type
    Stats,

    /// Totals per type for one counterparty
    Person { name: String },

    /// Browse the ledger in the terminal (default)
    Ui,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::new()?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    match cli.command.unwrap_or(Commands::Ui) {
        Commands::Import {
            file,
            keep_going,
            rules,
        } => {
            if rules.is_some() {
                config.rules_path = rules;
            }
            run_import(&config, &file, keep_going)
        }
        Commands::Stats => run_stats(&config),
        Commands::Person { name } => run_person(&config, &name),
        Commands::Ui => run_ui_mode(&config),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run_import(config: &Config, file: &Path, keep_going: bool) -> Result<()> {
    println!("📥 Import: SMS export → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let classifier = match &config.rules_path {
        Some(path) => Classifier::from_file(path)?,
        None => Classifier::default(),
    };

    // 1. Load messages
    println!("\n📂 Loading messages...");
    let messages = load_messages(file)
        .with_context(|| format!("Failed to load messages from {}", file.display()))?;
    println!("✓ Loaded {} messages from {}", messages.len(), file.display());

    // 2. Setup database
    let mut conn = open_database(&config.database_path).with_context(|| {
        format!("Failed to open database {}", config.database_path.display())
    })?;

    // 3. Extract and store; the run commits as a whole or not at all
    println!("\n💾 Extracting transactions...");
    let policy = if keep_going {
        StoragePolicy::Skip
    } else {
        StoragePolicy::Abort
    };

    let ingestor = Ingestor::new(RecordBuilder::new(classifier)).with_policy(policy);
    let summary = import_messages(
        &mut conn,
        &file.display().to_string(),
        &ingestor,
        messages.into_iter().map(Ok),
    )
    .context("Import failed, nothing was written")?;
    let report = summary.report;

    // 4. Summary
    println!("✓ Inserted: {} transactions", summary.inserted);
    println!("✓ Skipped duplicates: {}", summary.duplicates);
    println!("✓ Unrecognized messages: {}", report.unclassified);
    println!("✓ Unparseable messages: {}", report.failed);
    println!("✓ Zero-amount messages: {}", report.no_amount);
    if report.storage_errors > 0 {
        println!("⚠ Rejected by database: {}", report.storage_errors);
    }

    let count = verify_count(&conn)?;
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Database contains {} transactions", count);

    Ok(())
}

fn open_existing(config: &Config) -> Result<Connection> {
    let db_path = &config.database_path;

    if !db_path.exists() {
        eprintln!("❌ Database not found: {}", db_path.display());
        eprintln!("   Run: momo-ledger import <sms-backup.xml>");
        eprintln!("   to import transactions first.");
        std::process::exit(1);
    }

    Ok(open_database(db_path)?)
}

fn run_stats(config: &Config) -> Result<()> {
    let conn = open_existing(config)?;
    let stats = get_transaction_stats(&conn)?;

    println!("{:<15} {:>8} {:>16}", "Type", "Count", "Total (RWF)");
    for stat in &stats {
        println!("{:<15} {:>8} {:>16.2}", stat.category.label(), stat.count, stat.total);
    }

    Ok(())
}

fn run_person(config: &Config, name: &str) -> Result<()> {
    let conn = open_existing(config)?;
    let transactions = get_person_transactions(&conn, name)?;

    if transactions.is_empty() {
        println!("No transactions for {}", name);
        return Ok(());
    }

    let summary = person_summary(name, transactions.iter().map(|t| &t.record));
    println!("{} ({} transactions)", summary.name, transactions.len());
    for (label, value) in summary.labels.iter().zip(&summary.values) {
        println!("  {:<15} {:>16.2}", label, value);
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config) -> Result<()> {
    println!("🖥️  Loading MoMo Ledger UI...\n");

    let conn = open_existing(config)?;

    // Load transactions
    println!("📊 Loading transactions...");
    let transactions = momo_ledger::get_all_transactions(&conn)?;
    let total_count = verify_count(&conn)?;

    println!("✓ Loaded {} transactions\n", transactions.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(transactions, total_count);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use web UI: cargo run --bin momo-server --features server");
    std::process::exit(1);
}
