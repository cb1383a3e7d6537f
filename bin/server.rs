// MoMo Ledger - Web Server

use anyhow::{Context, Result};
use momo_ledger::server::{router, AppState};
use momo_ledger::{open_database, verify_count, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    println!("🌐 MoMo Ledger - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::new()?;
    let db_path = &config.database_path;

    if !db_path.exists() {
        eprintln!("❌ Database not found at {}", db_path.display());
        eprintln!("   Run: momo-ledger import <sms-backup.xml>");
        eprintln!("   to import transactions first.");
        std::process::exit(1);
    }

    let conn = open_database(db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    println!("✓ Database opened: {} ({} transactions)", db_path.display(), verify_count(&conn)?);

    let app = router(AppState::new(conn));

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;

    println!("\n🚀 Server running on http://{}", config.bind_address);
    println!("   API: http://{}/api/transactions", config.bind_address);
    println!("\n   Press Ctrl+C to stop\n");
    tracing::info!(address = %config.bind_address, "listening");

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;

    Ok(())
}
