use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::services::QrTicketManager;

#[derive(Parser)]
#[command(name = "banksampah-core")]
#[command(about = "Bank Sampah Core - waste-bank transactions, QR tickets and wallets", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// QR ticket commands
    #[command(subcommand)]
    Tickets(TicketCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum TicketCommands {
    /// Show the state of a QR ticket without modifying it
    Inspect {
        /// Ticket token as shown in the QR code
        #[arg(value_name = "TOKEN")]
        token: String,
    },
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    tracing::info!("Database migrations completed");
    println!("✓ Database migrations completed");

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Database Max Connections: {}", config.database_max_connections);
    println!("  QR Ticket TTL: {} minutes", config.qr_ticket_ttl_minutes);
    println!("  Direct Completion Allowed: {}", config.allow_direct_completion);
    println!("  Log Request Body: {}", config.log_request_body);
    println!("  Log Format: {:?}", config.log_format);

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

pub async fn handle_tickets_inspect(config: &Config, token: &str) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;
    let tickets = QrTicketManager::new(pool, config.ticket_ttl());

    let (tx, state) = tickets.inspect(token).await?;

    println!("Ticket:");
    println!("  Transaction: {}", tx.id);
    println!("  Depositor: {}", tx.depositor_id);
    println!(
        "  Waste Bank: {}",
        tx.waste_bank_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unassigned".to_string())
    );
    println!("  Status: {}", tx.status);
    println!("  Issued At: {}", format_time(tx.qr_issued_at));
    println!("  Expires At: {}", format_time(tx.qr_expires_at));
    match state.rejection_reason() {
        Some(reason) => println!("✗ {}", reason),
        None => println!("✓ Ticket is active"),
    }

    Ok(())
}

fn format_time(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    at.map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "-".to_string())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
