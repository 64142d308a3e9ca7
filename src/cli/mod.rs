//! CLI module for the ConnectU command-line interface.
//!
//! Without a subcommand the binary starts the server. Subcommands:
//! - `import-roster <file>` - Load enrollment roster documents into the database
//! - `config check` - Validate configuration file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::roster::{ImportStats, RosterValidator};
use crate::store::SqliteStore;
use crate::DbPool;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "connectu")]
#[command(author, version, about = "Campus networking backend for students and alumni", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "CONNECTU_CONFIG", default_value = "connectu.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Skip startup self-checks (for development only)
    #[arg(long)]
    pub skip_checks: bool,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a JSON array of roster documents
    ImportRoster {
        /// Path to the roster file
        path: PathBuf,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

/// Run a CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::ImportRoster { path }) => cmd_import_roster(cli, path).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        None => {
            // No subcommand means start the server - this is handled in main.rs
            Ok(())
        }
    }
}

/// Open the configured database, creating the data directory and schema if needed
pub async fn open_database(config: &Config) -> Result<DbPool> {
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory: {}",
            config.server.data_dir.display()
        )
    })?;

    let url = config.database.resolve_url(&config.server.data_dir);
    crate::db::init(&url, &config.database).await
}

/// Import roster documents into the configured database
async fn cmd_import_roster(cli: &Cli, path: &Path) -> Result<()> {
    let config = Config::load(&cli.config)?;
    let db = open_database(&config).await?;

    let stats = import_roster(db, path).await?;

    println!();
    println!("[OK] Roster import finished");
    println!();
    println!("Imported: {}", stats.imported);
    println!("Skipped:  {}", stats.skipped);
    if stats.skipped > 0 {
        println!();
        println!("Skipped documents had neither (Student Name, PRN) nor (name, prn) keys.");
    }
    println!();
    Ok(())
}

async fn import_roster(db: DbPool, path: &Path) -> Result<ImportStats> {
    let validator = RosterValidator::new(Arc::new(SqliteStore::new(db)));
    validator.import_file(path).await
}

/// Validate configuration file
fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("A default configuration will be used when starting the server.");
        return Ok(());
    }

    match Config::load(config_path) {
        Ok(config) => {
            println!("[OK] Configuration file is valid!");
            println!();
            println!("=== Configuration Summary ===");
            println!();
            println!("Server:");
            println!("  Host:         {}", config.server.host);
            println!("  Port:         {}", config.server.port);
            println!("  Data Dir:     {}", config.server.data_dir.display());
            println!(
                "  Database:     {}",
                config.database.resolve_url(&config.server.data_dir)
            );
            println!();
            println!("Registration:");
            println!("  Code TTL:     {}s", config.registration.otp_ttl_secs);
            println!("  Code Digits:  {}", config.registration.otp_digits);
            println!("  Sweep Every:  {}s", config.registration.sweep_interval_secs);
            println!();
            println!("Security:");
            println!(
                "  Rate Limiting: {}",
                if config.rate_limit.enabled {
                    "Enabled"
                } else {
                    "Disabled"
                }
            );
            println!("  Session TTL:  {} days", config.auth.token_ttl_days);
            println!();

            let warnings = config_warnings(&config);
            if !warnings.is_empty() {
                println!("Warnings:");
                for warning in warnings {
                    println!("  [!] {}", warning);
                }
                println!();
            }

            Ok(())
        }
        Err(e) => {
            println!("[!!] Configuration file is invalid!");
            println!();
            println!("Error: {:#}", e);
            println!();
            println!("Please check the configuration file syntax and try again.");
            anyhow::bail!("Invalid configuration file");
        }
    }
}

fn config_warnings(config: &Config) -> Vec<&'static str> {
    let mut warnings = Vec::new();

    if config.auth.generated_secret {
        warnings.push("No auth.jwt_secret set - sessions will be invalidated on every restart");
    }

    if config.email.log_only {
        warnings.push("email.log_only is set - verification codes are logged, not mailed");
    } else if !config.email.is_configured() {
        warnings.push("SMTP is not configured - signups cannot receive verification codes");
    }

    if config.roster.import_path.is_none() {
        warnings.push("No roster.import_path set - load the roster with `connectu import-roster`");
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RosterStore;
    use std::io::Write;

    #[test]
    fn test_parse_defaults_to_server() {
        let cli = Cli::parse_from(["connectu"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("connectu.toml"));
        assert!(!cli.skip_checks);
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["connectu", "import-roster", "students.json"]);
        assert!(matches!(
            cli.command,
            Some(Commands::ImportRoster { ref path }) if path == Path::new("students.json")
        ));

        let cli = Cli::parse_from(["connectu", "-c", "other.toml", "config", "check"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Config(ConfigCommands::Check))
        ));
        assert_eq!(cli.config, PathBuf::from("other.toml"));
    }

    #[test]
    fn test_default_config_warnings() {
        let warnings = config_warnings(&Config::default());
        assert_eq!(warnings.len(), 3);
    }

    #[tokio::test]
    async fn test_import_roster_into_database() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"Student Name": "Asha Rao", "PRN": "PRN001"}}, {{"name": "Ravi", "prn": 42}}, {{"title": "x"}}]"#
        )
        .unwrap();

        let db = crate::db::init_memory().await.unwrap();
        let stats = import_roster(db.clone(), file.path()).await.unwrap();
        assert_eq!(stats.imported, 2);
        assert_eq!(stats.skipped, 1);

        let store = SqliteStore::new(db);
        assert_eq!(store.roster_count().await.unwrap(), 2);
    }
}
