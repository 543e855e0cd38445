use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::Level;

use maksum_db::{Database, DatabaseSettings, DbError, Dialect, translate_statements};

#[derive(Parser, Debug)]
#[command(author, version, about = "Maksum database maintenance")]
struct Args {
    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create missing tables and columns, then apply pending migrations.
    Migrate,
    /// Show the selected backend and the applied migrations.
    Status,
    /// Print canonical DDL rewritten for a dialect.
    Translate {
        #[arg(long, value_enum)]
        dialect: Dialect,
        /// Read from this file instead of stdin.
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    match run(args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, class = ?e.class(), "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), DbError> {
    match command {
        Command::Migrate => {
            let db = Database::connect(DatabaseSettings::from_env()?).await?;
            let report = db.ensure_schema().await;
            db.shutdown();
            print_json(&report?);
        }
        Command::Status => {
            let db = Database::connect(DatabaseSettings::from_env()?).await?;
            let applied = db.applied_migrations().await;
            let status = db.status();
            db.shutdown();
            print_json(&json!({
                "backend": db.current_backend(),
                "target": db.target(),
                "applied_migrations": applied?,
                "open_connections": status.open_connections,
            }));
        }
        Command::Translate { dialect, file } => {
            let source = match file {
                Some(path) => std::fs::read_to_string(path)?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            for statement in translate_statements(&source, dialect) {
                println!("{statement};");
            }
        }
    }
    Ok(())
}

fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    );
}
