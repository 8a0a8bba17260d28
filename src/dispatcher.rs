//! Command dispatcher that routes parsed clap commands to ledger operations
//! and prints their results.

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use avco::config::Config;
use avco::db::{self, TransactionType};
use avco::ledger::{self, Position};

use crate::cli::{export, formatters, Cli, Commands};

/// Route a parsed command to its handler
pub fn dispatch(cli: Cli, config: &Config) -> Result<()> {
    let db_path = config.resolve_db_path(cli.db.clone());
    let json = cli.json;
    let decimals = config.display_decimals;

    if let Commands::Init = cli.command {
        db::init_database(db_path.clone())?;
        println!("\n{} Ledger database ready\n", "✓".green().bold());
        return Ok(());
    }

    let mut conn = open_ledger(db_path, config)?;

    match cli.command {
        Commands::Init => Ok(()),

        Commands::Purchase {
            cost,
            quantity,
            position,
        } => {
            let unit_cost = parse_cost(&cost)?;
            let position = Position::from_raw(position)?;
            let tx = ledger::create_purchase(&mut conn, unit_cost, quantity, position)?;
            if json {
                println!("{}", formatters::format_transaction_json(&tx));
            } else {
                print!("{}", formatters::format_saved("Purchase recorded", &tx, decimals));
            }
            Ok(())
        }

        Commands::Sale { quantity, position } => {
            let position = Position::from_raw(position)?;
            let tx = ledger::create_sale(&mut conn, quantity, position)?;
            if json {
                println!("{}", formatters::format_transaction_json(&tx));
            } else {
                print!("{}", formatters::format_saved("Sale recorded", &tx, decimals));
            }
            Ok(())
        }

        Commands::Update {
            id,
            quantity,
            cost,
            kind,
        } => {
            let cost = cost.as_deref().map(parse_cost).transpose()?;
            let tx = ledger::update_transaction(&mut conn, id, quantity, cost, kind.into())?;
            if json {
                println!("{}", formatters::format_transaction_json(&tx));
            } else {
                print!("{}", formatters::format_saved("Entry updated", &tx, decimals));
            }
            Ok(())
        }

        Commands::Delete { id } => {
            ledger::delete_transaction(&mut conn, id)?;
            if json {
                println!("{}", serde_json::json!({ "deleted": id }));
            } else {
                println!("\n{} Entry #{} deleted\n", "✓".green().bold(), id);
            }
            Ok(())
        }

        Commands::List { kind, lenient } => {
            let records = match (kind, lenient) {
                (Some(kind), false) => ledger::list_by_kind(&conn, TransactionType::from(kind))?,
                (Some(kind), true) => {
                    let kind = TransactionType::from(kind);
                    ledger::list_transactions_lenient(&conn)?
                        .into_iter()
                        .filter(|t| t.transaction_type == kind)
                        .collect()
                }
                (None, true) => ledger::list_transactions_lenient(&conn)?,
                (None, false) => ledger::list_transactions(&conn)?,
            };
            if json {
                println!("{}", formatters::format_transactions_json(&records));
            } else {
                print!("{}", formatters::format_transactions_table(&records, decimals));
            }
            Ok(())
        }

        Commands::Latest => {
            let tail = ledger::latest(&conn)?;
            if json {
                println!("{}", formatters::format_latest_json(tail.as_ref()));
            } else {
                print!("{}", formatters::format_latest(tail.as_ref(), decimals));
            }
            Ok(())
        }

        Commands::Check => {
            let report = ledger::verify_chain(&conn)?;
            if json {
                println!("{}", formatters::format_integrity_json(&report));
            } else {
                print!("{}", formatters::format_integrity_report(&report));
            }
            if report.is_healthy() {
                Ok(())
            } else {
                Err(anyhow!("ledger check found {} problem(s)", report.issues.len()))
            }
        }

        Commands::Export { file } => {
            let records = ledger::list_transactions(&conn)?;
            let written = export::export_csv(&records, &file)?;
            info!("Exported {} entries to {:?}", written, file);
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "exported": written, "file": file.display().to_string() })
                );
            } else {
                println!(
                    "\n{} Exported {} entries to {}\n",
                    "✓".green().bold(),
                    written,
                    file.display()
                );
            }
            Ok(())
        }
    }
}

/// Open the ledger, creating the schema on first use
fn open_ledger(db_path: Option<std::path::PathBuf>, config: &Config) -> Result<Connection> {
    let conn = db::open_db(db_path)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .context("Failed to set busy timeout")?;
    db::init_schema(&conn)?;
    Ok(conn)
}

fn parse_cost(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim())
        .with_context(|| format!("Invalid cost '{}'. Must be a decimal number", raw))
}
