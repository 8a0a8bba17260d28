// Database module - SQLite connection, schema and ledger row access

pub mod models;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::{Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::LedgerError;
pub use models::{NewTransaction, RunningTotals, Transaction, TransactionType};

/// Busy timeout applied to every connection unless configured otherwise
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

const TRANSACTION_COLUMNS: &str = "id, transaction_type, quantity, unit_cost, running_quantity, \
     running_asset, running_cost_per_unit, prev_id, next_id, created_at, updated_at";

/// Get the default database path (~/.avco/ledger.db)
pub fn get_default_db_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let avco_dir = PathBuf::from(home).join(".avco");

    std::fs::create_dir_all(&avco_dir).context("Failed to create .avco directory")?;

    Ok(avco_dir.join("ledger.db"))
}

/// Open database connection
pub fn open_db(db_path: Option<PathBuf>) -> Result<Connection> {
    let path = match db_path {
        Some(p) => p,
        None => get_default_db_path()?,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let conn = Connection::open(&path).context(format!("Failed to open database at {:?}", path))?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .context("Failed to set busy timeout")?;

    Ok(conn)
}

/// Initialize the database with schema
///
/// Safe to call on an existing database; every statement is idempotent.
pub fn init_database(db_path: Option<PathBuf>) -> Result<()> {
    let conn = open_db(db_path)?;
    init_schema(&conn)
}

/// Run the schema SQL on an open connection
pub fn init_schema(conn: &Connection) -> Result<()> {
    info!("Initializing ledger schema");

    let schema_sql = include_str!("schema.sql");
    conn.execute_batch(schema_sql)
        .context("Failed to execute schema")?;

    Ok(())
}

/// Head and tail of the chain, as recorded in the pointer row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerState {
    pub head_id: Option<i64>,
    pub tail_id: Option<i64>,
}

pub fn get_ledger_state(conn: &Connection) -> Result<LedgerState> {
    let state = conn
        .query_row(
            "SELECT head_id, tail_id FROM ledger_state WHERE id = 1",
            [],
            |row| {
                Ok(LedgerState {
                    head_id: row.get(0)?,
                    tail_id: row.get(1)?,
                })
            },
        )
        .optional()?;

    state.ok_or_else(|| LedgerError::broken("ledger_state row is missing").into())
}

pub fn set_head(conn: &Connection, head_id: Option<i64>) -> Result<()> {
    conn.execute(
        "UPDATE ledger_state SET head_id = ?1 WHERE id = 1",
        params![head_id],
    )?;
    Ok(())
}

pub fn set_tail(conn: &Connection, tail_id: Option<i64>) -> Result<()> {
    conn.execute(
        "UPDATE ledger_state SET tail_id = ?1 WHERE id = 1",
        params![tail_id],
    )?;
    Ok(())
}

/// Insert a transaction row, returns its id
pub fn insert_transaction(conn: &Connection, tx: &NewTransaction) -> Result<i64> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO transactions (
            transaction_type, quantity, unit_cost,
            running_quantity, running_asset, running_cost_per_unit,
            prev_id, next_id, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            tx.transaction_type.as_str(),
            tx.quantity,
            tx.unit_cost.to_string(),
            tx.running.quantity.to_string(),
            tx.running.asset.to_string(),
            tx.running.cost_per_unit.to_string(),
            tx.prev_id,
            tx.next_id,
            now,
            now,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Get a transaction by id
pub fn get_transaction(conn: &Connection, id: i64) -> Result<Option<Transaction>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM transactions WHERE id = ?1",
        TRANSACTION_COLUMNS
    ))?;

    let tx = stmt.query_row([id], row_to_transaction).optional()?;
    Ok(tx)
}

/// Get a transaction by id, failing with `NotFound` when it does not exist
pub fn require_transaction(conn: &Connection, id: i64) -> Result<Transaction> {
    get_transaction(conn, id)?.ok_or_else(|| LedgerError::NotFound(id).into())
}

/// Load every stored row keyed by id, in no particular order
pub fn load_all_transactions(conn: &Connection) -> Result<HashMap<i64, Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM transactions",
        TRANSACTION_COLUMNS
    ))?;

    let rows = stmt.query_map([], row_to_transaction)?;
    let mut by_id = HashMap::new();
    for row in rows {
        let tx = row?;
        by_id.insert(tx.id, tx);
    }
    Ok(by_id)
}

pub fn count_transactions(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
    Ok(count as usize)
}

pub fn set_prev_id(conn: &Connection, id: i64, prev_id: Option<i64>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE transactions SET prev_id = ?1 WHERE id = ?2",
        params![prev_id, id],
    )?;
    ensure_changed(changed, id)
}

pub fn set_next_id(conn: &Connection, id: i64, next_id: Option<i64>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE transactions SET next_id = ?1 WHERE id = ?2",
        params![next_id, id],
    )?;
    ensure_changed(changed, id)
}

/// Overwrite the movement fields of a record (quantity and unit cost)
pub fn update_movement(conn: &Connection, id: i64, quantity: i64, unit_cost: Decimal) -> Result<()> {
    let changed = conn.execute(
        "UPDATE transactions SET quantity = ?1, unit_cost = ?2, updated_at = ?3 WHERE id = ?4",
        params![quantity, unit_cost.to_string(), Utc::now(), id],
    )?;
    ensure_changed(changed, id)
}

/// Persist recomputed running totals (and unit cost, which sales re-derive)
pub fn update_running(
    conn: &Connection,
    id: i64,
    unit_cost: Decimal,
    running: &RunningTotals,
) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "UPDATE transactions
         SET unit_cost = ?1, running_quantity = ?2, running_asset = ?3,
             running_cost_per_unit = ?4, updated_at = ?5
         WHERE id = ?6",
    )?;
    let changed = stmt.execute(params![
        unit_cost.to_string(),
        running.quantity.to_string(),
        running.asset.to_string(),
        running.cost_per_unit.to_string(),
        Utc::now(),
        id,
    ])?;
    ensure_changed(changed, id)
}

pub fn delete_transaction_row(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM transactions WHERE id = ?1", [id])?;
    ensure_changed(changed, id)
}

fn ensure_changed(changed: usize, id: i64) -> Result<()> {
    if changed == 0 {
        return Err(LedgerError::NotFound(id).into());
    }
    Ok(())
}

fn row_to_transaction(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let type_str: String = row.get(1)?;
    let transaction_type = type_str.parse::<TransactionType>().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            Box::new(LedgerError::broken(format!(
                "unknown transaction type '{}'",
                type_str
            ))),
        )
    })?;

    Ok(Transaction {
        id: row.get(0)?,
        transaction_type,
        quantity: row.get(2)?,
        unit_cost: get_decimal_value(row, 3)?,
        running: RunningTotals {
            quantity: get_decimal_value(row, 4)?,
            asset: get_decimal_value(row, 5)?,
            cost_per_unit: get_decimal_value(row, 6)?,
        },
        prev_id: row.get(7)?,
        next_id: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Helper to read Decimal from SQLite (handles INTEGER, REAL and TEXT)
pub fn get_decimal_value(row: &Row, idx: usize) -> Result<Decimal, rusqlite::Error> {
    match row.get_ref(idx)? {
        ValueRef::Text(bytes) => {
            let s = std::str::from_utf8(bytes)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))?;
            Decimal::from_str(s)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        }
        ValueRef::Integer(i) => Ok(Decimal::from(i)),
        ValueRef::Real(f) => Decimal::try_from(f)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Real, Box::new(e))),
        _ => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "decimal".to_string(),
            Type::Null,
        )),
    }
}
