//! CSV export of the ordered ledger

use anyhow::{Context, Result};
use avco::db::Transaction;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct CsvRow<'a> {
    id: i64,
    transaction_type: &'a str,
    quantity: i64,
    unit_cost: String,
    total_quantity: String,
    total_asset: String,
    cost_per_unit: String,
}

/// Write `records` (head first) to `path`, one row per entry at full
/// precision. Returns the number of rows written.
pub fn export_csv(records: &[Transaction], path: &Path) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file {:?}", path))?;

    for tx in records {
        writer.serialize(CsvRow {
            id: tx.id,
            transaction_type: tx.transaction_type.as_str(),
            quantity: tx.quantity,
            unit_cost: tx.unit_cost.to_string(),
            total_quantity: tx.running.quantity.to_string(),
            total_asset: tx.running.asset.to_string(),
            cost_per_unit: tx.running.cost_per_unit.to_string(),
        })?;
    }
    writer.flush().context("Failed to flush CSV file")?;

    Ok(records.len())
}
