//! Output formatting module for CLI display
//!
//! Keeps presentation apart from the ledger: amounts are rounded here and
//! nowhere else.

use avco::db::Transaction;
use avco::ledger::IntegrityReport;
use avco::utils::{format_decimal_with_width, format_quantity};
use colored::Colorize;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

#[derive(Serialize)]
struct JsonTransaction {
    id: i64,
    transaction_type: String,
    quantity: i64,
    unit_cost: String,
    total_quantity: String,
    total_asset: String,
    cost_per_unit: String,
    prev_id: Option<i64>,
    next_id: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl From<&Transaction> for JsonTransaction {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            transaction_type: tx.transaction_type.as_str().to_string(),
            quantity: tx.quantity,
            unit_cost: tx.unit_cost.to_string(),
            total_quantity: tx.running.quantity.to_string(),
            total_asset: tx.running.asset.to_string(),
            cost_per_unit: tx.running.cost_per_unit.to_string(),
            prev_id: tx.prev_id,
            next_id: tx.next_id,
            created_at: tx.created_at.to_rfc3339(),
            updated_at: tx.updated_at.to_rfc3339(),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

/// Format ledger entries for JSON output
pub fn format_transactions_json(records: &[Transaction]) -> String {
    let rows: Vec<JsonTransaction> = records.iter().map(JsonTransaction::from).collect();
    to_json(&rows)
}

/// Format a single entry for JSON output
pub fn format_transaction_json(tx: &Transaction) -> String {
    to_json(&JsonTransaction::from(tx))
}

/// Format the latest state for JSON output; `null` on an empty ledger
pub fn format_latest_json(tx: Option<&Transaction>) -> String {
    to_json(&tx.map(JsonTransaction::from))
}

pub fn format_integrity_json(report: &IntegrityReport) -> String {
    to_json(report)
}

/// Format ledger entries as a terminal table, oldest first
pub fn format_transactions_table(records: &[Transaction], decimals: u32) -> String {
    if records.is_empty() {
        return format!("\n{} No transactions recorded\n", "ℹ".blue().bold());
    }

    #[derive(Tabled)]
    struct TransactionRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Type")]
        transaction_type: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Unit Cost")]
        unit_cost: String,
        #[tabled(rename = "Total Qty")]
        total_quantity: String,
        #[tabled(rename = "Total Asset")]
        total_asset: String,
        #[tabled(rename = "Cost/Unit")]
        cost_per_unit: String,
    }

    let rows: Vec<TransactionRow> = records
        .iter()
        .map(|tx| {
            let transaction_type = if tx.is_sale() {
                tx.transaction_type.as_str().red().to_string()
            } else {
                tx.transaction_type.as_str().green().to_string()
            };
            TransactionRow {
                id: tx.id,
                transaction_type,
                quantity: tx.quantity.to_string(),
                unit_cost: format_decimal_with_width(tx.unit_cost, decimals, 0),
                total_quantity: format_quantity(tx.running.quantity),
                total_asset: format_decimal_with_width(tx.running.asset, decimals, 0),
                cost_per_unit: format_decimal_with_width(tx.running.cost_per_unit, decimals, 0),
            }
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::rounded());
    // Right-align all numeric columns
    table.modify(Columns::new(2..), Alignment::right());

    format!("{}\n  {} entries\n", table, records.len())
}

/// Format the current aggregate state
pub fn format_latest(tx: Option<&Transaction>, decimals: u32) -> String {
    let Some(tx) = tx else {
        return format!("\n{} No record: the ledger is empty\n", "ℹ".blue().bold());
    };

    let mut output = String::new();
    output.push_str(&format!("\n{} Current position\n", "📦".cyan().bold()));
    output.push_str(&format!(
        "\n{:<18} {}",
        "Quantity:".bold(),
        format_quantity(tx.running.quantity)
    ));
    output.push_str(&format!(
        "\n{:<18} {}",
        "Total asset:".bold(),
        format_decimal_with_width(tx.running.asset, decimals, 0).cyan()
    ));
    output.push_str(&format!(
        "\n{:<18} {}",
        "Cost per unit:".bold(),
        format_decimal_with_width(tx.running.cost_per_unit, decimals, 0)
            .cyan()
            .bold()
    ));
    output.push_str(&format!("\n{:<18} #{}\n", "Latest entry:".bold(), tx.id));
    output
}

/// Confirmation printed after an entry is created or updated
pub fn format_saved(action: &str, tx: &Transaction, decimals: u32) -> String {
    let mut output = String::new();
    output.push_str(&format!("\n{} {}\n", "✓".green().bold(), action));
    output.push_str(&format!("  ID:             {}\n", tx.id));
    output.push_str(&format!(
        "  Type:           {}\n",
        tx.transaction_type.as_str()
    ));
    output.push_str(&format!("  Quantity:       {}\n", tx.quantity));
    output.push_str(&format!(
        "  Unit cost:      {}\n",
        format_decimal_with_width(tx.unit_cost, decimals, 0).cyan()
    ));
    output.push_str(&format!(
        "  Total quantity: {}\n",
        format_quantity(tx.running.quantity)
    ));
    output.push_str(&format!(
        "  Total asset:    {}\n",
        format_decimal_with_width(tx.running.asset, decimals, 0).cyan()
    ));
    output.push_str(&format!(
        "  Cost per unit:  {}\n",
        format_decimal_with_width(tx.running.cost_per_unit, decimals, 0)
            .cyan()
            .bold()
    ));
    output
}

pub fn format_integrity_report(report: &IntegrityReport) -> String {
    if report.is_healthy() {
        return format!(
            "\n{} Ledger is consistent ({} entries)\n",
            "✓".green().bold(),
            report.records
        );
    }

    let mut output = format!(
        "\n{} Ledger has {} problem(s) ({} of {} entries reachable)\n",
        "✗".red().bold(),
        report.issues.len(),
        report.reachable,
        report.records
    );
    for issue in &report.issues {
        output.push_str(&format!("  - {}\n", issue));
    }
    output
}
