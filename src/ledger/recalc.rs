//! Forward recalculation of running totals
//!
//! After any edit, every record from the edit point to the tail is rebuilt
//! from its predecessor. Records upstream of the edit are never touched.

use anyhow::Result;
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::debug;

use crate::db::{self, RunningTotals, Transaction};
use crate::error::LedgerError;

/// Rebuild running totals from `start_id` to the tail.
///
/// Must run inside the caller's SQLite transaction: any error aborts the
/// pass and the caller's rollback discards what was already written.
/// Returns the number of records recomputed.
pub(crate) fn recalculate_forward(conn: &Connection, start_id: i64) -> Result<usize> {
    let limit = db::count_transactions(conn)?;
    let mut current = db::require_transaction(conn, start_id)?;
    let mut prev_totals = match current.prev_id {
        Some(prev_id) => Some(fetch_linked(conn, prev_id, current.id)?.running),
        None => None,
    };

    let mut visited = 0usize;
    loop {
        let unit_cost = unit_cost_at(&current, prev_totals.as_ref())?;
        let running = RunningTotals::fold(prev_totals.as_ref(), current.quantity, unit_cost)?;
        ensure_non_negative(&current, &running)?;

        db::update_running(conn, current.id, unit_cost, &running)?;
        debug!(
            "Recalculated #{}: quantity={} asset={} cost_per_unit={}",
            current.id, running.quantity, running.asset, running.cost_per_unit
        );

        visited += 1;
        if visited > limit {
            return Err(LedgerError::broken(format!(
                "cycle detected while recalculating from #{}",
                start_id
            ))
            .into());
        }

        let Some(next_id) = current.next_id else {
            break;
        };
        let next = fetch_linked(conn, next_id, current.id)?;
        if next.prev_id != Some(current.id) {
            return Err(LedgerError::broken(format!(
                "#{} points to #{} but #{} points back to {:?}",
                current.id, next.id, next.id, next.prev_id
            ))
            .into());
        }

        prev_totals = Some(running);
        current = next;
    }

    Ok(visited)
}

/// Unit cost a record carries at its position: purchases keep their own,
/// sales take the predecessor's cost per unit.
pub(crate) fn unit_cost_at(tx: &Transaction, prev: Option<&RunningTotals>) -> Result<Decimal> {
    if !tx.is_sale() {
        return Ok(tx.unit_cost);
    }
    prev.map(|p| p.cost_per_unit).ok_or_else(|| {
        LedgerError::broken(format!("sale #{} has no predecessor", tx.id)).into()
    })
}

pub(crate) fn ensure_non_negative(tx: &Transaction, running: &RunningTotals) -> Result<()> {
    if running.quantity < Decimal::ZERO {
        return Err(LedgerError::invalid(format!(
            "insufficient quantity: {} #{} would leave {} units on hand",
            tx.transaction_type.as_str().to_lowercase(),
            tx.id,
            running.quantity
        ))
        .into());
    }
    Ok(())
}

/// Fetch a record that another record links to. A dangling link is an
/// integrity error rather than a lookup miss.
pub(crate) fn fetch_linked(conn: &Connection, id: i64, referenced_by: i64) -> Result<Transaction> {
    db::get_transaction(conn, id)?.ok_or_else(|| {
        LedgerError::broken(format!(
            "#{} references missing transaction #{}",
            referenced_by, id
        ))
        .into()
    })
}
