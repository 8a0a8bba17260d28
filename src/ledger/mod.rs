//! Weighted-average cost ledger
//!
//! The ledger is a doubly-linked chain of transaction rows (`prev_id` /
//! `next_id`) with the head and tail ids kept in a pointer row. Every record
//! caches the running quantity, asset value and cost per unit of the chain
//! prefix ending at it.
//!
//! Each mutating operation is one SQLite transaction opened with
//! `BEGIN IMMEDIATE`: create/unlink, relink and the forward recalculation
//! either all commit or all roll back. Taking `&mut Connection` serializes
//! writers on a connection; the immediate lock serializes them across
//! processes.

pub mod integrity;
pub mod position;
mod recalc;

use anyhow::{Context, Result};
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::db::{self, NewTransaction, RunningTotals, Transaction, TransactionType};
use crate::error::LedgerError;
pub use integrity::{verify_chain, IntegrityReport};
pub use position::Position;
use recalc::{fetch_linked, recalculate_forward};

/// Record a purchase of `quantity` units at `unit_cost` each.
pub fn create_purchase(
    conn: &mut Connection,
    unit_cost: Decimal,
    quantity: i64,
    position: Position,
) -> Result<Transaction> {
    validate_purchase(unit_cost, quantity)?;

    let db_tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let id = match position {
        Position::Append => append(&db_tx, TransactionType::Purchase, quantity, unit_cost)?,
        Position::Head => match db::get_ledger_state(&db_tx)?.head_id {
            Some(head_id) => insert_at_head(&db_tx, head_id, quantity, unit_cost)?,
            None => append(&db_tx, TransactionType::Purchase, quantity, unit_cost)?,
        },
        Position::After(prev_id) => {
            splice_after(&db_tx, prev_id, TransactionType::Purchase, quantity, unit_cost)?
        }
    };
    let created = db::require_transaction(&db_tx, id)?;
    db_tx.commit().context("Failed to commit purchase")?;

    info!(
        "Recorded purchase #{} ({} units @ {}) at {}",
        created.id, quantity, unit_cost, position
    );
    Ok(created)
}

/// Record a sale. `quantity` is the negative delta (e.g. `-5` sells five
/// units); the unit cost is taken from the weighted average at the
/// insertion point.
pub fn create_sale(conn: &mut Connection, quantity: i64, position: Position) -> Result<Transaction> {
    validate_sale(quantity)?;
    if position == Position::Head {
        return Err(LedgerError::invalid("a sale cannot be inserted at the head of the ledger").into());
    }

    let db_tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let id = match position {
        Position::After(prev_id) => {
            splice_after(&db_tx, prev_id, TransactionType::Sale, quantity, Decimal::ZERO)?
        }
        _ => append(&db_tx, TransactionType::Sale, quantity, Decimal::ZERO)?,
    };
    let created = db::require_transaction(&db_tx, id)?;
    db_tx.commit().context("Failed to commit sale")?;

    info!(
        "Recorded sale #{} ({} units @ {}) at {}",
        created.id, quantity, created.unit_cost, position
    );
    Ok(created)
}

/// Change the quantity (and, for purchases, the unit cost) of a record,
/// then rebuild it and everything downstream.
///
/// `kind` must match the stored kind. For sales `cost` is ignored: the unit
/// cost always follows the predecessor's cost per unit. For purchases
/// `cost = None` keeps the current unit cost.
pub fn update_transaction(
    conn: &mut Connection,
    id: i64,
    quantity: i64,
    cost: Option<Decimal>,
    kind: TransactionType,
) -> Result<Transaction> {
    let db_tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let existing = db::require_transaction(&db_tx, id)?;
    if existing.transaction_type != kind {
        return Err(LedgerError::invalid(format!(
            "transaction #{} is a {}, not a {}",
            id,
            existing.transaction_type.as_str(),
            kind.as_str()
        ))
        .into());
    }

    let unit_cost = match kind {
        TransactionType::Purchase => {
            let unit_cost = cost.unwrap_or(existing.unit_cost);
            validate_purchase(unit_cost, quantity)?;
            unit_cost
        }
        TransactionType::Sale => {
            validate_sale(quantity)?;
            let prev_id = existing.prev_id.ok_or_else(|| {
                LedgerError::broken(format!("sale #{} has no predecessor", id))
            })?;
            fetch_linked(&db_tx, prev_id, id)?.running.cost_per_unit
        }
    };

    db::update_movement(&db_tx, id, quantity, unit_cost)?;
    let recalculated = recalculate_forward(&db_tx, id)?;
    let updated = db::require_transaction(&db_tx, id)?;
    db_tx.commit().context("Failed to commit update")?;

    info!(
        "Updated #{} to {} units @ {}; {} records recalculated",
        id, quantity, updated.unit_cost, recalculated
    );
    Ok(updated)
}

/// Remove a record and rebuild everything after it.
pub fn delete_transaction(conn: &mut Connection, id: i64) -> Result<()> {
    let db_tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let existing = db::require_transaction(&db_tx, id)?;

    let prev = existing
        .prev_id
        .map(|prev_id| fetch_linked(&db_tx, prev_id, id))
        .transpose()?;
    let next = existing
        .next_id
        .map(|next_id| fetch_linked(&db_tx, next_id, id))
        .transpose()?;

    if let (None, Some(next)) = (&prev, &next) {
        if next.is_sale() {
            return Err(LedgerError::invalid(format!(
                "deleting #{} would leave sale #{} at the head of the ledger",
                id, next.id
            ))
            .into());
        }
    }

    db::delete_transaction_row(&db_tx, id)?;

    match &prev {
        Some(prev) => db::set_next_id(&db_tx, prev.id, existing.next_id)?,
        None => db::set_head(&db_tx, existing.next_id)?,
    }
    match &next {
        Some(next) => db::set_prev_id(&db_tx, next.id, existing.prev_id)?,
        None => db::set_tail(&db_tx, existing.prev_id)?,
    }

    let recalculated = match &next {
        Some(next) => recalculate_forward(&db_tx, next.id)?,
        None => 0,
    };
    db_tx.commit().context("Failed to commit delete")?;

    info!("Deleted #{}; {} records recalculated", id, recalculated);
    Ok(())
}

/// The tail record, holding the current aggregate quantity, asset value
/// and cost per unit. `None` on an empty ledger.
pub fn latest(conn: &Connection) -> Result<Option<Transaction>> {
    let state = db::get_ledger_state(conn)?;
    let Some(tail_id) = state.tail_id else {
        return Ok(None);
    };

    let tail = db::get_transaction(conn, tail_id)?.ok_or_else(|| {
        LedgerError::broken(format!("tail pointer references missing transaction #{}", tail_id))
    })?;
    if tail.next_id.is_some() {
        return Err(LedgerError::broken(format!(
            "tail #{} still links to #{:?}",
            tail_id, tail.next_id
        ))
        .into());
    }
    Ok(Some(tail))
}

/// Every record from head to tail. A broken chain is an error.
pub fn list_transactions(conn: &Connection) -> Result<Vec<Transaction>> {
    let (records, problem) = walk_chain(conn)?;
    if let Some(problem) = problem {
        return Err(problem.into());
    }

    let total = db::count_transactions(conn)?;
    if records.len() != total {
        return Err(LedgerError::broken(format!(
            "walk reached {} of {} transactions",
            records.len(),
            total
        ))
        .into());
    }
    Ok(records)
}

/// Like [`list_transactions`] but returns whatever prefix of the chain is
/// reachable when it is broken, logging the problem instead of failing.
pub fn list_transactions_lenient(conn: &Connection) -> Result<Vec<Transaction>> {
    let (records, problem) = walk_chain(conn)?;
    if let Some(problem) = problem {
        warn!(
            "Ledger walk stopped after {} records: {}",
            records.len(),
            problem
        );
    }
    Ok(records)
}

/// Ordered records of one kind only
pub fn list_by_kind(conn: &Connection, kind: TransactionType) -> Result<Vec<Transaction>> {
    Ok(list_transactions(conn)?
        .into_iter()
        .filter(|t| t.transaction_type == kind)
        .collect())
}

/// Rebuild running totals from `id` to the tail in its own transaction.
/// Running it twice yields the same totals. Returns the number of records
/// recomputed.
pub fn recalculate_from(conn: &mut Connection, id: i64) -> Result<usize> {
    let db_tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let recalculated = recalculate_forward(&db_tx, id)?;
    db_tx.commit().context("Failed to commit recalculation")?;

    info!("Recalculated {} records from #{}", recalculated, id);
    Ok(recalculated)
}

fn validate_purchase(unit_cost: Decimal, quantity: i64) -> Result<(), LedgerError> {
    if unit_cost <= Decimal::ZERO {
        return Err(LedgerError::invalid("cost must be greater than zero"));
    }
    if quantity < 1 {
        return Err(LedgerError::invalid("purchase quantity must be at least 1"));
    }
    Ok(())
}

fn validate_sale(quantity: i64) -> Result<(), LedgerError> {
    if quantity > -1 {
        return Err(LedgerError::invalid(
            "sale quantity must be negative (e.g. -5 sells five units)",
        ));
    }
    Ok(())
}

/// Unit cost and totals for a new record placed right after `prev`.
/// Sales copy the predecessor's cost per unit; purchases keep `unit_cost`.
fn place_after(
    prev: Option<&Transaction>,
    kind: TransactionType,
    quantity: i64,
    unit_cost: Decimal,
) -> Result<(Decimal, RunningTotals)> {
    let unit_cost = match (kind, prev) {
        (TransactionType::Purchase, _) => unit_cost,
        (TransactionType::Sale, Some(prev)) => prev.running.cost_per_unit,
        (TransactionType::Sale, None) => return Err(LedgerError::NoCostBasis.into()),
    };

    let running = RunningTotals::fold(prev.map(|p| &p.running), quantity, unit_cost)?;
    if running.quantity < Decimal::ZERO {
        return Err(LedgerError::invalid(format!(
            "insufficient quantity: selling {} units with only {} available",
            quantity.unsigned_abs(),
            prev.map(|p| p.running.quantity).unwrap_or_default()
        ))
        .into());
    }
    Ok((unit_cost, running))
}

fn append(conn: &Connection, kind: TransactionType, quantity: i64, unit_cost: Decimal) -> Result<i64> {
    let state = db::get_ledger_state(conn)?;
    let tail = match state.tail_id {
        Some(tail_id) => Some(db::get_transaction(conn, tail_id)?.ok_or_else(|| {
            LedgerError::broken(format!("tail pointer references missing transaction #{}", tail_id))
        })?),
        None => None,
    };

    let (unit_cost, running) = place_after(tail.as_ref(), kind, quantity, unit_cost)?;
    let id = db::insert_transaction(
        conn,
        &NewTransaction {
            transaction_type: kind,
            quantity,
            unit_cost,
            running,
            prev_id: tail.as_ref().map(|t| t.id),
            next_id: None,
        },
    )?;

    match &tail {
        Some(tail) => db::set_next_id(conn, tail.id, Some(id))?,
        None => db::set_head(conn, Some(id))?,
    }
    db::set_tail(conn, Some(id))?;
    Ok(id)
}

fn insert_at_head(conn: &Connection, head_id: i64, quantity: i64, unit_cost: Decimal) -> Result<i64> {
    let head = db::get_transaction(conn, head_id)?.ok_or_else(|| {
        LedgerError::broken(format!("head pointer references missing transaction #{}", head_id))
    })?;
    if head.prev_id.is_some() {
        return Err(LedgerError::broken(format!(
            "head #{} still links back to #{:?}",
            head_id, head.prev_id
        ))
        .into());
    }

    let (unit_cost, running) = place_after(None, TransactionType::Purchase, quantity, unit_cost)?;
    let id = db::insert_transaction(
        conn,
        &NewTransaction {
            transaction_type: TransactionType::Purchase,
            quantity,
            unit_cost,
            running,
            prev_id: None,
            next_id: Some(head_id),
        },
    )?;
    db::set_prev_id(conn, head_id, Some(id))?;
    db::set_head(conn, Some(id))?;

    recalculate_forward(conn, head_id)?;
    Ok(id)
}

fn splice_after(
    conn: &Connection,
    prev_id: i64,
    kind: TransactionType,
    quantity: i64,
    unit_cost: Decimal,
) -> Result<i64> {
    let prev = db::require_transaction(conn, prev_id)?;
    let Some(next_id) = prev.next_id else {
        return append(conn, kind, quantity, unit_cost);
    };
    let next = fetch_linked(conn, next_id, prev_id)?;

    let (unit_cost, running) = place_after(Some(&prev), kind, quantity, unit_cost)?;
    let id = db::insert_transaction(
        conn,
        &NewTransaction {
            transaction_type: kind,
            quantity,
            unit_cost,
            running,
            prev_id: Some(prev.id),
            next_id: Some(next.id),
        },
    )?;
    db::set_next_id(conn, prev.id, Some(id))?;
    db::set_prev_id(conn, next.id, Some(id))?;

    recalculate_forward(conn, id)?;
    Ok(id)
}

/// Follow `next_id` from the head pointer. Returns the records reached and
/// the first structural problem met, if any.
fn walk_chain(conn: &Connection) -> Result<(Vec<Transaction>, Option<LedgerError>)> {
    let state = db::get_ledger_state(conn)?;
    let limit = db::count_transactions(conn)?;
    let mut records: Vec<Transaction> = Vec::with_capacity(limit);

    if limit > 0 && state.head_id.is_none() {
        return Ok((records, Some(LedgerError::broken("ledger has records but no head"))));
    }

    let mut cursor = state.head_id;
    while let Some(id) = cursor {
        if records.len() >= limit {
            return Ok((
                records,
                Some(LedgerError::broken(format!("cycle detected at #{}", id))),
            ));
        }
        let Some(tx) = db::get_transaction(conn, id)? else {
            let problem = match records.last() {
                Some(prev) => format!("#{} references missing transaction #{}", prev.id, id),
                None => format!("head pointer references missing transaction #{}", id),
            };
            return Ok((records, Some(LedgerError::broken(problem))));
        };
        cursor = tx.next_id;
        records.push(tx);
    }

    if records.last().map(|t| t.id) != state.tail_id {
        let problem = LedgerError::broken(format!(
            "walk ended at {:?} but tail pointer is {:?}",
            records.last().map(|t| t.id),
            state.tail_id
        ));
        return Ok((records, Some(problem)));
    }
    Ok((records, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn memory_ledger() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn kind_of(err: &anyhow::Error) -> LedgerError {
        err.downcast_ref::<LedgerError>()
            .cloned()
            .expect("ledger error")
    }

    #[test]
    fn test_first_purchase_opens_chain() {
        let mut conn = memory_ledger();
        let p = create_purchase(&mut conn, dec!(2), 150, Position::Append).unwrap();
        assert_eq!(p.prev_id, None);
        assert_eq!(p.next_id, None);
        assert_eq!(p.running.quantity, dec!(150));
        assert_eq!(p.running.asset, dec!(300));
        assert_eq!(p.running.cost_per_unit, dec!(2));

        let state = db::get_ledger_state(&conn).unwrap();
        assert_eq!(state.head_id, Some(p.id));
        assert_eq!(state.tail_id, Some(p.id));
    }

    #[test]
    fn test_head_insert_on_empty_ledger_appends() {
        let mut conn = memory_ledger();
        let p = create_purchase(&mut conn, dec!(1), 3, Position::Head).unwrap();
        assert_eq!(latest(&conn).unwrap().map(|t| t.id), Some(p.id));
    }

    #[test]
    fn test_splice_after_tail_behaves_as_append() {
        let mut conn = memory_ledger();
        let p1 = create_purchase(&mut conn, dec!(2), 150, Position::Append).unwrap();
        let s = create_sale(&mut conn, -5, Position::After(p1.id)).unwrap();
        assert_eq!(s.prev_id, Some(p1.id));
        assert_eq!(s.unit_cost, dec!(2));
        assert_eq!(latest(&conn).unwrap().unwrap().id, s.id);
    }

    #[test]
    fn test_sale_on_empty_ledger_is_rejected() {
        let mut conn = memory_ledger();
        let err = create_sale(&mut conn, -5, Position::Append).unwrap_err();
        assert_eq!(kind_of(&err), LedgerError::NoCostBasis);
        assert_eq!(db::count_transactions(&conn).unwrap(), 0);
        assert_eq!(db::get_ledger_state(&conn).unwrap(), db::LedgerState::default());
    }

    #[test]
    fn test_sale_at_head_is_rejected() {
        let mut conn = memory_ledger();
        create_purchase(&mut conn, dec!(2), 10, Position::Append).unwrap();
        let err = create_sale(&mut conn, -1, Position::Head).unwrap_err();
        assert!(matches!(kind_of(&err), LedgerError::InvalidInput(_)));
    }

    #[test]
    fn test_input_validation() {
        let mut conn = memory_ledger();
        let err = create_purchase(&mut conn, dec!(0), 10, Position::Append).unwrap_err();
        assert!(matches!(kind_of(&err), LedgerError::InvalidInput(_)));
        let err = create_purchase(&mut conn, dec!(1), 0, Position::Append).unwrap_err();
        assert!(matches!(kind_of(&err), LedgerError::InvalidInput(_)));

        create_purchase(&mut conn, dec!(1), 10, Position::Append).unwrap();
        let err = create_sale(&mut conn, 5, Position::Append).unwrap_err();
        assert!(matches!(kind_of(&err), LedgerError::InvalidInput(_)));
        let err = create_sale(&mut conn, -11, Position::Append).unwrap_err();
        assert!(matches!(kind_of(&err), LedgerError::InvalidInput(_)));
        assert_eq!(db::count_transactions(&conn).unwrap(), 1);
    }

    #[test]
    fn test_splice_after_missing_id_is_not_found() {
        let mut conn = memory_ledger();
        create_purchase(&mut conn, dec!(1), 10, Position::Append).unwrap();
        let err = create_purchase(&mut conn, dec!(1), 10, Position::After(99)).unwrap_err();
        assert_eq!(kind_of(&err), LedgerError::NotFound(99));
        assert_eq!(db::count_transactions(&conn).unwrap(), 1);
    }

    #[test]
    fn test_update_kind_mismatch_is_rejected() {
        let mut conn = memory_ledger();
        let p = create_purchase(&mut conn, dec!(1), 10, Position::Append).unwrap();
        let err = update_transaction(&mut conn, p.id, -1, None, TransactionType::Sale).unwrap_err();
        assert!(matches!(kind_of(&err), LedgerError::InvalidInput(_)));
    }

    #[test]
    fn test_update_sale_ignores_cost_override() {
        let mut conn = memory_ledger();
        create_purchase(&mut conn, dec!(4), 10, Position::Append).unwrap();
        let s = create_sale(&mut conn, -2, Position::Append).unwrap();
        let updated =
            update_transaction(&mut conn, s.id, -3, Some(dec!(99)), TransactionType::Sale).unwrap();
        assert_eq!(updated.unit_cost, dec!(4));
        assert_eq!(updated.running.quantity, dec!(7));
        assert_eq!(updated.running.asset, dec!(28));
    }

    #[test]
    fn test_delete_head_before_sale_is_rejected() {
        let mut conn = memory_ledger();
        let p = create_purchase(&mut conn, dec!(4), 10, Position::Append).unwrap();
        create_sale(&mut conn, -2, Position::Append).unwrap();
        let err = delete_transaction(&mut conn, p.id).unwrap_err();
        assert!(matches!(kind_of(&err), LedgerError::InvalidInput(_)));
        assert_eq!(list_transactions(&conn).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let mut conn = memory_ledger();
        let err = delete_transaction(&mut conn, 5).unwrap_err();
        assert_eq!(kind_of(&err), LedgerError::NotFound(5));
    }

    #[test]
    fn test_list_by_kind_keeps_chain_order() {
        let mut conn = memory_ledger();
        let p1 = create_purchase(&mut conn, dec!(1), 10, Position::Append).unwrap();
        let s1 = create_sale(&mut conn, -1, Position::Append).unwrap();
        let p0 = create_purchase(&mut conn, dec!(2), 5, Position::Head).unwrap();

        let purchases: Vec<i64> = list_by_kind(&conn, TransactionType::Purchase)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(purchases, vec![p0.id, p1.id]);
        let sales: Vec<i64> = list_by_kind(&conn, TransactionType::Sale)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(sales, vec![s1.id]);
    }
}
