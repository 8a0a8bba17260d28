//! Whole-chain verification
//!
//! Rebuilds the expected running totals from scratch and compares them,
//! together with the chain structure, against what is stored.

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;

use crate::db::{self, RunningTotals};

/// Outcome of a full chain check. No issues means the ledger is healthy.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub records: usize,
    pub reachable: usize,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check every structural and numeric invariant of the stored ledger.
///
/// Never modifies the database; problems are collected, not raised.
pub fn verify_chain(conn: &Connection) -> Result<IntegrityReport> {
    let state = db::get_ledger_state(conn)?;
    let rows = db::load_all_transactions(conn)?;
    let mut report = IntegrityReport {
        records: rows.len(),
        ..Default::default()
    };

    let mut heads: Vec<i64> = rows.values().filter(|t| t.prev_id.is_none()).map(|t| t.id).collect();
    let mut tails: Vec<i64> = rows.values().filter(|t| t.next_id.is_none()).map(|t| t.id).collect();
    heads.sort_unstable();
    tails.sort_unstable();

    if rows.is_empty() {
        if state.head_id.is_some() || state.tail_id.is_some() {
            report
                .issues
                .push(format!("empty ledger but pointers are {:?}", state));
        }
        return Ok(report);
    }

    if heads.len() != 1 {
        report
            .issues
            .push(format!("expected exactly one head, found {:?}", heads));
    }
    if tails.len() != 1 {
        report
            .issues
            .push(format!("expected exactly one tail, found {:?}", tails));
    }
    if heads.first().copied() != state.head_id || heads.len() != 1 {
        report.issues.push(format!(
            "head pointer is {:?}, chain heads are {:?}",
            state.head_id, heads
        ));
    }
    if tails.first().copied() != state.tail_id || tails.len() != 1 {
        report.issues.push(format!(
            "tail pointer is {:?}, chain tails are {:?}",
            state.tail_id, tails
        ));
    }

    let mut seen = HashSet::new();
    let mut prev: Option<(i64, RunningTotals)> = None;
    let mut cursor = state.head_id;

    while let Some(id) = cursor {
        let Some(tx) = rows.get(&id) else {
            report.issues.push(match prev {
                Some((prev_id, _)) => format!("#{} references missing transaction #{}", prev_id, id),
                None => format!("head pointer references missing transaction #{}", id),
            });
            break;
        };
        if !seen.insert(id) {
            report.issues.push(format!("cycle: #{} visited twice", id));
            break;
        }

        let expected_prev = prev.map(|(prev_id, _)| prev_id);
        if tx.prev_id != expected_prev {
            report.issues.push(format!(
                "#{} has prev {:?}, expected {:?}",
                id, tx.prev_id, expected_prev
            ));
        }

        let prev_totals = prev.map(|(_, totals)| totals);
        if tx.is_sale() {
            match prev_totals {
                Some(p) if p.cost_per_unit != tx.unit_cost => report.issues.push(format!(
                    "sale #{} carries unit cost {}, predecessor cost per unit is {}",
                    id, tx.unit_cost, p.cost_per_unit
                )),
                None => report
                    .issues
                    .push(format!("sale #{} is the head of the chain", id)),
                _ => {}
            }
        }

        let expected = match RunningTotals::fold(prev_totals.as_ref(), tx.quantity, tx.unit_cost) {
            Ok(expected) => expected,
            Err(err) => {
                report.issues.push(format!("#{} running totals cannot be recomputed: {}", id, err));
                tx.running
            }
        };
        if expected != tx.running {
            report.issues.push(format!(
                "#{} running totals {:?} differ from expected {:?}",
                id, tx.running, expected
            ));
        }

        prev = Some((id, expected));
        cursor = tx.next_id;
    }

    report.reachable = seen.len();
    if report.reachable < report.records {
        let mut orphans: Vec<i64> = rows.keys().filter(|id| !seen.contains(id)).copied().collect();
        orphans.sort_unstable();
        report
            .issues
            .push(format!("unreachable transactions: {:?}", orphans));
    }

    Ok(report)
}
