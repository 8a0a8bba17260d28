use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::LedgerError;

/// Transaction type (purchase or sale)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Purchase,
    Sale,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "PURCHASE",
            TransactionType::Sale => "SALE",
        }
    }
}

impl FromStr for TransactionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PURCHASE" | "BUY" | "P" => Ok(TransactionType::Purchase),
            "SALE" | "SELL" | "S" => Ok(TransactionType::Sale),
            _ => Err(()),
        }
    }
}

/// Cached aggregates of the chain prefix ending at a record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RunningTotals {
    pub quantity: Decimal,
    pub asset: Decimal,
    pub cost_per_unit: Decimal,
}

impl RunningTotals {
    /// Fold one movement onto the totals of its predecessor.
    ///
    /// `prev = None` means the movement opens the chain. Cost per unit is
    /// zero whenever the running quantity is zero. Fails with
    /// `InvalidInput` when an amount does not fit in a `Decimal`.
    pub fn fold(
        prev: Option<&RunningTotals>,
        quantity: i64,
        unit_cost: Decimal,
    ) -> Result<Self, LedgerError> {
        let (base_quantity, base_asset) = prev
            .map(|p| (p.quantity, p.asset))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));

        let out_of_range = || LedgerError::invalid("amount out of range");
        let quantity_delta = Decimal::from(quantity);
        let running_quantity = base_quantity
            .checked_add(quantity_delta)
            .ok_or_else(out_of_range)?;
        let running_asset = unit_cost
            .checked_mul(quantity_delta)
            .and_then(|moved| base_asset.checked_add(moved))
            .ok_or_else(out_of_range)?;
        let cost_per_unit = if running_quantity.is_zero() {
            Decimal::ZERO
        } else {
            running_asset
                .checked_div(running_quantity)
                .ok_or_else(out_of_range)?
        };

        Ok(Self {
            quantity: running_quantity,
            asset: running_asset,
            cost_per_unit,
        })
    }
}

/// A ledger record: one movement plus the running totals as of that point
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub transaction_type: TransactionType,
    /// Signed delta: positive for purchases, negative for sales
    pub quantity: i64,
    pub unit_cost: Decimal,
    pub running: RunningTotals,
    pub prev_id: Option<i64>,
    pub next_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_sale(&self) -> bool {
        self.transaction_type == TransactionType::Sale
    }
}

/// Fields of a record that does not have an id yet
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub transaction_type: TransactionType,
    pub quantity: i64,
    pub unit_cost: Decimal,
    pub running: RunningTotals,
    pub prev_id: Option<i64>,
    pub next_id: Option<i64>,
}
