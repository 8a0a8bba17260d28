//! Avco - inventory ledger using the moving weighted-average cost method
//!
//! Purchases and sales form an ordered chain; every record caches the
//! running quantity, asset value and cost per unit at its position, and
//! edits anywhere in the chain recompute only the records after them.

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod utils;
