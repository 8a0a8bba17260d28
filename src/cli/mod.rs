use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use avco::db::TransactionType;

pub mod export;
pub mod formatters;

#[derive(Parser)]
#[command(name = "avco")]
#[command(version, about = "Inventory ledger using moving weighted-average cost")]
#[command(
    long_about = "Record purchases and sales of a single inventory item. Every entry keeps the running quantity, total asset value and weighted-average cost per unit as of its position; entries can be inserted, edited or removed anywhere and everything after them is recalculated."
)]
pub struct Cli {
    /// Ledger database file (overrides AVCO_DB and the config file)
    #[arg(long = "db", global = true)]
    pub db: Option<PathBuf>,

    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the ledger database
    Init,

    /// Record a purchase
    Purchase {
        /// Cost per unit (greater than zero)
        #[arg(short, long)]
        cost: String,

        /// Units bought (at least 1)
        #[arg(short, long)]
        quantity: i64,

        /// 0 = append, -1 = before the first entry, <id> = right after entry <id>
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        position: i64,
    },

    /// Record a sale at the current weighted-average cost
    Sale {
        /// Units sold, as a negative number (e.g. -5)
        #[arg(short, long, allow_negative_numbers = true)]
        quantity: i64,

        /// 0 = append, <id> = right after entry <id>
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        position: i64,
    },

    /// Change an entry and recalculate everything after it
    Update {
        /// Entry id
        id: i64,

        /// New quantity (negative for sales)
        #[arg(short, long, allow_negative_numbers = true)]
        quantity: i64,

        /// New cost per unit (purchases only; sales follow the average)
        #[arg(short, long)]
        cost: Option<String>,

        /// Kind of the entry being updated
        #[arg(short, long, value_enum)]
        kind: KindArg,
    },

    /// Remove an entry and recalculate everything after it
    Delete {
        /// Entry id
        id: i64,
    },

    /// List entries in ledger order
    List {
        /// Only show purchases or sales
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,

        /// Show the reachable part of a damaged ledger instead of failing
        #[arg(long)]
        lenient: bool,
    },

    /// Show current quantity, asset value and cost per unit
    Latest,

    /// Verify the chain and every running total
    Check,

    /// Write the ledger to a CSV file
    Export {
        /// Destination CSV path
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Purchase,
    Sale,
}

impl From<KindArg> for TransactionType {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Purchase => TransactionType::Purchase,
            KindArg::Sale => TransactionType::Sale,
        }
    }
}
