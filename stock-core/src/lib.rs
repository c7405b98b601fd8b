//! StockSense Inventory Core
//!
//! Stock ledger with an allocation guardrail and an append-only audit trail.
//!
//! # Architecture
//!
//! - **Single writer per item**: one actor per item code serializes every write
//! - **Atomic commit**: item update and transaction record share one `WriteBatch`
//! - **Guardrail**: dispatches can never consume allocated stock
//! - **Black-box audit trail**: transactions are written once and never changed
//!
//! # Invariants
//!
//! - `0 <= allocated_stock <= current_stock` for every item
//! - `0 <= min_threshold <= max_ceiling`
//! - `new_stock = previous_stock + quantity_change`, `quantity_change != 0`
//! - Transaction type matches the sign of the change
//! - Timestamps never decrease within one item's history

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod clock;
pub mod config;
pub mod error;
pub mod guardrail;
pub mod inventory;
pub mod ledger;
pub mod metrics;
pub mod recorder;
pub mod sanitize;
pub mod storage;
pub mod types;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::Config;
pub use error::{Error, Result};
pub use guardrail::{AllocationBreach, CeilingWarning, Decision};
pub use inventory::{HistoryReport, HistoryViolation, Inventory, InventoryStats};
pub use storage::Storage;
pub use types::{
    AllocationRecord, AllocationStatus, Item, ItemCode, ItemPatch, MutationOutcome,
    NewAllocation, NewItem, Principal, Role, StockMutation, Transaction, TransactionType,
};
