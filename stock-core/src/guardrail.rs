//! Allocation guardrail
//!
//! The single point that stops a non-reservation dispatch from consuming
//! reserved stock. Pure function of an item snapshot; it must be called
//! inside the item's critical section so the snapshot cannot be stale.
//!
//! Additions are always approved. A resulting stock above `max_ceiling` is
//! reported as a [`CeilingWarning`] and never blocks the mutation.

use crate::types::{Item, TransactionType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric breakdown of a rejected dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationBreach {
    /// Physical units on hand
    pub current_stock: i64,
    /// Reserved units
    pub allocated_stock: i64,
    /// `current_stock - allocated_stock`
    pub available_for_use: i64,
    /// Units the dispatch asked for
    pub requested_change: i64,
}

impl fmt::Display for AllocationBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requested {} but only {} available ({} on hand, {} allocated)",
            self.requested_change, self.available_for_use, self.current_stock, self.allocated_stock
        )
    }
}

/// Resulting stock would exceed the advisory ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CeilingWarning {
    /// Configured ceiling
    pub max_ceiling: i64,
    /// Stock after the addition
    pub resulting_stock: i64,
}

/// Guardrail verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Mutation may proceed
    Approved {
        /// Set when an addition pushes stock above the ceiling
        ceiling_warning: Option<CeilingWarning>,
    },
    /// Dispatch would consume reserved stock
    Rejected(AllocationBreach),
}

impl Decision {
    /// Whether the mutation may proceed
    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approved { .. })
    }
}

/// Evaluate a requested change against an item snapshot
pub fn check(item: &Item, quantity_change: i64, transaction_type: TransactionType) -> Decision {
    let available = item.available_stock();

    if quantity_change >= 0 {
        let resulting_stock = item.current_stock.saturating_add(quantity_change);
        let ceiling_warning = (resulting_stock > item.max_ceiling).then_some(CeilingWarning {
            max_ceiling: item.max_ceiling,
            resulting_stock,
        });
        return Decision::Approved { ceiling_warning };
    }

    let requested = quantity_change.saturating_neg();
    if requested > available {
        tracing::debug!(
            item = %item.code,
            %transaction_type,
            requested,
            available,
            "Guardrail rejected dispatch"
        );
        return Decision::Rejected(AllocationBreach {
            current_stock: item.current_stock,
            allocated_stock: item.allocated_stock,
            available_for_use: available,
            requested_change: requested,
        });
    }

    Decision::Approved {
        ceiling_warning: None,
    }
}
