//! Transaction recorder
//!
//! Turns a validated mutation request into one atomic unit of work:
//!
//! 1. Load the item snapshot
//! 2. Run the allocation guardrail against the snapshot
//! 3. Stage the new stock (`NegativeStockResult` if it would go below zero)
//! 4. Commit item + transaction + indices in one `WriteBatch`
//!
//! A rejected dispatch on an item with nothing reserved is reported as
//! `NegativeStockResult`; otherwise a rejection carries the full
//! `AllocationBreach` breakdown. Any failure before step 4 leaves storage
//! unchanged. Must be called from the item's actor so no other write to the
//! same item interleaves.

use crate::{
    clock::{Clock, Timestamp},
    guardrail::{self, Decision},
    ledger::ItemLedger,
    metrics::Metrics,
    storage::Storage,
    types::{ItemCode, MutationOutcome, Principal, StockMutation, Transaction},
    Error, Result,
};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Check-then-apply-then-log
#[derive(Clone)]
pub struct Recorder {
    ledger: ItemLedger,
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl Recorder {
    /// Create recorder
    pub fn new(
        ledger: ItemLedger,
        storage: Arc<Storage>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
    ) -> Self {
        Self {
            ledger,
            storage,
            clock,
            metrics,
        }
    }

    /// Current time from the recorder's clock
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Record a stock mutation; free text must already be sanitized
    pub fn record(
        &self,
        principal: &Principal,
        mutation: &StockMutation,
    ) -> Result<MutationOutcome> {
        let started = Instant::now();
        let result = self.record_inner(principal, mutation);

        match &result {
            Ok(outcome) => {
                self.metrics.record_mutation(
                    started.elapsed().as_secs_f64(),
                    outcome.ceiling_warning.is_some(),
                );
            }
            Err(e) => {
                self.metrics.record_rejection(e);
                if e.is_rejection() {
                    tracing::info!(
                        item = %mutation.code,
                        actor = %principal.id,
                        quantity_change = mutation.quantity_change,
                        error = %e,
                        "Mutation rejected"
                    );
                } else {
                    tracing::error!(item = %mutation.code, error = %e, "Mutation failed");
                }
            }
        }

        result
    }

    fn record_inner(
        &self,
        principal: &Principal,
        mutation: &StockMutation,
    ) -> Result<MutationOutcome> {
        mutation.validate()?;

        let code = ItemCode::new(mutation.code.as_str());
        let snapshot = self.ledger.get(&code)?;

        let decision = guardrail::check(
            &snapshot,
            mutation.quantity_change,
            mutation.transaction_type,
        );
        let ceiling_warning = match decision {
            Decision::Approved { ceiling_warning } => ceiling_warning,
            Decision::Rejected(breach) => {
                // Nothing reserved: the shortfall is physical stock
                if breach.allocated_stock == 0 {
                    snapshot.with_stock_delta(mutation.quantity_change)?;
                }
                return Err(Error::AllocationBreach(breach));
            }
        };

        let mut item = snapshot.with_stock_delta(mutation.quantity_change)?;

        // Non-decreasing per item even if the clock steps back
        let timestamp = match snapshot.last_movement_at {
            Some(last) => self.clock.now().max(last),
            None => self.clock.now(),
        };
        item.last_movement_at = Some(timestamp);

        let transaction = Transaction {
            id: Uuid::now_v7(),
            sequence: self.storage.next_transaction_sequence(),
            item_code: code,
            item_name: snapshot.description.clone(),
            actor_id: principal.id.clone(),
            actor_name: principal.display_name.clone(),
            quantity_change: mutation.quantity_change,
            previous_stock: snapshot.current_stock,
            new_stock: item.current_stock,
            transaction_type: mutation.transaction_type,
            destination: mutation.destination.clone(),
            purpose: mutation.purpose.clone(),
            timestamp,
            ceiling_exceeded: ceiling_warning.is_some(),
        };

        self.storage.commit_mutation(&item, &transaction)?;

        tracing::info!(
            item = %item.code,
            actor = %principal.id,
            transaction_type = %transaction.transaction_type,
            quantity_change = transaction.quantity_change,
            previous_stock = transaction.previous_stock,
            new_stock = transaction.new_stock,
            sequence = transaction.sequence,
            "Stock mutation recorded"
        );
        if let Some(warning) = &ceiling_warning {
            tracing::warn!(
                item = %item.code,
                max_ceiling = warning.max_ceiling,
                resulting_stock = warning.resulting_stock,
                "Stock above ceiling"
            );
        }

        Ok(MutationOutcome {
            item,
            transaction,
            ceiling_warning,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::guardrail::AllocationBreach;
    use crate::types::NewItem;
    use crate::Config;

    struct Fixture {
        recorder: Recorder,
        ledger: ItemLedger,
        storage: Arc<Storage>,
        clock: Arc<ManualClock>,
        _temp: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;

        let storage = Arc::new(Storage::open(&config).unwrap());
        let ledger = ItemLedger::new(storage.clone(), config.items.clone());
        let clock = Arc::new(ManualClock::new(Timestamp::from_nanos(1_000)));
        let recorder = Recorder::new(
            ledger.clone(),
            storage.clone(),
            clock.clone(),
            Metrics::new().unwrap(),
        );

        Fixture {
            recorder,
            ledger,
            storage,
            clock,
            _temp: temp_dir,
        }
    }

    fn create(f: &Fixture, code: &str, current: i64, allocated: i64, max_ceiling: i64) {
        f.ledger
            .create(
                NewItem {
                    code: code.to_string(),
                    description: "Gasket".to_string(),
                    current_stock: Some(current),
                    allocated_stock: Some(allocated),
                    min_threshold: Some(0),
                    max_ceiling: Some(max_ceiling),
                    ..Default::default()
                },
                Timestamp::ZERO,
            )
            .unwrap();
    }

    fn admin() -> Principal {
        Principal::admin("u1", "Ana")
    }

    #[test]
    fn test_guardrail_boundary() {
        let f = fixture();
        create(&f, "GSK-1", 10, 5, 20);

        let outcome = f
            .recorder
            .record(&admin(), &StockMutation::dispatch("GSK-1", 5))
            .unwrap();
        assert_eq!(outcome.item.current_stock, 5);
        assert_eq!(outcome.transaction.previous_stock, 10);
        assert_eq!(outcome.transaction.new_stock, 5);

        let err = f
            .recorder
            .record(&admin(), &StockMutation::dispatch("GSK-1", 5))
            .unwrap_err();
        assert_eq!(
            err.allocation_breach(),
            Some(&AllocationBreach {
                current_stock: 5,
                allocated_stock: 5,
                available_for_use: 0,
                requested_change: 5,
            })
        );
        assert_eq!(
            f.storage
                .item_transactions(&ItemCode::new("GSK-1"))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_breach_reported_when_dispatch_exceeds_physical_stock() {
        let f = fixture();
        create(&f, "GSK-1", 10, 5, 20);

        let err = f
            .recorder
            .record(&admin(), &StockMutation::dispatch("GSK-1", 11))
            .unwrap_err();
        assert_eq!(
            err.allocation_breach(),
            Some(&AllocationBreach {
                current_stock: 10,
                allocated_stock: 5,
                available_for_use: 5,
                requested_change: 11,
            })
        );

        create(&f, "GSK-2", 5, 5, 20);
        let err = f
            .recorder
            .record(&admin(), &StockMutation::dispatch("GSK-2", 8))
            .unwrap_err();
        assert_eq!(
            err.allocation_breach(),
            Some(&AllocationBreach {
                current_stock: 5,
                allocated_stock: 5,
                available_for_use: 0,
                requested_change: 8,
            })
        );

        assert!(f.storage.recent_transactions(10).unwrap().is_empty());
        assert_eq!(f.ledger.get(&ItemCode::new("GSK-1")).unwrap().current_stock, 10);
        assert_eq!(f.ledger.get(&ItemCode::new("GSK-2")).unwrap().current_stock, 5);
    }

    #[test]
    fn test_breach_leaves_storage_unchanged() {
        let f = fixture();
        create(&f, "GSK-1", 10, 5, 20);
        let before = f.ledger.get(&ItemCode::new("GSK-1")).unwrap();

        let err = f
            .recorder
            .record(&admin(), &StockMutation::dispatch("GSK-1", 6))
            .unwrap_err();
        assert!(matches!(err, Error::AllocationBreach(b) if b.requested_change == 6));
        assert_eq!(f.ledger.get(&before.code).unwrap(), before);
        assert!(f.storage.recent_transactions(10).unwrap().is_empty());
    }

    #[test]
    fn test_addition_over_ceiling() {
        let f = fixture();
        create(&f, "GSK-1", 5, 0, 8);

        let outcome = f
            .recorder
            .record(&admin(), &StockMutation::addition("GSK-1", 100))
            .unwrap();
        assert_eq!(outcome.item.current_stock, 105);
        assert!(outcome.transaction.ceiling_exceeded);
        assert_eq!(outcome.ceiling_warning.map(|w| w.resulting_stock), Some(105));
    }

    #[test]
    fn test_negative_result_blocked() {
        let f = fixture();
        create(&f, "GSK-1", 3, 0, 20);

        let outcome = f
            .recorder
            .record(&admin(), &StockMutation::dispatch("GSK-1", 3))
            .unwrap();
        assert_eq!(outcome.item.current_stock, 0);

        let err = f
            .recorder
            .record(&admin(), &StockMutation::dispatch("GSK-1", 1))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NegativeStockResult {
                current_stock: 0,
                quantity_change: -1
            }
        ));
    }

    #[test]
    fn test_invalid_mutation_rejected_first() {
        let f = fixture();
        let err = f
            .recorder
            .record(&admin(), &StockMutation::addition("missing", 0))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMutation(_)));

        let err = f
            .recorder
            .record(&admin(), &StockMutation::addition("missing", 1))
            .unwrap_err();
        assert!(matches!(err, Error::ItemNotFound(_)));
    }

    #[test]
    fn test_timestamps_monotonic_when_clock_steps_back() {
        let f = fixture();
        create(&f, "GSK-1", 0, 0, 20);

        f.clock.set(Timestamp::from_nanos(5_000));
        let first = f
            .recorder
            .record(&admin(), &StockMutation::addition("GSK-1", 1))
            .unwrap();

        f.clock.set(Timestamp::from_nanos(2_000));
        let second = f
            .recorder
            .record(&admin(), &StockMutation::addition("GSK-1", 1))
            .unwrap();

        assert_eq!(first.transaction.timestamp, Timestamp::from_nanos(5_000));
        assert!(second.transaction.timestamp >= first.transaction.timestamp);
        assert!(second.transaction.sequence > first.transaction.sequence);
    }

    #[test]
    fn test_snapshots_principal_and_annotations() {
        let f = fixture();
        create(&f, "GSK-1", 4, 0, 20);

        let mutation = StockMutation::dispatch("GSK-1", 2)
            .with_destination("Line 3")
            .with_purpose("Repair");
        let outcome = f
            .recorder
            .record(&Principal::staff("u9", "Ben"), &mutation)
            .unwrap();

        let stored = f.storage.get_transaction(outcome.transaction.sequence).unwrap();
        assert_eq!(stored.actor_id, "u9");
        assert_eq!(stored.actor_name, "Ben");
        assert_eq!(stored.item_name, "Gasket");
        assert_eq!(stored.destination, "Line 3");
        assert_eq!(stored.purpose, "Repair");
    }
}
