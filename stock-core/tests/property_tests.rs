//! Property-based tests for inventory invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Allocation safety: `allocated_stock <= current_stock` after any sequence
//! - Stock arithmetic: every record satisfies `new = previous + change`
//! - Replay: the audit trail reproduces the stored stock
//! - Atomicity: rejected mutations leave no record and no stock change

use proptest::prelude::*;
use stock_core::{
    AllocationBreach, Config, Error, Inventory, NewItem, Principal, StockMutation,
    TransactionType,
};

/// One requested stock movement
#[derive(Debug, Clone, Copy)]
enum Op {
    Add(i64),
    Dispatch(i64),
}

/// Strategy for generating movements
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..25).prop_map(Op::Add),
        (1i64..25).prop_map(Op::Dispatch),
    ]
}

/// Strategy for generating a valid starting item: (current, allocated)
fn start_strategy() -> impl Strategy<Value = (i64, i64)> {
    (0i64..40).prop_flat_map(|current| (Just(current), 0..=current))
}

/// Create test inventory with temp directory
fn create_test_inventory() -> (Inventory, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    config.rocksdb.sync_writes = false; // No fsync in tests

    (Inventory::open(config).unwrap(), temp_dir)
}

fn admin() -> Principal {
    Principal::admin("u1", "Ana")
}

fn staff() -> Principal {
    Principal::staff("u2", "Ben")
}

fn new_item(current: i64, allocated: i64) -> NewItem {
    NewItem {
        code: "PRT-1".to_string(),
        description: "Drive belt".to_string(),
        current_stock: Some(current),
        allocated_stock: Some(allocated),
        ..Default::default()
    }
}

fn to_mutation(op: Op) -> StockMutation {
    match op {
        Op::Add(qty) => StockMutation::addition("PRT-1", qty),
        Op::Dispatch(qty) => StockMutation::dispatch("PRT-1", qty),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: stock matches a simple model and never crosses the reserve
    #[test]
    fn prop_guardrail_matches_model(
        (current, allocated) in start_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..30),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (inventory, _temp) = create_test_inventory();
            inventory.create_item(&admin(), new_item(current, allocated)).await.unwrap();

            let mut model = current;
            let mut committed = 0usize;
            for op in ops {
                let result = inventory.mutate_stock(&staff(), to_mutation(op)).await;
                match op {
                    Op::Add(qty) => {
                        prop_assert!(result.is_ok());
                        model += qty;
                        committed += 1;
                    }
                    Op::Dispatch(qty) if qty <= model - allocated => {
                        prop_assert!(result.is_ok());
                        model -= qty;
                        committed += 1;
                    }
                    Op::Dispatch(qty) if allocated > 0 => {
                        let err = result.unwrap_err();
                        prop_assert_eq!(
                            err.allocation_breach(),
                            Some(&AllocationBreach {
                                current_stock: model,
                                allocated_stock: allocated,
                                available_for_use: model - allocated,
                                requested_change: qty,
                            })
                        );
                    }
                    Op::Dispatch(qty) => {
                        let err = result.unwrap_err();
                        prop_assert!(
                            matches!(
                                err,
                                Error::NegativeStockResult { current_stock, quantity_change }
                                    if current_stock == model && quantity_change == -qty
                            ),
                            "unexpected error: {:?}",
                            err
                        );
                    }
                }

                let item = inventory.get_item("PRT-1").unwrap();
                prop_assert_eq!(item.current_stock, model);
                prop_assert!(item.allocated_stock <= item.current_stock);
                prop_assert!(item.available_stock() >= 0);
            }

            let history = inventory.list_item_transactions(&staff(), "PRT-1").unwrap();
            prop_assert_eq!(history.len(), committed);

            inventory.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: the audit trail replays to the stored stock
    #[test]
    fn prop_history_replays_to_item(
        (current, allocated) in start_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..30),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (inventory, _temp) = create_test_inventory();
            inventory.create_item(&admin(), new_item(current, allocated)).await.unwrap();

            for op in ops {
                let _ = inventory.mutate_stock(&staff(), to_mutation(op)).await;
            }

            let mut history = inventory.list_item_transactions(&staff(), "PRT-1").unwrap();
            history.reverse();

            let mut stock = current;
            for txn in &history {
                prop_assert_ne!(txn.quantity_change, 0);
                prop_assert_eq!(txn.previous_stock, stock);
                prop_assert_eq!(txn.new_stock, txn.previous_stock + txn.quantity_change);
                prop_assert_eq!(
                    TransactionType::for_change(txn.quantity_change),
                    Some(txn.transaction_type)
                );
                stock = txn.new_stock;
            }
            prop_assert_eq!(stock, inventory.get_item("PRT-1").unwrap().current_stock);
            prop_assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

            let report = inventory.verify_item_history("PRT-1").unwrap();
            prop_assert!(report.is_consistent());
            prop_assert_eq!(report.transactions_checked, history.len());

            inventory.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: invalid thresholds are always refused at creation
    #[test]
    fn prop_invalid_threshold_refused(min in 0i64..100, gap in 1i64..100) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (inventory, _temp) = create_test_inventory();
            let mut fields = new_item(0, 0);
            fields.min_threshold = Some(min);
            fields.max_ceiling = Some(min - gap);

            let result = inventory.create_item(&admin(), fields).await;
            prop_assert!(
                matches!(result, Err(Error::InvalidThreshold { .. })),
                "unexpected result: {:?}",
                result
            );
            prop_assert!(inventory.list_items().unwrap().is_empty());

            inventory.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_rejected_mutation_leaves_no_trace() {
        let (inventory, _temp) = create_test_inventory();
        inventory
            .create_item(&admin(), new_item(10, 5))
            .await
            .unwrap();
        let before = inventory.get_item("PRT-1").unwrap();

        let err = inventory
            .mutate_stock(&staff(), StockMutation::dispatch("PRT-1", 6))
            .await
            .unwrap_err();
        assert!(err.is_rejection());

        assert_eq!(inventory.get_item("PRT-1").unwrap(), before);
        assert!(inventory.list_transactions(&admin(), None).unwrap().is_empty());

        inventory.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_full_item_lifecycle() {
        let (inventory, _temp) = create_test_inventory();

        // 1. Item created empty
        inventory
            .create_item(&admin(), new_item(0, 0))
            .await
            .unwrap();

        // 2. Delivery arrives
        let outcome = inventory
            .mutate_stock(
                &staff(),
                StockMutation::addition("PRT-1", 12)
                    .with_destination("Warehouse")
                    .with_purpose("Delivery"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.item.current_stock, 12);

        // 3. Restock band tightened
        inventory
            .update_thresholds(&admin(), "PRT-1", 4, 15)
            .await
            .unwrap();

        // 4. Dispatch to a line
        inventory
            .mutate_stock(
                &staff(),
                StockMutation::dispatch("PRT-1", 9)
                    .with_destination("Line 2")
                    .with_purpose("Repair"),
            )
            .await
            .unwrap();

        // 5. Now below threshold
        let low = inventory.list_low_stock().unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].current_stock, 3);

        // 6. Audit trail is complete and newest first
        let history = inventory.list_transactions(&admin(), None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].destination, "Line 2");
        assert_eq!(history[0].actor_name, "Ben");
        assert_eq!(history[1].purpose, "Delivery");
        assert!(inventory.verify_item_history("PRT-1").unwrap().is_consistent());

        let stats = inventory.stats().unwrap();
        assert_eq!(stats.total_items, 1);
        assert_eq!(stats.low_stock_count, 1);
        assert_eq!(stats.total_stock, 3);
        assert_eq!(stats.recent_transactions, 2);

        inventory.shutdown().await.unwrap();
    }
}
