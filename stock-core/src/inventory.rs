//! Inventory facade
//!
//! The public entry point. Responsibilities:
//! - authorization from the caller's [`Principal`]
//! - sanitization of every code and free-text field
//! - routing writes to the item's actor, reads straight to storage
//! - allocation records, history replay and dashboard statistics

use crate::{
    actor::ActorRegistry,
    clock::{Clock, SystemClock, Timestamp},
    ledger::ItemLedger,
    metrics::Metrics,
    recorder::Recorder,
    sanitize::{Sanitizer, DEFAULT_DESTINATION, DEFAULT_PURPOSE},
    storage::Storage,
    types::{
        validate_thresholds, AllocationRecord, AllocationStatus, Item, ItemCode, ItemPatch,
        MutationOutcome, NewAllocation, NewItem, Principal, StockMutation, Transaction,
        TransactionType,
    },
    Config, Error, Result,
};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const NANOS_PER_DAY: i64 = 86_400 * 1_000_000_000;

/// Dashboard statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStats {
    /// Items on record
    pub total_items: u64,
    /// Items whose available stock is below threshold
    pub low_stock_count: u64,
    /// Sum of `current_stock` over all items
    pub total_stock: i64,
    /// Transactions inside the recent window
    pub recent_transactions: u64,
}

/// Inconsistency found while replaying an item's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryViolation {
    /// Record with a zero change
    ZeroChange { sequence: u64 },
    /// `new_stock != previous_stock + quantity_change`
    Arithmetic { sequence: u64 },
    /// Type disagrees with the sign of the change
    TypeMismatch { sequence: u64 },
    /// Timestamp earlier than the previous record's
    TimestampRegression { sequence: u64 },
    /// `previous_stock` differs from the prior record's `new_stock`
    ChainBreak {
        sequence: u64,
        expected: i64,
        found: i64,
    },
    /// Last `new_stock` differs from the item's `current_stock`
    FinalStockMismatch { expected: i64, found: i64 },
}

/// Result of replaying an item's transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryReport {
    /// Item replayed
    pub item_code: ItemCode,
    /// Records examined
    pub transactions_checked: usize,
    /// Everything that did not add up
    pub violations: Vec<HistoryViolation>,
}

impl HistoryReport {
    /// No violations found
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Inventory core
#[derive(Debug)]
pub struct Inventory {
    config: Config,
    storage: Arc<Storage>,
    ledger: ItemLedger,
    recorder: Recorder,
    actors: ActorRegistry,
    sanitizer: Sanitizer,
    metrics: Metrics,
}

impl Inventory {
    /// Open inventory with the system clock
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open inventory with an explicit clock
    pub fn open_with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let storage = Arc::new(Storage::open(&config)?);
        let metrics =
            Metrics::new().map_err(|e| Error::Other(format!("Failed to create metrics: {}", e)))?;
        let ledger = ItemLedger::new(storage.clone(), config.items.clone());
        let recorder = Recorder::new(ledger.clone(), storage.clone(), clock, metrics.clone());
        let actors = ActorRegistry::new(
            ledger.clone(),
            recorder.clone(),
            config.actors.mailbox_capacity,
        );

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            data_dir = ?config.data_dir,
            "Inventory opened"
        );

        Ok(Self {
            config,
            storage,
            ledger,
            recorder,
            actors,
            sanitizer: Sanitizer::new(),
            metrics,
        })
    }

    /// Drain and stop all item actors
    pub async fn shutdown(&self) -> Result<()> {
        self.actors.shutdown().await?;
        tracing::info!("Inventory shut down");
        Ok(())
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    // Items

    /// Create an item (admin)
    pub async fn create_item(&self, principal: &Principal, fields: NewItem) -> Result<Item> {
        principal.require_admin("create items")?;

        let fields = NewItem {
            code: self.sanitizer.sanitize_code(&fields.code)?,
            description: self
                .sanitizer
                .sanitize_required(&fields.description, "description")?,
            vendor: self.sanitizer.sanitize_field(&fields.vendor)?,
            storage_location: self.sanitizer.sanitize_field(&fields.storage_location)?,
            image: self.sanitize_optional(fields.image)?,
            ..fields
        };

        // Bad fields never reach the registry, so no actor is spawned for them
        self.ledger.build(&fields, Timestamp::ZERO)?;

        let code = ItemCode::new(fields.code.as_str());
        let item = self.actors.handle(&code)?.create(fields).await?;
        self.metrics.record_item_created();
        Ok(item)
    }

    /// Get item by code
    pub fn get_item(&self, code: &str) -> Result<Item> {
        let code = self.sanitizer.sanitize_code(code)?;
        self.ledger.get(&ItemCode::new(code))
    }

    /// All items ordered by code
    pub fn list_items(&self) -> Result<Vec<Item>> {
        self.ledger.list()
    }

    /// Items whose available stock is below their threshold
    pub fn list_low_stock(&self) -> Result<Vec<Item>> {
        self.ledger.list_low_stock()
    }

    /// Apply a stock change and append its transaction
    pub async fn mutate_stock(
        &self,
        principal: &Principal,
        mutation: StockMutation,
    ) -> Result<MutationOutcome> {
        let mutation = StockMutation {
            code: self.sanitizer.sanitize_code(&mutation.code)?,
            destination: self
                .sanitizer
                .sanitize_note(&mutation.destination, DEFAULT_DESTINATION)?,
            purpose: self
                .sanitizer
                .sanitize_note(&mutation.purpose, DEFAULT_PURPOSE)?,
            ..mutation
        };
        mutation.validate()?;

        // Items are never deleted, so existence checked here still holds
        let code = ItemCode::new(mutation.code.as_str());
        self.ledger.get(&code)?;

        self.actors
            .handle(&code)?
            .mutate(principal.clone(), mutation)
            .await
    }

    /// Replace an item's restock band (admin)
    pub async fn update_thresholds(
        &self,
        principal: &Principal,
        code: &str,
        min_threshold: i64,
        max_ceiling: i64,
    ) -> Result<Item> {
        principal.require_admin("edit thresholds")?;
        validate_thresholds(min_threshold, max_ceiling)?;

        let code = self.existing_code(code)?;
        self.actors
            .handle(&code)?
            .update_thresholds(min_threshold, max_ceiling)
            .await
    }

    /// Edit an item's descriptive metadata (admin)
    pub async fn update_metadata(
        &self,
        principal: &Principal,
        code: &str,
        patch: ItemPatch,
    ) -> Result<Item> {
        principal.require_admin("edit item metadata")?;

        let patch = ItemPatch {
            description: patch
                .description
                .map(|d| self.sanitizer.sanitize_required(&d, "description"))
                .transpose()?,
            vendor: patch
                .vendor
                .map(|v| self.sanitizer.sanitize_field(&v))
                .transpose()?,
            storage_location: patch
                .storage_location
                .map(|l| self.sanitizer.sanitize_field(&l))
                .transpose()?,
            image: patch
                .image
                .map(|i| self.sanitize_optional(i))
                .transpose()?,
            ..patch
        };

        let code = self.existing_code(code)?;
        self.actors.handle(&code)?.update_metadata(patch).await
    }

    // History

    /// Newest transactions first (admin)
    pub fn list_transactions(
        &self,
        principal: &Principal,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>> {
        principal.require_admin("read transaction history")?;

        let limit = limit
            .unwrap_or(self.config.history.default_limit)
            .min(self.config.history.max_limit);
        self.storage.recent_transactions(limit)
    }

    /// One item's transactions, newest first
    pub fn list_item_transactions(
        &self,
        principal: &Principal,
        code: &str,
    ) -> Result<Vec<Transaction>> {
        let code = self.existing_code(code)?;
        tracing::debug!(item = %code, actor = %principal.id, "Item history read");

        let mut transactions = self.storage.item_transactions(&code)?;
        transactions.reverse();
        Ok(transactions)
    }

    /// Replay an item's history and check it against the stored item
    pub fn verify_item_history(&self, code: &str) -> Result<HistoryReport> {
        let code = self.existing_code(code)?;
        let item = self.ledger.get(&code)?;
        let transactions = self.storage.item_transactions(&code)?;

        let mut violations = Vec::new();
        let mut previous: Option<&Transaction> = None;

        for txn in &transactions {
            let sequence = txn.sequence;

            if txn.quantity_change == 0 {
                violations.push(HistoryViolation::ZeroChange { sequence });
            }
            if txn.previous_stock.checked_add(txn.quantity_change) != Some(txn.new_stock) {
                violations.push(HistoryViolation::Arithmetic { sequence });
            }
            if TransactionType::for_change(txn.quantity_change) != Some(txn.transaction_type) {
                violations.push(HistoryViolation::TypeMismatch { sequence });
            }
            if let Some(prev) = previous {
                if txn.timestamp < prev.timestamp {
                    violations.push(HistoryViolation::TimestampRegression { sequence });
                }
                if txn.previous_stock != prev.new_stock {
                    violations.push(HistoryViolation::ChainBreak {
                        sequence,
                        expected: prev.new_stock,
                        found: txn.previous_stock,
                    });
                }
            }
            previous = Some(txn);
        }

        if let Some(last) = previous {
            if last.new_stock != item.current_stock {
                violations.push(HistoryViolation::FinalStockMismatch {
                    expected: last.new_stock,
                    found: item.current_stock,
                });
            }
        }

        if !violations.is_empty() {
            tracing::warn!(item = %code, violations = violations.len(), "History inconsistent");
        }

        Ok(HistoryReport {
            item_code: code,
            transactions_checked: transactions.len(),
            violations,
        })
    }

    // Allocations

    /// Record an allocation request against an existing item
    pub fn create_allocation(
        &self,
        principal: &Principal,
        request: NewAllocation,
    ) -> Result<AllocationRecord> {
        if request.quantity_allocated <= 0 {
            return Err(Error::InvalidMutation(format!(
                "quantity_allocated must be positive, got {}",
                request.quantity_allocated
            )));
        }

        let code = self.existing_code(&request.item_code)?;
        let item = self.ledger.get(&code)?;
        let destination = self
            .sanitizer
            .sanitize_note(&request.destination, DEFAULT_DESTINATION)?;
        let purpose = self
            .sanitizer
            .sanitize_note(&request.purpose, DEFAULT_PURPOSE)?;

        let requested_at = self.recorder.now();
        let year = requested_at.to_datetime().year();

        let record = self.storage.insert_allocation(|sequence| AllocationRecord {
            id: Uuid::now_v7(),
            request_id: format!("MA-{}-{:04}", year, sequence),
            item_code: item.code.clone(),
            item_name: item.description.clone(),
            requested_by: principal.id.clone(),
            quantity_allocated: request.quantity_allocated,
            destination,
            purpose,
            status: AllocationStatus::Pending,
            requested_at,
        })?;

        self.metrics.record_allocation();
        tracing::info!(
            request_id = %record.request_id,
            item = %record.item_code,
            actor = %principal.id,
            quantity = record.quantity_allocated,
            "Allocation requested"
        );

        Ok(record)
    }

    /// Allocation records, newest first (admin)
    pub fn list_allocations(&self, principal: &Principal) -> Result<Vec<AllocationRecord>> {
        principal.require_admin("read allocations")?;
        self.storage.list_allocations()
    }

    // Statistics

    /// Dashboard statistics; the recent window ends at the inventory clock
    pub fn stats(&self) -> Result<InventoryStats> {
        let items = self.ledger.list()?;
        let window = self
            .config
            .history
            .recent_window_days
            .saturating_mul(NANOS_PER_DAY);
        let since = Timestamp::from_nanos(self.recorder.now().as_nanos().saturating_sub(window));

        Ok(InventoryStats {
            total_items: items.len() as u64,
            low_stock_count: items.iter().filter(|i| i.is_low_stock()).count() as u64,
            total_stock: items.iter().map(|i| i.current_stock).sum(),
            recent_transactions: self.storage.count_transactions_since(since)?,
        })
    }

    // Helpers

    fn existing_code(&self, code: &str) -> Result<ItemCode> {
        let code = ItemCode::new(self.sanitizer.sanitize_code(code)?);
        self.ledger.get(&code)?;
        Ok(code)
    }

    fn sanitize_optional(&self, field: Option<String>) -> Result<Option<String>> {
        match field {
            Some(value) => {
                let value = self.sanitizer.sanitize_field(&value)?;
                Ok((!value.is_empty()).then_some(value))
            }
            None => Ok(None),
        }
    }
}
