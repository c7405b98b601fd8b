//! Item ledger
//!
//! Holds item state and enforces the stock invariants:
//! - `allocated_stock <= current_stock`
//! - `0 <= min_threshold <= max_ceiling`
//! - `available_stock >= 0` (follows from the first)
//!
//! Writers must run inside the item's actor. Reads may be served from any
//! task; an item is a single key so a read never sees a torn record.

use crate::{
    clock::Timestamp,
    config::ItemDefaults,
    storage::Storage,
    types::{validate_thresholds, Item, ItemCode, ItemPatch, NewItem},
    Error, Result,
};
use std::sync::Arc;

/// Item state owner
#[derive(Debug, Clone)]
pub struct ItemLedger {
    storage: Arc<Storage>,
    defaults: ItemDefaults,
}

impl ItemLedger {
    /// Create ledger over storage
    pub fn new(storage: Arc<Storage>, defaults: ItemDefaults) -> Self {
        Self { storage, defaults }
    }

    /// Get item by code
    pub fn get(&self, code: &ItemCode) -> Result<Item> {
        self.storage.get_item(code)
    }

    /// Create an item; fields must already be sanitized
    pub fn create(&self, fields: NewItem, now: Timestamp) -> Result<Item> {
        let code = ItemCode::new(fields.code.as_str());

        if self.storage.find_item(&code)?.is_some() {
            return Err(Error::DuplicateCode(code.to_string()));
        }

        let item = self.build(&fields, now)?;
        self.storage.put_item(&item)?;

        tracing::info!(
            item = %item.code,
            current_stock = item.current_stock,
            allocated_stock = item.allocated_stock,
            "Item created"
        );

        Ok(item)
    }

    /// Item record for `fields` with defaults applied; does not touch storage
    pub fn build(&self, fields: &NewItem, now: Timestamp) -> Result<Item> {
        let min_threshold = fields.min_threshold.unwrap_or(self.defaults.min_threshold);
        let max_ceiling = fields.max_ceiling.unwrap_or(self.defaults.max_ceiling);
        validate_thresholds(min_threshold, max_ceiling)?;

        let item = Item {
            code: ItemCode::new(fields.code.as_str()),
            description: fields.description.clone(),
            vendor: fields.vendor.clone(),
            storage_location: fields.storage_location.clone(),
            image: fields.image.clone(),
            current_stock: fields.current_stock.unwrap_or(0),
            allocated_stock: fields.allocated_stock.unwrap_or(0),
            min_threshold,
            max_ceiling,
            date_delivered: fields.date_delivered,
            warranty_start: fields.warranty_start,
            warranty_end: fields.warranty_end,
            created_at: now,
            last_movement_at: None,
        };
        item.validate()?;
        Ok(item)
    }

    /// Stage a stock change.
    ///
    /// Does not check the allocation guardrail and does not persist; the
    /// recorder commits the returned item together with its transaction.
    pub fn apply_stock_delta(&self, code: &ItemCode, delta: i64) -> Result<Item> {
        self.get(code)?.with_stock_delta(delta)
    }

    /// Replace the restock band
    pub fn update_thresholds(
        &self,
        code: &ItemCode,
        min_threshold: i64,
        max_ceiling: i64,
    ) -> Result<Item> {
        validate_thresholds(min_threshold, max_ceiling)?;

        let mut item = self.get(code)?;
        item.min_threshold = min_threshold;
        item.max_ceiling = max_ceiling;
        self.storage.put_item(&item)?;

        tracing::info!(item = %code, min_threshold, max_ceiling, "Thresholds updated");
        Ok(item)
    }

    /// Edit descriptive metadata; fields must already be sanitized
    pub fn update_metadata(&self, code: &ItemCode, patch: ItemPatch) -> Result<Item> {
        let mut item = self.get(code)?;
        patch.apply(&mut item);
        self.storage.put_item(&item)?;

        tracing::info!(item = %code, "Metadata updated");
        Ok(item)
    }

    /// All items ordered by code
    pub fn list(&self) -> Result<Vec<Item>> {
        self.storage.list_items()
    }

    /// Items whose available stock is below their threshold
    pub fn list_low_stock(&self) -> Result<Vec<Item>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(Item::is_low_stock)
            .collect())
    }
}
