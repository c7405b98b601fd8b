//! Core types for the inventory
//!
//! All persisted types derive serde and are stored with bincode.
//! Quantities are whole units (`i64`).

use crate::clock::Timestamp;
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Days before `warranty_end` at which a warranty counts as expiring soon
pub const WARRANTY_WARNING_DAYS: i64 = 30;

/// Stable item identifier (SKU code)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemCode(String);

impl ItemCode {
    /// Create new item code
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Role of an authenticated principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// May create items, edit thresholds and read the audit trail
    Admin,
    /// May move stock and request allocations
    Staff,
}

/// Authenticated identity supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable user id
    pub id: String,
    /// Display name, snapshotted into transaction records
    pub display_name: String,
    /// Role
    pub role: Role,
}

impl Principal {
    /// Admin principal
    pub fn admin(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role: Role::Admin,
        }
    }

    /// Staff principal
    pub fn staff(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role: Role::Staff,
        }
    }

    /// Check admin role
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Require admin role for `operation`
    pub fn require_admin(&self, operation: &'static str) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::Forbidden {
                principal: self.id.clone(),
                operation,
            })
        }
    }
}

/// One inventory SKU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Unique code
    pub code: ItemCode,
    /// Description (snapshotted into transactions)
    pub description: String,
    /// Vendor
    pub vendor: String,
    /// Storage location
    pub storage_location: String,
    /// Image reference
    pub image: Option<String>,
    /// Physical units on hand
    pub current_stock: i64,
    /// Units reserved for maintenance agreements
    pub allocated_stock: i64,
    /// Restock threshold
    pub min_threshold: i64,
    /// Advisory ceiling
    pub max_ceiling: i64,
    /// Delivery date
    pub date_delivered: Option<NaiveDate>,
    /// Warranty start
    pub warranty_start: Option<NaiveDate>,
    /// Warranty end
    pub warranty_end: Option<NaiveDate>,
    /// Creation time
    pub created_at: Timestamp,
    /// Timestamp of the newest transaction for this item
    pub last_movement_at: Option<Timestamp>,
}

impl Item {
    /// Units eligible for ordinary dispatch
    pub fn available_stock(&self) -> i64 {
        self.current_stock - self.allocated_stock
    }

    /// Available stock below the restock threshold
    pub fn is_low_stock(&self) -> bool {
        self.available_stock() < self.min_threshold
    }

    /// Physical stock above the advisory ceiling
    pub fn exceeds_ceiling(&self) -> bool {
        self.current_stock > self.max_ceiling
    }

    /// Warranty ended before `today`
    pub fn warranty_expired(&self, today: NaiveDate) -> bool {
        self.warranty_end.map(|end| today > end).unwrap_or(false)
    }

    /// Warranty ends within the warning window (today included)
    pub fn warranty_expiring_soon(&self, today: NaiveDate) -> bool {
        match self.warranty_end {
            Some(end) => {
                let days = (end - today).num_days();
                (0..=WARRANTY_WARNING_DAYS).contains(&days)
            }
            None => false,
        }
    }

    /// Check stock and threshold invariants
    pub fn validate(&self) -> Result<()> {
        if self.current_stock < 0 {
            return Err(Error::InvalidMutation(format!(
                "current_stock must be non-negative, got {}",
                self.current_stock
            )));
        }
        if self.allocated_stock < 0 || self.allocated_stock > self.current_stock {
            return Err(Error::InvalidMutation(format!(
                "allocated_stock {} must be within 0..={}",
                self.allocated_stock, self.current_stock
            )));
        }
        validate_thresholds(self.min_threshold, self.max_ceiling)
    }

    /// Stage a stock change without persisting it
    pub fn with_stock_delta(&self, delta: i64) -> Result<Item> {
        let new_stock = self
            .current_stock
            .checked_add(delta)
            .ok_or_else(|| Error::InvalidMutation(format!("quantity_change {} overflows", delta)))?;

        if new_stock < 0 {
            return Err(Error::NegativeStockResult {
                current_stock: self.current_stock,
                quantity_change: delta,
            });
        }

        Ok(Item {
            current_stock: new_stock,
            ..self.clone()
        })
    }
}

/// Check threshold band invariant
pub fn validate_thresholds(min_threshold: i64, max_ceiling: i64) -> Result<()> {
    if min_threshold < 0 || max_ceiling < min_threshold {
        return Err(Error::InvalidThreshold {
            min_threshold,
            max_ceiling,
        });
    }
    Ok(())
}

/// Fields for item creation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewItem {
    /// Unique code
    pub code: String,
    /// Description (required)
    pub description: String,
    /// Vendor
    pub vendor: String,
    /// Storage location
    pub storage_location: String,
    /// Image reference
    pub image: Option<String>,
    /// Initial stock (defaults to 0)
    pub current_stock: Option<i64>,
    /// Initial allocation (defaults to 0)
    pub allocated_stock: Option<i64>,
    /// Restock threshold (defaults from config)
    pub min_threshold: Option<i64>,
    /// Advisory ceiling (defaults from config)
    pub max_ceiling: Option<i64>,
    /// Delivery date
    pub date_delivered: Option<NaiveDate>,
    /// Warranty start
    pub warranty_start: Option<NaiveDate>,
    /// Warranty end
    pub warranty_end: Option<NaiveDate>,
}

/// Metadata edit; `None` leaves a field unchanged.
///
/// Optional fields take `Some(None)` to clear them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPatch {
    /// Description
    pub description: Option<String>,
    /// Vendor
    pub vendor: Option<String>,
    /// Storage location
    pub storage_location: Option<String>,
    /// Image reference
    pub image: Option<Option<String>>,
    /// Delivery date
    pub date_delivered: Option<Option<NaiveDate>>,
    /// Warranty start
    pub warranty_start: Option<Option<NaiveDate>>,
    /// Warranty end
    pub warranty_end: Option<Option<NaiveDate>>,
}

impl ItemPatch {
    /// Apply to an item
    pub fn apply(self, item: &mut Item) {
        if let Some(description) = self.description {
            item.description = description;
        }
        if let Some(vendor) = self.vendor {
            item.vendor = vendor;
        }
        if let Some(location) = self.storage_location {
            item.storage_location = location;
        }
        if let Some(image) = self.image {
            item.image = image;
        }
        if let Some(date) = self.date_delivered {
            item.date_delivered = date;
        }
        if let Some(date) = self.warranty_start {
            item.warranty_start = date;
        }
        if let Some(date) = self.warranty_end {
            item.warranty_end = date;
        }
    }
}

/// Kind of stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Stock arriving (positive change)
    Addition,
    /// Stock leaving (negative change)
    Dispatch,
}

impl TransactionType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Addition => "addition",
            TransactionType::Dispatch => "dispatch",
        }
    }

    /// Parse from wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "addition" => Some(TransactionType::Addition),
            "dispatch" => Some(TransactionType::Dispatch),
            _ => None,
        }
    }

    /// Type implied by the sign of a change (`None` for zero)
    pub fn for_change(quantity_change: i64) -> Option<Self> {
        match quantity_change.signum() {
            1 => Some(TransactionType::Addition),
            -1 => Some(TransactionType::Dispatch),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable record of one stock movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique id (UUIDv7)
    pub id: Uuid,
    /// Global insertion order
    pub sequence: u64,
    /// Item reference
    pub item_code: ItemCode,
    /// Item description at commit time
    pub item_name: String,
    /// Principal id
    pub actor_id: String,
    /// Principal display name at commit time
    pub actor_name: String,
    /// Signed change, never zero
    pub quantity_change: i64,
    /// Stock before
    pub previous_stock: i64,
    /// Stock after
    pub new_stock: i64,
    /// Movement kind, matches the sign of `quantity_change`
    pub transaction_type: TransactionType,
    /// Where the stock went or came from
    pub destination: String,
    /// Why
    pub purpose: String,
    /// Commit time
    pub timestamp: Timestamp,
    /// Resulting stock was above the advisory ceiling
    pub ceiling_exceeded: bool,
}

/// Stock mutation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMutation {
    /// Target item
    pub code: String,
    /// Signed change
    pub quantity_change: i64,
    /// Declared kind
    pub transaction_type: TransactionType,
    /// Free-text destination (empty means "N/A")
    pub destination: String,
    /// Free-text purpose (empty means "General")
    pub purpose: String,
}

impl StockMutation {
    /// Dispatch of `quantity` units
    pub fn dispatch(code: impl Into<String>, quantity: i64) -> Self {
        Self {
            code: code.into(),
            quantity_change: -quantity,
            transaction_type: TransactionType::Dispatch,
            destination: String::new(),
            purpose: String::new(),
        }
    }

    /// Addition of `quantity` units
    pub fn addition(code: impl Into<String>, quantity: i64) -> Self {
        Self {
            code: code.into(),
            quantity_change: quantity,
            transaction_type: TransactionType::Addition,
            destination: String::new(),
            purpose: String::new(),
        }
    }

    /// Set destination
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    /// Set purpose
    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    /// Reject zero changes and type/sign disagreement
    pub fn validate(&self) -> Result<()> {
        match TransactionType::for_change(self.quantity_change) {
            None => Err(Error::InvalidMutation(
                "quantity_change must not be zero".to_string(),
            )),
            Some(implied) if implied != self.transaction_type => {
                Err(Error::InvalidMutation(format!(
                    "{} does not match quantity_change {}",
                    self.transaction_type, self.quantity_change
                )))
            }
            Some(_) => Ok(()),
        }
    }
}

/// Result of a committed mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationOutcome {
    /// Item after the change
    pub item: Item,
    /// Record appended to the audit trail
    pub transaction: Transaction,
    /// Non-blocking ceiling signal
    pub ceiling_warning: Option<crate::guardrail::CeilingWarning>,
}

/// Allocation request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    /// Awaiting fulfilment
    Pending,
    /// Fulfilled
    Fulfilled,
    /// Cancelled
    Cancelled,
}

/// Reservation request tied to a maintenance agreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    /// Unique id
    pub id: Uuid,
    /// Human-readable id (`MA-<year>-<seq>`)
    pub request_id: String,
    /// Item reference
    pub item_code: ItemCode,
    /// Item description at request time
    pub item_name: String,
    /// Principal id
    pub requested_by: String,
    /// Units requested
    pub quantity_allocated: i64,
    /// Destination
    pub destination: String,
    /// Purpose
    pub purpose: String,
    /// Status
    pub status: AllocationStatus,
    /// Request time
    pub requested_at: Timestamp,
}

/// Allocation request fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAllocation {
    /// Item reference
    pub item_code: String,
    /// Units requested
    pub quantity_allocated: i64,
    /// Destination
    pub destination: String,
    /// Purpose
    pub purpose: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(current: i64, allocated: i64) -> Item {
        Item {
            code: ItemCode::new("MCH-001"),
            description: "Hydraulic pump".to_string(),
            vendor: "Acme".to_string(),
            storage_location: "A1".to_string(),
            image: None,
            current_stock: current,
            allocated_stock: allocated,
            min_threshold: 5,
            max_ceiling: 20,
            date_delivered: None,
            warranty_start: None,
            warranty_end: None,
            created_at: Timestamp::ZERO,
            last_movement_at: None,
        }
    }

    #[test]
    fn test_available_and_low_stock() {
        let item = item(10, 7);
        assert_eq!(item.available_stock(), 3);
        assert!(item.is_low_stock());
        assert!(!item.exceeds_ceiling());
    }

    #[test]
    fn test_with_stock_delta_negative() {
        let err = item(3, 0).with_stock_delta(-4).unwrap_err();
        assert!(matches!(
            err,
            Error::NegativeStockResult {
                current_stock: 3,
                quantity_change: -4
            }
        ));
    }

    #[test]
    fn test_validate_rejects_over_allocation() {
        assert!(item(4, 5).validate().is_err());
        assert!(item(5, 5).validate().is_ok());
    }

    #[test]
    fn test_thresholds() {
        assert!(validate_thresholds(0, 0).is_ok());
        assert!(validate_thresholds(-1, 5).is_err());
        assert!(validate_thresholds(6, 5).is_err());
    }

    #[test]
    fn test_warranty_windows() {
        let mut item = item(1, 0);
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        item.warranty_end = NaiveDate::from_ymd_opt(2026, 1, 31);
        assert!(item.warranty_expiring_soon(today));
        assert!(!item.warranty_expired(today));

        item.warranty_end = NaiveDate::from_ymd_opt(2025, 12, 31);
        assert!(item.warranty_expired(today));
        assert!(!item.warranty_expiring_soon(today));
    }

    #[test]
    fn test_mutation_validate() {
        assert!(StockMutation::dispatch("A", 1).validate().is_ok());
        assert!(StockMutation::addition("A", 0).validate().is_err());

        let mut mismatched = StockMutation::addition("A", 5);
        mismatched.transaction_type = TransactionType::Dispatch;
        assert!(mismatched.validate().is_err());
    }

    #[test]
    fn test_transaction_type_parse() {
        assert_eq!(TransactionType::parse("dispatch"), Some(TransactionType::Dispatch));
        assert_eq!(TransactionType::parse("reserve"), None);
        assert_eq!(TransactionType::for_change(0), None);
    }

    #[test]
    fn test_require_admin() {
        assert!(Principal::admin("u1", "Ana").require_admin("create items").is_ok());
        assert!(matches!(
            Principal::staff("u2", "Ben").require_admin("create items"),
            Err(Error::Forbidden { .. })
        ));
    }
}
