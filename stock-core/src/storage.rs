//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `items` - Item records (key: item code)
//! - `transactions` - Append-only audit trail (key: sequence, big-endian)
//! - `indices` - Secondary indices:
//!   - `h` || code || 0x00 || sequence -> empty (per-item history)
//!   - `t` || timestamp || sequence -> empty (global time order)
//! - `allocations` - Allocation records (key: allocation sequence)
//! - `meta` - Counters
//!
//! Transactions are written exactly once, in the same `WriteBatch` as the
//! item update they describe. There is no update or delete path for them.

use crate::{
    clock::Timestamp,
    error::{Error, Result},
    types::{AllocationRecord, Item, ItemCode, Transaction},
    Config,
};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Column family names
const CF_ITEMS: &str = "items";
const CF_TRANSACTIONS: &str = "transactions";
const CF_INDICES: &str = "indices";
const CF_ALLOCATIONS: &str = "allocations";
const CF_META: &str = "meta";

/// Index key prefixes
const IDX_HISTORY: u8 = b'h';
const IDX_TIME: u8 = b't';

/// Meta keys
const META_ALLOCATION_SEQ: &[u8] = b"allocation_seq";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,

    /// Next transaction sequence
    next_transaction_seq: AtomicU64,

    /// Next allocation sequence
    next_allocation_seq: AtomicU64,

    /// Serializes allocation inserts
    allocation_lock: Mutex<()>,

    /// fsync on commit
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("next_transaction_seq", &self.next_transaction_seq)
            .field("next_allocation_seq", &self.next_allocation_seq)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ITEMS, Self::cf_options_items()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_transactions()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_ALLOCATIONS, Self::cf_options_transactions()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let mut storage = Self {
            db: Arc::new(db),
            next_transaction_seq: AtomicU64::new(1),
            next_allocation_seq: AtomicU64::new(1),
            allocation_lock: Mutex::new(()),
            sync_writes: config.rocksdb.sync_writes,
        };

        let last_transaction = storage.last_transaction_sequence()?;
        let last_allocation = storage.read_counter(META_ALLOCATION_SEQ)?;
        storage.next_transaction_seq = AtomicU64::new(last_transaction + 1);
        storage.next_allocation_seq = AtomicU64::new(last_allocation + 1);

        tracing::info!(
            path = ?path,
            last_transaction,
            last_allocation,
            "Opened RocksDB"
        );

        Ok(storage)
    }

    // Column family options

    fn cf_options_items() -> Options {
        let mut opts = Options::default();
        // Items are read on every mutation, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_transactions() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helpers

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &opts)?;
        Ok(())
    }

    fn read_counter(&self, key: &[u8]) -> Result<u64> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(decode_u64(&bytes)?),
            None => Ok(0),
        }
    }

    fn last_transaction_sequence(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(entry) => {
                let (key, _) = entry?;
                decode_u64(&key)
            }
            None => Ok(0),
        }
    }

    // Item operations

    /// Get item by code, if present
    pub fn find_item(&self, code: &ItemCode) -> Result<Option<Item>> {
        let cf = self.cf_handle(CF_ITEMS)?;
        match self.db.get_cf(cf, code.as_str().as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Get item by code
    pub fn get_item(&self, code: &ItemCode) -> Result<Item> {
        self.find_item(code)?
            .ok_or_else(|| Error::ItemNotFound(code.to_string()))
    }

    /// Write an item record without touching the audit trail.
    ///
    /// Only for creation and threshold/metadata edits; stock changes go
    /// through [`Storage::commit_mutation`].
    pub(crate) fn put_item(&self, item: &Item) -> Result<()> {
        let cf = self.cf_handle(CF_ITEMS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(cf, item.code.as_str().as_bytes(), bincode::serialize(item)?);
        self.write(batch)
    }

    /// All items ordered by code
    pub fn list_items(&self) -> Result<Vec<Item>> {
        let cf = self.cf_handle(CF_ITEMS)?;
        let mut items = Vec::new();
        for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = entry?;
            items.push(bincode::deserialize(&value)?);
        }
        Ok(items)
    }

    // Transaction operations

    /// Reserve the next global transaction sequence
    pub(crate) fn next_transaction_sequence(&self) -> u64 {
        self.next_transaction_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Item update + transaction append + indices (atomic)
    pub(crate) fn commit_mutation(&self, item: &Item, transaction: &Transaction) -> Result<()> {
        let cf_items = self.cf_handle(CF_ITEMS)?;
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let seq_key = transaction.sequence.to_be_bytes();
        if self.db.get_cf(cf_transactions, seq_key)?.is_some() {
            return Err(Error::Storage(format!(
                "Transaction sequence {} already written",
                transaction.sequence
            )));
        }

        let mut batch = WriteBatch::default();

        // 1. Item
        batch.put_cf(cf_items, item.code.as_str().as_bytes(), bincode::serialize(item)?);

        // 2. Transaction
        batch.put_cf(cf_transactions, seq_key, bincode::serialize(transaction)?);

        // 3. Indices
        let idx_history =
            Self::index_key_history(&transaction.item_code, Some(transaction.sequence));
        batch.put_cf(cf_indices, idx_history, b"");

        let idx_time = Self::index_key_time(transaction.timestamp, transaction.sequence);
        batch.put_cf(cf_indices, idx_time, b"");

        // Atomic commit
        self.write(batch)?;

        tracing::debug!(
            transaction_id = %transaction.id,
            sequence = transaction.sequence,
            item = %transaction.item_code,
            "Transaction committed"
        );

        Ok(())
    }

    /// Get transaction by sequence
    pub fn get_transaction(&self, sequence: u64) -> Result<Transaction> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = self
            .db
            .get_cf(cf, sequence.to_be_bytes())?
            .ok_or_else(|| Error::Storage(format!("Transaction {} missing", sequence)))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Newest transactions first, ordered by timestamp then sequence
    pub fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let upper = [IDX_TIME + 1];

        let mut transactions = Vec::with_capacity(limit.min(1024));
        for entry in self.db.iterator_cf(cf, IteratorMode::From(&upper, Direction::Reverse)) {
            if transactions.len() >= limit {
                break;
            }
            let (key, _) = entry?;
            if key.first() != Some(&IDX_TIME) {
                break;
            }
            // prefix (1) + timestamp (8) + sequence (8)
            let sequence = decode_u64(key.get(9..).unwrap_or_default())?;
            transactions.push(self.get_transaction(sequence)?);
        }
        Ok(transactions)
    }

    /// Count transactions with `timestamp >= since`
    pub fn count_transactions_since(&self, since: Timestamp) -> Result<u64> {
        let cf = self.cf_handle(CF_INDICES)?;
        let start = Self::index_key_time(since, 0);
        let mut count = 0u64;
        for entry in self.db.iterator_cf(cf, IteratorMode::From(&start, Direction::Forward)) {
            let (key, _) = entry?;
            if key.first() != Some(&IDX_TIME) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Transactions for one item, oldest first
    pub fn item_transactions(&self, code: &ItemCode) -> Result<Vec<Transaction>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = Self::index_key_history(code, None);

        let mut transactions = Vec::new();
        for entry in self.db.iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward)) {
            let (key, _) = entry?;
            if !key.starts_with(&prefix) {
                break;
            }
            let sequence = decode_u64(&key[prefix.len()..])?;
            transactions.push(self.get_transaction(sequence)?);
        }
        Ok(transactions)
    }

    // Allocation operations

    /// Append an allocation record; the caller fills everything except the
    /// sequence-derived request id, which `build` receives.
    pub(crate) fn insert_allocation(
        &self,
        build: impl FnOnce(u64) -> AllocationRecord,
    ) -> Result<AllocationRecord> {
        let cf_allocations = self.cf_handle(CF_ALLOCATIONS)?;
        let cf_meta = self.cf_handle(CF_META)?;

        // Held until the counter is written so it never moves backwards
        let _guard = self.allocation_lock.lock();
        let sequence = self.next_allocation_seq.fetch_add(1, Ordering::SeqCst);
        let record = build(sequence);

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_allocations, sequence.to_be_bytes(), bincode::serialize(&record)?);
        batch.put_cf(cf_meta, META_ALLOCATION_SEQ, sequence.to_be_bytes());
        self.write(batch)?;

        Ok(record)
    }

    /// Allocation records, newest first
    pub fn list_allocations(&self) -> Result<Vec<AllocationRecord>> {
        let cf = self.cf_handle(CF_ALLOCATIONS)?;
        let mut records = Vec::new();
        for entry in self.db.iterator_cf(cf, IteratorMode::End) {
            let (_, value) = entry?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }

    // Index key helpers

    fn index_key_history(code: &ItemCode, sequence: Option<u64>) -> Vec<u8> {
        let mut key = vec![IDX_HISTORY];
        key.extend_from_slice(code.as_str().as_bytes());
        key.push(0); // Separator; codes never contain NUL
        if let Some(seq) = sequence {
            key.extend_from_slice(&seq.to_be_bytes());
        }
        key
    }

    fn index_key_time(timestamp: Timestamp, sequence: u64) -> Vec<u8> {
        let mut key = vec![IDX_TIME];
        key.extend_from_slice(&timestamp.key_bytes());
        key.extend_from_slice(&sequence.to_be_bytes());
        key
    }
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Storage(format!("Expected 8-byte key, got {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(array))
}
