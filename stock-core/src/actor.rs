//! Per-item actors
//!
//! Every write to an item runs inside that item's actor, so the
//! read-check-write of a mutation never interleaves with another write to
//! the same item. Items with different codes are processed in parallel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    Inventory                          │
//! │        ActorRegistry: DashMap<ItemCode, Handle>      │
//! └──────────┬──────────────────────────────┬────────────┘
//!            │ mpsc (bounded)               │ mpsc (bounded)
//!            ▼                              ▼
//! ┌─────────────────────┐        ┌─────────────────────┐
//! │ ItemActor "MCH-001" │        │ ItemActor "FLT-007" │
//! │  one message at a   │  ...   │  one message at a   │
//! │  time, then reply   │        │  time, then reply   │
//! └──────────┬──────────┘        └──────────┬──────────┘
//!            │                              │
//!            ▼                              ▼
//! ┌──────────────────────────────────────────────────────┐
//! │          Storage::commit_mutation (WriteBatch)        │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Actors are spawned the first time a code is written and live until
//! [`ActorRegistry::shutdown`].

use crate::{
    ledger::ItemLedger,
    recorder::Recorder,
    types::{Item, ItemCode, ItemPatch, MutationOutcome, NewItem, Principal, StockMutation},
    Error, Result,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Message sent to an item actor
#[derive(Debug)]
pub enum ItemMessage {
    /// Create the item
    Create {
        fields: NewItem,
        response: oneshot::Sender<Result<Item>>,
    },

    /// Record a stock mutation
    Mutate {
        principal: Principal,
        mutation: StockMutation,
        response: oneshot::Sender<Result<MutationOutcome>>,
    },

    /// Replace the restock band
    UpdateThresholds {
        min_threshold: i64,
        max_ceiling: i64,
        response: oneshot::Sender<Result<Item>>,
    },

    /// Edit descriptive metadata
    UpdateMetadata {
        patch: ItemPatch,
        response: oneshot::Sender<Result<Item>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns writes for one item code
#[derive(Debug)]
pub struct ItemActor {
    /// Item this actor serializes
    code: ItemCode,

    /// Item state
    ledger: ItemLedger,

    /// Mutation protocol
    recorder: Recorder,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<ItemMessage>,
}

impl ItemActor {
    /// Create new actor
    pub fn new(
        code: ItemCode,
        ledger: ItemLedger,
        recorder: Recorder,
        mailbox: mpsc::Receiver<ItemMessage>,
    ) -> Self {
        Self {
            code,
            ledger,
            recorder,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        tracing::debug!(item = %self.code, "Item actor started");

        while let Some(msg) = self.mailbox.recv().await {
            if matches!(msg, ItemMessage::Shutdown) {
                break;
            }
            self.handle_message(msg);
        }

        tracing::debug!(item = %self.code, "Item actor stopped");
    }

    /// Handle a single message
    fn handle_message(&self, msg: ItemMessage) {
        match msg {
            ItemMessage::Create { fields, response } => {
                let result = if fields.code == self.code.as_str() {
                    self.ledger.create(fields, self.recorder.now())
                } else {
                    Err(Error::Concurrency(format!(
                        "Create for {} routed to actor {}",
                        fields.code, self.code
                    )))
                };
                let _ = response.send(result);
            }

            ItemMessage::Mutate {
                principal,
                mutation,
                response,
            } => {
                let result = self.recorder.record(&principal, &mutation);
                let _ = response.send(result);
            }

            ItemMessage::UpdateThresholds {
                min_threshold,
                max_ceiling,
                response,
            } => {
                let result = self
                    .ledger
                    .update_thresholds(&self.code, min_threshold, max_ceiling);
                let _ = response.send(result);
            }

            ItemMessage::UpdateMetadata { patch, response } => {
                let result = self.ledger.update_metadata(&self.code, patch);
                let _ = response.send(result);
            }

            ItemMessage::Shutdown => {
                // Handled in run loop
            }
        }
    }
}

/// Handle for sending messages to an item actor
#[derive(Clone, Debug)]
pub struct ItemHandle {
    sender: mpsc::Sender<ItemMessage>,
}

impl ItemHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<ItemMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> ItemMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Create the item
    pub async fn create(&self, fields: NewItem) -> Result<Item> {
        self.request(|response| ItemMessage::Create { fields, response })
            .await
    }

    /// Record a stock mutation
    pub async fn mutate(
        &self,
        principal: Principal,
        mutation: StockMutation,
    ) -> Result<MutationOutcome> {
        self.request(|response| ItemMessage::Mutate {
            principal,
            mutation,
            response,
        })
        .await
    }

    /// Replace the restock band
    pub async fn update_thresholds(&self, min_threshold: i64, max_ceiling: i64) -> Result<Item> {
        self.request(|response| ItemMessage::UpdateThresholds {
            min_threshold,
            max_ceiling,
            response,
        })
        .await
    }

    /// Edit descriptive metadata
    pub async fn update_metadata(&self, patch: ItemPatch) -> Result<Item> {
        self.request(|response| ItemMessage::UpdateMetadata { patch, response })
            .await
    }

    /// Shutdown actor; messages already queued are processed first
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ItemMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn an item actor
pub fn spawn_item_actor(
    code: ItemCode,
    ledger: ItemLedger,
    recorder: Recorder,
    mailbox_capacity: usize,
) -> (ItemHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = ItemActor::new(code, ledger, recorder, rx);

    let task = tokio::spawn(async move {
        actor.run().await;
    });

    (ItemHandle::new(tx), task)
}

/// Lazily spawned actors, one per item code
#[derive(Debug)]
pub struct ActorRegistry {
    actors: DashMap<ItemCode, ItemHandle>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    ledger: ItemLedger,
    recorder: Recorder,
    mailbox_capacity: usize,
    closed: AtomicBool,
}

impl ActorRegistry {
    /// Create empty registry
    pub fn new(ledger: ItemLedger, recorder: Recorder, mailbox_capacity: usize) -> Self {
        Self {
            actors: DashMap::new(),
            tasks: Mutex::new(Vec::new()),
            ledger,
            recorder,
            mailbox_capacity,
            closed: AtomicBool::new(false),
        }
    }

    /// Handle for `code`, spawning its actor on first use
    pub fn handle(&self, code: &ItemCode) -> Result<ItemHandle> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Concurrency("Inventory is shut down".to_string()));
        }

        if let Some(handle) = self.actors.get(code) {
            return Ok(handle.clone());
        }

        // The tasks lock orders spawns against shutdown; the entry lock
        // makes the spawn happen at most once per code
        let mut tasks = self.tasks.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Concurrency("Inventory is shut down".to_string()));
        }

        let handle = self
            .actors
            .entry(code.clone())
            .or_insert_with(|| {
                let (handle, task) = spawn_item_actor(
                    code.clone(),
                    self.ledger.clone(),
                    self.recorder.clone(),
                    self.mailbox_capacity,
                );
                tasks.push(task);
                handle
            })
            .clone();

        Ok(handle)
    }

    /// Number of live actors
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// No actor spawned yet
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Stop accepting work, drain every mailbox and wait for the actors
    pub async fn shutdown(&self) -> Result<()> {
        {
            let _tasks = self.tasks.lock();
            self.closed.store(true, Ordering::SeqCst);
        }

        let handles: Vec<ItemHandle> = self.actors.iter().map(|e| e.value().clone()).collect();
        self.actors.clear();
        for handle in handles {
            // Already stopped actors are fine here
            let _ = handle.shutdown().await;
        }

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        let count = tasks.len();
        for task in tasks {
            task.await
                .map_err(|e| Error::Concurrency(format!("Item actor failed: {}", e)))?;
        }

        tracing::info!(actors = count, "Item actors stopped");
        Ok(())
    }
}
