// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Work queue between "transaction recorded" and "transaction reconciled".
//!
//! Many producers (request handlers and the reconciliation worker itself)
//! enqueue; exactly one consumer, the worker, dequeues. Items are delivered
//! in FIFO order. The queue lives in memory only, so anything still queued
//! when the process exits is lost.

use crate::error::LedgerError;
use crate::transaction::Transaction;
use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

/// Default number of transactions buffered before `enqueue` waits.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[async_trait]
pub trait TransactionQueue: Send + Sync {
    /// Adds `transaction` to the back of the queue, waiting while the buffer
    /// is full.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::QueueClosed`] if the queue no longer accepts
    /// items.
    async fn enqueue(&self, transaction: Transaction) -> Result<(), LedgerError>;

    /// Waits for the next transaction. Returns `None` once the queue is closed
    /// and drained.
    ///
    /// Implementations must be cancel-safe: dropping the returned future
    /// before it completes must not lose an item.
    async fn dequeue(&self) -> Option<Transaction>;
}

/// Bounded FIFO queue backed by a tokio channel.
#[derive(Debug)]
pub struct InMemoryQueue {
    sender: mpsc::Sender<Transaction>,
    receiver: Mutex<mpsc::Receiver<Transaction>>,
}

impl InMemoryQueue {
    /// Creates a queue buffering up to `capacity` transactions.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Number of transactions currently buffered.
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[async_trait]
impl TransactionQueue for InMemoryQueue {
    async fn enqueue(&self, transaction: Transaction) -> Result<(), LedgerError> {
        self.sender
            .send(transaction)
            .await
            .map_err(|_| LedgerError::QueueClosed)
    }

    async fn dequeue(&self) -> Option<Transaction> {
        // Single consumer: the lock is uncontended in normal operation.
        self.receiver.lock().await.recv().await
    }
}
