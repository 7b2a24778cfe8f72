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


//! Ledger engine.
//!
//! The [`Engine`] is the entry point for recording transactions and reading
//! balances. It owns the reconciliation worker for its whole lifetime.
//!
//! # Consistency
//!
//! Recording is synchronous: once [`Engine::record_transaction`] returns, the
//! transaction is durable in the log and has an identifier. Balances follow
//! asynchronously, once the worker has dequeued and applied it. Reconciliation
//! failures never reach the caller; they are logged by the worker. A caller
//! that gives up after the save, for example on a request timeout, does not
//! keep the transaction out of the queue.

use crate::balance::Balance;
use crate::base::{TransactionId, UserId};
use crate::config::LedgerSettings;
use crate::error::{ConfigError, LedgerError};
use crate::reconciler::{Backlog, Reconciler, WorkerHandle};
use crate::repository::{BalanceRepository, TransactionRepository, within};
use crate::transaction::Transaction;
use crate::transaction_queue::{InMemoryQueue, TransactionQueue};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Records transactions and serves balance and history queries.
///
/// # Invariants
///
/// - Exactly one worker consumes the engine's queue.
/// - Every transaction is saved to the log before it is queued.
/// - A purchase's commission is queued only after the purchase was applied.
pub struct Engine {
    transactions: Arc<dyn TransactionRepository>,
    balances: Arc<dyn BalanceRepository>,
    queue: Arc<dyn TransactionQueue>,
    backlog: Backlog,
    call_timeout: Duration,
    worker: WorkerHandle,
}

impl Engine {
    /// Starts an engine with an in-memory work queue.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `settings` are invalid.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(
        transactions: Arc<dyn TransactionRepository>,
        balances: Arc<dyn BalanceRepository>,
        settings: LedgerSettings,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let queue = Arc::new(InMemoryQueue::new(settings.queue_capacity));
        Self::with_queue(transactions, balances, queue, &settings)
    }

    /// Starts an engine on a caller-supplied queue. The engine's worker must
    /// be the queue's only consumer, and every transaction must reach the
    /// queue through [`Engine::record_transaction`]; items pushed by anyone
    /// else are reconciled but not tracked by [`Engine::pending`] or
    /// [`Engine::wait_idle`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `settings` are invalid.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn with_queue(
        transactions: Arc<dyn TransactionRepository>,
        balances: Arc<dyn BalanceRepository>,
        queue: Arc<dyn TransactionQueue>,
        settings: &LedgerSettings,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let reconciler = Reconciler::new(
            Arc::clone(&transactions),
            Arc::clone(&balances),
            Arc::clone(&queue),
            settings,
        );
        let backlog = reconciler.backlog();
        let worker = WorkerHandle::spawn(reconciler);

        Ok(Self {
            transactions,
            balances,
            queue,
            backlog,
            call_timeout: settings.call_timeout(),
            worker,
        })
    }

    /// Saves `transaction` to the log and queues it for reconciliation.
    ///
    /// Returns as soon as the transaction is queued; it does not wait for
    /// balances to change. Once the save succeeded the transaction is handed
    /// to the queue by a separate task, so dropping this future while the
    /// queue is full still gets it reconciled.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Persistence`] - The log rejected or timed out the save.
    /// - [`LedgerError::QueueClosed`] - Saved, but could not be queued.
    pub async fn record_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<TransactionId, LedgerError> {
        let id = within(self.call_timeout, self.transactions.save(&transaction)).await?;

        self.backlog.add();
        let handoff = tokio::spawn(enqueue_saved(
            Arc::clone(&self.queue),
            self.backlog.clone(),
            transaction.identified(id.clone()),
        ));
        match handoff.await {
            Ok(queued) => queued.map(|()| id),
            Err(error) => {
                self.backlog.done();
                error!(error = %error, transaction_id = %id, "queue hand-off task failed");
                Err(LedgerError::QueueClosed)
            }
        }
    }

    /// Records a deposit of `amount` for `customer`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - `amount` is negative.
    /// - [`LedgerError::InvalidUser`] - `customer` is blank.
    /// - Any error of [`Engine::record_transaction`].
    pub async fn deposit(
        &self,
        customer: impl Into<UserId>,
        amount: Decimal,
    ) -> Result<Transaction, LedgerError> {
        let customer = customer.into();
        validate_user(&customer, "customer id is empty")?;
        validate_amount(amount)?;

        let transaction = Transaction::deposit(customer, amount);
        let id = self.record_transaction(transaction.clone()).await?;
        Ok(transaction.identified(id))
    }

    /// Records a purchase of `amount` by `customer` from `restaurant`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - `amount` is negative.
    /// - [`LedgerError::InvalidUser`] - Either participant id is blank.
    /// - Any error of [`Engine::record_transaction`].
    pub async fn purchase(
        &self,
        customer: impl Into<UserId>,
        restaurant: impl Into<UserId>,
        amount: Decimal,
    ) -> Result<Transaction, LedgerError> {
        let customer = customer.into();
        let restaurant = restaurant.into();
        validate_user(&customer, "customer id is empty")?;
        validate_user(&restaurant, "restaurant id is empty")?;
        validate_amount(amount)?;

        let transaction = Transaction::purchase(customer, restaurant, amount);
        let id = self.record_transaction(transaction.clone()).await?;
        Ok(transaction.identified(id))
    }

    /// Current balance of `user`; zero for users without activity.
    pub async fn get_balance(&self, user: &UserId) -> Result<Balance, LedgerError> {
        Ok(within(self.call_timeout, self.balances.get_balance(user)).await?)
    }

    /// Transactions where `customer` is the customer, newest first.
    pub async fn list_customer_transactions(
        &self,
        customer: &UserId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Ok(within(self.call_timeout, self.transactions.list_by_customer(customer)).await?)
    }

    /// Transactions where `restaurant` is the restaurant, newest first.
    pub async fn list_restaurant_transactions(
        &self,
        restaurant: &UserId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Ok(within(self.call_timeout, self.transactions.list_by_restaurant(restaurant)).await?)
    }

    /// Transactions recorded through this engine, including derived
    /// commissions, that are not yet fully reconciled.
    pub fn pending(&self) -> usize {
        self.backlog.pending()
    }

    /// Waits until every transaction recorded through this engine, and every
    /// commission derived from one, has been reconciled.
    ///
    /// Never resolves if the worker was stopped with work still queued.
    pub async fn wait_idle(&self) {
        self.backlog.idle().await;
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Stops the worker after the transaction it is currently reconciling.
    /// Anything still queued is discarded with the queue.
    pub async fn shutdown(&self) {
        let pending = self.pending();
        self.worker.stop().await;
        info!(pending, "ledger engine stopped");
    }
}

async fn enqueue_saved(
    queue: Arc<dyn TransactionQueue>,
    backlog: Backlog,
    transaction: Transaction,
) -> Result<(), LedgerError> {
    let transaction_id = transaction.id().map(ToString::to_string).unwrap_or_default();
    let queued = queue.enqueue(transaction).await;
    if let Err(error) = &queued {
        backlog.done();
        warn!(
            error = %error,
            transaction_id = %transaction_id,
            "transaction saved but not queued for reconciliation"
        );
    }
    queued
}

fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(())
}

fn validate_user(user: &UserId, reason: &'static str) -> Result<(), LedgerError> {
    if user.is_empty() {
        return Err(LedgerError::InvalidUser(reason));
    }
    Ok(())
}
