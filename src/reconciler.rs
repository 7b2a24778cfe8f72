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


//! Balance reconciliation.
//!
//! The [`Reconciler`] takes one recorded transaction at a time from the work
//! queue and moves it through three phases:
//!
//! ```text
//!   IDLE ──dequeue──► APPLYING ──purchase──► DERIVING
//!    ▲                   │                      │
//!    └───────────────────┴──────────────────────┘
//!       deposit, commission, failure      always
//! ```
//!
//! - **Applying** issues the balance increments for the transaction type.
//! - **Deriving** runs only for purchases: it records a commission
//!   transaction for the restaurant and feeds it back into the queue, where
//!   it is applied like any other transaction. Commissions never derive
//!   anything, so the chain is exactly one level deep.
//!
//! Failures abandon the single transaction: they are logged and never
//! retried, and the worker moves on to the next item.
//!
//! # Concurrency
//!
//! Exactly one worker consumes a queue. Balance increments are therefore
//! issued one transaction at a time, and a commission is only queued after
//! its purchase has been applied.

use crate::base::{TransactionId, UserId};
use crate::config::LedgerSettings;
use crate::error::{LedgerError, StoreError};
use crate::repository::{BalanceRepository, TransactionRepository, within};
use crate::transaction::{Transaction, TransactionKind, TransactionType};
use crate::transaction_queue::TransactionQueue;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Commission owed on a purchase of `amount`, or `None` when it would not be
/// strictly positive or is not representable.
pub fn commission_amount(amount: Decimal, rate: Decimal) -> Option<Decimal> {
    amount
        .checked_mul(rate)
        .filter(|commission| *commission > Decimal::ZERO)
}

/// Result of reconciling a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The transaction was not processed.
    Skipped(LedgerError),
    /// Balance effect applied, nothing derived.
    Applied,
    /// Purchase applied and its commission recorded and queued.
    Chained { commission: TransactionId },
    /// A balance update failed; the transaction was abandoned.
    ApplyFailed(LedgerError),
    /// The purchase was applied but its commission could not be recorded.
    CommissionDropped { amount: Decimal, error: LedgerError },
}

/// Number of transactions queued or in flight.
#[derive(Debug, Clone)]
pub(crate) struct Backlog(Arc<watch::Sender<usize>>);

impl Backlog {
    fn new() -> Self {
        Self(Arc::new(watch::Sender::new(0)))
    }

    pub(crate) fn add(&self) {
        self.0.send_modify(|pending| *pending += 1);
    }

    /// Marks one transaction as reconciled. Every call must pair with an
    /// earlier [`Backlog::add`].
    pub(crate) fn done(&self) {
        self.0.send_modify(|pending| {
            debug_assert!(*pending > 0, "backlog released more transactions than were added");
            *pending = pending.saturating_sub(1);
        });
    }

    pub(crate) fn pending(&self) -> usize {
        *self.0.borrow()
    }

    pub(crate) async fn idle(&self) {
        let mut pending = self.0.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = pending.wait_for(|count| *count == 0).await;
    }
}

/// Applies balance effects and derives commissions.
pub struct Reconciler {
    transactions: Arc<dyn TransactionRepository>,
    balances: Arc<dyn BalanceRepository>,
    queue: Arc<dyn TransactionQueue>,
    /// Hand-off for derived commissions. The worker is the queue's only
    /// consumer, so it must never wait on the queue's capacity itself.
    derived: mpsc::UnboundedSender<Transaction>,
    backlog: Backlog,
    commission_rate: Decimal,
    call_timeout: Duration,
}

impl Reconciler {
    /// Creates a reconciler reading from and feeding commissions back into
    /// `queue`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        balances: Arc<dyn BalanceRepository>,
        queue: Arc<dyn TransactionQueue>,
        settings: &LedgerSettings,
    ) -> Self {
        let backlog = Backlog::new();
        let derived = spawn_forwarder(Arc::clone(&queue), backlog.clone());
        Self {
            transactions,
            balances,
            queue,
            derived,
            backlog,
            commission_rate: settings.commission_rate,
            call_timeout: settings.call_timeout(),
        }
    }

    pub(crate) fn backlog(&self) -> Backlog {
        self.backlog.clone()
    }

    /// Reconciles one transaction: applies its balance effect and, for
    /// purchases, records and queues the derived commission.
    pub async fn reconcile(&self, transaction: &Transaction) -> Reconciliation {
        let Some(id) = transaction.id().filter(|id| !id.is_empty()) else {
            return Reconciliation::Skipped(LedgerError::NotApplicable(
                "transaction has no identifier",
            ));
        };

        if let Err(error) = self.apply(transaction).await {
            return Reconciliation::ApplyFailed(error);
        }

        if transaction.transaction_type() != TransactionType::Purchase {
            return Reconciliation::Applied;
        }
        let Some(amount) = commission_amount(transaction.amount(), self.commission_rate) else {
            return Reconciliation::Applied;
        };
        match self.derive_commission(id, transaction, amount).await {
            Ok(Some(commission)) => Reconciliation::Chained { commission },
            Ok(None) => Reconciliation::Applied,
            Err(error) => Reconciliation::CommissionDropped { amount, error },
        }
    }

    async fn apply(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        let amount = transaction.amount();
        match transaction.kind() {
            TransactionKind::Deposit { customer } => self.credit(&customer.id, amount).await,
            TransactionKind::Purchase {
                customer,
                restaurant,
            } => {
                // The restaurant is only credited once the customer debit landed.
                self.credit(&customer.id, -amount).await?;
                self.credit(&restaurant.id, amount).await
            }
            TransactionKind::Commission { restaurant, .. } => {
                self.credit(&restaurant.id, -amount).await?;
                self.bounded(self.balances.increment_commission_total(&restaurant.id, amount))
                    .await
            }
        }
    }

    async fn credit(&self, user: &UserId, delta: Decimal) -> Result<(), LedgerError> {
        self.bounded(self.balances.increment_amount(user, delta)).await
    }

    async fn derive_commission(
        &self,
        purchase_id: &TransactionId,
        purchase: &Transaction,
        amount: Decimal,
    ) -> Result<Option<TransactionId>, LedgerError> {
        let Some(restaurant) = purchase.restaurant() else {
            return Ok(None);
        };
        let commission = Transaction::commission(restaurant.clone(), purchase_id.clone(), amount);
        let id = self.bounded(self.transactions.save(&commission)).await?;

        self.backlog.add();
        if self.derived.send(commission.identified(id.clone())).is_err() {
            self.backlog.done();
            return Err(LedgerError::QueueClosed);
        }
        Ok(Some(id))
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        Ok(within(self.call_timeout, call).await?)
    }

    /// Worker loop. Runs until `shutdown` turns `true` or the queue closes.
    ///
    /// The signal is checked before every dequeue and also interrupts an idle
    /// wait; a transaction already dequeued is always reconciled in full.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            commission_rate = %self.commission_rate,
            call_timeout_secs = self.call_timeout.as_secs(),
            "reconciliation worker started"
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let next = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                next = self.queue.dequeue() => next,
            };

            let Some(transaction) = next else {
                warn!("work queue closed");
                break;
            };

            let outcome = self.reconcile(&transaction).await;
            report(&transaction, &outcome);
            self.backlog.done();
        }

        info!(pending = self.backlog.pending(), "reconciliation worker stopped");
    }
}

/// Feeds derived commissions into the bounded queue in the order they were
/// derived, waiting on its capacity outside the worker.
fn spawn_forwarder(
    queue: Arc<dyn TransactionQueue>,
    backlog: Backlog,
) -> mpsc::UnboundedSender<Transaction> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Transaction>();
    tokio::spawn(async move {
        while let Some(commission) = receiver.recv().await {
            if let Err(error) = queue.enqueue(commission).await {
                warn!(error = %error, "dropping derived commission");
                backlog.done();
            }
        }
    });
    sender
}

fn report(transaction: &Transaction, outcome: &Reconciliation) {
    let transaction_id = transaction.id().map(TransactionId::as_str).unwrap_or_default();
    let transaction_type = transaction.transaction_type();

    match outcome {
        Reconciliation::Skipped(reason) => {
            warn!(reason = %reason, transaction_type = %transaction_type, "transaction skipped");
        }
        Reconciliation::Applied => {
            debug!(transaction_id, transaction_type = %transaction_type, "transaction reconciled");
        }
        Reconciliation::Chained { commission } => {
            debug!(
                transaction_id,
                commission_id = %commission,
                "purchase reconciled, commission queued"
            );
        }
        Reconciliation::ApplyFailed(error) => {
            error!(
                error = %error,
                transaction_id,
                transaction_type = %transaction_type,
                amount = %transaction.amount(),
                "balance update failed"
            );
        }
        Reconciliation::CommissionDropped { amount, error } => {
            error!(
                error = %error,
                original_transaction_id = transaction_id,
                commission_amount = %amount,
                "commission transaction save failed"
            );
        }
    }
}

/// Owns the running worker task.
///
/// The worker is started once and stopped through [`WorkerHandle::stop`].
/// Dropping the handle signals the worker to stop without waiting for it.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Spawns `reconciler`'s loop on the current Tokio runtime.
    pub fn spawn(reconciler: Reconciler) -> Self {
        let (shutdown, signal) = watch::channel(false);
        let task = tokio::spawn(reconciler.run(signal));
        Self {
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Asks the worker to stop before its next dequeue.
    pub fn signal_stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Signals the worker and waits for the transaction in flight, if any,
    /// to finish.
    pub async fn stop(&self) {
        self.signal_stop();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(error) = task.await {
                error!(error = %error, "reconciliation worker terminated abnormally");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.signal_stop();
    }
}
