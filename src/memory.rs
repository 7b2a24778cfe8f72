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


//! In-memory repositories.
//!
//! Used by the server binary, replay mode and tests. Both stores are safe for
//! concurrent access: the log serialises appends behind a [`RwLock`] and the
//! balance store relies on [`DashMap`]'s entry API for atomic per-user
//! increments.

use crate::balance::Balance;
use crate::base::{TransactionId, UserId};
use crate::error::StoreError;
use crate::repository::{BalanceRepository, TransactionRepository};
use crate::transaction::Transaction;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Append-only transaction log with duplicate detection.
///
/// Combines a [`DashMap`] for O(1) identifier lookup with a vector that
/// preserves save order.
#[derive(Debug, Default)]
pub struct InMemoryTransactionLog {
    /// Saved transactions by identifier.
    by_id: DashMap<TransactionId, Arc<Transaction>>,

    /// Saved transactions in save order.
    entries: RwLock<Vec<Arc<Transaction>>>,
}

impl InMemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saved transactions.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a saved transaction.
    pub fn get(&self, id: &TransactionId) -> Option<Transaction> {
        self.by_id.get(id).map(|entry| Transaction::clone(entry.value()))
    }

    fn append(&self, transaction: &Transaction) -> Result<TransactionId, StoreError> {
        let id = transaction
            .id()
            .filter(|id| !id.is_empty())
            .cloned()
            .unwrap_or_else(TransactionId::generate);

        // Entry API keeps check-and-insert atomic across concurrent savers.
        match self.by_id.entry(id.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateId(id)),
            Entry::Vacant(entry) => {
                let stored = Arc::new(transaction.clone().identified(id.clone()));
                self.entries.write().push(Arc::clone(&stored));
                entry.insert(stored);
                Ok(id)
            }
        }
    }

    /// Matching transactions, newest first. Equal timestamps keep the most
    /// recently saved first.
    fn newest_first(&self, matches: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        let mut found: Vec<Transaction> = self
            .entries
            .read()
            .iter()
            .rev()
            .filter(|tx| matches(tx))
            .map(|tx| Transaction::clone(tx))
            .collect();
        found.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        found
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionLog {
    async fn save(&self, transaction: &Transaction) -> Result<TransactionId, StoreError> {
        self.append(transaction)
    }

    async fn list_by_customer(&self, customer: &UserId) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.newest_first(|tx| tx.involves_customer(customer)))
    }

    async fn list_by_restaurant(
        &self,
        restaurant: &UserId,
    ) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.newest_first(|tx| tx.involves_restaurant(restaurant)))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BalanceRecord {
    amount: Decimal,
    total_commission: Decimal,
}

/// Balance store keyed by user id.
#[derive(Debug, Default)]
pub struct InMemoryBalanceStore {
    balances: DashMap<UserId, BalanceRecord>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BalanceRepository for InMemoryBalanceStore {
    async fn get_balance(&self, user: &UserId) -> Result<Balance, StoreError> {
        Ok(self
            .balances
            .get(user)
            .map(|record| Balance::new(user.clone(), record.amount, record.total_commission))
            .unwrap_or_else(|| Balance::zero(user.clone())))
    }

    async fn increment_amount(&self, user: &UserId, delta: Decimal) -> Result<(), StoreError> {
        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut record = self.balances.entry(user.clone()).or_default();
        record.amount = record
            .amount
            .checked_add(delta)
            .ok_or_else(|| StoreError::Overflow(user.clone()))?;
        Ok(())
    }

    async fn increment_commission_total(
        &self,
        user: &UserId,
        delta: Decimal,
    ) -> Result<(), StoreError> {
        let mut record = self.balances.entry(user.clone()).or_default();
        record.total_commission = record
            .total_commission
            .checked_add(delta)
            .ok_or_else(|| StoreError::Overflow(user.clone()))?;
        Ok(())
    }
}
