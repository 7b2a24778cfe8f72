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


//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use commission_ledger::{
    Balance, BalanceRepository, InMemoryBalanceStore, InMemoryTransactionLog, StoreError,
    Transaction, TransactionId, TransactionRepository, TransactionType, UserId,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tokio::sync::watch;

/// A balance mutation as issued by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceCall {
    Amount(UserId, Decimal),
    CommissionTotal(UserId, Decimal),
}

impl BalanceCall {
    pub fn amount(user: &str, delta: Decimal) -> Self {
        Self::Amount(UserId::from(user), delta)
    }

    pub fn commission_total(user: &str, delta: Decimal) -> Self {
        Self::CommissionTotal(UserId::from(user), delta)
    }
}

fn injected() -> StoreError {
    StoreError::Unavailable("injected failure".into())
}

/// Balance store that records every mutation and fails on demand.
#[derive(Default)]
pub struct ScriptedBalances {
    inner: InMemoryBalanceStore,
    failing_users: HashSet<UserId>,
    fail_commission_total: bool,
    calls: Mutex<Vec<BalanceCall>>,
}

impl ScriptedBalances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mutation touching one of `users` fails.
    pub fn failing_for(users: &[&str]) -> Self {
        Self {
            failing_users: users.iter().map(|user| UserId::from(*user)).collect(),
            ..Self::default()
        }
    }

    /// Commission-total increments fail; amount increments succeed.
    pub fn failing_commission_total() -> Self {
        Self {
            fail_commission_total: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<BalanceCall> {
        self.calls.lock().clone()
    }

    pub async fn amount(&self, user: &str) -> Decimal {
        self.inner
            .get_balance(&UserId::from(user))
            .await
            .unwrap()
            .amount()
    }

    pub async fn balance(&self, user: &str) -> Balance {
        self.inner.get_balance(&UserId::from(user)).await.unwrap()
    }
}

#[async_trait]
impl BalanceRepository for ScriptedBalances {
    async fn get_balance(&self, user: &UserId) -> Result<Balance, StoreError> {
        self.inner.get_balance(user).await
    }

    async fn increment_amount(&self, user: &UserId, delta: Decimal) -> Result<(), StoreError> {
        self.calls
            .lock()
            .push(BalanceCall::Amount(user.clone(), delta));
        if self.failing_users.contains(user) {
            return Err(injected());
        }
        self.inner.increment_amount(user, delta).await
    }

    async fn increment_commission_total(
        &self,
        user: &UserId,
        delta: Decimal,
    ) -> Result<(), StoreError> {
        self.calls
            .lock()
            .push(BalanceCall::CommissionTotal(user.clone(), delta));
        if self.fail_commission_total || self.failing_users.contains(user) {
            return Err(injected());
        }
        self.inner.increment_commission_total(user, delta).await
    }
}

/// Balance store whose mutations never complete.
pub struct StalledBalances;

#[async_trait]
impl BalanceRepository for StalledBalances {
    async fn get_balance(&self, user: &UserId) -> Result<Balance, StoreError> {
        Ok(Balance::zero(user.clone()))
    }

    async fn increment_amount(&self, _user: &UserId, _delta: Decimal) -> Result<(), StoreError> {
        std::future::pending().await
    }

    async fn increment_commission_total(
        &self,
        _user: &UserId,
        _delta: Decimal,
    ) -> Result<(), StoreError> {
        std::future::pending().await
    }
}

/// Balance store whose mutations wait until the gate is opened.
pub struct GatedBalances {
    inner: InMemoryBalanceStore,
    gate: watch::Sender<bool>,
}

impl GatedBalances {
    pub fn closed() -> Self {
        Self {
            inner: InMemoryBalanceStore::new(),
            gate: watch::Sender::new(false),
        }
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    async fn wait_open(&self) {
        let mut gate = self.gate.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = gate.wait_for(|open| *open).await;
    }
}

#[async_trait]
impl BalanceRepository for GatedBalances {
    async fn get_balance(&self, user: &UserId) -> Result<Balance, StoreError> {
        self.inner.get_balance(user).await
    }

    async fn increment_amount(&self, user: &UserId, delta: Decimal) -> Result<(), StoreError> {
        self.wait_open().await;
        self.inner.increment_amount(user, delta).await
    }

    async fn increment_commission_total(
        &self,
        user: &UserId,
        delta: Decimal,
    ) -> Result<(), StoreError> {
        self.wait_open().await;
        self.inner.increment_commission_total(user, delta).await
    }
}

/// Transaction log that refuses to save commissions.
#[derive(Default)]
pub struct CommissionRejectingLog {
    inner: InMemoryTransactionLog,
}

impl CommissionRejectingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl TransactionRepository for CommissionRejectingLog {
    async fn save(&self, transaction: &Transaction) -> Result<TransactionId, StoreError> {
        if transaction.transaction_type() == TransactionType::Commission {
            return Err(injected());
        }
        self.inner.save(transaction).await
    }

    async fn list_by_customer(&self, customer: &UserId) -> Result<Vec<Transaction>, StoreError> {
        self.inner.list_by_customer(customer).await
    }

    async fn list_by_restaurant(
        &self,
        restaurant: &UserId,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.inner.list_by_restaurant(restaurant).await
    }
}

/// `tx` as the log would have returned it, under a fixed identifier.
pub fn saved(tx: Transaction, id: &str) -> Transaction {
    tx.identified(TransactionId::from(id))
}
