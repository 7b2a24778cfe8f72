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


//! Storage contracts consumed by the ledger.
//!
//! The ledger never assumes a storage technology. It needs an append-only
//! transaction log and a balance store whose increments are atomic per user.

use crate::balance::Balance;
use crate::base::{TransactionId, UserId};
use crate::error::StoreError;
use crate::transaction::Transaction;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;

/// Append-only log of transactions.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Persists `transaction` and returns its identifier.
    ///
    /// Transactions without an identifier get a new one. A transaction that
    /// already carries an identifier keeps it.
    async fn save(&self, transaction: &Transaction) -> Result<TransactionId, StoreError>;

    /// Transactions where `customer` is the customer, newest first.
    async fn list_by_customer(&self, customer: &UserId) -> Result<Vec<Transaction>, StoreError>;

    /// Transactions where `restaurant` is the restaurant, newest first.
    async fn list_by_restaurant(&self, restaurant: &UserId)
    -> Result<Vec<Transaction>, StoreError>;
}

/// Running balances keyed by user id.
///
/// Both increment operations must be atomic increment-or-create: a missing
/// record is created with `delta` as its initial value.
#[async_trait]
pub trait BalanceRepository: Send + Sync {
    /// Returns a zero balance, not an error, for unknown users.
    async fn get_balance(&self, user: &UserId) -> Result<Balance, StoreError>;

    async fn increment_amount(&self, user: &UserId, delta: Decimal) -> Result<(), StoreError>;

    async fn increment_commission_total(
        &self,
        user: &UserId,
        delta: Decimal,
    ) -> Result<(), StoreError>;
}

/// Runs a repository call, failing with [`StoreError::Timeout`] once `limit`
/// elapses.
pub(crate) async fn within<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
