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


//! Error types for the ledger and its repositories.

use crate::base::{TransactionId, UserId};
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a transaction log or balance store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not complete the call
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within its time budget
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// A transaction with this identifier was already saved
    #[error("duplicate transaction ID {0}")]
    DuplicateId(TransactionId),

    /// Applying the increment would overflow the stored value
    #[error("balance overflow for user {0}")]
    Overflow(UserId),
}

/// Ledger processing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A repository call failed (log write, balance write or read)
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// Nothing to do for this item
    #[error("not applicable: {0}")]
    NotApplicable(&'static str),

    /// Amount is negative
    #[error("invalid amount (must not be negative)")]
    InvalidAmount,

    /// A participant id is blank
    #[error("invalid user: {0}")]
    InvalidUser(&'static str),

    /// The work queue no longer accepts transactions
    #[error("work queue is closed")]
    QueueClosed,
}

impl LedgerError {
    /// Returns `true` when the failure came from a timed out repository call.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Persistence(StoreError::Timeout(_)))
    }
}

/// Invalid [`LedgerSettings`](crate::LedgerSettings).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("queue capacity must be greater than zero")]
    ZeroQueueCapacity,

    #[error("commission rate must be between 0 and 1, got {0}")]
    CommissionRateOutOfRange(rust_decimal::Decimal),

    #[error("call timeout must be greater than zero")]
    ZeroCallTimeout,
}
