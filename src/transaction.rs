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


//! Transactions recorded by the ledger.
//!
//! A transaction is created once, saved once and never changed afterwards.
//! Which participants it references is fixed by its kind:
//!
//! | Kind | Customer | Restaurant | Related transaction |
//! |------|----------|------------|---------------------|
//! | Deposit | yes | no | no |
//! | Purchase | yes | yes | no |
//! | Commission | no | yes | the purchase it was derived from |

use crate::base::{TransactionId, User, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of transaction types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Purchase,
    Commission,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => f.write_str("DEPOSIT"),
            Self::Purchase => f.write_str("PURCHASE"),
            Self::Commission => f.write_str("COMMISSION"),
        }
    }
}

/// Type-specific participants of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum TransactionKind {
    Deposit {
        customer: User,
    },
    Purchase {
        customer: User,
        restaurant: User,
    },
    Commission {
        restaurant: User,
        related_transaction: TransactionId,
    },
}

impl TransactionKind {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Self::Deposit { .. } => TransactionType::Deposit,
            Self::Purchase { .. } => TransactionType::Purchase,
            Self::Commission { .. } => TransactionType::Commission,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<TransactionId>,
    #[serde(flatten)]
    kind: TransactionKind,
    amount: Decimal,
    created_at: DateTime<Utc>,
}

impl Transaction {
    fn new(kind: TransactionKind, amount: Decimal) -> Self {
        Self {
            id: None,
            kind,
            amount,
            created_at: Utc::now(),
        }
    }

    /// A customer adding `amount` to their balance.
    pub fn deposit(customer: impl Into<UserId>, amount: Decimal) -> Self {
        Self::new(
            TransactionKind::Deposit {
                customer: User::customer(customer),
            },
            amount,
        )
    }

    /// A customer paying `amount` to a restaurant.
    pub fn purchase(
        customer: impl Into<UserId>,
        restaurant: impl Into<UserId>,
        amount: Decimal,
    ) -> Self {
        Self::new(
            TransactionKind::Purchase {
                customer: User::customer(customer),
                restaurant: User::restaurant(restaurant),
            },
            amount,
        )
    }

    /// Commission owed by `restaurant` for the purchase `related_transaction`.
    pub fn commission(restaurant: User, related_transaction: TransactionId, amount: Decimal) -> Self {
        Self::new(
            TransactionKind::Commission {
                restaurant,
                related_transaction,
            },
            amount,
        )
    }

    /// Overrides the creation timestamp. Only meaningful before the
    /// transaction is saved.
    pub fn created_at_time(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Returns the persisted copy of this transaction carrying `id`.
    pub fn identified(self, id: TransactionId) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    pub fn id(&self) -> Option<&TransactionId> {
        self.id.as_ref()
    }

    pub fn kind(&self) -> &TransactionKind {
        &self.kind
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.kind.transaction_type()
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn customer(&self) -> Option<&User> {
        match &self.kind {
            TransactionKind::Deposit { customer } | TransactionKind::Purchase { customer, .. } => {
                Some(customer)
            }
            TransactionKind::Commission { .. } => None,
        }
    }

    pub fn restaurant(&self) -> Option<&User> {
        match &self.kind {
            TransactionKind::Purchase { restaurant, .. }
            | TransactionKind::Commission { restaurant, .. } => Some(restaurant),
            TransactionKind::Deposit { .. } => None,
        }
    }

    pub fn related_transaction(&self) -> Option<&TransactionId> {
        match &self.kind {
            TransactionKind::Commission {
                related_transaction,
                ..
            } => Some(related_transaction),
            _ => None,
        }
    }

    pub fn involves_customer(&self, id: &UserId) -> bool {
        self.customer().is_some_and(|customer| &customer.id == id)
    }

    pub fn involves_restaurant(&self, id: &UserId) -> bool {
        self.restaurant().is_some_and(|restaurant| &restaurant.id == id)
    }
}
