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


//! Per-user running balances.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use commission_ledger::{Balance, UserId};
//!
//! let balance = Balance::zero(UserId::from("c1"));
//! assert_eq!(balance.amount(), dec!(0.00));
//! assert_eq!(balance.total_commission(), dec!(0.00));
//! ```

use crate::base::UserId;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Balance of a single user.
///
/// `amount` is signed and may go negative. `total_commission` only moves for
/// restaurants and never decreases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    user_id: UserId,
    amount: Decimal,
    total_commission: Decimal,
}

impl Balance {
    pub(crate) const DECIMAL_PRECISION: u32 = 4;

    pub fn new(user_id: UserId, amount: Decimal, total_commission: Decimal) -> Self {
        Self {
            user_id,
            amount,
            total_commission,
        }
    }

    /// The implicit balance of a user with no recorded activity.
    pub fn zero(user_id: UserId) -> Self {
        Self::new(user_id, Decimal::ZERO, Decimal::ZERO)
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn total_commission(&self) -> Decimal {
        self.total_commission
    }
}

impl Serialize for Balance {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Balance", 3)?;
        state.serialize_field("userId", &self.user_id)?;
        state.serialize_field("amount", &self.amount.round_dp(Self::DECIMAL_PRECISION))?;
        state.serialize_field(
            "totalCommission",
            &self.total_commission.round_dp(Self::DECIMAL_PRECISION),
        )?;
        state.end()
    }
}
