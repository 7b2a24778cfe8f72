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


//! Pipeline settings.

use crate::error::ConfigError;
use crate::transaction_queue::DEFAULT_QUEUE_CAPACITY;
use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

/// Share of a purchase charged to the restaurant as commission.
pub const DEFAULT_COMMISSION_RATE: Decimal = dec!(0.05);

/// Upper bound for a single repository call.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Tunables for the reconciliation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct LedgerSettings {
    /// Transactions buffered in the work queue before producers wait
    #[arg(long, env = "QUEUE_BUFFER_SIZE", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Commission charged on every purchase, as a fraction of its amount
    #[arg(long, env = "COMMISSION_RATE", default_value_t = DEFAULT_COMMISSION_RATE)]
    pub commission_rate: Decimal,

    /// Timeout in seconds for each repository call
    #[arg(long, env = "CALL_TIMEOUT_SECS", default_value_t = DEFAULT_CALL_TIMEOUT_SECS)]
    pub call_timeout_secs: u64,
}

impl LedgerSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.commission_rate < Decimal::ZERO || self.commission_rate > Decimal::ONE {
            return Err(ConfigError::CommissionRateOutOfRange(self.commission_rate));
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::ZeroCallTimeout);
        }
        Ok(())
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            commission_rate: DEFAULT_COMMISSION_RATE,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
        }
    }
}
