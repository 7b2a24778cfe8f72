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


//! # Commission Ledger
//!
//! This library records monetary transactions between customers and
//! restaurants and keeps per-user running balances. Balances are reconciled
//! asynchronously: every recorded transaction is queued for a single
//! background worker, and each purchase chains a commission transaction
//! back through the same pipeline.
//!
//! ## Core Components
//!
//! - [`Engine`]: Records transactions, answers queries, owns the worker
//! - [`Reconciler`]: Applies balance effects and derives commissions
//! - [`TransactionQueue`]: FIFO hand-off between recording and reconciling
//! - [`TransactionRepository`] / [`BalanceRepository`]: Storage contracts
//! - [`LedgerError`]: Error types for ledger operations
//!
//! ## Example
//!
//! ```
//! use commission_ledger::{
//!     Engine, InMemoryBalanceStore, InMemoryTransactionLog, LedgerSettings, UserId,
//! };
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::start(
//!     Arc::new(InMemoryTransactionLog::new()),
//!     Arc::new(InMemoryBalanceStore::new()),
//!     LedgerSettings::default(),
//! )?;
//!
//! engine.deposit("c1", dec!(100)).await?;
//! engine.purchase("c1", "r1", dec!(40)).await?;
//! engine.wait_idle().await;
//!
//! let restaurant = engine.get_balance(&UserId::from("r1")).await?;
//! assert_eq!(restaurant.amount(), dec!(38));
//! assert_eq!(restaurant.total_commission(), dec!(2));
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Consistency
//!
//! The queue is held in memory, so transactions not yet reconciled when the
//! process exits never reach the balances. Each balance increment is atomic
//! on its own, but the two increments of a purchase or commission are not
//! applied as a unit.

pub mod api;
mod balance;
mod base;
pub mod config;
mod engine;
pub mod error;
pub mod logging;
mod memory;
mod reconciler;
mod repository;
mod transaction;
mod transaction_queue;

pub use balance::Balance;
pub use base::{TransactionId, User, UserId, UserRole};
pub use config::LedgerSettings;
pub use engine::Engine;
pub use error::{ConfigError, LedgerError, StoreError};
pub use memory::{InMemoryBalanceStore, InMemoryTransactionLog};
pub use reconciler::{Reconciler, Reconciliation, WorkerHandle, commission_amount};
pub use repository::{BalanceRepository, TransactionRepository};
pub use transaction::{Transaction, TransactionKind, TransactionType};
pub use transaction_queue::{DEFAULT_QUEUE_CAPACITY, InMemoryQueue, TransactionQueue};
