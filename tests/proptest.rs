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


//! Property-based tests for the reconciliation pipeline.
//!
//! These tests verify invariants that should hold for any sequence of
//! deposits and purchases once the pipeline is idle.

use commission_ledger::{
    Engine, InMemoryBalanceStore, InMemoryTransactionLog, LedgerSettings, TransactionType,
    UserId, commission_amount,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;
use std::sync::Arc;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Non-negative amount (0 to 10000 with 4 decimal places).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (0i64..=100_000_000i64).prop_map(|units| Decimal::new(units, 4))
}

/// Any non-negative amount, weighted towards values near the top of the range.
fn arb_extreme_amount() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        arb_amount(),
        Just(Decimal::MAX),
        (0u32..=28).prop_map(|scale| Decimal::from_i128_with_scale(i128::from(u64::MAX), scale)),
        any::<u64>().prop_map(|hi| Decimal::from_parts(u32::MAX, u32::MAX, (hi >> 32) as u32, false, 0)),
    ]
}

/// Commission rate between 0 and 1 with 4 decimal places.
fn arb_rate() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000i64).prop_map(|units| Decimal::new(units, 4))
}

#[derive(Debug, Clone)]
enum Op {
    Deposit { customer: u8, amount: Decimal },
    Purchase { customer: u8, restaurant: u8, amount: Decimal },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4, arb_amount()).prop_map(|(customer, amount)| Op::Deposit { customer, amount }),
        (0u8..4, 0u8..3, arb_amount()).prop_map(|(customer, restaurant, amount)| {
            Op::Purchase {
                customer,
                restaurant,
                amount,
            }
        }),
    ]
}

/// Final state of a pipeline after replaying `ops` to completion.
struct Settled {
    amounts: Decimal,
    commission_totals: Decimal,
    commission_count: usize,
}

fn settle(ops: &[Op], rate: Decimal) -> Settled {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let log = Arc::new(InMemoryTransactionLog::new());
        let settings = LedgerSettings {
            commission_rate: rate,
            ..LedgerSettings::default()
        };
        let engine =
            Engine::start(log.clone(), Arc::new(InMemoryBalanceStore::new()), settings).unwrap();

        let mut customers = BTreeSet::new();
        let mut restaurants = BTreeSet::new();
        for op in ops {
            match op {
                Op::Deposit { customer, amount } => {
                    let customer = format!("c{customer}");
                    engine.deposit(customer.as_str(), *amount).await.unwrap();
                    customers.insert(customer);
                }
                Op::Purchase {
                    customer,
                    restaurant,
                    amount,
                } => {
                    let customer = format!("c{customer}");
                    let restaurant = format!("r{restaurant}");
                    engine
                        .purchase(customer.as_str(), restaurant.as_str(), *amount)
                        .await
                        .unwrap();
                    customers.insert(customer);
                    restaurants.insert(restaurant);
                }
            }
        }
        engine.wait_idle().await;

        let mut settled = Settled {
            amounts: Decimal::ZERO,
            commission_totals: Decimal::ZERO,
            commission_count: 0,
        };
        for user in customers.iter().chain(&restaurants) {
            let balance = engine.get_balance(&UserId::from(user.as_str())).await.unwrap();
            settled.amounts += balance.amount();
            settled.commission_totals += balance.total_commission();
        }
        for restaurant in &restaurants {
            settled.commission_count += engine
                .list_restaurant_transactions(&UserId::from(restaurant.as_str()))
                .await
                .unwrap()
                .iter()
                .filter(|tx| tx.transaction_type() == TransactionType::Commission)
                .count();
        }
        engine.shutdown().await;
        settled
    })
}

// =============================================================================
// Commission Arithmetic
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Commission is the exact product of amount and rate, when positive.
    #[test]
    fn commission_is_exact_product(amount in arb_amount(), rate in arb_rate()) {
        match commission_amount(amount, rate) {
            Some(commission) => {
                prop_assert_eq!(commission, amount * rate);
                prop_assert!(commission > Decimal::ZERO);
            }
            None => prop_assert!(amount.is_zero() || rate.is_zero()),
        }
    }

    /// Commission is computed without panicking for any non-negative amount.
    #[test]
    fn commission_never_panics(amount in arb_extreme_amount(), rate in arb_rate()) {
        if let Some(commission) = commission_amount(amount, rate) {
            prop_assert!(commission > Decimal::ZERO);
            prop_assert!(commission <= amount);
        }
    }

    /// Commission never exceeds the purchase amount.
    #[test]
    fn commission_bounded_by_amount(amount in arb_amount(), rate in arb_rate()) {
        if let Some(commission) = commission_amount(amount, rate) {
            prop_assert!(commission <= amount);
        }
    }
}

// =============================================================================
// Extreme Amounts
// =============================================================================

/// Replays `ops` with unbounded amounts, then one ordinary deposit for
/// `c_last`. Returns whether the worker survived and that deposit landed.
fn worker_survives(ops: &[Op]) -> (bool, Decimal) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let engine = Engine::start(
            Arc::new(InMemoryTransactionLog::new()),
            Arc::new(InMemoryBalanceStore::new()),
            LedgerSettings::default(),
        )
        .unwrap();
        for op in ops {
            match op {
                Op::Deposit { customer, amount } => {
                    engine.deposit(format!("c{customer}"), *amount).await.unwrap();
                }
                Op::Purchase {
                    customer,
                    restaurant,
                    amount,
                } => {
                    engine
                        .purchase(format!("c{customer}"), format!("r{restaurant}"), *amount)
                        .await
                        .unwrap();
                }
            }
        }
        engine.deposit("c_last", dec!(1)).await.unwrap();
        let drained = tokio::time::timeout(std::time::Duration::from_secs(5), engine.wait_idle())
            .await
            .is_ok();
        let running = engine.is_running();
        let last = engine
            .get_balance(&UserId::from("c_last"))
            .await
            .unwrap()
            .amount();
        engine.shutdown().await;
        (drained && running, last)
    })
}

fn arb_extreme_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..2, arb_extreme_amount())
            .prop_map(|(customer, amount)| Op::Deposit { customer, amount }),
        (0u8..2, 0u8..2, arb_extreme_amount()).prop_map(|(customer, restaurant, amount)| {
            Op::Purchase {
                customer,
                restaurant,
                amount,
            }
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Overflowing balances abandon single transactions; the worker keeps
    /// reconciling everything queued after them.
    #[test]
    fn extreme_amounts_never_stop_the_worker(
        ops in prop::collection::vec(arb_extreme_op(), 1..20),
    ) {
        let (alive, last) = worker_survives(&ops);
        prop_assert!(alive);
        prop_assert_eq!(last, dec!(1));
    }
}

// =============================================================================
// Pipeline Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Money only enters through deposits: amounts plus collected commissions
    /// always sum to the total deposited.
    #[test]
    fn deposits_are_conserved(ops in prop::collection::vec(arb_op(), 1..30)) {
        let deposited: Decimal = ops
            .iter()
            .filter_map(|op| match op {
                Op::Deposit { amount, .. } => Some(*amount),
                Op::Purchase { .. } => None,
            })
            .sum();

        let settled = settle(&ops, dec!(0.05));

        prop_assert_eq!(settled.amounts + settled.commission_totals, deposited);
    }

    /// Exactly one commission per purchase with a positive commission, and
    /// their totals match the purchase amounts times the rate.
    #[test]
    fn one_commission_per_purchase(
        ops in prop::collection::vec(arb_op(), 1..30),
        rate in arb_rate(),
    ) {
        let purchases: Vec<Decimal> = ops
            .iter()
            .filter_map(|op| match op {
                Op::Purchase { amount, .. } => Some(*amount),
                Op::Deposit { .. } => None,
            })
            .collect();
        let expected: Vec<Decimal> = purchases
            .iter()
            .filter_map(|amount| commission_amount(*amount, rate))
            .collect();

        let settled = settle(&ops, rate);

        prop_assert!(settled.commission_count <= purchases.len());
        prop_assert_eq!(settled.commission_count, expected.len());
        prop_assert_eq!(settled.commission_totals, expected.iter().copied().sum::<Decimal>());
    }
}
