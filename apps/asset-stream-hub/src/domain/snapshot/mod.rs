//! Account Snapshot Types
//!
//! The immutable account-state value broadcast to every client once per
//! tick, and the fixed account parameters it is derived from.
//!
//! # Formulas
//!
//! ```text
//! pnl          = (new_price - previous_price) * position_size
//! margin       = balance - pnl
//! can_transfer = margin - lock_price * position_size
//! ```
//!
//! All arithmetic is checked. A result outside the `Decimal` range is a
//! [`SnapshotError`] instead of a panic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Account Parameters
// =============================================================================

/// Fixed account parameters for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountParameters {
    /// Account balance at position open.
    pub balance: Decimal,
    /// Size of the open position.
    pub position_size: Decimal,
    /// Price the simulation starts from.
    pub baseline_price: Decimal,
    /// Price used to value the locked position amount.
    pub lock_price: Decimal,
}

impl Default for AccountParameters {
    fn default() -> Self {
        Self {
            balance: Decimal::new(268_005, 1),
            position_size: Decimal::new(888, 1),
            baseline_price: Decimal::new(100, 0),
            lock_price: Decimal::new(100, 0),
        }
    }
}

impl AccountParameters {
    /// Amount locked by the open position (`lock_price * position_size`).
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Overflow` if the product is out of range.
    pub fn locked_amount(&self) -> Result<Decimal, SnapshotError> {
        self.lock_price
            .checked_mul(self.position_size)
            .ok_or(SnapshotError::Overflow("locked amount"))
    }

    /// Check that every snapshot reachable from the baseline price with a
    /// relative move of at most `max_relative_delta` can be computed.
    ///
    /// # Errors
    ///
    /// Returns the first quantity that overflows at either extreme price.
    pub fn check_range(&self, max_relative_delta: Decimal) -> Result<(), SnapshotError> {
        let max = max_relative_delta.abs();
        for factor in [Decimal::ONE + max, Decimal::ONE - max] {
            let price = self
                .baseline_price
                .checked_mul(factor)
                .ok_or(SnapshotError::Overflow("new price"))?;
            Snapshot::compute(self, self.baseline_price, price)?;
        }
        Ok(())
    }
}

/// Snapshot computation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// A derived quantity does not fit in a `Decimal`.
    #[error("{0} overflowed")]
    Overflow(&'static str),
}

// =============================================================================
// Snapshot
// =============================================================================

/// One computed account state.
///
/// Fields are private so a snapshot can only come out of [`Snapshot::compute`],
/// which keeps the four values consistent with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    balance: Decimal,
    #[serde(rename = "pnl")]
    unrealized_pnl: Decimal,
    #[serde(rename = "margin")]
    margin_balance: Decimal,
    #[serde(rename = "canTransfer")]
    transferable: Decimal,
}

impl Snapshot {
    /// Compute a snapshot from a price move.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Overflow` naming the first quantity that is
    /// out of range.
    pub fn compute(
        params: &AccountParameters,
        previous_price: Decimal,
        new_price: Decimal,
    ) -> Result<Self, SnapshotError> {
        let unrealized_pnl = new_price
            .checked_sub(previous_price)
            .and_then(|price_move| price_move.checked_mul(params.position_size))
            .ok_or(SnapshotError::Overflow("pnl"))?;
        let margin_balance = params
            .balance
            .checked_sub(unrealized_pnl)
            .ok_or(SnapshotError::Overflow("margin"))?;
        let transferable = margin_balance
            .checked_sub(params.locked_amount()?)
            .ok_or(SnapshotError::Overflow("transferable amount"))?;

        Ok(Self {
            balance: params.balance.normalize(),
            unrealized_pnl: unrealized_pnl.normalize(),
            margin_balance: margin_balance.normalize(),
            transferable: transferable.normalize(),
        })
    }

    /// Account balance at position open.
    #[must_use]
    pub const fn balance(&self) -> Decimal {
        self.balance
    }

    /// Signed unrealized profit/loss.
    #[must_use]
    pub const fn unrealized_pnl(&self) -> Decimal {
        self.unrealized_pnl
    }

    /// `balance - unrealized_pnl`.
    #[must_use]
    pub const fn margin_balance(&self) -> Decimal {
        self.margin_balance
    }

    /// `margin_balance - locked_amount`.
    #[must_use]
    pub const fn transferable(&self) -> Decimal {
        self.transferable
    }

    /// Encode as the outbound JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use proptest::prelude::*;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn default_parameters_match_demo_account() {
        let params = AccountParameters::default();
        assert_eq!(params.balance, dec("26800.5"));
        assert_eq!(params.position_size, dec("88.8"));
        assert_eq!(params.baseline_price, dec("100"));
        assert_eq!(params.locked_amount().unwrap(), dec("8880"));
    }

    #[test]
    fn compute_price_up() {
        let params = AccountParameters::default();
        let snapshot = Snapshot::compute(&params, dec("100.0"), dec("100.2")).unwrap();

        assert_eq!(snapshot.balance(), dec("26800.5"));
        assert_eq!(snapshot.unrealized_pnl(), dec("17.76"));
        assert_eq!(snapshot.margin_balance(), dec("26782.74"));
        assert_eq!(snapshot.transferable(), dec("17902.74"));
    }

    #[test]
    fn compute_price_down_gives_negative_pnl() {
        let params = AccountParameters::default();
        let snapshot = Snapshot::compute(&params, dec("100"), dec("99.5")).unwrap();

        assert_eq!(snapshot.unrealized_pnl(), dec("-44.4"));
        assert_eq!(snapshot.margin_balance(), dec("26844.9"));
        assert_eq!(snapshot.transferable(), dec("17964.9"));
    }

    #[test]
    fn compute_unchanged_price() {
        let params = AccountParameters::default();
        let snapshot = Snapshot::compute(&params, dec("100"), dec("100")).unwrap();

        assert!(snapshot.unrealized_pnl().is_zero());
        assert_eq!(snapshot.margin_balance(), params.balance);
    }

    #[test]
    fn json_has_exactly_four_fields() {
        let params = AccountParameters::default();
        let snapshot = Snapshot::compute(&params, dec("100.0"), dec("100.2")).unwrap();

        let value: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 4);
        assert_eq!(object["balance"], "26800.5");
        assert_eq!(object["pnl"], "17.76");
        assert_eq!(object["margin"], "26782.74");
        assert_eq!(object["canTransfer"], "17902.74");
    }

    #[test]
    fn compute_reports_overflow_instead_of_panicking() {
        let params = AccountParameters {
            position_size: dec("100000000000000000000"),
            lock_price: dec("10000000000"),
            ..AccountParameters::default()
        };

        assert_eq!(
            Snapshot::compute(&params, dec("100"), dec("100.2")),
            Err(SnapshotError::Overflow("locked amount"))
        );
    }

    #[test]
    fn margin_overflow_on_price_drop() {
        let params = AccountParameters {
            balance: Decimal::MAX,
            ..AccountParameters::default()
        };

        assert!(Snapshot::compute(&params, dec("100"), dec("100.2")).is_ok());
        assert_eq!(
            Snapshot::compute(&params, dec("100"), dec("99.5")),
            Err(SnapshotError::Overflow("margin"))
        );
    }

    #[test]
    fn default_parameters_are_in_range() {
        assert!(AccountParameters::default().check_range(dec("0.005")).is_ok());
    }

    #[test]
    fn check_range_covers_both_price_extremes() {
        let params = AccountParameters {
            baseline_price: dec("79000000000000000000000000000"),
            ..AccountParameters::default()
        };
        assert_eq!(
            params.check_range(dec("0.005")),
            Err(SnapshotError::Overflow("new price"))
        );

        let params = AccountParameters {
            balance: Decimal::MAX,
            ..AccountParameters::default()
        };
        assert_eq!(
            params.check_range(dec("0.005")),
            Err(SnapshotError::Overflow("margin"))
        );
    }

    proptest! {
        #[test]
        fn fields_are_mutually_consistent(
            prev_cents in 1i64..10_000_000,
            new_cents in 1i64..10_000_000,
            balance_cents in 0i64..1_000_000_000,
            size_tenths in 1i64..100_000,
        ) {
            let params = AccountParameters {
                balance: Decimal::new(balance_cents, 2),
                position_size: Decimal::new(size_tenths, 1),
                baseline_price: Decimal::new(prev_cents, 2),
                lock_price: Decimal::new(prev_cents, 2),
            };
            let previous = Decimal::new(prev_cents, 2);
            let new = Decimal::new(new_cents, 2);

            let snapshot = Snapshot::compute(&params, previous, new).unwrap();

            let pnl = (new - previous) * params.position_size;
            prop_assert_eq!(snapshot.unrealized_pnl(), pnl);
            prop_assert_eq!(snapshot.margin_balance(), params.balance - pnl);
            prop_assert_eq!(
                snapshot.transferable(),
                params.balance - pnl - params.lock_price * params.position_size
            );
        }
    }
}
