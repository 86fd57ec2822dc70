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

//! Fixed-scale monetary values.
//!
//! [`Money`] pairs a [`Decimal`] amount with a [`Currency`] code and keeps the
//! amount at a fixed scale of two fractional digits. Two rounding rules are
//! selectable per context: half-to-even for pure value arithmetic, half-up
//! (away from zero) for account balance mutation.
//!
//! Arithmetic between two values requires identical currencies. A mismatch is
//! a caller bug, not a recoverable condition, and panics.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use transfer_ledger_rs::{Currency, Money};
//!
//! let a = Money::of(dec!(10.005), Currency::USD);
//! assert_eq!(a.amount(), dec!(10.00)); // half-to-even
//! ```

use crate::error::TransferError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// ISO-style three-letter currency code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Currency([u8; 3]);

impl Currency {
    pub const USD: Currency = Currency(*b"USD");
    pub const EUR: Currency = Currency(*b"EUR");

    /// Returns the code as an uppercase string slice.
    pub fn code(&self) -> &str {
        // Construction only admits ASCII alphabetic bytes.
        std::str::from_utf8(&self.0).expect("currency code is ASCII")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(TransferError::InvalidRequest(format!(
                "invalid currency code: {s:?}"
            )));
        }
        let mut bytes = [0u8; 3];
        for (i, b) in code.bytes().enumerate() {
            bytes[i] = b.to_ascii_uppercase();
        }
        Ok(Currency(bytes))
    }
}

impl Serialize for Currency {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(D::Error::custom)
    }
}

/// Rounding rule applied when normalizing an amount to the fixed scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Banker's rounding; used for pure value arithmetic.
    HalfEven,
    /// Round half away from zero; used for account balance mutation.
    HalfUp,
}

impl Rounding {
    fn strategy(self) -> RoundingStrategy {
        match self {
            Rounding::HalfEven => RoundingStrategy::MidpointNearestEven,
            Rounding::HalfUp => RoundingStrategy::MidpointAwayFromZero,
        }
    }
}

/// Immutable monetary value at a fixed scale of two fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Number of fractional digits every amount is stored at.
    pub const SCALE: u32 = 2;

    /// Creates a value normalized with [`Rounding::HalfEven`].
    pub fn of(amount: Decimal, currency: Currency) -> Money {
        Money::of_rounded(amount, currency, Rounding::HalfEven)
    }

    /// Creates a value normalized with an explicit rounding rule.
    pub fn of_rounded(amount: Decimal, currency: Currency, rounding: Rounding) -> Money {
        Money {
            amount: normalize(amount, rounding),
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Money {
        Money::of(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns `self + other`, normalized half-to-even.
    ///
    /// # Panics
    ///
    /// Panics if the currencies differ.
    pub fn add(&self, other: &Money) -> Money {
        self.add_rounded(other, Rounding::HalfEven)
    }

    /// Returns `self + other` under an explicit rounding rule.
    pub fn add_rounded(&self, other: &Money, rounding: Rounding) -> Money {
        self.assert_same_currency(other);
        Money::of_rounded(self.amount + other.amount, self.currency, rounding)
    }

    /// Returns `self - other`, normalized half-to-even.
    ///
    /// # Panics
    ///
    /// Panics if the currencies differ.
    pub fn subtract(&self, other: &Money) -> Money {
        self.subtract_rounded(other, Rounding::HalfEven)
    }

    /// Returns `self - other` under an explicit rounding rule.
    pub fn subtract_rounded(&self, other: &Money, rounding: Rounding) -> Money {
        self.assert_same_currency(other);
        Money::of_rounded(self.amount - other.amount, self.currency, rounding)
    }

    /// Returns `self * factor`, normalized half-to-even.
    pub fn multiply(&self, factor: Decimal) -> Money {
        Money::of(self.amount * factor, self.currency)
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Compares two amounts of the same currency.
    ///
    /// # Panics
    ///
    /// Panics if the currencies differ; callers must guarantee same-currency
    /// operands.
    pub fn compare(&self, other: &Money) -> Ordering {
        self.assert_same_currency(other);
        self.amount.cmp(&other.amount)
    }

    fn assert_same_currency(&self, other: &Money) {
        assert_eq!(
            self.currency, other.currency,
            "currency mismatch: {} vs {}",
            self.currency, other.currency
        );
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.currency, self.amount)
    }
}

fn normalize(amount: Decimal, rounding: Rounding) -> Decimal {
    let mut normalized = amount.round_dp_with_strategy(Money::SCALE, rounding.strategy());
    normalized.rescale(Money::SCALE);
    normalized
}
