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

//! Account aggregate.
//!
//! An [`Account`] owns its balance, status, and version counter. Balance
//! mutations on one instance serialize through an internal mutex; the version
//! counter is the optimistic-concurrency token the account store compares at
//! save time.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use transfer_ledger_rs::{Account, AccountId, Currency, Money};
//!
//! let account = Account::open(
//!     AccountId(1),
//!     "Alice",
//!     Money::of(dec!(100.00), Currency::USD),
//! )
//! .unwrap();
//! account.debit(&Money::of(dec!(25.00), Currency::USD)).unwrap();
//! assert_eq!(account.balance(), Money::of(dec!(75.00), Currency::USD));
//! ```

use crate::base::AccountId;
use crate::error::TransferError;
use crate::money::{Currency, Money, Rounding};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Account lifecycle status.
///
/// Accounts are never physically deleted; closing an account is the terminal
/// status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    Active,
    Locked,
    Closed,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Locked => "LOCKED",
            AccountStatus::Closed => "CLOSED",
        };
        f.write_str(label)
    }
}

impl FromStr for AccountStatus {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(AccountStatus::Active),
            "LOCKED" => Ok(AccountStatus::Locked),
            "CLOSED" => Ok(AccountStatus::Closed),
            other => Err(TransferError::InvalidRequest(format!(
                "unknown account status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct AccountData {
    id: AccountId,
    holder_name: String,
    balance: Money,
    status: AccountStatus,
    version: u64,
    /// Version the store row had when this instance was hydrated; compared
    /// against the stored row at save time.
    persisted_version: u64,
    last_updated: DateTime<Utc>,
    daily_limit: Option<Money>,
}

impl AccountData {
    fn ensure_active(&self) -> Result<(), TransferError> {
        if self.status != AccountStatus::Active {
            return Err(TransferError::AccountNotActive(self.id));
        }
        Ok(())
    }

    /// Bumps the version and advances the timestamp strictly.
    fn touch(&mut self) {
        self.version += 1;
        let mut now = Utc::now();
        if now <= self.last_updated {
            now = self.last_updated + Duration::nanoseconds(1);
        }
        self.last_updated = now;
    }
}

/// Bank account with balance, status, and an optimistic-concurrency version.
#[derive(Debug)]
pub struct Account {
    inner: Mutex<AccountData>,
}

impl Account {
    /// Opens an account with an opening balance and ACTIVE status.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidRequest`] if the holder name is blank
    /// or the opening balance is negative.
    pub fn open(
        id: AccountId,
        holder_name: &str,
        opening_balance: Money,
    ) -> Result<Self, TransferError> {
        let holder_name = holder_name.trim();
        if holder_name.is_empty() {
            return Err(TransferError::InvalidRequest(
                "holder name must not be blank".into(),
            ));
        }
        if opening_balance.is_negative() {
            return Err(TransferError::InvalidRequest(
                "opening balance must not be negative".into(),
            ));
        }
        Ok(Account {
            inner: Mutex::new(AccountData {
                id,
                holder_name: holder_name.to_owned(),
                balance: opening_balance,
                status: AccountStatus::Active,
                version: 0,
                persisted_version: 0,
                last_updated: Utc::now(),
                daily_limit: None,
            }),
        })
    }

    pub fn id(&self) -> AccountId {
        self.inner.lock().id
    }

    pub fn holder_name(&self) -> String {
        self.inner.lock().holder_name.clone()
    }

    pub fn balance(&self) -> Money {
        self.inner.lock().balance
    }

    pub fn currency(&self) -> Currency {
        self.inner.lock().balance.currency()
    }

    pub fn status(&self) -> AccountStatus {
        self.inner.lock().status
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().status == AccountStatus::Active
    }

    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.inner.lock().last_updated
    }

    pub fn daily_limit(&self) -> Option<Money> {
        self.inner.lock().daily_limit
    }

    /// Subtracts `amount` from the balance, rounding half-up.
    ///
    /// # Errors
    ///
    /// - [`TransferError::AccountNotActive`] if the account is not ACTIVE.
    /// - [`TransferError::InvalidAmount`] if the amount is not positive.
    /// - [`TransferError::InsufficientBalance`] if the balance is too low.
    pub fn debit(&self, amount: &Money) -> Result<(), TransferError> {
        let mut data = self.inner.lock();
        data.ensure_active()?;
        if !amount.is_positive() {
            return Err(TransferError::InvalidAmount);
        }
        if data.balance.compare(amount) == Ordering::Less {
            return Err(TransferError::InsufficientBalance {
                account: data.id,
                requested: *amount,
                available: data.balance,
            });
        }
        data.balance = data.balance.subtract_rounded(amount, Rounding::HalfUp);
        data.touch();
        Ok(())
    }

    /// Adds `amount` to the balance, rounding half-up.
    ///
    /// # Errors
    ///
    /// - [`TransferError::AccountNotActive`] if the account is not ACTIVE.
    /// - [`TransferError::InvalidAmount`] if the amount is not positive.
    pub fn credit(&self, amount: &Money) -> Result<(), TransferError> {
        let mut data = self.inner.lock();
        data.ensure_active()?;
        if !amount.is_positive() {
            return Err(TransferError::InvalidAmount);
        }
        data.balance = data.balance.add_rounded(amount, Rounding::HalfUp);
        data.touch();
        Ok(())
    }

    /// Changes the status; bumps the version only if the status changes.
    pub fn set_status(&self, status: AccountStatus) {
        let mut data = self.inner.lock();
        if data.status != status {
            data.status = status;
            data.touch();
        }
    }

    /// # Errors
    ///
    /// Returns [`TransferError::InvalidRequest`] if the name is blank.
    pub fn set_holder_name(&self, holder_name: &str) -> Result<(), TransferError> {
        let holder_name = holder_name.trim();
        if holder_name.is_empty() {
            return Err(TransferError::InvalidRequest(
                "holder name must not be blank".into(),
            ));
        }
        let mut data = self.inner.lock();
        data.holder_name = holder_name.to_owned();
        data.touch();
        Ok(())
    }

    /// Sets the advisory daily transfer limit.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidRequest`] if the limit is negative.
    pub fn set_daily_limit(&self, limit: Option<Money>) -> Result<(), TransferError> {
        if limit.is_some_and(|l| l.is_negative()) {
            return Err(TransferError::InvalidRequest(
                "daily limit must not be negative".into(),
            ));
        }
        let mut data = self.inner.lock();
        data.daily_limit = limit;
        data.touch();
        Ok(())
    }

    pub(crate) fn persisted_version(&self) -> u64 {
        self.inner.lock().persisted_version
    }

    /// Records that the current state has been persisted, making the current
    /// version the new baseline for conflict detection.
    pub(crate) fn mark_persisted(&self) {
        let mut data = self.inner.lock();
        data.persisted_version = data.version;
    }
}

impl Clone for Account {
    fn clone(&self) -> Self {
        Account {
            inner: Mutex::new(self.inner.lock().clone()),
        }
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        *self.inner.lock() == *other.inner.lock()
    }
}

impl Serialize for Account {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("Account", 6)?;
        state.serialize_field("id", &data.id)?;
        state.serialize_field("holder", &data.holder_name)?;
        state.serialize_field("balance", &data.balance.amount())?;
        state.serialize_field("currency", data.balance.currency().code())?;
        state.serialize_field("status", &data.status)?;
        state.serialize_field("version", &data.version)?;
        state.end()
    }
}
