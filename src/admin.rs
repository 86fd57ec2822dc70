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

//! Administrative account operations.
//!
//! Accounts are opened, updated, and closed here. Closing is a status
//! transition to CLOSED; account rows are never deleted.

use crate::account::{Account, AccountStatus};
use crate::base::AccountId;
use crate::error::TransferError;
use crate::money::Money;
use crate::store::AccountStore;
use std::sync::Arc;
use tracing::info;

/// Account management operations reserved for administrators.
#[derive(Clone)]
pub struct AccountAdmin {
    accounts: Arc<dyn AccountStore>,
}

impl AccountAdmin {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        AccountAdmin { accounts }
    }

    /// Opens an ACTIVE account with an opening balance.
    ///
    /// # Errors
    ///
    /// [`TransferError::InvalidRequest`] for a blank holder name or negative
    /// opening balance.
    pub fn open_account(
        &self,
        holder_name: &str,
        opening_balance: Money,
    ) -> Result<Account, TransferError> {
        let account = Account::open(self.accounts.allocate_id(), holder_name, opening_balance)?;
        self.accounts.insert(account.clone())?;
        info!(account = %account.id(), holder = holder_name, "account opened");
        Ok(account)
    }

    /// Updates holder name and/or the advisory daily transfer limit.
    ///
    /// # Errors
    ///
    /// [`TransferError::AccountNotFound`] for an unknown id;
    /// [`TransferError::InvalidRequest`] for invalid field values;
    /// [`TransferError::OptimisticConflict`] if a concurrent update won.
    pub fn update_account(
        &self,
        id: AccountId,
        holder_name: Option<&str>,
        daily_limit: Option<Money>,
    ) -> Result<Account, TransferError> {
        let account = self
            .accounts
            .find_by_id(id)
            .ok_or(TransferError::AccountNotFound(id))?;
        if let Some(holder_name) = holder_name {
            account.set_holder_name(holder_name)?;
        }
        if let Some(daily_limit) = daily_limit {
            account.set_daily_limit(Some(daily_limit))?;
        }
        self.accounts.save(&account)?;
        Ok(account)
    }

    /// Transitions the account to a new status.
    ///
    /// # Errors
    ///
    /// [`TransferError::AccountNotFound`] for an unknown id;
    /// [`TransferError::OptimisticConflict`] if a concurrent update won.
    pub fn change_status(
        &self,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, TransferError> {
        let account = self
            .accounts
            .find_by_id(id)
            .ok_or(TransferError::AccountNotFound(id))?;
        account.set_status(status);
        self.accounts.save(&account)?;
        info!(account = %id, %status, "account status changed");
        Ok(account)
    }

    /// Closes the account. The row remains for audit.
    ///
    /// # Errors
    ///
    /// Same conditions as [`AccountAdmin::change_status`].
    pub fn close_account(&self, id: AccountId) -> Result<(), TransferError> {
        self.change_status(id, AccountStatus::Closed)?;
        Ok(())
    }

    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.accounts.find_by_id(id)
    }

    /// All accounts, ordered by id.
    pub fn accounts(&self) -> Vec<Account> {
        self.accounts.list()
    }
}
