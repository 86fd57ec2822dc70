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

//! Storage contracts consumed by the transfer engine.
//!
//! The engine owns no persistence of its own; it talks to these traits.
//! The in-memory reference implementations live in [`crate::memory`];
//! production deployments supply database-backed implementations with the
//! same semantics:
//!
//! - account rows carry a version compared at save time (optimistic
//!   concurrency), and a multi-account save commits atomically;
//! - the transaction log enforces idempotency-key uniqueness at the storage
//!   layer, so concurrent duplicate admissions serialize in the store, not
//!   in application memory.

use crate::account::Account;
use crate::base::{AccountId, AuthorizationId, TransactionId};
use crate::limit::GlobalConfig;
use crate::money::Money;
use crate::transaction::{
    AuthorizationStatus, TransactionLog, TransactionStatus, TransferAuthorization,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage-layer failures, mapped into the domain taxonomy by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The stored row changed since this instance was loaded
    #[error("version conflict: row was modified concurrently")]
    VersionConflict,

    /// Unique constraint violated (duplicate id or idempotency key)
    #[error("unique constraint violated")]
    DuplicateKey,

    /// The row to update does not exist
    #[error("row not found")]
    NotFound,
}

/// Which side of a transfer an account must be on to match a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    All,
    Sent,
    Received,
}

/// Filter for transaction-log queries. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account_id: Option<AccountId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<TransactionStatus>,
    pub direction: Direction,
}

impl TransactionFilter {
    pub fn matches(&self, log: &TransactionLog) -> bool {
        if let Some(account_id) = self.account_id {
            let on_matching_side = match self.direction {
                Direction::All => log.involves(account_id),
                Direction::Sent => log.source_account_id() == account_id,
                Direction::Received => log.destination_account_id() == account_id,
            };
            if !on_matching_side {
                return false;
            }
        }
        if let Some(from) = self.from {
            if log.created_on() < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if log.created_on() > to {
                return false;
            }
        }
        if let Some(status) = self.status {
            if log.status() != status {
                return false;
            }
        }
        true
    }
}

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest { page: 0, size: 20 }
    }
}

/// One page of query results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub size: usize,
}

/// Account persistence with optimistic concurrency control.
pub trait AccountStore: Send + Sync {
    /// Reserves a fresh unique account id.
    fn allocate_id(&self) -> AccountId;

    /// Inserts a new account row.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateKey`] if the id is already taken.
    fn insert(&self, account: Account) -> Result<(), StoreError>;

    /// Returns a detached copy of the account, or `None`.
    fn find_by_id(&self, id: AccountId) -> Option<Account>;

    /// Persists an updated account.
    ///
    /// # Errors
    ///
    /// [`StoreError::VersionConflict`] if the stored row changed since this
    /// instance was loaded; [`StoreError::NotFound`] if the row is missing.
    fn save(&self, account: &Account) -> Result<(), StoreError>;

    /// Persists several updated accounts atomically: either every row commits
    /// or none does.
    ///
    /// # Errors
    ///
    /// Same conditions as [`AccountStore::save`], checked across all rows
    /// before any row is written.
    fn save_all(&self, accounts: &[&Account]) -> Result<(), StoreError>;

    /// Detached copies of all accounts, ordered by id.
    fn list(&self) -> Vec<Account>;
}

/// Transaction-log persistence with a uniqueness constraint on the
/// idempotency key.
pub trait TransactionLogStore: Send + Sync {
    /// Inserts a new log row, admitting its idempotency key.
    ///
    /// At most one live (PENDING or SUCCESS) log may hold a key; a key whose
    /// current log is FAILED is released for re-admission. Concurrent inserts
    /// under one key serialize inside the store: exactly one wins.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateKey`] if the key is held by a live log.
    fn insert(&self, log: &TransactionLog) -> Result<(), StoreError>;

    /// Replaces the stored row for this log's id.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no row with this id exists.
    fn update(&self, log: &TransactionLog) -> Result<(), StoreError>;

    fn find_by_id(&self, id: TransactionId) -> Option<TransactionLog>;

    /// Returns the log currently holding the idempotency key.
    fn find_by_idempotency_key(&self, key: &str) -> Option<TransactionLog>;

    /// Filtered, paged query in insertion order.
    fn search(&self, filter: &TransactionFilter, page: PageRequest) -> Page<TransactionLog>;
}

/// Authorization-request persistence.
pub trait AuthorizationStore: Send + Sync {
    /// Creates and stores a PENDING authorization with a fresh id.
    fn create(
        &self,
        transaction_id: TransactionId,
        source_account_id: AccountId,
        destination_account_id: AccountId,
        amount: Money,
    ) -> TransferAuthorization;

    fn find_by_id(&self, id: AuthorizationId) -> Option<TransferAuthorization>;

    fn find_by_status(&self, status: AuthorizationStatus) -> Vec<TransferAuthorization>;

    /// Persists a decision.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the row is missing;
    /// [`StoreError::VersionConflict`] if the stored row already reached a
    /// terminal status (a concurrent decision won).
    fn save(&self, authorization: &TransferAuthorization) -> Result<(), StoreError>;
}

/// Singleton configuration persistence.
pub trait GlobalConfigStore: Send + Sync {
    fn find(&self) -> Option<GlobalConfig>;

    fn save(&self, config: GlobalConfig);
}
