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

//! Error types for transfer processing.

use crate::base::{AccountId, AuthorizationId};
use crate::money::Money;
use crate::store::StoreError;
use thiserror::Error;

/// Transfer processing errors.
///
/// [`TransferError::OptimisticConflict`] is the only retryable kind: the
/// caller should re-submit, and the idempotency key of a conflicted (FAILED)
/// attempt is released for re-admission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Malformed request (caller error, not retryable as-is)
    #[error("invalid transfer request: {0}")]
    InvalidRequest(String),

    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Referenced account does not exist
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    /// Account exists but is LOCKED or CLOSED
    #[error("account {0} is not ACTIVE")]
    AccountNotActive(AccountId),

    /// Debit would exceed the source balance
    #[error("insufficient balance in account {account}: requested {requested}, available {available}")]
    InsufficientBalance {
        account: AccountId,
        requested: Money,
        available: Money,
    },

    /// Idempotency key already used by a live (PENDING or SUCCESS) transfer
    #[error("duplicate transfer request (idempotency key already used)")]
    DuplicateTransfer,

    /// Lost an optimistic-concurrency race; safe to retry
    #[error("concurrent modification detected, please retry the transfer")]
    OptimisticConflict,

    /// Referenced authorization request does not exist
    #[error("authorization request {0} not found")]
    AuthorizationNotFound(AuthorizationId),

    /// Authorization is not in PENDING state
    #[error("authorization request is not in PENDING state")]
    InvalidState,

    /// Unexpected persistence failure
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<StoreError> for TransferError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::VersionConflict => TransferError::OptimisticConflict,
            StoreError::DuplicateKey => TransferError::DuplicateTransfer,
            StoreError::NotFound => TransferError::Storage("row not found".into()),
        }
    }
}
