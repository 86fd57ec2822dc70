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

//! Transaction log and authorization records.
//!
//! A [`TransactionLog`] is created PENDING at request admission, before any
//! account is touched, and transitions exactly once to SUCCESS or FAILED. A
//! transfer routed to the approval workflow keeps its log PENDING until an
//! admin decision finalizes it.
//!
//! A [`TransferAuthorization`] transitions only out of PENDING:
//! `PENDING -> APPROVED` or `PENDING -> REJECTED`, never back.

use crate::base::{AccountId, AuthorizationId, TransactionId};
use crate::error::TransferError;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failed)
    }
}

/// Durable record of one transfer attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionLog {
    id: TransactionId,
    idempotency_key: String,
    source_account_id: AccountId,
    destination_account_id: AccountId,
    amount: Money,
    status: TransactionStatus,
    failure_reason: Option<String>,
    created_on: DateTime<Utc>,
}

impl TransactionLog {
    /// Creates a PENDING record with a freshly generated attempt id.
    pub(crate) fn pending(
        source_account_id: AccountId,
        destination_account_id: AccountId,
        amount: Money,
        idempotency_key: &str,
    ) -> Self {
        TransactionLog {
            id: TransactionId::generate(),
            idempotency_key: idempotency_key.to_owned(),
            source_account_id,
            destination_account_id,
            amount,
            status: TransactionStatus::Pending,
            failure_reason: None,
            created_on: Utc::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn source_account_id(&self) -> AccountId {
        self.source_account_id
    }

    pub fn destination_account_id(&self) -> AccountId {
        self.destination_account_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    /// True if the account is the source or the destination of this transfer.
    pub fn involves(&self, account_id: AccountId) -> bool {
        self.source_account_id == account_id || self.destination_account_id == account_id
    }

    pub(crate) fn mark_success(&mut self) {
        debug_assert_eq!(self.status, TransactionStatus::Pending);
        self.status = TransactionStatus::Success;
        self.failure_reason = None;
    }

    pub(crate) fn mark_failed(&mut self, reason: impl Into<String>) {
        debug_assert_eq!(self.status, TransactionStatus::Pending);
        self.status = TransactionStatus::Failed;
        self.failure_reason = Some(reason.into());
    }

    /// Keeps the record PENDING while noting why it has not executed.
    pub(crate) fn mark_awaiting_approval(&mut self, reason: impl Into<String>) {
        debug_assert_eq!(self.status, TransactionStatus::Pending);
        self.failure_reason = Some(reason.into());
    }
}

/// Decision status of an authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthorizationStatus {
    Pending,
    Approved,
    Rejected,
}

impl AuthorizationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AuthorizationStatus::Approved | AuthorizationStatus::Rejected
        )
    }
}

/// A transfer held for administrative decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferAuthorization {
    id: AuthorizationId,
    transaction_id: TransactionId,
    source_account_id: AccountId,
    destination_account_id: AccountId,
    amount: Money,
    status: AuthorizationStatus,
    rejection_reason: Option<String>,
    requested_at: DateTime<Utc>,
}

impl TransferAuthorization {
    pub(crate) fn pending(
        id: AuthorizationId,
        transaction_id: TransactionId,
        source_account_id: AccountId,
        destination_account_id: AccountId,
        amount: Money,
    ) -> Self {
        TransferAuthorization {
            id,
            transaction_id,
            source_account_id,
            destination_account_id,
            amount,
            status: AuthorizationStatus::Pending,
            rejection_reason: None,
            requested_at: Utc::now(),
        }
    }

    pub fn id(&self) -> AuthorizationId {
        self.id
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub fn source_account_id(&self) -> AccountId {
        self.source_account_id
    }

    pub fn destination_account_id(&self) -> AccountId {
        self.destination_account_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn status(&self) -> AuthorizationStatus {
        self.status
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    /// # Errors
    ///
    /// Returns [`TransferError::InvalidState`] unless the status is PENDING.
    pub(crate) fn approve(&mut self) -> Result<(), TransferError> {
        if self.status != AuthorizationStatus::Pending {
            return Err(TransferError::InvalidState);
        }
        self.status = AuthorizationStatus::Approved;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`TransferError::InvalidState`] unless the status is PENDING.
    pub(crate) fn reject(&mut self, reason: &str) -> Result<(), TransferError> {
        if self.status != AuthorizationStatus::Pending {
            return Err(TransferError::InvalidState);
        }
        self.status = AuthorizationStatus::Rejected;
        self.rejection_reason = Some(reason.to_owned());
        Ok(())
    }
}
