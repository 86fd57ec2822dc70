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

//! Administrative approval workflow for over-limit transfers.
//!
//! A transfer whose amount exceeds the global limit parks as a PENDING
//! transaction log plus a PENDING [`TransferAuthorization`]. An admin either
//! approves (the engine re-executes the original transfer) or rejects (the
//! original log is finalized FAILED with the rejection reason).
//!
//! The decision and the execution outcome are separate facts: once an
//! authorization is APPROVED it stays APPROVED even if the re-execution then
//! fails, and the failure is visible on the transaction log.

use crate::base::AuthorizationId;
use crate::engine::TransferEngine;
use crate::error::TransferError;
use crate::store::{AuthorizationStore, TransactionLogStore};
use crate::transaction::{AuthorizationStatus, TransactionLog, TransactionStatus, TransferAuthorization};
use std::sync::Arc;
use tracing::info;

/// Resolves pending transfer authorizations.
pub struct ApprovalService {
    authorizations: Arc<dyn AuthorizationStore>,
    logs: Arc<dyn TransactionLogStore>,
    engine: Arc<TransferEngine>,
}

impl ApprovalService {
    pub fn new(
        authorizations: Arc<dyn AuthorizationStore>,
        logs: Arc<dyn TransactionLogStore>,
        engine: Arc<TransferEngine>,
    ) -> Self {
        ApprovalService {
            authorizations,
            logs,
            engine,
        }
    }

    /// Approves a pending authorization and executes the held transfer.
    ///
    /// # Errors
    ///
    /// - [`TransferError::AuthorizationNotFound`] for an unknown id.
    /// - [`TransferError::InvalidState`] if the authorization was already
    ///   decided.
    /// - Any engine error from the re-execution (insufficient balance,
    ///   inactive account, version conflict); the authorization remains
    ///   APPROVED and the transaction log carries the failure.
    pub fn approve(&self, id: AuthorizationId) -> Result<TransactionLog, TransferError> {
        let mut authorization = self
            .authorizations
            .find_by_id(id)
            .ok_or(TransferError::AuthorizationNotFound(id))?;
        authorization.approve()?;
        self.authorizations.save(&authorization)?;
        info!(
            authorization = %id,
            transaction = %authorization.transaction_id(),
            "transfer authorization approved"
        );

        self.engine.execute_approved(authorization.transaction_id())
    }

    /// Rejects a pending authorization and finalizes the held transfer as
    /// FAILED.
    ///
    /// # Errors
    ///
    /// - [`TransferError::AuthorizationNotFound`] for an unknown id.
    /// - [`TransferError::InvalidState`] if the authorization was already
    ///   decided.
    pub fn reject(&self, id: AuthorizationId, reason: &str) -> Result<(), TransferError> {
        let mut authorization = self
            .authorizations
            .find_by_id(id)
            .ok_or(TransferError::AuthorizationNotFound(id))?;
        authorization.reject(reason)?;
        self.authorizations.save(&authorization)?;

        // Close out the parked log so no record is left PENDING forever.
        if let Some(mut log) = self.logs.find_by_id(authorization.transaction_id()) {
            if log.status() == TransactionStatus::Pending {
                log.mark_failed(format!("transfer rejected: {reason}"));
                self.logs.update(&log)?;
            }
        }
        info!(authorization = %id, reason, "transfer authorization rejected");
        Ok(())
    }

    /// Authorizations still awaiting a decision, oldest first.
    pub fn pending_authorizations(&self) -> Vec<TransferAuthorization> {
        self.authorizations
            .find_by_status(AuthorizationStatus::Pending)
    }
}
