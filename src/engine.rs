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

//! Transfer execution engine.
//!
//! The [`TransferEngine`] is the central component: it admits transfer
//! requests idempotently, validates the participating accounts, routes
//! over-limit amounts to the approval workflow, and executes the
//! debit-then-credit sequence with an auditable [`TransactionLog`] per
//! attempt.
//!
//! # Execution order
//!
//! 1. Input validation (ids present and distinct, amount positive, key
//!    present).
//! 2. Idempotency admission: a key held by a PENDING or SUCCESS log is
//!    rejected; a key whose attempt FAILED is released for retry.
//! 3. A PENDING log is persisted *before* any account is touched, so a crash
//!    mid-transfer leaves a discoverable record instead of silent loss. An
//!    insert race on the key is equivalent to step 2's rejection.
//! 4. Both accounts are loaded and validated (existence, ACTIVE status,
//!    distinct resolved identities, matching currency).
//! 5. If the amount exceeds the global limit, no balance changes: the log
//!    stays PENDING and a PENDING authorization is created.
//! 6. Debit source, then credit destination; both rows persist atomically.
//! 7. The log is marked SUCCESS.
//!
//! Any failure after step 3 durably marks the log FAILED with the failure
//! reason before the error propagates. A lost optimistic-concurrency race
//! surfaces as the retryable [`TransferError::OptimisticConflict`].

use crate::account::Account;
use crate::base::{AccountId, TransactionId};
use crate::error::TransferError;
use crate::limit::LimitPolicy;
use crate::money::{Currency, Money};
use crate::store::{
    AccountStore, AuthorizationStore, Page, PageRequest, StoreError, TransactionFilter,
    TransactionLogStore,
};
use crate::transaction::{TransactionLog, TransactionStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Failure-reason text recorded while a transfer waits for approval.
const AWAITING_APPROVAL_REASON: &str = "pending approval: amount exceeds global transfer limit";

/// A transfer order as submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    pub amount: Decimal,
    pub currency: Currency,
    pub idempotency_key: String,
}

impl TransferRequest {
    pub fn new(
        source_account_id: AccountId,
        destination_account_id: AccountId,
        amount: Decimal,
        currency: Currency,
        idempotency_key: impl Into<String>,
    ) -> Self {
        TransferRequest {
            source_account_id,
            destination_account_id,
            amount,
            currency,
            idempotency_key: idempotency_key.into(),
        }
    }

    fn validate(&self, amount: &Money) -> Result<(), TransferError> {
        if self.source_account_id == self.destination_account_id {
            return Err(TransferError::InvalidRequest(
                "source and destination accounts must be different".into(),
            ));
        }
        if !amount.is_positive() {
            return Err(TransferError::InvalidRequest(
                "amount must be positive".into(),
            ));
        }
        if self.idempotency_key.trim().is_empty() {
            return Err(TransferError::InvalidRequest(
                "idempotency key must be provided".into(),
            ));
        }
        Ok(())
    }
}

/// Orchestrates validation, idempotency, execution, and approval routing.
pub struct TransferEngine {
    accounts: Arc<dyn AccountStore>,
    logs: Arc<dyn TransactionLogStore>,
    authorizations: Arc<dyn AuthorizationStore>,
    limits: LimitPolicy,
}

impl TransferEngine {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        logs: Arc<dyn TransactionLogStore>,
        authorizations: Arc<dyn AuthorizationStore>,
        limits: LimitPolicy,
    ) -> Self {
        TransferEngine {
            accounts,
            logs,
            authorizations,
            limits,
        }
    }

    /// Executes a transfer request, returning the persisted transaction
    /// record.
    ///
    /// A result with [`TransactionStatus::Pending`] means the amount exceeded
    /// the global limit and an authorization request was created; no balance
    /// changed.
    ///
    /// # Errors
    ///
    /// | Error | Condition |
    /// |-------|-----------|
    /// | [`TransferError::InvalidRequest`] | Malformed input or currency mismatch |
    /// | [`TransferError::DuplicateTransfer`] | Idempotency key held by a live log |
    /// | [`TransferError::AccountNotFound`] | Either account is missing |
    /// | [`TransferError::AccountNotActive`] | Either account is LOCKED or CLOSED |
    /// | [`TransferError::InsufficientBalance`] | Source balance below the amount |
    /// | [`TransferError::OptimisticConflict`] | Lost a concurrent-update race (retryable) |
    pub fn transfer(&self, request: &TransferRequest) -> Result<TransactionLog, TransferError> {
        let amount = Money::of(request.amount, request.currency);
        request.validate(&amount)?;

        // Admission: one live attempt per idempotency key. The store's
        // uniqueness constraint (checked again at insert) closes the race
        // between two concurrent admissions.
        if let Some(existing) = self.logs.find_by_idempotency_key(&request.idempotency_key) {
            if existing.status() != TransactionStatus::Failed {
                return Err(TransferError::DuplicateTransfer);
            }
        }

        let mut log = TransactionLog::pending(
            request.source_account_id,
            request.destination_account_id,
            amount,
            &request.idempotency_key,
        );
        match self.logs.insert(&log) {
            Ok(()) => {}
            Err(StoreError::DuplicateKey) => return Err(TransferError::DuplicateTransfer),
            Err(other) => return Err(other.into()),
        }

        let (source, destination) =
            match self.load_participants(log.source_account_id(), log.destination_account_id(), &amount)
            {
                Ok(participants) => participants,
                Err(error) => return Err(self.fail(&mut log, error)),
            };

        if self.limits.requires_approval(&amount) {
            log.mark_awaiting_approval(AWAITING_APPROVAL_REASON);
            self.logs.update(&log)?;
            let authorization = self.authorizations.create(
                log.id(),
                source.id(),
                destination.id(),
                amount,
            );
            info!(
                transaction = %log.id(),
                authorization = %authorization.id(),
                amount = %amount,
                "transfer requires approval"
            );
            return Ok(log);
        }

        self.execute(&mut log, &source, &destination, &amount)
    }

    /// Re-enters the execution path for a transfer that was approved.
    ///
    /// Runs account validation and execution against the original PENDING
    /// log, skipping the limit gate (the decision already happened).
    pub(crate) fn execute_approved(
        &self,
        transaction_id: TransactionId,
    ) -> Result<TransactionLog, TransferError> {
        let mut log = self
            .logs
            .find_by_id(transaction_id)
            .ok_or_else(|| TransferError::Storage(format!("transaction {transaction_id} not found")))?;
        if log.status() != TransactionStatus::Pending {
            return Err(TransferError::InvalidState);
        }

        let amount = log.amount();
        let (source, destination) =
            match self.load_participants(log.source_account_id(), log.destination_account_id(), &amount)
            {
                Ok(participants) => participants,
                Err(error) => return Err(self.fail(&mut log, error)),
            };
        self.execute(&mut log, &source, &destination, &amount)
    }

    /// The transaction currently holding an idempotency key, if any.
    ///
    /// A rejected duplicate submission can retrieve the original result here.
    pub fn transaction_by_key(&self, idempotency_key: &str) -> Option<TransactionLog> {
        self.logs.find_by_idempotency_key(idempotency_key)
    }

    pub fn transaction(&self, id: TransactionId) -> Option<TransactionLog> {
        self.logs.find_by_id(id)
    }

    /// Paged transaction history for one account.
    pub fn account_transactions(
        &self,
        account_id: AccountId,
        filter: TransactionFilter,
        page: PageRequest,
    ) -> Page<TransactionLog> {
        let filter = TransactionFilter {
            account_id: Some(account_id),
            ..filter
        };
        self.logs.search(&filter, page)
    }

    /// Unscoped paged search across all transactions.
    pub fn search_transactions(
        &self,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> Page<TransactionLog> {
        self.logs.search(filter, page)
    }

    /// Step 4: load both accounts and re-verify against resolved identities.
    fn load_participants(
        &self,
        source_id: AccountId,
        destination_id: AccountId,
        amount: &Money,
    ) -> Result<(Account, Account), TransferError> {
        let source = self
            .accounts
            .find_by_id(source_id)
            .ok_or(TransferError::AccountNotFound(source_id))?;
        let destination = self
            .accounts
            .find_by_id(destination_id)
            .ok_or(TransferError::AccountNotFound(destination_id))?;

        if source.id() == destination.id() {
            return Err(TransferError::InvalidRequest(
                "source and destination accounts must be different".into(),
            ));
        }
        if !source.is_active() {
            return Err(TransferError::AccountNotActive(source.id()));
        }
        if !destination.is_active() {
            return Err(TransferError::AccountNotActive(destination.id()));
        }
        // Money arithmetic requires same-currency operands; guard it here so
        // a mismatch fails the transfer instead of the process.
        if source.currency() != amount.currency() || destination.currency() != amount.currency() {
            return Err(TransferError::InvalidRequest(format!(
                "currency mismatch: transfer is {}, accounts are {} and {}",
                amount.currency(),
                source.currency(),
                destination.currency()
            )));
        }
        Ok((source, destination))
    }

    /// Steps 6-7: debit before credit, persist both rows atomically, then
    /// finalize the log.
    fn execute(
        &self,
        log: &mut TransactionLog,
        source: &Account,
        destination: &Account,
        amount: &Money,
    ) -> Result<TransactionLog, TransferError> {
        if let Err(error) = source.debit(amount) {
            return Err(self.fail(log, error));
        }
        if let Err(error) = destination.credit(amount) {
            return Err(self.fail(log, error));
        }

        match self.accounts.save_all(&[source, destination]) {
            Ok(()) => {}
            Err(StoreError::VersionConflict) => {
                return Err(self.fail(log, TransferError::OptimisticConflict));
            }
            Err(other) => return Err(self.fail(log, other.into())),
        }

        log.mark_success();
        self.logs.update(log)?;
        info!(
            transaction = %log.id(),
            source = %source.id(),
            destination = %destination.id(),
            amount = %amount,
            "transfer completed"
        );
        Ok(log.clone())
    }

    /// Durably marks the log FAILED with the failure reason, then hands the
    /// error back for propagation.
    fn fail(&self, log: &mut TransactionLog, error: TransferError) -> TransferError {
        log.mark_failed(error.to_string());
        if let Err(store_error) = self.logs.update(log) {
            tracing::error!(
                transaction = %log.id(),
                %store_error,
                "could not persist FAILED transaction log"
            );
        }
        warn!(transaction = %log.id(), %error, "transfer failed");
        error
    }
}
