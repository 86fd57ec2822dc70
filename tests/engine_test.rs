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

//! Transfer engine public API integration tests.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use transfer_ledger_rs::{
    Account, AccountId, AccountStatus, AccountStore, AuthorizationStatus, Currency,
    InMemoryAccountStore, InMemoryAuthorizationStore, InMemoryGlobalConfigStore, InMemoryLedger,
    InMemoryTransactionLogStore, LimitPolicy, Money, PageRequest, StoreError, TransactionFilter,
    TransactionStatus, TransferEngine, TransferError, TransferRequest,
};

fn usd(amount: Decimal) -> Money {
    Money::of(amount, Currency::USD)
}

fn ledger_with_accounts(balances: &[Decimal]) -> (InMemoryLedger, Vec<AccountId>) {
    let ledger = InMemoryLedger::new();
    let ids = balances
        .iter()
        .map(|balance| {
            ledger
                .admin
                .open_account("Holder", usd(*balance))
                .unwrap()
                .id()
        })
        .collect();
    (ledger, ids)
}

fn request(source: AccountId, destination: AccountId, amount: Decimal, key: &str) -> TransferRequest {
    TransferRequest::new(source, destination, amount, Currency::USD, key)
}

fn balance(ledger: &InMemoryLedger, id: AccountId) -> Money {
    ledger.admin.account(id).unwrap().balance()
}

#[test]
fn successful_transfer_moves_exact_amounts() {
    let (ledger, ids) = ledger_with_accounts(&[dec!(500.00), dec!(200.00)]);
    let (a, b) = (ids[0], ids[1]);

    let log = ledger.engine.transfer(&request(a, b, dec!(100.00), "key-1")).unwrap();

    assert_eq!(log.status(), TransactionStatus::Success);
    assert!(log.failure_reason().is_none());
    assert_eq!(balance(&ledger, a), usd(dec!(400.00)));
    assert_eq!(balance(&ledger, b), usd(dec!(300.00)));
}

#[test]
fn duplicate_idempotency_key_fails_second_call() {
    let (ledger, ids) = ledger_with_accounts(&[dec!(500.00), dec!(200.00)]);
    let (a, b) = (ids[0], ids[1]);

    ledger.engine.transfer(&request(a, b, dec!(100.00), "key-1")).unwrap();
    let result = ledger.engine.transfer(&request(a, b, dec!(100.00), "key-1"));

    assert_eq!(result, Err(TransferError::DuplicateTransfer));
    // Balances unchanged by the rejected second call.
    assert_eq!(balance(&ledger, a), usd(dec!(400.00)));
    assert_eq!(balance(&ledger, b), usd(dec!(300.00)));

    // The caller can retrieve the original result separately.
    let original = ledger.engine.transaction_by_key("key-1").unwrap();
    assert_eq!(original.status(), TransactionStatus::Success);
}

#[test]
fn insufficient_balance_fails_and_leaves_balances() {
    let (ledger, ids) = ledger_with_accounts(&[dec!(50.00), dec!(200.00)]);
    let (a, b) = (ids[0], ids[1]);

    let result = ledger.engine.transfer(&request(a, b, dec!(100.00), "key-2"));

    assert!(matches!(
        result,
        Err(TransferError::InsufficientBalance { .. })
    ));
    assert_eq!(balance(&ledger, a), usd(dec!(50.00)));
    assert_eq!(balance(&ledger, b), usd(dec!(200.00)));

    let log = ledger.engine.transaction_by_key("key-2").unwrap();
    assert_eq!(log.status(), TransactionStatus::Failed);
    assert!(log.failure_reason().unwrap().contains("insufficient balance"));
}

#[test]
fn transfer_from_locked_account_fails() {
    let (ledger, ids) = ledger_with_accounts(&[dec!(500.00), dec!(200.00)]);
    let (a, b) = (ids[0], ids[1]);
    ledger.admin.change_status(a, AccountStatus::Locked).unwrap();

    let result = ledger.engine.transfer(&request(a, b, dec!(100.00), "key-3"));

    assert_eq!(result, Err(TransferError::AccountNotActive(a)));
    assert_eq!(balance(&ledger, a), usd(dec!(500.00)));
    assert_eq!(balance(&ledger, b), usd(dec!(200.00)));
}

#[test]
fn transfer_to_closed_account_fails_without_debiting() {
    let (ledger, ids) = ledger_with_accounts(&[dec!(500.00), dec!(200.00)]);
    let (a, b) = (ids[0], ids[1]);
    ledger.admin.close_account(b).unwrap();

    let result = ledger.engine.transfer(&request(a, b, dec!(100.00), "key-4"));

    assert_eq!(result, Err(TransferError::AccountNotActive(b)));
    assert_eq!(balance(&ledger, a), usd(dec!(500.00)));

    let log = ledger.engine.transaction_by_key("key-4").unwrap();
    assert_eq!(log.status(), TransactionStatus::Failed);
}

#[test]
fn missing_account_fails_with_not_found() {
    let (ledger, ids) = ledger_with_accounts(&[dec!(500.00)]);
    let a = ids[0];
    let ghost = AccountId(99);

    let result = ledger.engine.transfer(&request(a, ghost, dec!(100.00), "key-5"));

    assert_eq!(result, Err(TransferError::AccountNotFound(ghost)));
    let log = ledger.engine.transaction_by_key("key-5").unwrap();
    assert_eq!(log.status(), TransactionStatus::Failed);
    assert!(log.failure_reason().unwrap().contains("not found"));
}

#[test]
fn same_account_is_rejected_before_any_log() {
    let (ledger, ids) = ledger_with_accounts(&[dec!(500.00)]);
    let a = ids[0];

    let result = ledger.engine.transfer(&request(a, a, dec!(100.00), "key-6"));

    assert!(matches!(result, Err(TransferError::InvalidRequest(_))));
    // Rejected at input validation: no record was admitted.
    assert!(ledger.engine.transaction_by_key("key-6").is_none());
}

#[test]
fn non_positive_amount_is_rejected() {
    let (ledger, ids) = ledger_with_accounts(&[dec!(500.00), dec!(200.00)]);
    let (a, b) = (ids[0], ids[1]);

    for amount in [dec!(0.00), dec!(-5.00)] {
        let result = ledger.engine.transfer(&request(a, b, amount, "key-7"));
        assert!(matches!(result, Err(TransferError::InvalidRequest(_))));
    }
    assert!(ledger.engine.transaction_by_key("key-7").is_none());
}

#[test]
fn blank_idempotency_key_is_rejected() {
    let (ledger, ids) = ledger_with_accounts(&[dec!(500.00), dec!(200.00)]);
    let result = ledger
        .engine
        .transfer(&request(ids[0], ids[1], dec!(100.00), "   "));
    assert!(matches!(result, Err(TransferError::InvalidRequest(_))));
}

#[test]
fn currency_mismatch_fails_the_attempt() {
    let (ledger, ids) = ledger_with_accounts(&[dec!(500.00), dec!(200.00)]);
    let (a, b) = (ids[0], ids[1]);

    let result = ledger.engine.transfer(&TransferRequest::new(
        a,
        b,
        dec!(100.00),
        Currency::EUR,
        "key-8",
    ));

    assert!(matches!(result, Err(TransferError::InvalidRequest(_))));
    let log = ledger.engine.transaction_by_key("key-8").unwrap();
    assert_eq!(log.status(), TransactionStatus::Failed);
    assert!(log.failure_reason().unwrap().contains("currency mismatch"));
}

#[test]
fn over_limit_transfer_parks_without_touching_balances() {
    let (ledger, ids) = ledger_with_accounts(&[dec!(5000.00), dec!(200.00)]);
    let (a, b) = (ids[0], ids[1]);
    ledger.limits.set_limit(Some(usd(dec!(1000.00)))).unwrap();

    let log = ledger.engine.transfer(&request(a, b, dec!(1500.00), "key-9")).unwrap();

    assert_eq!(log.status(), TransactionStatus::Pending);
    assert!(log.failure_reason().unwrap().contains("pending approval"));
    assert_eq!(balance(&ledger, a), usd(dec!(5000.00)));
    assert_eq!(balance(&ledger, b), usd(dec!(200.00)));

    let pending = ledger.approvals.pending_authorizations();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status(), AuthorizationStatus::Pending);
    assert_eq!(pending[0].transaction_id(), log.id());
    assert_eq!(pending[0].amount(), usd(dec!(1500.00)));
}

#[test]
fn amount_at_limit_executes_immediately() {
    let (ledger, ids) = ledger_with_accounts(&[dec!(5000.00), dec!(200.00)]);
    ledger.limits.set_limit(Some(usd(dec!(1000.00)))).unwrap();

    let log = ledger
        .engine
        .transfer(&request(ids[0], ids[1], dec!(1000.00), "key-10"))
        .unwrap();

    assert_eq!(log.status(), TransactionStatus::Success);
    assert!(ledger.approvals.pending_authorizations().is_empty());
}

#[test]
fn pending_key_stays_reserved() {
    let (ledger, ids) = ledger_with_accounts(&[dec!(5000.00), dec!(200.00)]);
    ledger.limits.set_limit(Some(usd(dec!(1000.00)))).unwrap();

    ledger
        .engine
        .transfer(&request(ids[0], ids[1], dec!(1500.00), "key-11"))
        .unwrap();

    // The parked transfer holds its key until finalized.
    let result = ledger
        .engine
        .transfer(&request(ids[0], ids[1], dec!(1500.00), "key-11"));
    assert_eq!(result, Err(TransferError::DuplicateTransfer));
}

#[test]
fn account_history_filters_by_status_and_direction() {
    let (ledger, ids) = ledger_with_accounts(&[dec!(500.00), dec!(200.00), dec!(300.00)]);
    let (a, b, c) = (ids[0], ids[1], ids[2]);

    ledger.engine.transfer(&request(a, b, dec!(10.00), "t-1")).unwrap();
    ledger.engine.transfer(&request(b, a, dec!(20.00), "t-2")).unwrap();
    ledger.engine.transfer(&request(c, b, dec!(30.00), "t-3")).unwrap();
    // One failed attempt from a.
    let _ = ledger.engine.transfer(&request(a, b, dec!(9999.00), "t-4"));

    let all = ledger
        .engine
        .account_transactions(a, TransactionFilter::default(), PageRequest::default());
    assert_eq!(all.total, 3);

    let sent = ledger.engine.account_transactions(
        a,
        TransactionFilter {
            direction: transfer_ledger_rs::Direction::Sent,
            ..TransactionFilter::default()
        },
        PageRequest::default(),
    );
    assert_eq!(sent.total, 2);

    let failed = ledger.engine.account_transactions(
        a,
        TransactionFilter {
            status: Some(TransactionStatus::Failed),
            ..TransactionFilter::default()
        },
        PageRequest::default(),
    );
    assert_eq!(failed.total, 1);
    assert_eq!(failed.items[0].idempotency_key(), "t-4");

    let paged = ledger.engine.account_transactions(
        a,
        TransactionFilter::default(),
        PageRequest { page: 1, size: 2 },
    );
    assert_eq!(paged.total, 3);
    assert_eq!(paged.items.len(), 1);
}

// =============================================================================
// Optimistic-conflict paths
// =============================================================================
//
// The in-memory account store serializes commits, so a conflict cannot be
// interleaved from outside a single-threaded test. Instead the store trait
// seam is used: a decorator forces the next multi-account commit to lose its
// version race, exactly as if another writer had slipped in between load and
// save.

struct ConflictOnce {
    inner: InMemoryAccountStore,
    armed: AtomicBool,
}

impl ConflictOnce {
    fn new() -> Self {
        ConflictOnce {
            inner: InMemoryAccountStore::new(),
            armed: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

impl AccountStore for ConflictOnce {
    fn allocate_id(&self) -> AccountId {
        self.inner.allocate_id()
    }

    fn insert(&self, account: Account) -> Result<(), StoreError> {
        self.inner.insert(account)
    }

    fn find_by_id(&self, id: AccountId) -> Option<Account> {
        self.inner.find_by_id(id)
    }

    fn save(&self, account: &Account) -> Result<(), StoreError> {
        self.inner.save(account)
    }

    fn save_all(&self, accounts: &[&Account]) -> Result<(), StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            return Err(StoreError::VersionConflict);
        }
        self.inner.save_all(accounts)
    }

    fn list(&self) -> Vec<Account> {
        self.inner.list()
    }
}

fn engine_over(accounts: Arc<ConflictOnce>) -> TransferEngine {
    let logs = Arc::new(InMemoryTransactionLogStore::new());
    let authorizations = Arc::new(InMemoryAuthorizationStore::new());
    let limits = LimitPolicy::new(Arc::new(InMemoryGlobalConfigStore::new()));
    TransferEngine::new(accounts, logs, authorizations, limits)
}

#[test]
fn version_conflict_fails_log_and_is_retryable_with_same_key() {
    let accounts = Arc::new(ConflictOnce::new());
    let a = accounts.allocate_id();
    let b = accounts.allocate_id();
    accounts
        .insert(Account::open(a, "Alice", usd(dec!(500.00))).unwrap())
        .unwrap();
    accounts
        .insert(Account::open(b, "Bob", usd(dec!(200.00))).unwrap())
        .unwrap();
    let engine = engine_over(Arc::clone(&accounts));

    accounts.arm();
    let result = engine.transfer(&request(a, b, dec!(100.00), "key-c"));
    assert_eq!(result, Err(TransferError::OptimisticConflict));

    // The losing writer left no balance change behind.
    assert_eq!(accounts.find_by_id(a).unwrap().balance(), usd(dec!(500.00)));
    assert_eq!(accounts.find_by_id(b).unwrap().balance(), usd(dec!(200.00)));

    let failed = engine.transaction_by_key("key-c").unwrap();
    assert_eq!(failed.status(), TransactionStatus::Failed);
    assert!(failed.failure_reason().unwrap().contains("concurrent modification"));

    // A FAILED attempt releases its key: the retry is admitted and succeeds.
    let retried = engine.transfer(&request(a, b, dec!(100.00), "key-c")).unwrap();
    assert_eq!(retried.status(), TransactionStatus::Success);
    assert_eq!(accounts.find_by_id(a).unwrap().balance(), usd(dec!(400.00)));
    assert_eq!(accounts.find_by_id(b).unwrap().balance(), usd(dec!(300.00)));

    // After the retry succeeded, the key is consumed for good.
    let third = engine.transfer(&request(a, b, dec!(100.00), "key-c"));
    assert_eq!(third, Err(TransferError::DuplicateTransfer));
}
