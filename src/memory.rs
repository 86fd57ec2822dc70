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

//! In-memory reference implementations of the storage contracts, plus a
//! fully wired [`InMemoryLedger`] used by the CLI, tests, and benches.
//!
//! These stores reproduce the semantics a database would provide: the account
//! store detects lost updates by comparing row versions inside a single write
//! section (so a multi-account commit is atomic), and the transaction-log
//! store enforces idempotency-key uniqueness with an atomic check-and-insert,
//! so exactly one of two racing admissions wins.

use crate::account::Account;
use crate::admin::AccountAdmin;
use crate::approval::ApprovalService;
use crate::base::{AccountId, AuthorizationId, TransactionId};
use crate::engine::TransferEngine;
use crate::limit::{GlobalConfig, LimitPolicy};
use crate::money::Money;
use crate::store::{
    AccountStore, AuthorizationStore, GlobalConfigStore, Page, PageRequest, StoreError,
    TransactionFilter, TransactionLogStore,
};
use crate::transaction::{
    AuthorizationStatus, TransactionLog, TransactionStatus, TransferAuthorization,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Account rows behind a single lock so multi-row commits are atomic.
///
/// The write section is short (version compare plus clone), standing in for
/// the row locks a database would take during a transaction commit.
pub struct InMemoryAccountStore {
    rows: RwLock<BTreeMap<AccountId, Account>>,
    next_id: AtomicU64,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        InMemoryAccountStore {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Checks one row against the locked map without writing anything.
    fn check_conflict(
        rows: &BTreeMap<AccountId, Account>,
        account: &Account,
    ) -> Result<(), StoreError> {
        let stored = rows.get(&account.id()).ok_or(StoreError::NotFound)?;
        if stored.version() != account.persisted_version() {
            return Err(StoreError::VersionConflict);
        }
        Ok(())
    }

    fn commit(rows: &mut BTreeMap<AccountId, Account>, account: &Account) {
        let row = account.clone();
        row.mark_persisted();
        rows.insert(row.id(), row);
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn allocate_id(&self) -> AccountId {
        AccountId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert(&self, account: Account) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&account.id()) {
            return Err(StoreError::DuplicateKey);
        }
        InMemoryAccountStore::commit(&mut rows, &account);
        Ok(())
    }

    fn find_by_id(&self, id: AccountId) -> Option<Account> {
        self.rows.read().get(&id).cloned()
    }

    fn save(&self, account: &Account) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        InMemoryAccountStore::check_conflict(&rows, account)?;
        InMemoryAccountStore::commit(&mut rows, account);
        Ok(())
    }

    fn save_all(&self, accounts: &[&Account]) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        for account in accounts {
            InMemoryAccountStore::check_conflict(&rows, account)?;
        }
        for account in accounts {
            InMemoryAccountStore::commit(&mut rows, account);
        }
        Ok(())
    }

    fn list(&self) -> Vec<Account> {
        self.rows.read().values().cloned().collect()
    }
}

/// Transaction log with an idempotency-key index.
///
/// The key index uses the entry API for an atomic check-and-insert, so two
/// concurrent admissions of the same key are serialized by the map itself.
/// FAILED attempts stay in the log history but release their key.
pub struct InMemoryTransactionLogStore {
    by_id: DashMap<TransactionId, TransactionLog>,
    by_key: DashMap<String, TransactionId>,
    /// Insertion-order index backing `search`.
    order: RwLock<Vec<TransactionId>>,
}

impl InMemoryTransactionLogStore {
    pub fn new() -> Self {
        InMemoryTransactionLogStore {
            by_id: DashMap::new(),
            by_key: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryTransactionLogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionLogStore for InMemoryTransactionLogStore {
    fn insert(&self, log: &TransactionLog) -> Result<(), StoreError> {
        match self.by_key.entry(log.idempotency_key().to_owned()) {
            Entry::Occupied(mut entry) => {
                let holder_failed = self
                    .by_id
                    .get(entry.get())
                    .is_some_and(|held| held.status() == TransactionStatus::Failed);
                if !holder_failed {
                    return Err(StoreError::DuplicateKey);
                }
                entry.insert(log.id());
            }
            Entry::Vacant(entry) => {
                entry.insert(log.id());
            }
        }
        self.by_id.insert(log.id(), log.clone());
        self.order.write().push(log.id());
        Ok(())
    }

    fn update(&self, log: &TransactionLog) -> Result<(), StoreError> {
        match self.by_id.get_mut(&log.id()) {
            Some(mut stored) => {
                *stored = log.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    fn find_by_id(&self, id: TransactionId) -> Option<TransactionLog> {
        self.by_id.get(&id).map(|log| log.value().clone())
    }

    fn find_by_idempotency_key(&self, key: &str) -> Option<TransactionLog> {
        let id = self.by_key.get(key).map(|id| *id)?;
        self.find_by_id(id)
    }

    fn search(&self, filter: &TransactionFilter, page: PageRequest) -> Page<TransactionLog> {
        let order = self.order.read();
        let matching: Vec<TransactionLog> = order
            .iter()
            .filter_map(|id| self.by_id.get(id).map(|log| log.value().clone()))
            .filter(|log| filter.matches(log))
            .collect();
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(page.page.saturating_mul(page.size))
            .take(page.size)
            .collect();
        Page {
            items,
            total,
            page: page.page,
            size: page.size,
        }
    }
}

/// Authorization rows; terminal rows are immutable.
pub struct InMemoryAuthorizationStore {
    rows: DashMap<AuthorizationId, TransferAuthorization>,
    next_id: AtomicU64,
}

impl InMemoryAuthorizationStore {
    pub fn new() -> Self {
        InMemoryAuthorizationStore {
            rows: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for InMemoryAuthorizationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationStore for InMemoryAuthorizationStore {
    fn create(
        &self,
        transaction_id: TransactionId,
        source_account_id: AccountId,
        destination_account_id: AccountId,
        amount: Money,
    ) -> TransferAuthorization {
        let id = AuthorizationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let authorization = TransferAuthorization::pending(
            id,
            transaction_id,
            source_account_id,
            destination_account_id,
            amount,
        );
        self.rows.insert(id, authorization.clone());
        authorization
    }

    fn find_by_id(&self, id: AuthorizationId) -> Option<TransferAuthorization> {
        self.rows.get(&id).map(|authorization| authorization.value().clone())
    }

    fn find_by_status(&self, status: AuthorizationStatus) -> Vec<TransferAuthorization> {
        let mut matching: Vec<TransferAuthorization> = self
            .rows
            .iter()
            .filter(|entry| entry.value().status() == status)
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by_key(|authorization| authorization.id());
        matching
    }

    fn save(&self, authorization: &TransferAuthorization) -> Result<(), StoreError> {
        match self.rows.get_mut(&authorization.id()) {
            Some(mut stored) => {
                // A terminal row never changes again; the loser of a racing
                // double-decision gets a conflict instead of overwriting.
                if stored.status().is_terminal() {
                    return Err(StoreError::VersionConflict);
                }
                *stored = authorization.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }
}

/// Singleton configuration row, keyed like its database counterpart.
pub struct InMemoryGlobalConfigStore {
    rows: DashMap<String, GlobalConfig>,
}

impl InMemoryGlobalConfigStore {
    pub fn new() -> Self {
        InMemoryGlobalConfigStore {
            rows: DashMap::new(),
        }
    }
}

impl Default for InMemoryGlobalConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalConfigStore for InMemoryGlobalConfigStore {
    fn find(&self) -> Option<GlobalConfig> {
        self.rows
            .get(GlobalConfig::DEFAULT_ID)
            .map(|config| config.value().clone())
    }

    fn save(&self, config: GlobalConfig) {
        self.rows.insert(config.id().to_owned(), config);
    }
}

/// Fully wired in-memory ledger: stores, engine, admin operations, approval
/// workflow, and limit policy sharing the same state.
pub struct InMemoryLedger {
    pub engine: Arc<TransferEngine>,
    pub admin: AccountAdmin,
    pub approvals: ApprovalService,
    pub limits: LimitPolicy,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        let accounts: Arc<dyn AccountStore> = Arc::new(InMemoryAccountStore::new());
        let logs: Arc<dyn TransactionLogStore> = Arc::new(InMemoryTransactionLogStore::new());
        let authorizations: Arc<dyn AuthorizationStore> =
            Arc::new(InMemoryAuthorizationStore::new());
        let config: Arc<dyn GlobalConfigStore> = Arc::new(InMemoryGlobalConfigStore::new());

        let limits = LimitPolicy::new(config);
        let engine = Arc::new(TransferEngine::new(
            Arc::clone(&accounts),
            Arc::clone(&logs),
            Arc::clone(&authorizations),
            limits.clone(),
        ));
        let admin = AccountAdmin::new(accounts);
        let approvals = ApprovalService::new(authorizations, logs, Arc::clone(&engine));

        InMemoryLedger {
            engine,
            admin,
            approvals,
            limits,
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use rust_decimal_macros::dec;
    use std::thread;

    fn usd(amount: rust_decimal::Decimal) -> Money {
        Money::of(amount, Currency::USD)
    }

    fn stored_account(store: &InMemoryAccountStore, balance: rust_decimal::Decimal) -> AccountId {
        let id = store.allocate_id();
        let account = Account::open(id, "Holder", usd(balance)).unwrap();
        store.insert(account).unwrap();
        id
    }

    fn pending_log(key: &str) -> TransactionLog {
        TransactionLog::pending(AccountId(1), AccountId(2), usd(dec!(10.00)), key)
    }

    // === Account store ===

    #[test]
    fn allocate_id_is_unique_and_sequential() {
        let store = InMemoryAccountStore::new();
        assert_eq!(store.allocate_id(), AccountId(1));
        assert_eq!(store.allocate_id(), AccountId(2));
    }

    #[test]
    fn save_detects_lost_update() {
        let store = InMemoryAccountStore::new();
        let id = stored_account(&store, dec!(100.00));

        let first = store.find_by_id(id).unwrap();
        let second = store.find_by_id(id).unwrap();

        first.credit(&usd(dec!(10.00))).unwrap();
        store.save(&first).unwrap();

        second.credit(&usd(dec!(20.00))).unwrap();
        assert_eq!(store.save(&second), Err(StoreError::VersionConflict));

        // The winner's state is what persisted.
        assert_eq!(store.find_by_id(id).unwrap().balance(), usd(dec!(110.00)));
    }

    #[test]
    fn saved_account_can_be_loaded_and_saved_again() {
        let store = InMemoryAccountStore::new();
        let id = stored_account(&store, dec!(100.00));

        let account = store.find_by_id(id).unwrap();
        account.credit(&usd(dec!(10.00))).unwrap();
        store.save(&account).unwrap();

        let reloaded = store.find_by_id(id).unwrap();
        reloaded.credit(&usd(dec!(5.00))).unwrap();
        store.save(&reloaded).unwrap();
        assert_eq!(store.find_by_id(id).unwrap().balance(), usd(dec!(115.00)));
    }

    #[test]
    fn save_all_commits_nothing_on_conflict() {
        let store = InMemoryAccountStore::new();
        let a = stored_account(&store, dec!(100.00));
        let b = stored_account(&store, dec!(100.00));

        let fresh_a = store.find_by_id(a).unwrap();
        let stale_b = store.find_by_id(b).unwrap();

        // Another writer advances b.
        let winner = store.find_by_id(b).unwrap();
        winner.credit(&usd(dec!(1.00))).unwrap();
        store.save(&winner).unwrap();

        fresh_a.debit(&usd(dec!(50.00))).unwrap();
        stale_b.credit(&usd(dec!(50.00))).unwrap();
        assert_eq!(
            store.save_all(&[&fresh_a, &stale_b]),
            Err(StoreError::VersionConflict)
        );

        // Neither row changed: a is untouched, b still shows the winner.
        assert_eq!(store.find_by_id(a).unwrap().balance(), usd(dec!(100.00)));
        assert_eq!(store.find_by_id(b).unwrap().balance(), usd(dec!(101.00)));
    }

    #[test]
    fn list_is_ordered_by_id() {
        let store = InMemoryAccountStore::new();
        stored_account(&store, dec!(1.00));
        stored_account(&store, dec!(2.00));
        let ids: Vec<AccountId> = store.list().iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec![AccountId(1), AccountId(2)]);
    }

    // === Transaction log store ===

    #[test]
    fn duplicate_key_is_rejected_while_log_is_live() {
        let store = InMemoryTransactionLogStore::new();
        store.insert(&pending_log("key-1")).unwrap();
        assert_eq!(
            store.insert(&pending_log("key-1")),
            Err(StoreError::DuplicateKey)
        );

        // SUCCESS keeps holding the key.
        let mut held = store.find_by_idempotency_key("key-1").unwrap();
        held.mark_success();
        store.update(&held).unwrap();
        assert_eq!(
            store.insert(&pending_log("key-1")),
            Err(StoreError::DuplicateKey)
        );
    }

    #[test]
    fn failed_attempt_releases_its_key() {
        let store = InMemoryTransactionLogStore::new();
        let first = pending_log("key-1");
        store.insert(&first).unwrap();

        let mut failed = first.clone();
        failed.mark_failed("concurrent modification");
        store.update(&failed).unwrap();

        let retry = pending_log("key-1");
        store.insert(&retry).unwrap();
        assert_eq!(
            store.find_by_idempotency_key("key-1").unwrap().id(),
            retry.id()
        );
        // The failed attempt stays in history.
        assert_eq!(store.find_by_id(first.id()).unwrap().id(), first.id());
    }

    #[test]
    fn concurrent_inserts_admit_exactly_one() {
        let store = Arc::new(InMemoryTransactionLogStore::new());
        let admitted: Vec<bool> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = Arc::clone(&store);
                    scope.spawn(move || store.insert(&pending_log("key-race")).is_ok())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(admitted.iter().filter(|ok| **ok).count(), 1);
    }

    #[test]
    fn search_filters_and_pages_in_insertion_order() {
        let store = InMemoryTransactionLogStore::new();
        for i in 0..5 {
            let log = TransactionLog::pending(
                AccountId(1),
                AccountId(2),
                usd(dec!(10.00)),
                &format!("key-{i}"),
            );
            store.insert(&log).unwrap();
        }
        let log = TransactionLog::pending(AccountId(3), AccountId(1), usd(dec!(10.00)), "key-in");
        store.insert(&log).unwrap();

        let sent = store.search(
            &TransactionFilter {
                account_id: Some(AccountId(1)),
                direction: crate::store::Direction::Sent,
                ..TransactionFilter::default()
            },
            PageRequest { page: 0, size: 3 },
        );
        assert_eq!(sent.total, 5);
        assert_eq!(sent.items.len(), 3);

        let received = store.search(
            &TransactionFilter {
                account_id: Some(AccountId(1)),
                direction: crate::store::Direction::Received,
                ..TransactionFilter::default()
            },
            PageRequest::default(),
        );
        assert_eq!(received.total, 1);
    }

    // === Authorization store ===

    #[test]
    fn terminal_authorizations_reject_further_saves() {
        let store = InMemoryAuthorizationStore::new();
        let created = store.create(
            TransactionId::generate(),
            AccountId(1),
            AccountId(2),
            usd(dec!(5000.00)),
        );

        let mut first = store.find_by_id(created.id()).unwrap();
        let mut second = store.find_by_id(created.id()).unwrap();

        first.approve().unwrap();
        store.save(&first).unwrap();

        second.reject("too large").unwrap();
        assert_eq!(store.save(&second), Err(StoreError::VersionConflict));
        assert_eq!(
            store.find_by_id(created.id()).unwrap().status(),
            AuthorizationStatus::Approved
        );
    }

    #[test]
    fn find_by_status_returns_pending_in_id_order() {
        let store = InMemoryAuthorizationStore::new();
        for _ in 0..3 {
            store.create(
                TransactionId::generate(),
                AccountId(1),
                AccountId(2),
                usd(dec!(5000.00)),
            );
        }
        let pending = store.find_by_status(AuthorizationStatus::Pending);
        assert_eq!(pending.len(), 3);
        assert!(pending.windows(2).all(|w| w[0].id() < w[1].id()));
        assert!(store.find_by_status(AuthorizationStatus::Approved).is_empty());
    }

    // === Config store ===

    #[test]
    fn config_round_trips_through_the_default_row() {
        let store = InMemoryGlobalConfigStore::new();
        assert!(store.find().is_none());
        store.save(GlobalConfig::new(Some(usd(dec!(1000.00)))));
        assert_eq!(
            store.find().unwrap().global_transfer_limit(),
            Some(usd(dec!(1000.00)))
        );
        store.save(GlobalConfig::new(None));
        assert_eq!(store.find().unwrap().global_transfer_limit(), None);
    }
}
