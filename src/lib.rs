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

//! # Transfer Ledger
//!
//! This library provides a money-transfer ledger engine: it manages bank
//! accounts, executes transfers between them with at-most-once semantics per
//! idempotency key, and routes over-limit amounts through an administrative
//! approval workflow.
//!
//! ## Core Components
//!
//! - [`TransferEngine`]: Central transfer processor with an auditable
//!   transaction log per attempt
//! - [`Account`]: Bank account with balance invariants and an
//!   optimistic-concurrency version
//! - [`Money`]: Fixed-scale decimal value with per-context rounding
//! - [`ApprovalService`]: Admin decisions over held transfers
//! - [`TransferError`]: Error taxonomy for transfer processing failures
//!
//! ## Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use transfer_ledger_rs::{Currency, InMemoryLedger, Money, TransferRequest};
//!
//! let ledger = InMemoryLedger::new();
//! let alice = ledger
//!     .admin
//!     .open_account("Alice", Money::of(dec!(500.00), Currency::USD))
//!     .unwrap();
//! let bob = ledger
//!     .admin
//!     .open_account("Bob", Money::of(dec!(200.00), Currency::USD))
//!     .unwrap();
//!
//! let log = ledger
//!     .engine
//!     .transfer(&TransferRequest::new(
//!         alice.id(),
//!         bob.id(),
//!         dec!(100.00),
//!         Currency::USD,
//!         "key-1",
//!     ))
//!     .unwrap();
//!
//! assert_eq!(
//!     ledger.admin.account(alice.id()).unwrap().balance(),
//!     Money::of(dec!(400.00), Currency::USD)
//! );
//! assert_eq!(
//!     ledger.admin.account(bob.id()).unwrap().balance(),
//!     Money::of(dec!(300.00), Currency::USD)
//! );
//! # let _ = log;
//! ```
//!
//! ## Concurrency
//!
//! Each transfer runs as an independent unit of work. There is no global
//! lock: balance mutations on one account instance serialize through a
//! per-account mutex, lost updates across detached instances are caught by a
//! version check at the storage layer, and idempotency-key uniqueness is a
//! storage constraint, so racing duplicate submissions admit exactly one.

pub mod account;
mod admin;
mod approval;
mod base;
mod engine;
pub mod error;
mod limit;
mod memory;
pub mod money;
mod store;
mod transaction;

pub use account::{Account, AccountStatus};
pub use admin::AccountAdmin;
pub use approval::ApprovalService;
pub use base::{AccountId, AuthorizationId, TransactionId};
pub use engine::{TransferEngine, TransferRequest};
pub use error::TransferError;
pub use limit::{GlobalConfig, LimitPolicy};
pub use memory::{
    InMemoryAccountStore, InMemoryAuthorizationStore, InMemoryGlobalConfigStore, InMemoryLedger,
    InMemoryTransactionLogStore,
};
pub use money::{Currency, Money, Rounding};
pub use store::{
    AccountStore, AuthorizationStore, Direction, GlobalConfigStore, Page, PageRequest, StoreError,
    TransactionFilter, TransactionLogStore,
};
pub use transaction::{
    AuthorizationStatus, TransactionLog, TransactionStatus, TransferAuthorization,
};
