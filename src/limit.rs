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

//! Global transfer limit policy.
//!
//! A single configuration row holds the current limit. When a limit is set,
//! any transfer strictly above it is routed to the approval workflow instead
//! of executing; with no limit, every transfer executes immediately.

use crate::error::TransferError;
use crate::money::Money;
use crate::store::GlobalConfigStore;
use serde::Serialize;
use std::sync::Arc;

/// Singleton configuration record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalConfig {
    id: String,
    global_transfer_limit: Option<Money>,
}

impl GlobalConfig {
    /// Id of the one configuration row.
    pub const DEFAULT_ID: &'static str = "DEFAULT";

    pub fn new(global_transfer_limit: Option<Money>) -> Self {
        GlobalConfig {
            id: GlobalConfig::DEFAULT_ID.to_owned(),
            global_transfer_limit,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn global_transfer_limit(&self) -> Option<Money> {
        self.global_transfer_limit
    }
}

/// Decides whether a transfer amount requires administrative approval.
#[derive(Clone)]
pub struct LimitPolicy {
    config: Arc<dyn GlobalConfigStore>,
}

impl LimitPolicy {
    pub fn new(config: Arc<dyn GlobalConfigStore>) -> Self {
        LimitPolicy { config }
    }

    /// The currently configured limit, if any.
    pub fn limit(&self) -> Option<Money> {
        self.config.find().and_then(|c| c.global_transfer_limit())
    }

    /// Replaces the limit; `None` disables approval routing entirely.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidRequest`] for a negative limit.
    pub fn set_limit(&self, limit: Option<Money>) -> Result<(), TransferError> {
        if limit.is_some_and(|l| l.is_negative()) {
            return Err(TransferError::InvalidRequest(
                "global transfer limit must not be negative".into(),
            ));
        }
        self.config.save(GlobalConfig::new(limit));
        Ok(())
    }

    /// True when a limit is set and `amount` strictly exceeds it.
    ///
    /// The threshold is currency-agnostic: only the decimal magnitude is
    /// compared.
    pub fn requires_approval(&self, amount: &Money) -> bool {
        match self.limit() {
            Some(limit) => amount.amount() > limit.amount(),
            None => false,
        }
    }
}
