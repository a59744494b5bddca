// SPDX-License-Identifier: GNU GENERAL PUBLIC LICENSE Version 3
//
// Copyleft (c) 2024 James Wong. This file is part of James Wong.
// is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the
// Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// James Wong is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with James Wong.  If not, see <https://www.gnu.org/licenses/>.
//
// IMPORTANT: Any software that fully or partially contains or uses materials
// covered by this license must also be released under the GNU GPL license.
// This includes modifications and derived works.

use crate::config::config::CacheProperties;
use moka::future::Cache;
use std::{future::Future, time::Duration};

/// Bounded, time-limited cache of lookup decisions keyed by normalized address.
///
/// Concurrent misses on the same key are coalesced: only one `compute` future
/// is driven and every waiter receives its result. Misses on distinct keys do
/// not wait on each other.
#[derive(Clone)]
pub struct LookupCache {
    inner: Cache<String, bool>,
}

impl LookupCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        tracing::debug!("Creating lookup cache with max-capacity: {}, ttl: {:?}", max_capacity, ttl);
        Self {
            inner: Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build(),
        }
    }

    pub fn from_config(config: &CacheProperties) -> Self {
        Self::new(config.max_capacity, config.ttl)
    }

    pub async fn get_or_compute<F>(&self, key: &str, compute: F) -> bool
    where
        F: Future<Output = bool>,
    {
        self.inner.get_with_by_ref(key, compute).await
    }

    pub async fn get(&self, key: &str) -> Option<bool> {
        self.inner.get(key).await
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Approximate number of live entries, pending maintenance is not flushed.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }
}
