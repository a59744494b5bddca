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

use super::{
    cache::LookupCache,
    refresher::{RefreshCoordinator, RefreshOutcome},
    registry::MatcherRegistry,
    scheduler::RefreshScheduler,
};
use crate::{
    config::config::{AppConfig, RefreshProperties},
    feed::{feed_base::RangeFeed, feed_http::HttpRangeFeed},
};
use cloudblock_utils::addrs;
use std::{net::IpAddr, sync::Arc};
use tokio::sync::Mutex;

/// Entry point for the host server.
///
/// Call [`initialize`](Self::initialize) once at startup, then
/// [`is_blocked`](Self::is_blocked) for every incoming request; a `true`
/// answer means the request should be rejected with 403. Every failure mode
/// (no ranges loaded yet, broken feed, unparsable address) answers `false`.
///
/// Dropping the blocker stops its refresh scheduler in the background; call
/// [`shutdown`](Self::shutdown) to wait for it instead.
pub struct RangeBlocker {
    registry: Arc<MatcherRegistry>,
    cache: LookupCache,
    coordinator: RefreshCoordinator,
    refresh_config: RefreshProperties,
    scheduler: Mutex<Option<RefreshScheduler>>,
}

impl RangeBlocker {
    pub const NAME: &'static str = "CLOUD_RANGES";

    /// Builds a blocker fetching from the configured http feed.
    pub fn new(config: &AppConfig) -> Result<Arc<RangeBlocker>, reqwest::Error> {
        let feed = HttpRangeFeed::new(&config.feed)?;
        Ok(Self::with_feed(config, feed))
    }

    pub fn with_feed(config: &AppConfig, feed: Arc<dyn RangeFeed>) -> Arc<RangeBlocker> {
        let registry = Arc::new(MatcherRegistry::new());
        Arc::new(RangeBlocker {
            coordinator: RefreshCoordinator::new(feed, registry.clone()),
            registry,
            cache: LookupCache::from_config(&config.cache),
            refresh_config: config.refresh.clone(),
            scheduler: Mutex::new(None),
        })
    }

    /// Loads the ranges once and, if enabled, starts the periodic refresh.
    ///
    /// Never fails: a broken feed is logged and the blocker keeps answering `false`.
    pub async fn initialize(self: &Arc<Self>) {
        tracing::info!("Initializing {} blocker ...", Self::NAME);
        self.refresh().await;

        if self.refresh_config.enabled {
            let mut scheduler = self.scheduler.lock().await;
            if scheduler.is_some() {
                tracing::debug!("Refresh scheduler already started.");
                return;
            }
            match RefreshScheduler::start(&self.refresh_config.cron, Arc::downgrade(self)).await {
                Ok(started) => *scheduler = Some(started),
                Err(e) => tracing::error!("Failed to start cloud ranges refresh scheduler: {}", e),
            }
        }
    }

    /// Re-runs the refresh pipeline. Cached decisions are dropped after a successful publish.
    pub async fn refresh(&self) -> RefreshOutcome {
        let outcome = self.coordinator.refresh_once().await;
        if outcome.is_refreshed() {
            self.cache.invalidate_all();
        }
        outcome
    }

    pub async fn is_blocked(&self, remote_addr: &str) -> bool {
        // Nothing loaded yet, answer without caching so the first load takes effect immediately.
        let Some(snapshot) = self.registry.snapshot() else {
            return false;
        };
        let Some(ip) = addrs::parse_remote_ip(remote_addr) else {
            tracing::debug!("Unparsable remote address '{}', not blocking.", remote_addr);
            return false;
        };

        // Keyed by generation, an answer computed against a replaced matcher is never served.
        let key = Self::cache_key(snapshot.generation, &ip);
        let blocked = self
            .cache
            .get_or_compute(&key, async move { snapshot.matcher.contains(&ip) })
            .await;
        if blocked {
            tracing::info!(ip = %ip, "Blocking cloud range IP address.");
        }
        blocked
    }

    /// The cached decision for an address under the active ranges, if one exists.
    pub async fn cached_decision(&self, remote_addr: &str) -> Option<bool> {
        let generation = self.registry.generation();
        let ip = addrs::parse_remote_ip(remote_addr)?;
        self.cache.get(&Self::cache_key(generation, &ip)).await
    }

    fn cache_key(generation: u64, ip: &IpAddr) -> String {
        format!("{}#{}", generation, ip)
    }

    pub fn registry(&self) -> &Arc<MatcherRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    pub async fn scheduler_cron(&self) -> Option<String> {
        self.scheduler.lock().await.as_ref().map(|s| s.cron().to_owned())
    }

    pub async fn shutdown(&self) {
        if let Some(scheduler) = self.scheduler.lock().await.take() {
            if let Err(e) = scheduler.shutdown().await {
                tracing::warn!("Failed to stop cloud ranges refresh scheduler: {}", e);
            }
        }
    }
}

impl Drop for RangeBlocker {
    fn drop(&mut self) {
        let Some(scheduler) = self.scheduler.get_mut().take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = scheduler.shutdown().await {
                        tracing::warn!("Failed to stop cloud ranges refresh scheduler: {}", e);
                    }
                });
            }
            Err(_) => tracing::warn!("No tokio runtime on drop, the refresh scheduler was not stopped."),
        }
    }
}
