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

use super::{matcher::IpRangeMatcher, registry::MatcherRegistry};
use crate::{error::RefreshError, feed::feed_base::RangeFeed};
use cloudblock_types::ranges::RangeDocument;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[derive(Debug)]
pub enum RefreshOutcome {
    /// A new matcher was published.
    Refreshed { ipv4_ranges: usize, ipv6_ranges: usize },
    /// Another refresh was already in flight, nothing was done.
    Skipped,
    /// The previous matcher (if any) was kept.
    Failed(RefreshError),
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed { .. })
    }
}

/// Runs the fetch -> build -> publish pipeline, at most one at a time.
pub struct RefreshCoordinator {
    feed: Arc<dyn RangeFeed>,
    registry: Arc<MatcherRegistry>,
    refreshing: AtomicBool,
}

/// Clears the in-flight flag when the refresh ends, including by panic.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RefreshCoordinator {
    pub fn new(feed: Arc<dyn RangeFeed>, registry: Arc<MatcherRegistry>) -> Self {
        Self {
            feed,
            registry,
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    fn try_acquire(&self) -> Option<RefreshGuard<'_>> {
        self.refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard(&self.refreshing))
    }

    pub async fn refresh_once(&self) -> RefreshOutcome {
        let Some(_guard) = self.try_acquire() else {
            tracing::debug!("Skipping cloud ranges refresh, another one is in progress.");
            return RefreshOutcome::Skipped;
        };

        tracing::info!("Updating cloud ranges blocker from {} ...", self.feed.source());
        match self.fetch_and_build().await {
            Ok((document, matcher)) => {
                let (ipv4_ranges, ipv6_ranges) = (matcher.ipv4_count(), matcher.ipv6_count());
                self.registry.set(matcher);
                tracing::info!(
                    ipv4_ranges,
                    ipv6_ranges,
                    sync_token = %document.sync_token,
                    create_date = %document.create_date,
                    "Loaded cloud IP ranges."
                );
                RefreshOutcome::Refreshed { ipv4_ranges, ipv6_ranges }
            }
            Err(e) => {
                tracing::error!(
                    stage = e.stage(),
                    source = self.feed.source(),
                    retained = self.registry.is_ready(),
                    "Failed to refresh cloud IP ranges: {}",
                    e
                );
                RefreshOutcome::Failed(e)
            }
        }
    }

    async fn fetch_and_build(&self) -> Result<(RangeDocument, IpRangeMatcher), RefreshError> {
        let document = self.feed.fetch().await?;
        let matcher = IpRangeMatcher::build(document.all_ranges())?;
        Ok((document, matcher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BuildError, FetchError};
    use crate::feed::mock::{MockRangeFeed, MockStep};
    use std::time::Duration;

    fn coordinator(feed: Arc<MockRangeFeed>) -> (RefreshCoordinator, Arc<MatcherRegistry>) {
        let registry = Arc::new(MatcherRegistry::new());
        (RefreshCoordinator::new(feed, registry.clone()), registry)
    }

    #[tokio::test]
    async fn test_refresh_publishes_matcher() {
        let feed = Arc::new(MockRangeFeed::new(vec![MockRangeFeed::document(
            &["10.0.0.0/8", "198.51.100.0/24"],
            &["2600:1f14::/35"],
        )]));
        let (coordinator, registry) = coordinator(feed.clone());

        let outcome = coordinator.refresh_once().await;
        assert!(matches!(outcome, RefreshOutcome::Refreshed { ipv4_ranges: 2, ipv6_ranges: 1 }));
        assert!(registry.matches("10.1.2.3"));
        assert!(registry.matches("2600:1f14::8"));
        assert!(!registry.matches("11.1.2.3"));
        assert!(!coordinator.is_refreshing());
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_matcher() {
        let feed = Arc::new(MockRangeFeed::new(vec![
            MockRangeFeed::document(&["10.0.0.0/8"], &[]),
            MockStep::NetworkError,
            MockStep::DecodeError,
        ]));
        let (coordinator, registry) = coordinator(feed.clone());

        assert!(coordinator.refresh_once().await.is_refreshed());
        let before = registry.current().unwrap();

        match coordinator.refresh_once().await {
            RefreshOutcome::Failed(RefreshError::Fetch(FetchError::Network { .. })) => {}
            other => panic!("expected network failure, got {:?}", other),
        }
        assert!(Arc::ptr_eq(&before, &registry.current().unwrap()));
        assert!(registry.matches("10.1.2.3"));

        match coordinator.refresh_once().await {
            RefreshOutcome::Failed(e @ RefreshError::Fetch(FetchError::Decode { .. })) => assert_eq!(e.stage(), "fetch"),
            other => panic!("expected decode failure, got {:?}", other),
        }
        assert!(registry.matches("10.1.2.3"));
        assert!(!registry.matches("11.1.2.3"));
        assert_eq!(feed.calls(), 3);
    }

    #[tokio::test]
    async fn test_invalid_range_aborts_whole_refresh() {
        let feed = Arc::new(MockRangeFeed::new(vec![
            MockRangeFeed::document(&["10.0.0.0/8"], &[]),
            MockRangeFeed::document(&["172.16.0.0/12", "not-a-cidr"], &[]),
        ]));
        let (coordinator, registry) = coordinator(feed);

        assert!(coordinator.refresh_once().await.is_refreshed());
        match coordinator.refresh_once().await {
            RefreshOutcome::Failed(e @ RefreshError::Build(BuildError::InvalidCidr { .. })) => {
                assert_eq!(e.stage(), "build")
            }
            other => panic!("expected build failure, got {:?}", other),
        }
        // Nothing from the rejected document leaked in.
        assert!(registry.matches("10.1.2.3"));
        assert!(!registry.matches("172.16.0.1"));
    }

    #[tokio::test]
    async fn test_failure_before_first_load_leaves_registry_empty() {
        let feed = Arc::new(MockRangeFeed::new(vec![MockStep::NetworkError]));
        let (coordinator, registry) = coordinator(feed);

        assert!(matches!(coordinator.refresh_once().await, RefreshOutcome::Failed(_)));
        assert!(!registry.is_ready());
        assert!(!registry.matches("10.1.2.3"));
        // The guard was released, a later call may retry.
        assert!(!coordinator.is_refreshing());
        assert!(matches!(coordinator.refresh_once().await, RefreshOutcome::Failed(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refreshes_run_once() {
        let feed = Arc::new(
            MockRangeFeed::new(vec![MockRangeFeed::document(&["10.0.0.0/8"], &[])])
                .with_delay(Duration::from_millis(300)),
        );
        let (coordinator, registry) = coordinator(feed.clone());
        let coordinator = Arc::new(coordinator);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.refresh_once().await })
            })
            .collect();

        let outcomes: Vec<RefreshOutcome> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(outcomes.iter().filter(|o| o.is_refreshed()).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| matches!(o, RefreshOutcome::Skipped)).count(), 7);
        assert_eq!(feed.calls(), 1);
        assert!(registry.matches("10.1.2.3"));

        // Once idle again, a new refresh goes through.
        assert!(coordinator.refresh_once().await.is_refreshed());
        assert_eq!(feed.calls(), 2);
    }
}
