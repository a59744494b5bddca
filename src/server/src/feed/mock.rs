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

use super::feed_base::RangeFeed;
use crate::error::FetchError;
use cloudblock_types::ranges::RangeDocument;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

pub const MOCK_FEED_URL: &str = "mock://ip-ranges.json";

#[derive(Clone)]
pub enum MockStep {
    Document(RangeDocument),
    NetworkError,
    DecodeError,
}

/// Scripted feed; replays its steps in order and repeats the last one.
pub struct MockRangeFeed {
    steps: Mutex<VecDeque<MockStep>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl MockRangeFeed {
    pub fn new(steps: Vec<MockStep>) -> Self {
        assert!(!steps.is_empty());
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn document(ipv4: &[&str], ipv6: &[&str]) -> MockStep {
        MockStep::Document(RangeDocument {
            sync_token: String::from("1718834593"),
            create_date: String::from("2024-06-19-22-03-13"),
            ipv4_ranges: ipv4.iter().map(|s| s.to_string()).collect(),
            ipv6_ranges: ipv6.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn next_step(&self) -> MockStep {
        let mut steps = self.steps.lock().unwrap();
        if steps.len() > 1 {
            steps.pop_front().unwrap()
        } else {
            steps.front().cloned().unwrap()
        }
    }
}

#[async_trait::async_trait]
impl RangeFeed for MockRangeFeed {
    fn source(&self) -> &str {
        MOCK_FEED_URL
    }

    async fn fetch(&self) -> Result<RangeDocument, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.next_step();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match step {
            MockStep::Document(doc) => Ok(doc),
            MockStep::NetworkError => Err(FetchError::Network {
                url: MOCK_FEED_URL.to_string(),
                // An unparsable url fails in the request builder, without touching the network.
                source: reqwest::Client::new().get("http://[::1").build().unwrap_err(),
            }),
            MockStep::DecodeError => Err(FetchError::Decode {
                url: MOCK_FEED_URL.to_string(),
                source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            }),
        }
    }
}
