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

use super::matcher::IpRangeMatcher;
use arc_swap::ArcSwapOption;
use cloudblock_utils::addrs;
use std::{
    net::IpAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// A published matcher with its publish sequence number.
#[derive(Debug)]
pub struct Snapshot {
    /// Starts at 1 and grows by one on every publish.
    pub generation: u64,
    pub matcher: Arc<IpRangeMatcher>,
}

/// Holds the currently published matcher.
///
/// Readers never lock: a lookup loads the current `Arc` and queries it, while a
/// refresh builds a complete new matcher aside and publishes it with one swap.
/// Before the first successful publish every lookup answers `false`.
#[derive(Default)]
pub struct MatcherRegistry {
    active: ArcSwapOption<Snapshot>,
    generation: AtomicU64,
}

impl MatcherRegistry {
    pub fn new() -> Self {
        Self {
            active: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
        }
    }

    /// Replaces the active matcher wholesale.
    pub fn set(&self, matcher: IpRangeMatcher) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.active.store(Some(Arc::new(Snapshot {
            generation,
            matcher: Arc::new(matcher),
        })));
    }

    /// The active matcher together with its generation, read as one unit.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.active.load_full()
    }

    pub fn current(&self) -> Option<Arc<IpRangeMatcher>> {
        (*self.active.load()).as_ref().map(|snapshot| snapshot.matcher.clone())
    }

    /// Generation of the active matcher, `0` while nothing was published.
    pub fn generation(&self) -> u64 {
        (*self.active.load()).as_ref().map_or(0, |snapshot| snapshot.generation)
    }

    pub fn is_ready(&self) -> bool {
        self.active.load().is_some()
    }

    pub fn matches(&self, addr: &str) -> bool {
        match addrs::parse_remote_ip(addr) {
            Some(ip) => self.matches_ip(&ip),
            None => false,
        }
    }

    pub fn matches_ip(&self, ip: &IpAddr) -> bool {
        match &*self.active.load() {
            Some(snapshot) => snapshot.matcher.contains(ip),
            None => false,
        }
    }
}
