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

use super::blocker::RangeBlocker;
use crate::config::config::DEFAULT_REFRESH_CRON;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Periodically re-runs the blocker refresh on a cron schedule.
pub struct RefreshScheduler {
    scheduler: JobScheduler,
    cron: String,
    stopped: Arc<AtomicBool>,
}

impl RefreshScheduler {
    pub async fn start(cron: &str, blocker: Weak<RangeBlocker>) -> Result<Self, JobSchedulerError> {
        // Pre-check the cron expression is valid.
        let cron = match Job::new_async(cron, |_uuid, _lock| Box::pin(async {})) {
            Ok(_) => cron,
            Err(e) => {
                tracing::warn!(
                    "Invalid refresh cron expression '{}': {}. Using default '{}'",
                    cron,
                    e,
                    DEFAULT_REFRESH_CRON
                );
                DEFAULT_REFRESH_CRON
            }
        };

        let job = Job::new_async(cron, move |_uuid, _lock| {
            let blocker = blocker.clone();
            Box::pin(async move {
                // The blocker owns the scheduler, so it is only gone during teardown.
                match blocker.upgrade() {
                    Some(blocker) => {
                        blocker.refresh().await;
                    }
                    None => tracing::debug!("Range blocker dropped, skipping scheduled refresh."),
                }
            })
        })?;

        let stopped = Arc::new(AtomicBool::new(false));
        let stopped_flag = stopped.clone();
        let mut scheduler = JobScheduler::new().await?;
        scheduler.set_shutdown_handler(Box::new(move || {
            let stopped = stopped_flag.clone();
            Box::pin(async move {
                stopped.store(true, Ordering::Release);
                tracing::info!("Stopped cloud ranges refresh scheduler.");
            })
        }));
        scheduler.add(job).await?;
        scheduler.start().await?;

        tracing::info!("Started cloud ranges refresh scheduler with cron '{}'", cron);
        Ok(Self {
            scheduler,
            cron: cron.to_owned(),
            stopped,
        })
    }

    pub fn cron(&self) -> &str {
        &self.cron
    }

    /// Flag raised once the scheduler has fully stopped.
    pub fn stopped(&self) -> Arc<AtomicBool> {
        self.stopped.clone()
    }

    pub async fn shutdown(mut self) -> Result<(), JobSchedulerError> {
        tracing::info!("Stopping cloud ranges refresh scheduler.");
        self.scheduler.shutdown().await
    }
}
