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
use crate::{config::config::FeedProperties, error::FetchError};
use cloudblock_types::ranges::RangeDocument;
use cloudblock_utils::httpclients;
use std::sync::Arc;

pub struct HttpRangeFeed {
    url: String,
    client: reqwest::Client,
}

impl HttpRangeFeed {
    pub fn new(config: &FeedProperties) -> Result<Arc<HttpRangeFeed>, reqwest::Error> {
        let client = httpclients::build_client(&config.to_http_options())?;
        Ok(Self::with_client(config.url.to_owned(), client))
    }

    pub fn with_client(url: String, client: reqwest::Client) -> Arc<HttpRangeFeed> {
        Arc::new(Self { url, client })
    }

    fn network_error(&self, source: reqwest::Error) -> FetchError {
        FetchError::Network {
            url: self.url.to_owned(),
            source,
        }
    }
}

#[async_trait::async_trait]
impl RangeFeed for HttpRangeFeed {
    fn source(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<RangeDocument, FetchError> {
        tracing::debug!("Fetching range feed from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| self.network_error(e))?;

        let payload = response.bytes().await.map_err(|e| self.network_error(e))?;

        RangeDocument::from_json_slice(&payload).map_err(|source| FetchError::Decode {
            url: self.url.to_owned(),
            source,
        })
    }
}
