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

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure (timeout, refused connection, DNS) or a non-success status.
    #[error("failed to fetch range feed from '{url}': {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode range feed from '{url}': {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid CIDR range '{cidr}': {source}")]
    InvalidCidr {
        cidr: String,
        #[source]
        source: ipnet::AddrParseError,
    },
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("fetch stage failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("build stage failed: {0}")]
    Build(#[from] BuildError),
}

impl RefreshError {
    pub fn stage(&self) -> &'static str {
        match self {
            RefreshError::Fetch(_) => "fetch",
            RefreshError::Build(_) => "build",
        }
    }
}
