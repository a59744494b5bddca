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

use serde::{Deserialize, Serialize};

/// The range document published by the provider, reduced to what the matcher needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeDocument {
    pub sync_token: String,
    pub create_date: String,
    pub ipv4_ranges: Vec<String>,
    pub ipv6_ranges: Vec<String>,
}

// Wire format of https://ip-ranges.amazonaws.com/ip-ranges.json, other fields are ignored.

#[derive(Debug, Serialize, Deserialize)]
struct IpRangesJson {
    #[serde(rename = "syncToken")]
    sync_token: String,
    #[serde(rename = "createDate")]
    create_date: String,
    #[serde(rename = "prefixes")]
    prefixes: Vec<Ipv4PrefixJson>,
    #[serde(rename = "ipv6_prefixes", default)]
    ipv6_prefixes: Vec<Ipv6PrefixJson>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Ipv4PrefixJson {
    #[serde(rename = "ip_prefix")]
    ip_prefix: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Ipv6PrefixJson {
    #[serde(rename = "ipv6_prefix")]
    ipv6_prefix: String,
}

impl RangeDocument {
    /// Decodes the provider JSON payload.
    pub fn from_json_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let json: IpRangesJson = serde_json::from_slice(payload)?;
        Ok(Self::from(json))
    }

    /// All ranges, IPv4 first then IPv6, in feed order.
    pub fn all_ranges(&self) -> impl Iterator<Item = &str> {
        self.ipv4_ranges
            .iter()
            .chain(self.ipv6_ranges.iter())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ipv4_ranges.len() + self.ipv6_ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<IpRangesJson> for RangeDocument {
    fn from(json: IpRangesJson) -> Self {
        RangeDocument {
            sync_token: json.sync_token,
            create_date: json.create_date,
            ipv4_ranges: json.prefixes.into_iter().map(|p| p.ip_prefix).collect(),
            ipv6_ranges: json.ipv6_prefixes.into_iter().map(|p| p.ipv6_prefix).collect(),
        }
    }
}
