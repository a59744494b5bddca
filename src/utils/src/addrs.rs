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

use std::{
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

/// Parses the remote address reported by a host server into a canonical IP.
///
/// Accepts a bare address (`10.1.2.3`, `2001:db8::1`) as well as the socket
/// forms (`10.1.2.3:443`, `[2001:db8::1]:443`). IPv4-mapped IPv6 addresses are
/// folded to their IPv4 form. Anything else yields `None`.
pub fn parse_remote_ip(remote_addr: &str) -> Option<IpAddr> {
    let remote_addr = remote_addr.trim();
    if remote_addr.is_empty() {
        return None;
    }
    let ip = IpAddr::from_str(remote_addr)
        .ok()
        .or_else(|| SocketAddr::from_str(remote_addr).ok().map(|addr| addr.ip()))
        .or_else(|| {
            remote_addr
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .and_then(|s| IpAddr::from_str(s).ok())
        })?;
    Some(ip.to_canonical())
}
