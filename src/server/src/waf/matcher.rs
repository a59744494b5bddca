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

use crate::error::BuildError;
use cloudblock_utils::addrs;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use iprange::IpRange;
use std::{fmt, net::IpAddr};

/// Compiled, immutable set of CIDR ranges answering point containment queries.
///
/// Each address family is kept in its own prefix trie, so a lookup walks at
/// most 32 (IPv4) or 128 (IPv6) levels no matter how many ranges were loaded.
pub struct IpRangeMatcher {
    v4: IpRange<Ipv4Net>,
    v6: IpRange<Ipv6Net>,
    ipv4_count: usize,
    ipv6_count: usize,
}

impl IpRangeMatcher {
    /// Compiles the given ranges, failing on the first entry that is not a valid CIDR.
    ///
    /// Duplicates and overlapping ranges are accepted. Host bits set in an entry
    /// (`10.1.2.3/8`) are masked off.
    pub fn build<I, S>(ranges: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut v4 = IpRange::new();
        let mut v6 = IpRange::new();
        let (mut ipv4_count, mut ipv6_count) = (0, 0);

        for range in ranges {
            let range = range.as_ref();
            let network = range.parse::<IpNet>().map_err(|source| BuildError::InvalidCidr {
                cidr: range.to_owned(),
                source,
            })?;
            match network.trunc() {
                IpNet::V4(network) => {
                    v4.add(network);
                    ipv4_count += 1;
                }
                IpNet::V6(network) => {
                    v6.add(network);
                    ipv6_count += 1;
                }
            }
        }
        v4.simplify();
        v6.simplify();

        Ok(IpRangeMatcher {
            v4,
            v6,
            ipv4_count,
            ipv6_count,
        })
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        match addr.to_canonical() {
            IpAddr::V4(addr) => self.v4.contains(&addr),
            IpAddr::V6(addr) => self.v6.contains(&addr),
        }
    }

    /// Like [`contains`](Self::contains), but for untrusted input; unparsable addresses never match.
    pub fn contains_str(&self, addr: &str) -> bool {
        addrs::parse_remote_ip(addr)
            .map(|ip| self.contains(&ip))
            .unwrap_or(false)
    }

    /// Number of IPv4 entries accepted at build time, duplicates included.
    pub fn ipv4_count(&self) -> usize {
        self.ipv4_count
    }

    pub fn ipv6_count(&self) -> usize {
        self.ipv6_count
    }
}

impl fmt::Debug for IpRangeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpRangeMatcher")
            .field("ipv4_count", &self.ipv4_count)
            .field("ipv6_count", &self.ipv6_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_build_and_match() {
        let matcher = IpRangeMatcher::build(["198.51.100.0/24", "203.0.113.0/24"]).unwrap();
        assert!(matcher.contains_str("198.51.100.1"));
        assert!(matcher.contains_str("203.0.113.255"));
        assert!(!matcher.contains_str("203.5.113.1"));
        assert!(!matcher.contains_str("192.51.100.1"));
        assert_eq!(matcher.ipv4_count(), 2);
        assert_eq!(matcher.ipv6_count(), 0);
    }

    #[test]
    fn test_malformed_address_never_matches() {
        let matcher = IpRangeMatcher::build(["0.0.0.0/0", "::/0"]).unwrap();
        for addr in ["65", "", "not-an-ip", "1.2.3.4.5", "[::1", "12345::"] {
            assert!(!matcher.contains_str(addr), "{} should not match", addr);
        }
    }

    #[test]
    fn test_family_without_ranges_never_matches() {
        let v4_only = IpRangeMatcher::build(["0.0.0.0/0"]).unwrap();
        assert!(v4_only.contains(&ip("8.8.8.8")));
        assert!(!v4_only.contains(&ip("2001:db8::1")));
        assert!(!v4_only.contains(&IpAddr::V6(Ipv6Addr::LOCALHOST)));

        let v6_only = IpRangeMatcher::build(["::/0"]).unwrap();
        assert!(v6_only.contains(&ip("2001:db8::1")));
        assert!(!v6_only.contains(&ip("8.8.8.8")));

        let empty = IpRangeMatcher::build(Vec::<String>::new()).unwrap();
        assert!(!empty.contains(&ip("8.8.8.8")));
        assert!(!empty.contains(&ip("2001:db8::1")));
    }

    #[test]
    fn test_ipv6_ranges() {
        let matcher = IpRangeMatcher::build(["2600:1f14::/35", "2a05:d07a:a000::/40"]).unwrap();
        assert!(matcher.contains(&ip("2600:1f14::1")));
        assert!(matcher.contains(&ip("2600:1f15:ffff::1")));
        assert!(!matcher.contains(&ip("2600:1f16::1")));
        assert!(matcher.contains(&ip("2a05:d07a:a0ff:ffff::")));
        assert!(!matcher.contains(&ip("2a05:d07a:a100::")));
        assert_eq!(matcher.ipv6_count(), 2);
    }

    #[test]
    fn test_ipv4_mapped_ipv6_uses_ipv4_ranges() {
        let matcher = IpRangeMatcher::build(["10.0.0.0/8"]).unwrap();
        let mapped = IpAddr::V6(Ipv4Addr::new(10, 9, 8, 7).to_ipv6_mapped());
        assert!(matcher.contains(&mapped));
        assert!(matcher.contains_str("::ffff:10.9.8.7"));
    }

    #[test]
    fn test_duplicates_overlaps_and_host_bits() {
        let matcher = IpRangeMatcher::build([
            "10.0.0.0/8",
            "10.0.0.0/8",
            "10.20.0.0/16",
            "172.16.5.9/12",
            "192.0.2.7/32",
        ])
        .unwrap();
        assert_eq!(matcher.ipv4_count(), 5);
        assert!(matcher.contains(&ip("10.20.1.1")));
        assert!(matcher.contains(&ip("172.31.255.255")));
        assert!(!matcher.contains(&ip("172.32.0.0")));
        assert!(matcher.contains(&ip("192.0.2.7")));
        assert!(!matcher.contains(&ip("192.0.2.8")));
    }

    #[test]
    fn test_invalid_cidr_rejects_whole_build() {
        let bad_ranges = [
            "10.0.0.0",
            "10.0.0.0/33",
            "300.0.0.0/8",
            "2001:db8::/129",
            "garbage",
            "",
            // Surrounding whitespace is not a valid CIDR either.
            " 10.0.0.0/8",
            "10.0.0.0/8\n",
        ];
        for bad in bad_ranges {
            match IpRangeMatcher::build(["192.0.2.0/24", bad]) {
                Err(BuildError::InvalidCidr { cidr, .. }) => assert_eq!(cidr, bad),
                Ok(m) => panic!("expected {} to be rejected, built {:?}", bad, m),
            }
        }
    }

    #[test]
    fn test_contains_agrees_with_network_mask() {
        let ranges = [
            "3.5.140.0/22",
            "13.34.37.64/27",
            "52.93.178.234/32",
            "99.77.0.0/18",
            "2600:1ff2:4000::/40",
            "2a05:d03a:8000::/56",
        ];
        let networks: Vec<IpNet> = ranges.iter().map(|r| r.parse().unwrap()).collect();
        let matcher = IpRangeMatcher::build(ranges).unwrap();

        // Walk the neighbourhood around every network boundary.
        for network in &networks {
            let probes: Vec<IpAddr> = match network {
                IpNet::V4(net) => {
                    let (lo, hi) = (u32::from(net.network()), u32::from(net.broadcast()));
                    [lo.wrapping_sub(1), lo, lo + 1, hi - 1, hi, hi.wrapping_add(1)]
                        .into_iter()
                        .map(|v| IpAddr::V4(Ipv4Addr::from(v)))
                        .collect()
                }
                IpNet::V6(net) => {
                    let (lo, hi) = (u128::from(net.network()), u128::from(net.broadcast()));
                    [lo.wrapping_sub(1), lo, lo + 1, hi - 1, hi, hi.wrapping_add(1)]
                        .into_iter()
                        .map(|v| IpAddr::V6(Ipv6Addr::from(v)))
                        .collect()
                }
            };
            for probe in probes {
                let expected = networks.iter().any(|n| n.contains(&probe));
                assert_eq!(matcher.contains(&probe), expected, "probe {}", probe);
            }
        }
    }
}
