// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use std::{cmp::Ordering, fmt, net::Ipv4Addr, ops::Range};

use ipnet::Ipv4Net;
use thiserror::Error;

/// A set of equally sized subnets.
///
/// Subnets are addressed by their index relative to `first`. The set stores
/// the indices as sorted, non-overlapping, non-adjacent half-open ranges.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct SubnetSet {
    first: u32,
    subnet_len: u8,
    capacity: u32,
    pub(crate) ranges: Vec<Range<u32>>,
}

impl fmt::Display for SubnetSet {
    // Format the set as [first_subnet-last_subnet, first_subnet-last_subnet, ...]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "{}-{}",
                self.subnet_at(range.start),
                self.subnet_at(range.end - 1)
            )?;
        }
        write!(f, "]")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubnetSetError {
    #[error("subnet {0} not in range")]
    NotInRange(Ipv4Net),
    #[error("subnet {0} is not aligned to the subnet size")]
    Misaligned(Ipv4Net),
    #[error("subnet {0} already exists")]
    AlreadyInSet(Ipv4Net),
    #[error("subnet {0} does not exist")]
    NotInSet(Ipv4Net),
}

impl SubnetSet {
    /// Creates a full set of `capacity` subnets of length `subnet_len`, starting at `first`.
    pub fn full(first: Ipv4Addr, subnet_len: u8, capacity: u32) -> Self {
        let ranges = if capacity == 0 {
            Vec::new()
        } else {
            vec![0..capacity]
        };
        Self {
            first: first.to_bits(),
            subnet_len,
            capacity,
            ranges,
        }
    }

    pub fn len(&self) -> u64 {
        self.ranges.iter().map(|r| u64::from(r.end - r.start)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains(&self, subnet: Ipv4Net) -> bool {
        match self.index_of(subnet) {
            Ok(i) => self.find(i).is_ok(),
            Err(_) => false,
        }
    }

    pub fn insert(&mut self, subnet: Ipv4Net) -> Result<(), SubnetSetError> {
        let value = self.index_of(subnet)?;
        let i = match self.find(value) {
            Ok(_) => return Err(SubnetSetError::AlreadyInSet(subnet)),
            Err(i) => i,
        };
        // ranges[..i] end before value, ranges[i..] start after it.
        let joins_prev = i > 0 && self.ranges[i - 1].end == value;
        let joins_next = i < self.ranges.len() && self.ranges[i].start == value + 1;
        match (joins_prev, joins_next) {
            (true, true) => {
                self.ranges[i - 1].end = self.ranges[i].end;
                self.ranges.remove(i);
            }
            (true, false) => self.ranges[i - 1].end = value + 1,
            (false, true) => self.ranges[i].start = value,
            (false, false) => self.ranges.insert(i, value..value + 1),
        }
        Ok(())
    }

    pub fn remove(&mut self, subnet: Ipv4Net) -> Result<(), SubnetSetError> {
        let value = self.index_of(subnet)?;
        let i = self
            .find(value)
            .map_err(|_| SubnetSetError::NotInSet(subnet))?;

        let range = self.ranges[i].clone();
        if range.start == value {
            self.ranges[i].start = value + 1;
        } else if range.end - 1 == value {
            self.ranges[i].end = value;
        } else {
            // Split the range around the value.
            self.ranges[i].start = value + 1;
            self.ranges.insert(i, range.start..value);
        }
        if self.ranges[i].is_empty() {
            self.ranges.remove(i);
        }
        Ok(())
    }

    /// Returns the nth subnet in the set.
    pub fn nth(&self, mut n: u64) -> Option<Ipv4Net> {
        for range in &self.ranges {
            let len = u64::from(range.end - range.start);
            if n < len {
                return Some(self.subnet_at(range.start + n as u32));
            }
            n -= len;
        }
        None
    }

    fn find(&self, value: u32) -> Result<usize, usize> {
        self.ranges.binary_search_by(|range| {
            if range.end <= value {
                Ordering::Less
            } else if range.start > value {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })
    }

    fn index_of(&self, subnet: Ipv4Net) -> Result<u32, SubnetSetError> {
        if subnet.prefix_len() != self.subnet_len || subnet.addr() != subnet.network() {
            return Err(SubnetSetError::Misaligned(subnet));
        }
        let offset = u64::from(subnet.network().to_bits())
            .checked_sub(u64::from(self.first))
            .ok_or(SubnetSetError::NotInRange(subnet))?;
        if offset % self.size() != 0 {
            return Err(SubnetSetError::Misaligned(subnet));
        }
        let index = offset / self.size();
        if index >= u64::from(self.capacity) {
            return Err(SubnetSetError::NotInRange(subnet));
        }
        Ok(index as u32)
    }

    fn subnet_at(&self, index: u32) -> Ipv4Net {
        let addr = u64::from(self.first) + u64::from(index) * self.size();
        Ipv4Net::new_assert(Ipv4Addr::from_bits(addr as u32), self.subnet_len)
    }

    fn size(&self) -> u64 {
        1u64 << (32 - self.subnet_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> SubnetSet {
        SubnetSet::full(Ipv4Addr::new(10, 1, 1, 0), 24, 10)
    }

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[test]
    fn remove_and_insert_keep_ranges_merged() {
        let mut set = set();
        assert_eq!(set.len(), 10);

        set.remove(net("10.1.1.0/24")).unwrap();
        set.remove(net("10.1.5.0/24")).unwrap();
        set.remove(net("10.1.10.0/24")).unwrap();
        assert_eq!(set.ranges, vec![1..4, 5..9]);
        assert_eq!(set.len(), 7);
        assert_eq!(
            set.to_string(),
            "[10.1.2.0/24-10.1.4.0/24, 10.1.6.0/24-10.1.9.0/24]"
        );

        set.insert(net("10.1.5.0/24")).unwrap();
        assert_eq!(set.ranges, vec![1..9]);
        set.insert(net("10.1.1.0/24")).unwrap();
        set.insert(net("10.1.10.0/24")).unwrap();
        assert_eq!(set.ranges, vec![0..10]);
    }

    #[test]
    fn nth_walks_over_ranges() {
        let mut set = set();
        set.remove(net("10.1.2.0/24")).unwrap();
        assert_eq!(set.nth(0), Some(net("10.1.1.0/24")));
        assert_eq!(set.nth(1), Some(net("10.1.3.0/24")));
        assert_eq!(set.nth(8), Some(net("10.1.10.0/24")));
        assert_eq!(set.nth(9), None);
    }

    #[test]
    fn rejects_foreign_subnets() {
        let mut set = set();
        assert_eq!(
            set.remove(net("10.1.0.0/24")),
            Err(SubnetSetError::NotInRange(net("10.1.0.0/24")))
        );
        assert_eq!(
            set.remove(net("10.1.11.0/24")),
            Err(SubnetSetError::NotInRange(net("10.1.11.0/24")))
        );
        assert_eq!(
            set.remove(net("10.1.2.0/25")),
            Err(SubnetSetError::Misaligned(net("10.1.2.0/25")))
        );
        assert_eq!(
            set.remove(net("10.1.2.7/24")),
            Err(SubnetSetError::Misaligned(net("10.1.2.7/24")))
        );
        assert!(!set.contains(net("10.1.0.0/24")));
    }

    #[test]
    fn double_insert_and_remove_fail() {
        let mut set = set();
        assert_eq!(
            set.insert(net("10.1.3.0/24")),
            Err(SubnetSetError::AlreadyInSet(net("10.1.3.0/24")))
        );
        set.remove(net("10.1.3.0/24")).unwrap();
        assert_eq!(
            set.remove(net("10.1.3.0/24")),
            Err(SubnetSetError::NotInSet(net("10.1.3.0/24")))
        );
    }
}
