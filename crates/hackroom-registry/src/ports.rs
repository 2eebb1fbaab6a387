//! Host port pool.

use std::collections::{BTreeSet, HashSet};
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::PortError;

/// Inclusive range of host ports rooms may bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ports().contains(&port)
    }

    pub fn ports(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }

    /// Number of ports in the range. An inverted range is empty.
    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            usize::from(self.end - self.start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::new(8001, 8099)
    }
}

/// Hands out ports from a [`PortRange`], lowest first.
///
/// Every port in the range is in at most one of `free` and `assigned`.
/// Ports found bound by someone else at startup are in neither, so they
/// are never handed out.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    range: PortRange,
    free: BTreeSet<u16>,
    assigned: HashSet<u16>,
}

impl PortAllocator {
    /// Every port in `range` starts out free.
    pub fn new(range: PortRange) -> Self {
        Self::reconciled(range, [])
    }

    /// Like [`new`](Self::new), but ports in `in_use` are left out of the
    /// pool. Ports outside the range are ignored.
    pub fn reconciled(range: PortRange, in_use: impl IntoIterator<Item = u16>) -> Self {
        let in_use: HashSet<u16> = in_use.into_iter().collect();
        let free = range.ports().filter(|p| !in_use.contains(p)).collect();
        Self {
            range,
            free,
            assigned: HashSet::new(),
        }
    }

    /// Takes the lowest free port.
    ///
    /// # Errors
    /// [`PortError::Exhausted`] when nothing is free.
    pub fn acquire(&mut self) -> Result<u16, PortError> {
        let port = self.free.pop_first().ok_or(PortError::Exhausted {
            start: self.range.start,
            end: self.range.end,
        })?;
        self.assigned.insert(port);
        Ok(port)
    }

    /// Returns an assigned port to the pool.
    ///
    /// # Errors
    /// [`PortError::InvalidState`] if `port` isn't currently assigned
    /// (already released, never handed out, or outside the range).
    pub fn release(&mut self, port: u16) -> Result<(), PortError> {
        if !self.assigned.remove(&port) {
            return Err(PortError::InvalidState(port));
        }
        self.free.insert(port);
        Ok(())
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    pub fn is_assigned(&self, port: u16) -> bool {
        self.assigned.contains(&port)
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    /// Free ports in ascending order.
    pub fn free_ports(&self) -> Vec<u16> {
        self.free.iter().copied().collect()
    }
}
