// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet filter descriptors and the "N of every X, offset O" evaluator.
//!
//! A descriptor passes a packet when `((value + O) mod X) < N`, where
//! `value` is the descriptor's own evaluation counter (by-count) or the
//! packet timestamp in sixteenths of a second (by-time). Over any `X`
//! consecutive counter values exactly `N` pass; `O` only shifts the phase.

use crate::message::PacketTime;
use serde::{Deserialize, Serialize};

/// Filter algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    /// Empty descriptor slot; never passes, never counts.
    #[default]
    Unused,
    /// Pattern driven by the per-descriptor evaluation counter.
    ByCount,
    /// Pattern driven by the packet timestamp.
    ByTime,
}

/// One filter rule tying a message type to a destination slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    /// Destination table index.
    pub dest: usize,
    /// Algorithm.
    pub kind: FilterKind,
    /// Passes per window.
    pub n: u32,
    /// Window length.
    pub x: u32,
    /// Phase offset.
    #[serde(default)]
    pub o: u32,
}

impl FilterDescriptor {
    /// The unused sentinel.
    pub const UNUSED: Self = Self {
        dest: 0,
        kind: FilterKind::Unused,
        n: 0,
        x: 0,
        o: 0,
    };

    /// Pass `n` of every `x` packets by count, shifted by `o`.
    pub fn by_count(dest: usize, n: u32, x: u32, o: u32) -> Self {
        Self {
            dest,
            kind: FilterKind::ByCount,
            n,
            x,
            o,
        }
    }

    /// Pass `n` of every `x` sixteenths of a second, shifted by `o`.
    pub fn by_time(dest: usize, n: u32, x: u32, o: u32) -> Self {
        Self {
            dest,
            kind: FilterKind::ByTime,
            n,
            x,
            o,
        }
    }

    /// Check if this is the unused sentinel.
    pub fn is_unused(&self) -> bool {
        self.kind == FilterKind::Unused
    }

    /// Pure pass/drop test for a given filter value.
    pub fn passes(&self, value: u32) -> bool {
        if self.x == 0 {
            return false;
        }
        let x = u64::from(self.x);
        let phase = (u64::from(value) + u64::from(self.o)) % x;
        phase < u64::from(self.n)
    }
}

impl Default for FilterDescriptor {
    fn default() -> Self {
        Self::UNUSED
    }
}

/// Per-descriptor evaluation counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCounter {
    count: u32,
}

impl FilterCounter {
    /// Counter starting at `count` (used to exercise wraparound).
    pub fn starting_at(count: u32) -> Self {
        Self { count }
    }

    /// Number of evaluations so far, modulo 2^32.
    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Evaluate `descriptor` for one packet and advance its counter.
///
/// The counter advances by exactly one on every evaluation, including
/// degenerate `X == 0` descriptors. The unused sentinel is not evaluated.
pub fn evaluate(
    descriptor: &FilterDescriptor,
    counter: &mut FilterCounter,
    time: Option<PacketTime>,
) -> bool {
    let value = match descriptor.kind {
        FilterKind::Unused => return false,
        FilterKind::ByCount => counter.count,
        FilterKind::ByTime => time.map_or(counter.count, |t| t.filter_value()),
    };
    counter.count = counter.count.wrapping_add(1);

    let pass = descriptor.passes(value);
    tracing::trace!(
        dest = descriptor.dest,
        value,
        pass,
        "filter {}/{} offset {}",
        descriptor.n,
        descriptor.x,
        descriptor.o
    );
    pass
}
