// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Destination filename generation.
//!
//! Filenames are `path + basename + "_" + discriminator + extension`:
//! - Sequence: `/ram/ds/events_00000042.dat`
//! - Time: `/ram/ds/events_2026291143022.dat` (`YYYYDDDHHMMSS`, UTC)

use crate::dest_table::DestinationDefinition;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Default width of the zero-padded sequence discriminator.
pub const SEQUENCE_DIGITS: usize = 8;

/// Default largest sequence number before wrapping back to 1.
pub const MAX_SEQUENCE_COUNT: u32 = 99_999_999;

/// Separator between basename and discriminator.
pub const SEPARATOR: &str = "_";

/// Sequence numbering policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePolicy {
    /// Zero-padded width.
    pub digits: usize,
    /// Largest sequence number; the next one is 1.
    pub max: u32,
}

impl SequencePolicy {
    /// Sequence number that follows `current`. Never returns 0.
    pub fn next(&self, current: u32) -> u32 {
        if current >= self.max {
            1
        } else {
            current + 1
        }
    }

    /// Clamp a stored sequence number into `1..=max`.
    pub fn normalize(&self, sequence: u32) -> u32 {
        if sequence == 0 || sequence > self.max {
            1
        } else {
            sequence
        }
    }

    /// Zero-padded discriminator for `sequence`.
    pub fn format(&self, sequence: u32) -> String {
        format!("{:0width$}", sequence, width = self.digits)
    }
}

impl Default for SequencePolicy {
    fn default() -> Self {
        Self {
            digits: SEQUENCE_DIGITS,
            max: MAX_SEQUENCE_COUNT,
        }
    }
}

/// Fixed-width time discriminator: year, day of year, hour, minute, second.
pub fn time_discriminator(time: DateTime<Utc>) -> String {
    time.format("%Y%j%H%M%S").to_string()
}

/// Assemble the full path for `def` with the given discriminator.
pub fn build_path(def: &DestinationDefinition, discriminator: &str) -> PathBuf {
    let mut name = String::with_capacity(
        def.path.len() + def.basename.len() + discriminator.len() + def.extension.len() + 3,
    );

    name.push_str(&def.path);
    if !def.path.ends_with('/') {
        name.push('/');
    }
    if !def.basename.is_empty() {
        name.push_str(&def.basename);
        name.push_str(SEPARATOR);
    }
    name.push_str(discriminator);
    if !def.extension.is_empty() {
        if !def.extension.starts_with('.') {
            name.push('.');
        }
        name.push_str(&def.extension);
    }

    PathBuf::from(name)
}

/// Find the first free sequence-mode filename starting at `start`.
///
/// Walks at most `policy.max` candidates, wrapping to 1 after the maximum.
/// Returns the path and the sequence number it uses, or `None` when every
/// number is taken.
pub fn allocate_sequence_name(
    def: &DestinationDefinition,
    start: u32,
    policy: &SequencePolicy,
    exists: impl Fn(&Path) -> bool,
) -> Option<(PathBuf, u32)> {
    let mut sequence = policy.normalize(start);
    for _ in 0..policy.max {
        let path = build_path(def, &policy.format(sequence));
        if !exists(&path) {
            return Some((path, sequence));
        }
        sequence = policy.next(sequence);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn def() -> DestinationDefinition {
        DestinationDefinition::new("/ram/ds", "events").extension("dat")
    }

    #[test]
    fn test_sequential_filename() {
        let policy = SequencePolicy::default();
        let path = build_path(&def(), &policy.format(5));
        assert_eq!(path, PathBuf::from("/ram/ds/events_00000005.dat"));
    }

    #[test]
    fn test_empty_basename_and_extension() {
        let bare = DestinationDefinition::new("/ram/ds/", "");
        let path = build_path(&bare, "00000001");
        assert_eq!(path, PathBuf::from("/ram/ds/00000001"));
    }

    #[test]
    fn test_time_discriminator_fixed_width() {
        let t = Utc.with_ymd_and_hms(2026, 2, 3, 4, 5, 6).single().expect("time");
        assert_eq!(time_discriminator(t), "2026034040506");

        let t = Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).single().expect("time");
        assert_eq!(time_discriminator(t), "2026365235959");
    }

    #[test]
    fn test_sequence_wraps_to_one() {
        let policy = SequencePolicy { digits: 2, max: 99 };
        assert_eq!(policy.next(98), 99);
        assert_eq!(policy.next(99), 1);
        assert_eq!(policy.normalize(0), 1);
        assert_eq!(policy.normalize(100), 1);
    }

    #[test]
    fn test_allocation_skips_existing() {
        let policy = SequencePolicy { digits: 2, max: 5 };
        let taken: HashSet<PathBuf> = [3, 4]
            .iter()
            .map(|n| build_path(&def(), &policy.format(*n)))
            .collect();

        let (path, sequence) =
            allocate_sequence_name(&def(), 3, &policy, |p| taken.contains(p)).expect("free name");
        assert_eq!(sequence, 5);
        assert_eq!(path, PathBuf::from("/ram/ds/events_05.dat"));
    }

    #[test]
    fn test_allocation_wraps_past_max() {
        let policy = SequencePolicy { digits: 2, max: 5 };
        let taken: HashSet<PathBuf> = [4, 5]
            .iter()
            .map(|n| build_path(&def(), &policy.format(*n)))
            .collect();

        let (_, sequence) =
            allocate_sequence_name(&def(), 4, &policy, |p| taken.contains(p)).expect("free name");
        assert_eq!(sequence, 1);
    }

    #[test]
    fn test_allocation_exhausted() {
        let policy = SequencePolicy { digits: 2, max: 5 };
        assert!(allocate_sequence_name(&def(), 1, &policy, |_| true).is_none());
    }
}
