// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Housekeeping counters and reports.

use serde::Serialize;

/// Engine counters. All wrap on overflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Commands executed.
    pub cmd_accepted: u32,
    /// Commands rejected.
    pub cmd_rejected: u32,
    /// Packets received while processing was disabled.
    pub disabled_packets: u32,
    /// Packets with no filter table entry.
    pub ignored_packets: u32,
    /// Descriptor evaluations that dropped the packet.
    pub filtered_packets: u32,
    /// Descriptor evaluations that passed the packet.
    pub passed_packets: u32,
    /// Successful packet writes.
    pub file_writes: u32,
    /// Failed or refused packet writes.
    pub file_write_errors: u32,
    /// Successful header close-time updates.
    pub file_updates: u32,
    /// Failed header close-time updates.
    pub file_update_errors: u32,
    /// Files moved after closing.
    pub file_moves: u32,
    /// Failed moves.
    pub file_move_errors: u32,
    /// Accepted destination table loads.
    pub dest_table_loads: u32,
    /// Rejected destination table loads.
    pub dest_table_errors: u32,
    /// Accepted filter table loads.
    pub filter_table_loads: u32,
    /// Rejected filter table loads.
    pub filter_table_errors: u32,
}

/// Increment a counter, wrapping at `u32::MAX`.
pub(crate) fn bump(counter: &mut u32) {
    *counter = counter.wrapping_add(1);
}

impl Counters {
    /// Zero the command and packet counters. Table load counters survive.
    pub fn reset(&mut self) {
        *self = Self {
            dest_table_loads: self.dest_table_loads,
            dest_table_errors: self.dest_table_errors,
            filter_table_loads: self.filter_table_loads,
            filter_table_errors: self.filter_table_errors,
            ..Self::default()
        };
    }
}

/// Periodic housekeeping report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HousekeepingReport {
    #[serde(flatten)]
    pub counters: Counters,
    /// Packet processing enable state.
    pub app_enabled: bool,
    /// Active filter table description.
    pub filter_table: String,
    /// Active destination table description.
    pub dest_table: String,
    /// Slots with an open file.
    pub open_files: usize,
}

/// Status of one destination slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub slot: usize,
    pub enabled: bool,
    pub open: bool,
    /// Seconds since the current file was opened.
    pub age_secs: u64,
    /// Current file size in bytes, header included.
    pub size: u64,
    /// Bytes per second written during the last housekeeping cycle.
    pub rate: u64,
    /// Sequence number the next file will use.
    pub sequence: u32,
    /// Set when no free sequence number is left.
    pub exhausted: bool,
    /// Current file, or the last closed one.
    pub filename: Option<String>,
}
