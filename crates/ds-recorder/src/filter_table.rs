// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet filter table.
//!
//! Maps each message identifier to up to [`FILTERS_PER_PACKET`] filter
//! descriptors, evaluated in table order.
//!
//! # File format
//!
//! ```toml
//! description = "Sample filter table"
//!
//! [[packets]]
//! message_id = 0x0801
//! filters = [
//!     { dest = 1, kind = "by-count", n = 1, x = 1, o = 0 },
//!     { dest = 4, kind = "by-count", n = 1, x = 2, o = 0 },
//! ]
//! ```

use crate::error::ConfigError;
use crate::filter::FilterDescriptor;
use crate::message::MessageId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Maximum number of message identifiers in the table.
pub const PACKETS_IN_FILTER_TABLE: usize = 256;

/// Filter descriptors per message identifier.
pub const FILTERS_PER_PACKET: usize = 4;

/// Maximum table description length.
pub const DESCRIPTION_LEN: usize = 32;

/// Filters for one message identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketEntry {
    pub message_id: MessageId,
    pub filters: [FilterDescriptor; FILTERS_PER_PACKET],
}

impl PacketEntry {
    /// Entry with every descriptor unused.
    pub fn new(message_id: impl Into<MessageId>) -> Self {
        Self {
            message_id: message_id.into(),
            filters: [FilterDescriptor::UNUSED; FILTERS_PER_PACKET],
        }
    }

    /// Place `descriptor` in the first unused slot.
    ///
    /// A full entry is left unchanged; table validation never sees more
    /// than [`FILTERS_PER_PACKET`] descriptors.
    pub fn filter(mut self, descriptor: FilterDescriptor) -> Self {
        if let Some(slot) = self.filters.iter_mut().find(|f| f.is_unused()) {
            *slot = descriptor;
        }
        self
    }

    /// Descriptors in use, with their position in the entry.
    pub fn active_filters(&self) -> impl Iterator<Item = (usize, &FilterDescriptor)> {
        self.filters
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_unused())
    }
}

/// Loaded, indexed packet filter table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FilterTableFile", into = "FilterTableFile")]
pub struct FilterTable {
    description: String,
    entries: Vec<PacketEntry>,
    index: HashMap<MessageId, usize>,
}

impl FilterTable {
    /// Build a table, rejecting duplicate identifiers and oversized tables.
    pub fn new(
        description: impl Into<String>,
        entries: Vec<PacketEntry>,
    ) -> Result<Self, ConfigError> {
        let description = description.into();
        if description.len() > DESCRIPTION_LEN {
            return Err(ConfigError::Invalid(format!(
                "Filter table description longer than {} bytes",
                DESCRIPTION_LEN
            )));
        }
        if entries.len() > PACKETS_IN_FILTER_TABLE {
            return Err(ConfigError::TooManyEntries {
                got: entries.len(),
                max: PACKETS_IN_FILTER_TABLE,
            });
        }

        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.message_id, i).is_some() {
                return Err(ConfigError::DuplicateMessageId(entry.message_id));
            }
        }

        Ok(Self {
            description,
            entries,
            index,
        })
    }

    /// Load and parse a TOML filter table.
    ///
    /// Destination indices are checked later against the destination table
    /// with [`FilterTable::validate`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a TOML filter table.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Render the table as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Check descriptors against a destination table of `dest_count` slots.
    pub fn validate(&self, dest_count: usize) -> Result<(), ConfigError> {
        for entry in &self.entries {
            for (i, filter) in entry.active_filters() {
                check_descriptor(entry.message_id, i, filter, dest_count)?;
            }
        }
        Ok(())
    }

    /// Table description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Position of the entry for `message_id`.
    pub fn lookup(&self, message_id: MessageId) -> Option<usize> {
        self.index.get(&message_id).copied()
    }

    /// All entries in table order.
    pub fn entries(&self) -> &[PacketEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace one descriptor. The caller validates it first.
    pub(crate) fn set_filter(&mut self, entry: usize, filter: usize, descriptor: FilterDescriptor) {
        self.entries[entry].filters[filter] = descriptor;
    }

    /// Append an entry with no active filters. Returns its position.
    pub(crate) fn add(&mut self, message_id: MessageId) -> Result<usize, ConfigError> {
        if self.index.contains_key(&message_id) {
            return Err(ConfigError::DuplicateMessageId(message_id));
        }
        if self.entries.len() >= PACKETS_IN_FILTER_TABLE {
            return Err(ConfigError::TooManyEntries {
                got: self.entries.len() + 1,
                max: PACKETS_IN_FILTER_TABLE,
            });
        }
        let position = self.entries.len();
        self.entries.push(PacketEntry::new(message_id));
        self.index.insert(message_id, position);
        Ok(position)
    }

    /// Remove the entry for `message_id`. Returns its former position.
    pub(crate) fn remove(&mut self, message_id: MessageId) -> Option<usize> {
        let position = self.index.remove(&message_id)?;
        self.entries.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(position)
    }
}

impl Default for FilterTable {
    fn default() -> Self {
        Self {
            description: String::new(),
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

/// Validate one descriptor against a destination table of `dest_count`.
pub(crate) fn check_descriptor(
    message_id: MessageId,
    filter: usize,
    descriptor: &FilterDescriptor,
    dest_count: usize,
) -> Result<(), ConfigError> {
    if descriptor.dest >= dest_count {
        return Err(ConfigError::DestinationOutOfRange {
            message_id,
            filter,
            dest: descriptor.dest,
            count: dest_count,
        });
    }
    if descriptor.n > descriptor.x {
        return Err(ConfigError::InvalidFilterParms {
            message_id,
            filter,
            n: descriptor.n,
            x: descriptor.x,
        });
    }
    Ok(())
}

/// On-disk shape of the filter table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FilterTableFile {
    #[serde(default)]
    description: String,
    #[serde(default)]
    packets: Vec<PacketFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PacketFile {
    message_id: MessageId,
    #[serde(default)]
    filters: Vec<FilterDescriptor>,
}

impl TryFrom<FilterTableFile> for FilterTable {
    type Error = ConfigError;

    fn try_from(file: FilterTableFile) -> Result<Self, Self::Error> {
        let mut entries = Vec::with_capacity(file.packets.len());
        for packet in file.packets {
            if packet.filters.len() > FILTERS_PER_PACKET {
                return Err(ConfigError::Invalid(format!(
                    "Packet {} has {} filters, maximum is {}",
                    packet.message_id,
                    packet.filters.len(),
                    FILTERS_PER_PACKET
                )));
            }
            let mut entry = PacketEntry::new(packet.message_id);
            for (slot, filter) in entry.filters.iter_mut().zip(packet.filters) {
                *slot = filter;
            }
            entries.push(entry);
        }
        FilterTable::new(file.description, entries)
    }
}

impl From<FilterTable> for FilterTableFile {
    fn from(table: FilterTable) -> Self {
        let packets = table
            .entries
            .into_iter()
            .map(|entry| {
                let mut filters = entry.filters.to_vec();
                while filters.last().is_some_and(|f| f.is_unused()) {
                    filters.pop();
                }
                PacketFile {
                    message_id: entry.message_id,
                    filters,
                }
            })
            .collect();
        Self {
            description: table.description,
            packets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterKind;

    const SAMPLE: &str = r#"
description = "Sample filter table"

[[packets]]
message_id = 0x0801
filters = [
    { dest = 1, kind = "by-count", n = 1, x = 1, o = 0 },
    { dest = 4, kind = "by-count", n = 1, x = 2 },
]

[[packets]]
message_id = 0x0808
filters = [{ dest = 0, kind = "by-time", n = 1, x = 16, o = 0 }]
"#;

    #[test]
    fn test_parse_sample_table() {
        let table = FilterTable::from_toml_str(SAMPLE).expect("parse");

        assert_eq!(table.description(), "Sample filter table");
        assert_eq!(table.len(), 2);

        let first = &table.entries()[0];
        assert_eq!(first.message_id, MessageId(0x0801));
        assert_eq!(first.filters[1], FilterDescriptor::by_count(4, 1, 2, 0));
        assert!(first.filters[2].is_unused());
        assert!(first.filters[3].is_unused());

        let second = &table.entries()[table.lookup(MessageId(0x0808)).expect("lookup")];
        assert_eq!(second.filters[0].kind, FilterKind::ByTime);
    }

    #[test]
    fn test_duplicate_message_id_rejected() {
        let content = r#"
[[packets]]
message_id = 5

[[packets]]
message_id = 5
"#;
        let err = FilterTable::from_toml_str(content).expect_err("duplicate");
        assert!(err.to_string().contains("Duplicate message id"));
    }

    #[test]
    fn test_too_many_filters_rejected() {
        let content = r#"
[[packets]]
message_id = 1
filters = [
    { dest = 0, kind = "by-count", n = 1, x = 1 },
    { dest = 0, kind = "by-count", n = 1, x = 1 },
    { dest = 0, kind = "by-count", n = 1, x = 1 },
    { dest = 0, kind = "by-count", n = 1, x = 1 },
    { dest = 0, kind = "by-count", n = 1, x = 1 },
]
"#;
        assert!(FilterTable::from_toml_str(content).is_err());
    }

    #[test]
    fn test_validate_destination_range() {
        let table = FilterTable::from_toml_str(SAMPLE).expect("parse");

        assert!(table.validate(5).is_ok());
        match table.validate(4) {
            Err(ConfigError::DestinationOutOfRange { dest, count, .. }) => {
                assert_eq!(dest, 4);
                assert_eq!(count, 4);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_validate_n_greater_than_x() {
        let entry = PacketEntry::new(7u32).filter(FilterDescriptor::by_count(0, 2, 0, 0));
        let table = FilterTable::new("bad", vec![entry]).expect("build");

        assert!(matches!(
            table.validate(1),
            Err(ConfigError::InvalidFilterParms { n: 2, x: 0, .. })
        ));
    }

    #[test]
    fn test_unused_descriptors_skip_validation() {
        let table = FilterTable::new("ok", vec![PacketEntry::new(1u32)]).expect("build");
        assert!(table.validate(0).is_ok());
    }

    #[test]
    fn test_add_and_remove_reindex() {
        let mut table = FilterTable::new(
            "t",
            vec![PacketEntry::new(1u32), PacketEntry::new(2u32), PacketEntry::new(3u32)],
        )
        .expect("build");

        assert_eq!(table.remove(MessageId(2)), Some(1));
        assert_eq!(table.lookup(MessageId(3)), Some(1));
        assert_eq!(table.lookup(MessageId(2)), None);

        assert_eq!(table.add(MessageId(9)).expect("add"), 2);
        assert!(table.add(MessageId(9)).is_err());
    }

    #[test]
    fn test_toml_roundtrip_trims_unused() {
        let table = FilterTable::from_toml_str(SAMPLE).expect("parse");
        let rendered = table.to_toml_string().expect("render");
        assert!(!rendered.contains("unused"));

        let reparsed = FilterTable::from_toml_str(&rendered).expect("reparse");
        assert_eq!(reparsed, table);
    }
}
