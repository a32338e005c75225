// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Destination file table.
//!
//! One [`DestinationDefinition`] per slot; slots are addressed by their
//! position in the table.
//!
//! # File format
//!
//! ```toml
//! description = "Sample destination table"
//!
//! [[files]]
//! path = "/ram/ds/"
//! basename = "events"
//! extension = ".dat"
//! filename_mode = "sequence"
//! size_limit = 2097152
//! age_limit = 3600
//! sequence_count = 1
//! move_directory = "/ram/downlink/"
//! enabled = true
//! ```

use crate::error::ConfigError;
use crate::filter_table::DESCRIPTION_LEN;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum number of destination slots.
pub const DEST_FILE_CNT: usize = 16;

/// Maximum length of a destination path or move directory.
pub const PATHNAME_BUFSIZE: usize = 64;

/// Maximum length of a basename.
pub const BASENAME_BUFSIZE: usize = 64;

/// Maximum length of an extension, including the leading dot.
pub const EXTENSION_BUFSIZE: usize = 8;

/// Smallest accepted file size limit in bytes.
pub const FILE_MIN_SIZE_LIMIT: u64 = 1024;

/// Smallest accepted file age limit in seconds.
pub const FILE_MIN_AGE_LIMIT: u64 = 60;

/// How the variable part of a filename is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilenameMode {
    /// Zero-padded sequence count.
    #[default]
    Sequence,
    /// Open time as `YYYYDDDHHMMSS`.
    Time,
}

/// Naming and limit policy for one destination slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationDefinition {
    /// Directory the file is created in.
    pub path: String,

    /// Filename prefix.
    #[serde(default)]
    pub basename: String,

    /// Filename suffix.
    #[serde(default)]
    pub extension: String,

    /// Sequence or time discriminator.
    #[serde(default)]
    pub filename_mode: FilenameMode,

    /// Maximum file size in bytes, header included.
    pub size_limit: u64,

    /// Maximum file age in seconds.
    pub age_limit: u64,

    /// Sequence number used for the next file.
    #[serde(default = "default_sequence")]
    pub sequence_count: u32,

    /// Directory closed files are moved to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_directory: Option<String>,

    /// Whether the slot accepts packets.
    #[serde(default)]
    pub enabled: bool,
}

fn default_sequence() -> u32 {
    1
}

impl DestinationDefinition {
    /// Enabled sequence-mode destination with minimal limits.
    pub fn new(path: impl Into<String>, basename: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            basename: basename.into(),
            extension: String::new(),
            filename_mode: FilenameMode::Sequence,
            size_limit: FILE_MIN_SIZE_LIMIT,
            age_limit: FILE_MIN_AGE_LIMIT,
            sequence_count: 1,
            move_directory: None,
            enabled: true,
        }
    }

    /// Set extension.
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Set filename mode.
    pub fn filename_mode(mut self, mode: FilenameMode) -> Self {
        self.filename_mode = mode;
        self
    }

    /// Set size limit in bytes.
    pub fn size_limit(mut self, bytes: u64) -> Self {
        self.size_limit = bytes;
        self
    }

    /// Set age limit in seconds.
    pub fn age_limit(mut self, seconds: u64) -> Self {
        self.age_limit = seconds;
        self
    }

    /// Set the first sequence number.
    pub fn sequence_count(mut self, sequence: u32) -> Self {
        self.sequence_count = sequence;
        self
    }

    /// Move closed files to `dir`.
    pub fn move_to(mut self, dir: impl Into<String>) -> Self {
        self.move_directory = Some(dir.into());
        self
    }

    /// Set enable state.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Check if `other` names files the same way.
    ///
    /// Slots whose identity is unchanged keep their open file across a
    /// table reload; limit and enable changes are adopted in place.
    pub fn same_identity(&self, other: &Self) -> bool {
        self.path == other.path
            && self.basename == other.basename
            && self.extension == other.extension
            && self.filename_mode == other.filename_mode
    }

    /// Validate one slot definition.
    pub fn validate(&self, slot: usize, max_sequence: u32) -> Result<(), ConfigError> {
        let invalid = |what: String| ConfigError::Invalid(format!("Destination {}: {}", slot, what));

        if self.path.is_empty() {
            return Err(invalid("empty path".into()));
        }
        check_len(&self.path, PATHNAME_BUFSIZE).map_err(|m| invalid(format!("path {}", m)))?;
        check_len(&self.basename, BASENAME_BUFSIZE)
            .map_err(|m| invalid(format!("basename {}", m)))?;
        check_len(&self.extension, EXTENSION_BUFSIZE)
            .map_err(|m| invalid(format!("extension {}", m)))?;
        if let Some(dir) = &self.move_directory {
            if dir.is_empty() {
                return Err(invalid("empty move directory".into()));
            }
            check_len(dir, PATHNAME_BUFSIZE)
                .map_err(|m| invalid(format!("move directory {}", m)))?;
        }
        if self.size_limit < FILE_MIN_SIZE_LIMIT {
            return Err(invalid(format!(
                "size limit {} below minimum {}",
                self.size_limit, FILE_MIN_SIZE_LIMIT
            )));
        }
        if self.age_limit < FILE_MIN_AGE_LIMIT {
            return Err(invalid(format!(
                "age limit {} below minimum {}",
                self.age_limit, FILE_MIN_AGE_LIMIT
            )));
        }
        if self.sequence_count > max_sequence {
            return Err(invalid(format!(
                "sequence count {} above maximum {}",
                self.sequence_count, max_sequence
            )));
        }
        Ok(())
    }
}

fn check_len(value: &str, max: usize) -> Result<(), String> {
    if value.len() > max {
        return Err(format!("longer than {} bytes", max));
    }
    if value.chars().any(|c| c.is_control()) {
        return Err("contains control characters".into());
    }
    Ok(())
}

/// Loaded destination file table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DestinationTable {
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub files: Vec<DestinationDefinition>,
}

impl DestinationTable {
    /// Build a table from slot definitions.
    pub fn new(description: impl Into<String>, files: Vec<DestinationDefinition>) -> Self {
        Self {
            description: description.into(),
            files,
        }
    }

    /// Load and parse a TOML destination table.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a TOML destination table.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Render the table as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Validate every slot.
    pub fn validate(&self, max_sequence: u32) -> Result<(), ConfigError> {
        if self.description.len() > DESCRIPTION_LEN {
            return Err(ConfigError::Invalid(format!(
                "Destination table description longer than {} bytes",
                DESCRIPTION_LEN
            )));
        }
        if self.files.len() > DEST_FILE_CNT {
            return Err(ConfigError::TooManyEntries {
                got: self.files.len(),
                max: DEST_FILE_CNT,
            });
        }
        for (slot, def) in self.files.iter().enumerate() {
            def.validate(slot, max_sequence)?;
        }
        Ok(())
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if the table has no slots.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
description = "Sample destination table"

[[files]]
path = "/ram/ds/"
basename = "events"
extension = ".dat"
size_limit = 2097152
age_limit = 3600
move_directory = "/ram/downlink/"
enabled = true

[[files]]
path = "/ram/ds/"
basename = "hk"
filename_mode = "time"
size_limit = 1024
age_limit = 60
sequence_count = 42
"#;

    #[test]
    fn test_parse_sample_table() {
        let table = DestinationTable::from_toml_str(SAMPLE).expect("parse");
        assert_eq!(table.len(), 2);

        let events = &table.files[0];
        assert_eq!(events.filename_mode, FilenameMode::Sequence);
        assert_eq!(events.sequence_count, 1);
        assert_eq!(events.move_directory.as_deref(), Some("/ram/downlink/"));
        assert!(events.enabled);

        let hk = &table.files[1];
        assert_eq!(hk.filename_mode, FilenameMode::Time);
        assert_eq!(hk.sequence_count, 42);
        assert!(!hk.enabled);

        assert!(table.validate(99_999_999).is_ok());
    }

    #[test]
    fn test_minimum_limits_enforced() {
        let small = DestinationDefinition::new("/tmp/", "x").size_limit(1023);
        assert!(small.validate(0, 10).is_err());

        let young = DestinationDefinition::new("/tmp/", "x").age_limit(59);
        assert!(young.validate(0, 10).is_err());
    }

    #[test]
    fn test_sequence_above_max_rejected() {
        let def = DestinationDefinition::new("/tmp/", "x").sequence_count(11);
        assert!(def.validate(0, 10).is_err());
        assert!(def.validate(0, 11).is_ok());
    }

    #[test]
    fn test_string_limits() {
        assert!(DestinationDefinition::new("", "x").validate(0, 10).is_err());
        assert!(DestinationDefinition::new("/tmp/", "x")
            .extension(".toolong1")
            .validate(0, 10)
            .is_err());
        assert!(DestinationDefinition::new("/tmp/\n", "x")
            .validate(0, 10)
            .is_err());
    }

    #[test]
    fn test_too_many_slots() {
        let table = DestinationTable::new(
            "many",
            vec![DestinationDefinition::new("/tmp/", "x"); DEST_FILE_CNT + 1],
        );
        assert!(matches!(
            table.validate(10),
            Err(ConfigError::TooManyEntries { .. })
        ));
    }

    #[test]
    fn test_identity_ignores_limits() {
        let a = DestinationDefinition::new("/tmp/", "x");
        let b = a.clone().size_limit(4096).age_limit(600).enabled(false);
        let c = a.clone().filename_mode(FilenameMode::Time);

        assert!(a.same_identity(&b));
        assert!(!a.same_identity(&c));
    }
}
