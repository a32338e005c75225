// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine configuration.
//!
//! Supports both programmatic and file-based configuration.
//!
//! ```toml
//! secs_per_hk_cycle = 4
//! persist_enable_state = true
//! state_file = "/cf/ds_state.json"
//! header = "cfe"
//! spacecraft_id = 66
//! filter_table = "/cf/ds_filter_tbl.toml"
//! dest_table = "/cf/ds_file_tbl.toml"
//! ```

use crate::error::ConfigError;
use crate::filename::{SequencePolicy, MAX_SEQUENCE_COUNT, SEQUENCE_DIGITS};
use crate::format::{HeaderIds, HeaderKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between housekeeping ticks.
    #[serde(default = "default_hk_cycle")]
    pub secs_per_hk_cycle: u64,

    /// Packet processing state when nothing is persisted.
    #[serde(default = "default_true")]
    pub default_enable_state: bool,

    /// Persist the packet processing state across restarts.
    #[serde(default = "default_true")]
    pub persist_enable_state: bool,

    /// Durable store location (None = not persisted).
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Destination file header.
    #[serde(default)]
    pub header: HeaderKind,

    /// Move closed files to the slot's move directory.
    #[serde(default = "default_true")]
    pub move_files: bool,

    /// Width of sequence-mode discriminators.
    #[serde(default = "default_digits")]
    pub sequence_digits: usize,

    /// Largest sequence number before wrapping to 1.
    #[serde(default = "default_max_sequence")]
    pub max_sequence_count: u32,

    #[serde(default)]
    pub spacecraft_id: u32,

    #[serde(default)]
    pub processor_id: u32,

    #[serde(default)]
    pub application_id: u32,

    /// Filter table loaded at startup.
    #[serde(default)]
    pub filter_table: Option<PathBuf>,

    /// Destination table loaded at startup.
    #[serde(default)]
    pub dest_table: Option<PathBuf>,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_hk_cycle() -> u64 {
    4
}

fn default_true() -> bool {
    true
}

fn default_digits() -> usize {
    SEQUENCE_DIGITS
}

fn default_max_sequence() -> u32 {
    MAX_SEQUENCE_COUNT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            secs_per_hk_cycle: default_hk_cycle(),
            default_enable_state: true,
            persist_enable_state: true,
            state_file: None,
            header: HeaderKind::Cfe,
            move_files: true,
            sequence_digits: SEQUENCE_DIGITS,
            max_sequence_count: MAX_SEQUENCE_COUNT,
            spacecraft_id: 0,
            processor_id: 0,
            application_id: 0,
            filter_table: None,
            dest_table: None,
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Create a new config builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secs_per_hk_cycle == 0 {
            return Err(ConfigError::Invalid(
                "secs_per_hk_cycle must be at least 1".into(),
            ));
        }
        if self.max_sequence_count == 0 {
            return Err(ConfigError::Invalid(
                "max_sequence_count must be at least 1".into(),
            ));
        }
        if self.sequence_digits == 0
            || self.sequence_digits < self.max_sequence_count.to_string().len()
        {
            return Err(ConfigError::Invalid(format!(
                "max_sequence_count {} does not fit in {} digits",
                self.max_sequence_count, self.sequence_digits
            )));
        }
        Ok(())
    }

    /// Sequence numbering policy.
    pub fn sequence_policy(&self) -> SequencePolicy {
        SequencePolicy {
            digits: self.sequence_digits,
            max: self.max_sequence_count,
        }
    }

    /// Identifiers stamped into file headers.
    pub fn header_ids(&self) -> HeaderIds {
        HeaderIds {
            spacecraft_id: self.spacecraft_id,
            processor_id: self.processor_id,
            application_id: self.application_id,
        }
    }
}

/// Config builder for fluent API.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: Option<EngineConfig>,
}

impl EngineConfigBuilder {
    fn with(mut self, f: impl FnOnce(&mut EngineConfig)) -> Self {
        let mut config = self.config.take().unwrap_or_default();
        f(&mut config);
        self.config = Some(config);
        self
    }

    /// Set housekeeping cycle length in seconds.
    pub fn secs_per_hk_cycle(self, secs: u64) -> Self {
        self.with(|c| c.secs_per_hk_cycle = secs)
    }

    /// Set processing state used when nothing is persisted.
    pub fn default_enable_state(self, enabled: bool) -> Self {
        self.with(|c| c.default_enable_state = enabled)
    }

    /// Persist processing state across restarts.
    pub fn persist_enable_state(self, persist: bool) -> Self {
        self.with(|c| c.persist_enable_state = persist)
    }

    /// Set durable store location.
    pub fn state_file(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.with(|c| c.state_file = Some(path))
    }

    /// Set file header kind.
    pub fn header(self, header: HeaderKind) -> Self {
        self.with(|c| c.header = header)
    }

    /// Enable or disable moving closed files.
    pub fn move_files(self, enabled: bool) -> Self {
        self.with(|c| c.move_files = enabled)
    }

    /// Set sequence width and maximum.
    pub fn sequence(self, digits: usize, max: u32) -> Self {
        self.with(|c| {
            c.sequence_digits = digits;
            c.max_sequence_count = max;
        })
    }

    /// Set header identifiers.
    pub fn ids(self, spacecraft_id: u32, processor_id: u32, application_id: u32) -> Self {
        self.with(|c| {
            c.spacecraft_id = spacecraft_id;
            c.processor_id = processor_id;
            c.application_id = application_id;
        })
    }

    /// Build the configuration.
    pub fn build(self) -> EngineConfig {
        self.config.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();

        assert_eq!(config.secs_per_hk_cycle, 4);
        assert_eq!(config.header, HeaderKind::Cfe);
        assert_eq!(config.max_sequence_count, 99_999_999);
        assert_eq!(config.sequence_digits, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::builder()
            .secs_per_hk_cycle(1)
            .header(HeaderKind::None)
            .sequence(2, 99)
            .ids(66, 1, 7)
            .persist_enable_state(false)
            .build();

        assert_eq!(config.secs_per_hk_cycle, 1);
        assert_eq!(config.header, HeaderKind::None);
        assert_eq!(config.sequence_policy().max, 99);
        assert_eq!(config.header_ids().spacecraft_id, 66);
        assert!(!config.persist_enable_state);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sequence_must_fit_digits() {
        let config = EngineConfig::builder().sequence(2, 100).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_hk_cycle_rejected() {
        let config = EngineConfig::builder().secs_per_hk_cycle(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
secs_per_hk_cycle = 2
header = "none"
state_file = "/tmp/state.json"
move_files = false
"#,
        )
        .expect("parse");

        assert_eq!(config.secs_per_hk_cycle, 2);
        assert_eq!(config.header, HeaderKind::None);
        assert_eq!(config.state_file, Some(PathBuf::from("/tmp/state.json")));
        assert!(!config.move_files);
        assert!(config.default_enable_state);
    }
}
