// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for table loading and the recording engine.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Table and configuration errors.
///
/// Any of these rejects the whole load; the previously active table stays
/// in effect.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Duplicate message id {0}")]
    DuplicateMessageId(crate::MessageId),

    #[error("Packet {message_id}: filter {filter} targets destination {dest} (table has {count})")]
    DestinationOutOfRange {
        message_id: crate::MessageId,
        filter: usize,
        dest: usize,
        count: usize,
    },

    #[error("Packet {message_id}: filter {filter} has N={n} greater than X={x}")]
    InvalidFilterParms {
        message_id: crate::MessageId,
        filter: usize,
        n: u32,
        x: u32,
    },

    #[error("Table has {got} entries, capacity is {max}")]
    TooManyEntries { got: usize, max: usize },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine errors.
///
/// Every variant is local to one message, one slot or one command; none of
/// them stops the dispatch loop.
#[derive(Debug, Error)]
pub enum DsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Destination {slot}: no free sequence number left")]
    SequenceExhausted { slot: usize },

    #[error("Destination {slot}: file {} already exists", path.display())]
    NameCollision { slot: usize, path: PathBuf },

    #[error("Destination {slot}: {len}-byte message cannot fit under the {limit}-byte limit")]
    MessageTooLarge { slot: usize, len: usize, limit: u64 },

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

impl DsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
