// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Destination file formats.
//!
//! Supports:
//! - No header (packets only)
//! - cFE file header with data-storage secondary header (default)

pub mod cfe;

pub use cfe::{close_time_bytes, FileHeader, HeaderIds, CONTENT_TYPE, FILE_HDR_SUBTYPE};

use crate::dest_table::FilenameMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Header written at the start of each destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderKind {
    /// Packets only.
    None,
    /// cFE primary header plus data-storage secondary header.
    #[default]
    Cfe,
}

impl HeaderKind {
    /// Header length in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::None => 0,
            Self::Cfe => FileHeader::SIZE as u64,
        }
    }

    /// Encoded header for a newly opened file.
    pub fn encode(
        &self,
        ids: HeaderIds,
        open_time: DateTime<Utc>,
        slot: usize,
        mode: FilenameMode,
        path: &Path,
    ) -> Vec<u8> {
        match self {
            Self::None => Vec::new(),
            Self::Cfe => {
                let filename_type = match mode {
                    FilenameMode::Sequence => 1,
                    FilenameMode::Time => 2,
                };
                FileHeader::new(
                    ids,
                    open_time,
                    slot,
                    filename_type,
                    &path.to_string_lossy(),
                )
                .to_bytes()
            }
        }
    }

    /// In-place update applied when the file closes: `(offset, bytes)`.
    pub fn close_update(&self, close_time: DateTime<Utc>) -> Option<(u64, [u8; 8])> {
        match self {
            Self::None => None,
            Self::Cfe => Some((FileHeader::CLOSE_TIME_OFFSET, close_time_bytes(close_time))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_kind_sizes() {
        assert_eq!(HeaderKind::None.size(), 0);
        assert_eq!(HeaderKind::Cfe.size(), 140);
    }

    #[test]
    fn test_none_has_no_bytes_or_update() {
        let now = Utc::now();
        let bytes = HeaderKind::None.encode(
            HeaderIds::default(),
            now,
            0,
            FilenameMode::Sequence,
            Path::new("/tmp/x"),
        );
        assert!(bytes.is_empty());
        assert!(HeaderKind::None.close_update(now).is_none());
    }

    #[test]
    fn test_cfe_encode_matches_size() {
        let bytes = HeaderKind::Cfe.encode(
            HeaderIds::default(),
            Utc::now(),
            2,
            FilenameMode::Time,
            Path::new("/tmp/x"),
        );
        assert_eq!(bytes.len() as u64, HeaderKind::Cfe.size());
        assert_eq!(&bytes[76..82], b"/tmp/x");
    }
}
