// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! cFE-style file header for destination files.
//!
//! # Layout (big-endian)
//!
//! ```text
//! +---------------------------------------------------------+
//! |              Primary Header (64 bytes)                   |
//! |  ContentType (4) | SubType (4) | Length (4)              |
//! |  SpacecraftId (4) | ProcessorId (4) | ApplicationId (4)  |
//! |  OpenSeconds (4) | OpenSubseconds (4)                    |
//! |  Description (32, NUL padded)                           |
//! +---------------------------------------------------------+
//! |              Secondary Header (76 bytes)                 |
//! |  CloseSeconds (4) | CloseSubseconds (4)                  |
//! |  FileTableIndex (2) | FilenameType (2)                   |
//! |  Filename (64, NUL padded)                              |
//! +---------------------------------------------------------+
//! |              Packets...                                  |
//! +---------------------------------------------------------+
//! ```
//!
//! The close time is zero while the file is open and rewritten in place
//! when the file is closed.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use std::io::{self, Read, Write};

/// Content type magic: "cFE1".
pub const CONTENT_TYPE: u32 = 0x6346_4531;

/// Sub type identifying data-storage files.
pub const FILE_HDR_SUBTYPE: u32 = 0x2710;

/// Description written into every header.
pub const FILE_HDR_DESCRIPTION: &str = "DS data storage file";

const DESCRIPTION_SIZE: usize = 32;
const FILENAME_SIZE: usize = 64;

/// Mission identifiers stamped into the primary header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderIds {
    pub spacecraft_id: u32,
    pub processor_id: u32,
    pub application_id: u32,
}

/// Primary header (64 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryHeader {
    pub content_type: u32,
    pub sub_type: u32,
    pub length: u32,
    pub ids: HeaderIds,
    pub seconds: u32,
    pub subseconds: u32,
    pub description: [u8; DESCRIPTION_SIZE],
}

impl PrimaryHeader {
    pub const SIZE: usize = 64;

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.content_type)?;
        w.write_u32::<BigEndian>(self.sub_type)?;
        w.write_u32::<BigEndian>(self.length)?;
        w.write_u32::<BigEndian>(self.ids.spacecraft_id)?;
        w.write_u32::<BigEndian>(self.ids.processor_id)?;
        w.write_u32::<BigEndian>(self.ids.application_id)?;
        w.write_u32::<BigEndian>(self.seconds)?;
        w.write_u32::<BigEndian>(self.subseconds)?;
        w.write_all(&self.description)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let content_type = r.read_u32::<BigEndian>()?;
        if content_type != CONTENT_TYPE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid cFE file content type",
            ));
        }

        let sub_type = r.read_u32::<BigEndian>()?;
        let length = r.read_u32::<BigEndian>()?;
        let ids = HeaderIds {
            spacecraft_id: r.read_u32::<BigEndian>()?,
            processor_id: r.read_u32::<BigEndian>()?,
            application_id: r.read_u32::<BigEndian>()?,
        };
        let seconds = r.read_u32::<BigEndian>()?;
        let subseconds = r.read_u32::<BigEndian>()?;
        let mut description = [0u8; DESCRIPTION_SIZE];
        r.read_exact(&mut description)?;

        Ok(Self {
            content_type,
            sub_type,
            length,
            ids,
            seconds,
            subseconds,
            description,
        })
    }
}

/// Data-storage secondary header (76 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryHeader {
    pub close_seconds: u32,
    pub close_subseconds: u32,
    pub file_table_index: u16,
    pub filename_type: u16,
    pub filename: [u8; FILENAME_SIZE],
}

impl SecondaryHeader {
    pub const SIZE: usize = 76;

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.close_seconds)?;
        w.write_u32::<BigEndian>(self.close_subseconds)?;
        w.write_u16::<BigEndian>(self.file_table_index)?;
        w.write_u16::<BigEndian>(self.filename_type)?;
        w.write_all(&self.filename)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let close_seconds = r.read_u32::<BigEndian>()?;
        let close_subseconds = r.read_u32::<BigEndian>()?;
        let file_table_index = r.read_u16::<BigEndian>()?;
        let filename_type = r.read_u16::<BigEndian>()?;
        let mut filename = [0u8; FILENAME_SIZE];
        r.read_exact(&mut filename)?;

        Ok(Self {
            close_seconds,
            close_subseconds,
            file_table_index,
            filename_type,
            filename,
        })
    }

    /// Filename with NUL padding stripped.
    pub fn filename(&self) -> String {
        let len = self
            .filename
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILENAME_SIZE);
        String::from_utf8_lossy(&self.filename[..len]).to_string()
    }
}

/// Complete destination file header (140 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub primary: PrimaryHeader,
    pub secondary: SecondaryHeader,
}

impl FileHeader {
    pub const SIZE: usize = PrimaryHeader::SIZE + SecondaryHeader::SIZE;

    /// Offset of the close time within the file.
    pub const CLOSE_TIME_OFFSET: u64 = PrimaryHeader::SIZE as u64;

    /// Header for a file opened at `open_time`; close time left at zero.
    pub fn new(
        ids: HeaderIds,
        open_time: DateTime<Utc>,
        slot: usize,
        filename_type: u16,
        filename: &str,
    ) -> Self {
        let (seconds, subseconds) = split_time(open_time);
        Self {
            primary: PrimaryHeader {
                content_type: CONTENT_TYPE,
                sub_type: FILE_HDR_SUBTYPE,
                length: PrimaryHeader::SIZE as u32,
                ids,
                seconds,
                subseconds,
                description: padded(FILE_HDR_DESCRIPTION),
            },
            secondary: SecondaryHeader {
                close_seconds: 0,
                close_subseconds: 0,
                file_table_index: slot as u16,
                filename_type,
                filename: padded(filename),
            },
        }
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.primary.write(w)?;
        self.secondary.write(w)
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            primary: PrimaryHeader::read(r)?,
            secondary: SecondaryHeader::read(r)?,
        })
    }

    /// Serialized header.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        // Writing into a Vec cannot fail.
        let _ = self.write(&mut buf);
        buf
    }
}

/// Bytes written at [`FileHeader::CLOSE_TIME_OFFSET`] when closing.
pub fn close_time_bytes(close_time: DateTime<Utc>) -> [u8; 8] {
    let (seconds, subseconds) = split_time(close_time);
    let mut buf = [0u8; 8];
    buf[..4].copy_from_slice(&seconds.to_be_bytes());
    buf[4..].copy_from_slice(&subseconds.to_be_bytes());
    buf
}

/// Split a time into whole seconds and 2^-32 fractions.
fn split_time(time: DateTime<Utc>) -> (u32, u32) {
    let seconds = time.timestamp().clamp(0, i64::from(u32::MAX)) as u32;
    let nanos = u64::from(time.timestamp_subsec_nanos().min(999_999_999));
    let subseconds = ((nanos << 32) / 1_000_000_000) as u32;
    (seconds, subseconds)
}

/// NUL-padded fixed-size copy of `s`, truncated to leave a terminator.
fn padded<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let bytes = s.as_bytes();
    let len = bytes.len().min(N - 1);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn open_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 500_000_000)
            .single()
            .expect("time")
    }

    #[test]
    fn test_header_size() {
        let header = FileHeader::new(HeaderIds::default(), open_time(), 3, 1, "/ram/x_00000001");
        assert_eq!(header.to_bytes().len(), FileHeader::SIZE);
        assert_eq!(FileHeader::SIZE, 140);
    }

    #[test]
    fn test_header_fields() {
        let ids = HeaderIds {
            spacecraft_id: 0x42,
            processor_id: 1,
            application_id: 7,
        };
        let header = FileHeader::new(ids, open_time(), 3, 2, "/ram/ds/events_00000001.dat");
        let bytes = header.to_bytes();

        assert_eq!(&bytes[0..4], b"cFE1");
        assert_eq!(&bytes[4..8], &FILE_HDR_SUBTYPE.to_be_bytes());
        assert_eq!(&bytes[8..12], &64u32.to_be_bytes());
        assert_eq!(&bytes[12..16], &0x42u32.to_be_bytes());
        assert_eq!(&bytes[24..28], &1_700_000_000u32.to_be_bytes());
        assert_eq!(&bytes[28..32], &0x8000_0000u32.to_be_bytes());
        assert!(bytes[32..64].starts_with(FILE_HDR_DESCRIPTION.as_bytes()));
        // Close time zero until closed.
        assert_eq!(&bytes[64..72], &[0u8; 8]);

        let parsed = FileHeader::read(&mut std::io::Cursor::new(bytes)).expect("read");
        assert_eq!(parsed, header);
        assert_eq!(parsed.secondary.file_table_index, 3);
        assert_eq!(parsed.secondary.filename(), "/ram/ds/events_00000001.dat");
    }

    #[test]
    fn test_close_time_bytes() {
        let close = Utc.timestamp_opt(1_700_000_100, 0).single().expect("time");
        let bytes = close_time_bytes(close);
        assert_eq!(&bytes[..4], &1_700_000_100u32.to_be_bytes());
        assert_eq!(&bytes[4..], &[0u8; 4]);
    }

    #[test]
    fn test_long_filename_truncated() {
        let long = "x".repeat(100);
        let header = FileHeader::new(HeaderIds::default(), open_time(), 0, 1, &long);
        assert_eq!(header.secondary.filename().len(), 63);
    }

    #[test]
    fn test_bad_content_type() {
        let mut bytes = FileHeader::new(HeaderIds::default(), open_time(), 0, 1, "f").to_bytes();
        bytes[0] = b'x';
        assert!(FileHeader::read(&mut std::io::Cursor::new(bytes)).is_err());
    }
}
