// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CCSDS space packet stream reader.
//!
//! Splits a byte stream of back-to-back space packets into engine packets.
//!
//! ```text
//! +----------------+----------------+----------------+------------------+
//! | stream id (16) | sequence (16)  | length (16)    | data (length+1)  |
//! +----------------+----------------+----------------+------------------+
//! ```
//!
//! The message id is the stream id. The whole packet, primary header
//! included, is what gets stored. When the secondary header flag is set the
//! first six data bytes carry the telemetry time (32-bit seconds, 16-bit
//! subseconds).

use crate::message::{MessageId, Packet, PacketTime};
use byteorder::{BigEndian, ByteOrder};
use std::io::{self, Read};

/// Primary header length.
pub const PRIMARY_HEADER_LEN: usize = 6;

/// Primary header plus telemetry time.
pub const TLM_HEADER_LEN: usize = 12;

/// Secondary header flag in the stream id.
const SECONDARY_HEADER_FLAG: u16 = 0x0800;

/// One packet read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub message_id: MessageId,
    pub bytes: Vec<u8>,
    pub time: Option<PacketTime>,
}

impl RawPacket {
    /// Parse a complete packet.
    pub fn parse(bytes: Vec<u8>) -> io::Result<Self> {
        if bytes.len() < PRIMARY_HEADER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}-byte packet shorter than its header", bytes.len()),
            ));
        }
        let stream_id = BigEndian::read_u16(&bytes[0..2]);
        let time = if stream_id & SECONDARY_HEADER_FLAG != 0 && bytes.len() >= TLM_HEADER_LEN {
            Some(PacketTime {
                seconds: BigEndian::read_u32(&bytes[6..10]),
                subseconds: u32::from(BigEndian::read_u16(&bytes[10..12])) << 16,
            })
        } else {
            None
        };

        Ok(Self {
            message_id: MessageId(u32::from(stream_id)),
            bytes,
            time,
        })
    }

    /// Borrowed view for dispatch.
    pub fn as_packet(&self) -> Packet<'_> {
        Packet {
            message_id: self.message_id,
            payload: &self.bytes,
            time: self.time,
        }
    }
}

/// Reads packets from a byte stream.
pub struct PacketReader<R> {
    reader: R,
}

impl<R: Read> PacketReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Next packet, or `None` at a clean end of stream.
    ///
    /// A stream that ends inside a packet is an `UnexpectedEof` error.
    pub fn next_packet(&mut self) -> io::Result<Option<RawPacket>> {
        let mut header = [0u8; PRIMARY_HEADER_LEN];
        let got = read_full(&mut self.reader, &mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < PRIMARY_HEADER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended inside a packet header",
            ));
        }

        let total = usize::from(BigEndian::read_u16(&header[4..6])) + PRIMARY_HEADER_LEN + 1;
        let mut bytes = vec![0u8; total];
        bytes[..PRIMARY_HEADER_LEN].copy_from_slice(&header);
        self.reader.read_exact(&mut bytes[PRIMARY_HEADER_LEN..])?;

        RawPacket::parse(bytes).map(Some)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Iterator for PacketReader<R> {
    type Item = io::Result<RawPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}

/// Fill `buf`, stopping early only at end of stream.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
