// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound message types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bus message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl From<u32> for MessageId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Packet timestamp as carried in the telemetry secondary header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketTime {
    /// Whole seconds.
    pub seconds: u32,
    /// Fraction of a second in units of 2^-32 s.
    pub subseconds: u32,
}

impl PacketTime {
    /// Filter value used by the by-time algorithm: time in sixteenths of a
    /// second, truncated to 32 bits.
    pub fn filter_value(&self) -> u32 {
        (self.seconds << 4) | (self.subseconds >> 28)
    }
}

/// One message delivered by the bus.
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    pub message_id: MessageId,
    pub payload: &'a [u8],
    pub time: Option<PacketTime>,
}

impl<'a> Packet<'a> {
    pub fn new(message_id: impl Into<MessageId>, payload: &'a [u8]) -> Self {
        Self {
            message_id: message_id.into(),
            payload,
            time: None,
        }
    }

    pub fn with_time(mut self, time: PacketTime) -> Self {
        self.time = Some(time);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_display() {
        assert_eq!(MessageId(0x0801).to_string(), "0x0801");
        assert_eq!(MessageId(0x18A5F).to_string(), "0x18A5F");
    }

    #[test]
    fn test_filter_value_sixteenths() {
        let time = PacketTime {
            seconds: 3,
            subseconds: 0x8000_0000,
        };
        // 3.5 s = 56 sixteenths
        assert_eq!(time.filter_value(), 56);
    }
}
