// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use anyhow::{Result, bail};

/// Bytes needed to reach ASC/ASCQ in fixed-format sense data. The sg header
/// only carries 16, so the FRU and sense-key-specific bytes are usually cut.
pub const FIXED_MIN_LEN: usize = 14;

/// SPC fixed-format sense data, as far as a 16-byte sense area holds it.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct SenseData {
    pub valid: bool,        // bit7 of byte0
    pub response_code: u8,  // low-7 bits of byte0
    pub filemark: bool,     // bit7 of byte2
    pub eom: bool,          // bit6 of byte2
    pub ili: bool,          // bit5 of byte2
    pub sense_key: u8,      // low nibble of byte2
    pub information: u32,   // bytes 3-6
    pub additional_len: u8, // byte7
    pub cmd_specific: u32,  // bytes 8-11
    pub asc: u8,            // byte12
    pub ascq: u8,           // byte13
}

impl SenseData {
    /// Parses fixed-format (0x70/0x71) sense data.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < FIXED_MIN_LEN {
            bail!("sense buffer too small: {} < {FIXED_MIN_LEN}", buf.len());
        }
        let response_code = buf[0] & 0x7F;
        if !matches!(response_code, 0x70 | 0x71) {
            bail!("not fixed-format sense data: response code {response_code:#04x}");
        }

        Ok(Self {
            valid: buf[0] & 0x80 != 0,
            response_code,
            filemark: buf[2] & 0x80 != 0,
            eom: buf[2] & 0x40 != 0,
            ili: buf[2] & 0x20 != 0,
            sense_key: buf[2] & 0x0F,
            information: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
            additional_len: buf[7],
            cmd_specific: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            asc: buf[12],
            ascq: buf[13],
        })
    }

    pub fn sense_key_str(&self) -> &'static str {
        match self.sense_key {
            0x0 => "NO SENSE",
            0x1 => "RECOVERED ERROR",
            0x2 => "NOT READY",
            0x3 => "MEDIUM ERROR",
            0x4 => "HARDWARE ERROR",
            0x5 => "ILLEGAL REQUEST",
            0x6 => "UNIT ATTENTION",
            0x7 => "DATA PROTECT",
            0x8 => "BLANK CHECK",
            0xB => "ABORTED COMMAND",
            _ => "RESERVED",
        }
    }
}

impl fmt::Debug for SenseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenseData")
            .field("valid", &self.valid)
            .field(
                "response_code",
                &format_args!("{:#04x}", self.response_code),
            )
            .field("sense_key", &self.sense_key_str())
            .field("filemark", &self.filemark)
            .field("eom", &self.eom)
            .field("ili", &self.ili)
            .field("information", &self.information)
            .field("asc", &format_args!("{:#04x}", self.asc))
            .field("ascq", &format_args!("{:#04x}", self.ascq))
            .field("description", &asc_ascq_to_str(self.asc, self.ascq))
            .finish()
    }
}

/// SPC description of an ASC/ASCQ pair, for the pairs a passthrough caller
/// typically runs into.
#[inline]
pub fn asc_ascq_to_str(asc: u8, ascq: u8) -> &'static str {
    match (asc, ascq) {
        (0x00, 0x00) => "No additional sense information",
        (0x04, 0x00) => "Logical unit not ready, cause not reportable",
        (0x04, 0x01) => "Logical unit is in process of becoming ready",
        (0x20, 0x00) => "Invalid command operation code",
        (0x24, 0x00) => "Invalid field in CDB",
        (0x25, 0x00) => "Logical unit not supported",
        (0x28, 0x00) => "Not ready to ready change, medium may have changed",
        (0x29, 0x00) => "Power on, reset, or bus device reset occurred",
        (0x3A, 0x00) => "Medium not present",
        _ => "UNSPECIFIED / vendor specific",
    }
}
