// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! INQUIRY (6).
//!
//! CDB layout (SPC):
//!   [0] = 0x12 (INQUIRY)
//!   [1] = EVPD (bit 0), LUN (bits 7..5 on SCSI-2 devices)
//!   [2] = Page Code (only when EVPD=1; else 0)
//!   [3] = reserved
//!   [4] = Allocation Length (u8)
//!   [5] = Control

use anyhow::{Result, bail};

pub const INQUIRY_OPCODE: u8 = 0x12;
pub const INQUIRY_CDB_LEN: usize = 6;
/// Minimum length of a standard INQUIRY response.
pub const INQUIRY_STANDARD_LEN: usize = 36;
/// Offset of the vendor identification in the response.
pub const INQUIRY_VENDOR: usize = 8;

/// Standard INQUIRY (EVPD=0).
#[inline]
pub fn build_inquiry(allocation_len: u8) -> [u8; INQUIRY_CDB_LEN] {
    [INQUIRY_OPCODE, 0x00, 0x00, 0x00, allocation_len, 0x00]
}

/// VPD INQUIRY (EVPD=1) for `page`.
#[inline]
pub fn build_inquiry_vpd(page: u8, allocation_len: u8) -> [u8; INQUIRY_CDB_LEN] {
    [INQUIRY_OPCODE, 0x01, page, 0x00, allocation_len, 0x00]
}

/// Decoded view of an INQUIRY CDB, for request dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InquiryCdb {
    pub evpd: bool,
    pub lun: u8,
    pub page_code: u8,
    pub allocation_len: u8,
    pub control: u8,
}

impl InquiryCdb {
    /// `None` if `cdb` is not a complete INQUIRY command.
    pub fn parse(cdb: &[u8]) -> Option<Self> {
        match cdb {
            [INQUIRY_OPCODE, b1, page, _, alloc, control, ..] => Some(Self {
                evpd: b1 & 0x01 != 0,
                lun: (b1 & 0xE0) >> 5,
                page_code: *page,
                allocation_len: *alloc,
                control: *control,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryStandard {
    pub peripheral_qualifier: u8, // bits 7..5 of byte0
    pub device_type: u8,          // bits 4..0 of byte0
    pub rmb: bool,                // byte1 bit7
    pub version: u8,              // byte2
    pub response_data_format: u8, // byte3 low nibble
    pub additional_length: u8,    // byte4
    pub vendor_id: String,        // bytes 8..16
    pub product_id: String,       // bytes 16..32
    pub product_rev: String,      // bytes 32..36
}

impl InquiryStandard {
    pub fn device_type_str(&self) -> &'static str {
        match self.device_type {
            0x00 => "Direct-access block (disk)",
            0x01 => "Sequential-access (tape)",
            0x02 => "Printer",
            0x03 => "Processor",
            0x04 => "WORM",
            0x05 => "CD/DVD",
            0x06 => "Scanner",
            0x07 => "Optical memory",
            0x08 => "Medium changer",
            0x09 => "Communications",
            _ => "Unknown/Reserved",
        }
    }
}

/// Parses a standard INQUIRY response (at least 36 bytes).
pub fn parse_inquiry_standard(buf: &[u8]) -> Result<InquiryStandard> {
    if buf.len() < INQUIRY_STANDARD_LEN {
        bail!("INQUIRY buffer too short: {}", buf.len());
    }

    Ok(InquiryStandard {
        peripheral_qualifier: (buf[0] >> 5) & 0x07,
        device_type: buf[0] & 0x1F,
        rmb: buf[1] & 0x80 != 0,
        version: buf[2],
        response_data_format: buf[3] & 0x0F,
        additional_length: buf[4],
        vendor_id: trim_ascii(&buf[INQUIRY_VENDOR..16]),
        product_id: trim_ascii(&buf[16..32]),
        product_rev: trim_ascii(&buf[32..36]),
    })
}

/// Vendor field of a (possibly truncated) response, for logging.
pub fn vendor_of(buf: &[u8]) -> Option<String> {
    buf.get(INQUIRY_VENDOR..16).map(trim_ascii)
}

fn trim_ascii(bytes: &[u8]) -> String {
    let s: String = bytes
        .iter()
        .map(|&b| if b.is_ascii() && b != 0 { b as char } else { ' ' })
        .collect();
    s.trim().to_string()
}
