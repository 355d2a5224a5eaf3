// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use thiserror::Error;

/// ASPI request status, as carried in the `SRB_Status` byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Status {
    /// 0x00 – request accepted, exchange in flight
    #[default]
    Pending = 0x00,
    /// 0x01 – completed without error
    Complete = 0x01,
    /// 0x04 – completed with error
    Error = 0x04,
    /// 0xE0 – malformed request block
    InvalidRequest = 0xE0,
    /// 0xE5 – device exclusively held elsewhere
    Busy = 0xE5,
}

#[derive(Debug, Error)]
#[error("invalid ASPI status: 0x{0:02x}")]
pub struct UnknownStatus(pub u8);

impl From<Status> for u8 {
    #[inline]
    fn from(s: Status) -> u8 {
        s as u8
    }
}

impl TryFrom<u8> for Status {
    type Error = UnknownStatus;

    fn try_from(b: u8) -> Result<Self, UnknownStatus> {
        Ok(match b {
            0x00 => Status::Pending,
            0x01 => Status::Complete,
            0x04 => Status::Error,
            0xE0 => Status::InvalidRequest,
            0xE5 => Status::Busy,
            other => return Err(UnknownStatus(other)),
        })
    }
}

impl Status {
    /// Terminal states end the per-request state machine.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Pending)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Pending => "SS_PENDING",
            Status::Complete => "SS_COMP",
            Status::Error => "SS_ERR",
            Status::InvalidRequest => "SS_INVALID_SRB",
            Status::Busy => "SS_ASPI_IS_BUSY",
        })
    }
}

/// Host adapter status reported on success.
pub const HOST_STATUS_OK: u8 = 0x00;
/// SCSI target status GOOD.
pub const TARGET_STATUS_GOOD: u8 = 0x00;
